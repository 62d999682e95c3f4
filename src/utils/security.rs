use std::fmt;

//===============
// Name Handling
//===============
// Names and directories are sent verbatim on the FTP control channel,
// so anything that could split a command line or climb the tree is rejected.
#[derive(Debug, PartialEq, Eq)]
pub enum NameValidationError {
    Empty,
    ContainsSeparator,
    ContainsParentDir,
    ControlCharacter,
    DotName,
}

impl fmt::Display for NameValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameValidationError::Empty => write!(f, "is empty"),
            NameValidationError::ContainsSeparator => {
                write!(f, "must not contain path separators (/ or \\)")
            }
            NameValidationError::ContainsParentDir => {
                write!(f, "must not contain parent directory segments (..)")
            }
            NameValidationError::ControlCharacter => {
                write!(f, "must not contain control characters")
            }
            NameValidationError::DotName => write!(f, "must not be . or .."),
        }
    }
}

impl std::error::Error for NameValidationError {}

// CR/LF would let a caller smuggle extra FTP commands, NUL truncates C strings
fn check_characters(value: &str) -> Result<(), NameValidationError> {
    if value.trim().is_empty() {
        return Err(NameValidationError::Empty);
    }
    if value.chars().any(char::is_control) {
        return Err(NameValidationError::ControlCharacter);
    }
    Ok(())
}

// A bare file name placed into a remote directory
pub fn validate_file_name(name: &str) -> Result<(), NameValidationError> {
    check_characters(name)?;

    if name.contains(['/', '\\']) {
        return Err(NameValidationError::ContainsSeparator);
    }
    if name == "." || name == ".." {
        return Err(NameValidationError::DotName);
    }

    Ok(())
}

// A remote directory, absolute or relative to the login directory
// Separators are fine here; climbing out with ".." is not
pub fn validate_remote_dir(dir: &str) -> Result<(), NameValidationError> {
    check_characters(dir)?;

    if dir.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(NameValidationError::ContainsParentDir);
    }

    Ok(())
}
