//! Directory entries and `LIST` output parsing (Unix `ls -l` and DOS/IIS styles).

/// Entry type. The discriminant is the numeric `type` code exposed by the list API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Unknown = 0,
    File = 1,
    Directory = 2,
    Symlink = 3,
}

impl EntryKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            EntryKind::Unknown => "unknown",
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::Symlink => "symlink",
        }
    }
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub size: u64,
    pub kind: EntryKind,
    /// Timestamp as printed by the server (e.g. `Jan 05 12:30`)
    pub modified_at: Option<String>,
}

impl RemoteEntry {
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Parse a full `LIST` response. Lines that match no known format are skipped.
pub fn parse_list(text: &str) -> Vec<RemoteEntry> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty() && !line.starts_with("total "))
        .filter_map(|line| parse_unix_line(line).or_else(|| parse_dos_line(line)))
        .filter(|entry| entry.name != "." && entry.name != "..")
        .collect()
}

/// Byte ranges of whitespace-separated tokens, so names keep inner spaces.
fn token_spans(line: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, ch) in line.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, line.len()));
    }
    spans
}

fn is_month(token: &str) -> bool {
    MONTHS.contains(&token.to_ascii_lowercase().as_str())
}

fn is_number(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// `12:30` or `2023`
fn is_time_or_year(token: &str) -> bool {
    match token.split_once(':') {
        Some((hours, minutes)) => {
            is_number(hours) && hours.len() <= 2 && is_number(minutes) && minutes.len() == 2
        }
        None => is_number(token) && token.len() == 4,
    }
}

// drwxr-xr-x 2 owner group 4096 Jan 05 12:30 name
// Owner/group columns vary between servers, so anchor on "<size> <month> <day> <time|year>".
// A group may itself be named like a month, hence the full four-token match.
fn parse_unix_line(line: &str) -> Option<RemoteEntry> {
    let kind = match line.chars().next()? {
        'd' => EntryKind::Directory,
        '-' => EntryKind::File,
        'l' => EntryKind::Symlink,
        'b' | 'c' | 'p' | 's' => EntryKind::Unknown,
        _ => return None,
    };

    let spans = token_spans(line);
    let token = |i: usize| &line[spans[i].0..spans[i].1];

    let month_index = (2..spans.len().saturating_sub(3))
        .find(|&i| {
            is_month(token(i))
                && is_number(token(i - 1))
                && is_number(token(i + 1))
                && is_time_or_year(token(i + 2))
        })?;

    let size = token(month_index - 1).parse::<u64>().ok()?;
    let modified_at = format!(
        "{} {} {}",
        token(month_index),
        token(month_index + 1),
        token(month_index + 2)
    );

    let mut name = &line[spans[month_index + 3].0..];
    if kind == EntryKind::Symlink {
        if let Some(arrow) = name.find(" -> ") {
            name = &name[..arrow];
        }
    }

    Some(RemoteEntry {
        name: name.to_string(),
        size,
        kind,
        modified_at: Some(modified_at),
    })
}

// 01-05-24  12:30PM       <DIR>          archive
// 01-05-24  12:30PM                 2048 report.pdf
fn parse_dos_line(line: &str) -> Option<RemoteEntry> {
    let spans = token_spans(line);
    if spans.len() < 4 {
        return None;
    }
    let token = |i: usize| &line[spans[i].0..spans[i].1];

    let date = token(0);
    let looks_like_date = date.len() >= 8
        && date
            .split(['-', '/'])
            .all(|part| is_number(part) && part.len() <= 4);
    if !looks_like_date {
        return None;
    }

    let time = token(1);
    if !time.contains(':') {
        return None;
    }

    let (kind, size) = if token(2).eq_ignore_ascii_case("<DIR>") {
        (EntryKind::Directory, 0)
    } else {
        (EntryKind::File, token(2).parse::<u64>().ok()?)
    };

    Some(RemoteEntry {
        name: line[spans[3].0..].to_string(),
        size,
        kind,
        modified_at: Some(format!("{date} {time}")),
    })
}
