//! FTP control channel: command writes and (multi-line) reply parsing.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::stream::{bounded, FtpStream};
use super::tls::FtpTls;
use super::FtpError;

/// One complete server reply. Multi-line texts are joined with `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    pub fn is_permanent_failure(&self) -> bool {
        (500..600).contains(&self.code)
    }
}

pub struct ControlChannel {
    stream: BufReader<FtpStream>,
    timeout: Duration,
}

impl ControlChannel {
    pub fn new(stream: FtpStream, timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, FtpError> {
        Ok(self.stream.get_ref().peer_addr()?)
    }

    /// Switch the control connection to TLS after a `234` to `AUTH TLS`.
    pub async fn upgrade(self, tls: &FtpTls) -> Result<Self, FtpError> {
        let timeout = self.timeout;
        let tcp = match self.stream.into_inner() {
            FtpStream::Plain(tcp) => tcp,
            FtpStream::Tls(_) => {
                return Err(FtpError::Protocol("control channel already uses TLS".into()))
            }
        };

        let stream = tls.wrap(tcp, timeout).await?;
        Ok(Self::new(stream, timeout))
    }

    pub async fn send(&mut self, command: &str) -> Result<(), FtpError> {
        if command.starts_with("PASS ") {
            tracing::debug!("ftp > PASS ****");
        } else {
            tracing::debug!("ftp > {}", command);
        }

        let line = format!("{command}\r\n");
        let timeout = self.timeout;
        let writer = self.stream.get_mut();
        bounded(timeout, writer.write_all(line.as_bytes())).await?;
        bounded(timeout, writer.flush()).await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, FtpError> {
        let mut raw = Vec::new();
        let n = bounded(self.timeout, self.stream.read_until(b'\n', &mut raw)).await?;
        if n == 0 {
            return Err(FtpError::Closed);
        }

        let line = String::from_utf8_lossy(&raw);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    pub async fn read_reply(&mut self) -> Result<Reply, FtpError> {
        let first = self.read_line().await?;
        let (code, multiline, text) = parse_status_line(&first)?;

        let mut lines = vec![text.to_string()];
        if multiline {
            // Continuation ends at "<code> "; intermediate lines may be anything
            let terminator = format!("{code} ");
            loop {
                let line = self.read_line().await?;
                if line.starts_with(&terminator) || line == code.to_string() {
                    lines.push(line.get(4..).unwrap_or_default().to_string());
                    break;
                }
                lines.push(line);
            }
        }

        let reply = Reply {
            code,
            text: lines.join("\n"),
        };
        tracing::debug!("ftp < {} {}", reply.code, reply.text);
        Ok(reply)
    }

    /// Send a command and return whatever reply comes back.
    pub async fn command(&mut self, command: &str) -> Result<Reply, FtpError> {
        self.send(command).await?;
        self.read_reply().await
    }

    /// Send a command and fail unless the reply code is one of `expected`.
    pub async fn execute(&mut self, command: &str, expected: &[u16]) -> Result<Reply, FtpError> {
        let reply = self.command(command).await?;
        expect_reply(command, reply, expected)
    }
}

pub(crate) fn expect_reply(command: &str, reply: Reply, expected: &[u16]) -> Result<Reply, FtpError> {
    if expected.contains(&reply.code) {
        Ok(reply)
    } else {
        Err(unexpected(command, reply))
    }
}

pub(crate) fn unexpected(command: &str, reply: Reply) -> FtpError {
    FtpError::UnexpectedReply {
        command: command_verb(command).to_string(),
        code: reply.code,
        message: reply.text,
    }
}

/// Verb only, so arguments (paths, passwords) never end up in error messages.
fn command_verb(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}

fn parse_status_line(line: &str) -> Result<(u16, bool, &str), FtpError> {
    let code = line
        .get(..3)
        .filter(|c| c.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| FtpError::Protocol(format!("bad status line: {line:?}")))?;

    match line.as_bytes().get(3) {
        None => Ok((code, false, "")),
        Some(b' ') => Ok((code, false, &line[4..])),
        Some(b'-') => Ok((code, true, &line[4..])),
        Some(_) => Err(FtpError::Protocol(format!("bad status line: {line:?}"))),
    }
}

/// Extract the quoted path from a `257 "<path>" ...` reply. Doubled quotes are literal.
pub(crate) fn parse_pwd_reply(text: &str) -> Option<String> {
    let start = text.find('"')? + 1;
    let bytes = text.as_bytes();
    let mut path = String::new();
    let mut i = start;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            if bytes.get(i + 1) == Some(&b'"') {
                path.push('"');
                i += 2;
                continue;
            }
            return Some(path);
        }
        let ch = text[i..].chars().next()?;
        path.push(ch);
        i += ch.len_utf8();
    }
    None
}
