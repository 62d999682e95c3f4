//! Passive-mode data connections and timed byte copies.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::stream::bounded;
use super::FtpError;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Port from `229 Entering Extended Passive Mode (|||6446|)`.
pub(crate) fn parse_epsv_reply(text: &str) -> Option<u16> {
    let open = text.find('(')?;
    let close = text[open..].find(')')? + open;
    let inner = &text[open + 1..close];

    // Delimiter is whatever character the server chose, usually '|'
    let delimiter = inner.chars().next()?;
    let fields: Vec<&str> = inner.split(delimiter).collect();
    if fields.len() != 5 {
        return None;
    }
    fields[3].parse().ok()
}

/// Address from `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
pub(crate) fn parse_pasv_reply(text: &str) -> Option<SocketAddrV4Parts> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let numbers: Vec<u8> = text[start..]
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .take(6)
        .map(|s| s.parse::<u8>())
        .collect::<Result<_, _>>()
        .ok()?;

    if numbers.len() != 6 {
        return None;
    }

    Some(SocketAddrV4Parts {
        ip: Ipv4Addr::new(numbers[0], numbers[1], numbers[2], numbers[3]),
        port: u16::from(numbers[4]) << 8 | u16::from(numbers[5]),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SocketAddrV4Parts {
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// Servers behind NAT often advertise their private address in `227` replies.
/// Use the control connection's peer instead unless that peer is private too.
pub(crate) fn passive_target(advertised: SocketAddrV4Parts, control_peer: SocketAddr) -> SocketAddr {
    let advertised_private = advertised.ip.is_private()
        || advertised.ip.is_loopback()
        || advertised.ip.is_unspecified();
    let peer_private = match control_peer.ip() {
        IpAddr::V4(ip) => ip.is_private() || ip.is_loopback(),
        IpAddr::V6(ip) => ip.is_loopback(),
    };

    if advertised_private && !peer_private {
        SocketAddr::new(control_peer.ip(), advertised.port)
    } else {
        SocketAddr::new(IpAddr::V4(advertised.ip), advertised.port)
    }
}

/// Which side of a copy failed.
#[derive(Debug)]
pub(crate) enum CopyFailure {
    Source(FtpError),
    Sink(FtpError),
}

/// Copy until EOF, applying the inactivity timeout to every read and write.
///
/// `lenient_eof` treats an abrupt close as end of data; some FTPS servers
/// close data connections without a TLS close_notify. The final transfer
/// reply still decides success.
pub(crate) async fn copy_bounded<R, W>(
    reader: &mut R,
    writer: &mut W,
    limit: Duration,
    lenient_eof: bool,
) -> Result<u64, CopyFailure>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match bounded(limit, reader.read(&mut buffer)).await {
            Ok(n) => n,
            Err(FtpError::Io(err))
                if lenient_eof && err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                0
            }
            Err(err) => return Err(CopyFailure::Source(err)),
        };
        if n == 0 {
            break;
        }

        bounded(limit, writer.write_all(&buffer[..n]))
            .await
            .map_err(CopyFailure::Sink)?;
        total += n as u64;
    }

    bounded(limit, writer.flush())
        .await
        .map_err(CopyFailure::Sink)?;

    Ok(total)
}
