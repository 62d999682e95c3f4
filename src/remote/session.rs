//! FTP/FTPS implementation of the remote session traits.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::control::{expect_reply, parse_pwd_reply, unexpected, ControlChannel, Reply};
use super::facts::{parse_list, RemoteEntry};
use super::stream::{bounded, FtpStream};
use super::tls::FtpTls;
use super::transfer::{
    copy_bounded, parse_epsv_reply, parse_pasv_reply, passive_target, CopyFailure,
};
use super::{FtpError, RemoteConnector, RemoteError, RemoteSession};
use crate::common::config::{RemoteSettings, SecurityMode};

/// Opens one fresh FTP session per call. Sessions are never pooled.
pub struct FtpConnector {
    settings: Arc<RemoteSettings>,
    tls: Option<FtpTls>,
}

impl FtpConnector {
    pub fn new(settings: Arc<RemoteSettings>) -> Result<Self, FtpError> {
        let tls = if settings.security.is_tls() {
            Some(FtpTls::new(&settings.host)?)
        } else {
            None
        };

        Ok(Self { settings, tls })
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }
}

#[async_trait]
impl RemoteConnector for FtpConnector {
    async fn open(&self) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let endpoint = self.endpoint();
        match FtpSession::connect(&self.settings, self.tls.clone()).await {
            Ok(session) => {
                tracing::debug!(%endpoint, home = %session.home, "FTP session opened");
                Ok(Box::new(session))
            }
            Err(source) => Err(RemoteError::Connect {
                host: endpoint,
                source,
            }),
        }
    }
}

pub struct FtpSession {
    control: ControlChannel,
    tls: Option<FtpTls>,
    /// Working directory right after login; every operation returns here
    home: String,
    epsv_supported: bool,
}

impl FtpSession {
    pub async fn connect(
        settings: &RemoteSettings,
        tls: Option<FtpTls>,
    ) -> Result<Self, FtpError> {
        let limit = Duration::from_millis(settings.timeout_ms);
        let endpoint = format!("{}:{}", settings.host, settings.port);

        let addr = resolve(&endpoint, limit).await?;
        let tcp = bounded(limit, TcpStream::connect(addr)).await?;

        let stream = match (settings.security, &tls) {
            (SecurityMode::Implicit, Some(tls)) => tls.wrap(tcp, limit).await?,
            _ => FtpStream::Plain(tcp),
        };

        let mut control = ControlChannel::new(stream, limit);
        let greeting = control.read_reply().await?;
        expect_reply("CONNECT", greeting, &[220])?;

        if let (SecurityMode::Explicit, Some(tls)) = (settings.security, &tls) {
            control.execute("AUTH TLS", &[234]).await?;
            control = control.upgrade(tls).await?;
        }

        login(&mut control, &settings.user, &settings.password).await?;

        if tls.is_some() {
            control.execute("PBSZ 0", &[200]).await?;
            control.execute("PROT P", &[200]).await?;
        }

        control.execute("TYPE I", &[200]).await?;

        let pwd = control.execute("PWD", &[257]).await?;
        let home = parse_pwd_reply(&pwd.text)
            .ok_or_else(|| FtpError::Protocol(format!("unparseable PWD reply: {}", pwd.text)))?;

        Ok(Self {
            control,
            tls,
            home,
            epsv_supported: true,
        })
    }

    /// `Ok(false)` when the server refuses the directory change.
    async fn change_dir(&mut self, path: &str) -> Result<bool, FtpError> {
        let reply = self.control.command(&format!("CWD {path}")).await?;
        if reply.is_completion() {
            Ok(true)
        } else if reply.is_permanent_failure() {
            Ok(false)
        } else {
            Err(unexpected("CWD", reply))
        }
    }

    async fn return_home(&mut self) -> Result<(), FtpError> {
        let home = self.home.clone();
        if self.change_dir(&home).await? {
            Ok(())
        } else {
            Err(FtpError::Protocol(format!("cannot return to {home}")))
        }
    }

    /// Return home after an operation that changed directory. A failure to
    /// get back only surfaces when the operation itself succeeded.
    async fn settle<T>(&mut self, result: Result<T, RemoteError>) -> Result<T, RemoteError> {
        let back = self.return_home().await;
        match (result, back) {
            (Err(err), _) => Err(err),
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(RemoteError::transfer("return to home directory", err)),
        }
    }

    async fn make_dir(&mut self, name: &str) -> Result<(), FtpError> {
        let reply = self.control.command(&format!("MKD {name}")).await?;
        if reply.is_completion() {
            return Ok(());
        }
        // Lost a creation race with another session; CWD below decides
        if reply.is_permanent_failure() {
            tracing::debug!(dir = name, code = reply.code, "MKD refused");
            return Ok(());
        }
        Err(unexpected("MKD", reply))
    }

    async fn passive_addr(&mut self) -> Result<SocketAddr, FtpError> {
        let peer = self.control.peer_addr()?;

        if self.epsv_supported {
            let reply = self.control.command("EPSV").await?;
            if reply.code == 229 {
                let port = parse_epsv_reply(&reply.text).ok_or_else(|| {
                    FtpError::Protocol(format!("unparseable EPSV reply: {}", reply.text))
                })?;
                return Ok(SocketAddr::new(peer.ip(), port));
            }
            tracing::debug!(code = reply.code, "EPSV unsupported, falling back to PASV");
            self.epsv_supported = false;
        }

        let reply = self.control.execute("PASV", &[227]).await?;
        let advertised = parse_pasv_reply(&reply.text)
            .ok_or_else(|| FtpError::Protocol(format!("unparseable PASV reply: {}", reply.text)))?;
        Ok(passive_target(advertised, peer))
    }

    /// Open a data connection and issue `command` on it. Returns once the
    /// server has accepted the transfer (1xx) and TLS, if any, is up.
    async fn start_transfer(&mut self, command: &str) -> Result<FtpStream, FtpError> {
        let addr = self.passive_addr().await?;
        let limit = self.control.timeout();
        let tcp = bounded(limit, TcpStream::connect(addr)).await?;

        self.control.send(command).await?;

        let control = &mut self.control;
        let accepted = async move {
            let reply = control.read_reply().await?;
            if reply.is_preliminary() {
                Ok(reply)
            } else {
                Err(unexpected(command, reply))
            }
        };

        // Many servers only start their TLS accept after the command, so the
        // handshake has to run alongside the wait for the preliminary reply.
        match &self.tls {
            Some(tls) => {
                let (_, stream) = tokio::try_join!(accepted, tls.wrap(tcp, limit))?;
                Ok(stream)
            }
            None => {
                accepted.await?;
                Ok(FtpStream::Plain(tcp))
            }
        }
    }

    async fn finish_transfer(&mut self, command: &str) -> Result<Reply, FtpError> {
        let reply = self.control.read_reply().await?;
        expect_reply(command, reply, &[226, 250])
    }

    async fn list_current(&mut self) -> Result<Vec<RemoteEntry>, FtpError> {
        let mut data = self.start_transfer("LIST").await?;
        let lenient = data.is_tls();
        let mut raw = Vec::new();
        copy_bounded(&mut data, &mut raw, self.control.timeout(), lenient)
            .await
            .map_err(|failure| match failure {
                CopyFailure::Source(err) | CopyFailure::Sink(err) => err,
            })?;
        drop(data);
        self.finish_transfer("LIST").await?;

        Ok(parse_list(&String::from_utf8_lossy(&raw)))
    }

    async fn enter_dir(&mut self, dir: &str) -> Result<(), RemoteError> {
        match self.change_dir(dir).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(RemoteError::DirectoryNotFound(dir.to_string())),
            Err(err) => Err(RemoteError::transfer("change directory", err)),
        }
    }

    async fn ensure_dir_inner(&mut self, path: &str) -> Result<(), RemoteError> {
        if path.starts_with('/') {
            self.enter_dir("/").await?;
        }

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let entered = self
                .change_dir(segment)
                .await
                .map_err(|err| RemoteError::transfer("change directory", err))?;
            if entered {
                continue;
            }

            self.make_dir(segment)
                .await
                .map_err(|err| RemoteError::transfer("create directory", err))?;
            match self.change_dir(segment).await {
                Ok(true) => {}
                Ok(false) => {
                    return Err(RemoteError::transfer(
                        "create directory",
                        FtpError::Protocol(format!("could not create {segment} in {path}")),
                    ))
                }
                Err(err) => return Err(RemoteError::transfer("change directory", err)),
            }
        }

        Ok(())
    }

    async fn list_inner(&mut self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        self.enter_dir(dir).await?;
        self.list_current()
            .await
            .map_err(|err| RemoteError::transfer("list directory", err))
    }

    async fn download_inner(
        &mut self,
        local: &Path,
        dir: &str,
        name: &str,
    ) -> Result<u64, RemoteError> {
        let entries = self.list_inner(dir).await?;
        if !entries.iter().any(|e| e.name == name && !e.is_directory()) {
            return Err(RemoteError::FileNotFound(name.to_string()));
        }

        let mut file = File::create(local).await.map_err(RemoteError::Local)?;

        let command = format!("RETR {name}");
        let mut data = self
            .start_transfer(&command)
            .await
            .map_err(|err| RemoteError::transfer("download", err))?;
        let lenient = data.is_tls();

        let copied = copy_bounded(&mut data, &mut file, self.control.timeout(), lenient)
            .await
            .map_err(|failure| match failure {
                CopyFailure::Source(err) => RemoteError::transfer("download", err),
                CopyFailure::Sink(FtpError::Io(err)) => RemoteError::Local(err),
                CopyFailure::Sink(err) => RemoteError::transfer("download", err),
            })?;
        drop(data);

        self.finish_transfer("RETR")
            .await
            .map_err(|err| RemoteError::transfer("download", err))?;
        file.sync_all().await.map_err(RemoteError::Local)?;

        Ok(copied)
    }
}

async fn resolve(endpoint: &str, limit: Duration) -> Result<SocketAddr, FtpError> {
    let lookup = tokio::time::timeout(limit, tokio::net::lookup_host(endpoint))
        .await
        .map_err(|_| FtpError::Timeout(limit))?;

    let resolve_error = |source| FtpError::Resolve {
        host: endpoint.to_string(),
        source,
    };

    lookup.map_err(resolve_error)?.next().ok_or_else(|| {
        resolve_error(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no addresses found",
        ))
    })
}

async fn login(control: &mut ControlChannel, user: &str, password: &str) -> Result<(), FtpError> {
    let reply = control.command(&format!("USER {user}")).await?;
    if reply.code == 230 {
        return Ok(());
    }
    if !reply.is_intermediate() {
        return Err(unexpected("USER", reply));
    }

    control
        .execute(&format!("PASS {password}"), &[230, 202])
        .await?;
    Ok(())
}

#[async_trait]
impl RemoteSession for FtpSession {
    async fn ensure_dir(&mut self, path: &str) -> Result<(), RemoteError> {
        let result = self.ensure_dir_inner(path).await;
        self.settle(result).await
    }

    async fn exists(&mut self, dir: &str, name: &str) -> Result<bool, RemoteError> {
        let result = self.list_inner(dir).await;
        match self.settle(result).await {
            Ok(entries) => Ok(entries.iter().any(|e| e.name == name)),
            Err(RemoteError::DirectoryNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn upload(&mut self, local: &Path, remote_path: &str) -> Result<u64, RemoteError> {
        let mut file = File::open(local).await.map_err(RemoteError::Local)?;

        let command = format!("STOR {remote_path}");
        let mut data = self
            .start_transfer(&command)
            .await
            .map_err(|err| RemoteError::transfer("upload", err))?;

        let limit = self.control.timeout();
        let copied = copy_bounded(&mut file, &mut data, limit, false)
            .await
            .map_err(|failure| match failure {
                CopyFailure::Source(FtpError::Io(err)) => RemoteError::Local(err),
                CopyFailure::Source(err) | CopyFailure::Sink(err) => {
                    RemoteError::transfer("upload", err)
                }
            })?;

        // EOF on the data connection is what ends a STOR
        bounded(limit, data.shutdown())
            .await
            .map_err(|err| RemoteError::transfer("upload", err))?;
        drop(data);

        self.finish_transfer("STOR")
            .await
            .map_err(|err| RemoteError::transfer("upload", err))?;

        Ok(copied)
    }

    async fn download_to(
        &mut self,
        local: &Path,
        dir: &str,
        name: &str,
    ) -> Result<u64, RemoteError> {
        let result = self.download_inner(local, dir, name).await;
        self.settle(result).await
    }

    async fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let result = self.list_inner(dir).await;
        self.settle(result).await
    }

    async fn close(mut self: Box<Self>) {
        match self.control.command("QUIT").await {
            Ok(reply) => tracing::debug!(code = reply.code, "FTP session closed"),
            Err(err) => tracing::debug!(error = %err, "QUIT failed, dropping connection"),
        }
    }
}
