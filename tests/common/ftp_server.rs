//! Minimal FTP/FTPS server on loopback, enough to drive the real client.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use super::fake_remote::normalize;

/// How the server secures its connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerTls {
    None,
    /// Plain greeting, `AUTH TLS` upgrade
    Explicit,
    /// TLS from the first byte
    Implicit,
}

#[derive(Debug, Clone)]
pub struct FtpServerOptions {
    pub user: String,
    pub password: String,
    pub epsv: bool,
    pub tls: ServerTls,
    /// Close TLS data connections after RETR/LIST without a close_notify
    pub abrupt_data_close: bool,
}

impl Default for FtpServerOptions {
    fn default() -> Self {
        Self {
            user: "relay".into(),
            password: "secret".into(),
            epsv: true,
            tls: ServerTls::None,
            abrupt_data_close: false,
        }
    }
}

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

type Control = BufReader<Box<dyn Io>>;

#[derive(Default)]
struct Store {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    commands: Vec<String>,
}

#[derive(Clone)]
pub struct TestFtpServer {
    pub addr: SocketAddr,
    store: Arc<Mutex<Store>>,
}

/// Self-signed certificate for `localhost`.
fn self_signed_acceptor() -> TlsAcceptor {
    let CertifiedKey { cert, key_pair } =
        generate_simple_self_signed(vec!["localhost".to_string()]).expect("generate cert");
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
            .with_safe_default_protocol_versions()
            .expect("protocol versions")
            .with_no_client_auth()
            .with_single_cert(vec![cert.der().clone()], key)
            .expect("server cert");
    // Nothing is sent after the handshake, so a STOR sender never has unread data
    config.send_tls13_tickets = 0;

    TlsAcceptor::from(Arc::new(config))
}

impl TestFtpServer {
    pub async fn start(options: FtpServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ftp");
        let addr = listener.local_addr().expect("ftp addr");

        let mut store = Store::default();
        store.dirs.insert("/".into());
        let store = Arc::new(Mutex::new(store));

        let acceptor = (options.tls != ServerTls::None).then(self_signed_acceptor);

        let accept_store = store.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let store = accept_store.clone();
                let options = options.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let _ = handle_client(socket, store, options, acceptor).await;
                });
            }
        });

        Self { addr, store }
    }

    pub fn add_dir(&self, path: &str) {
        let path = normalize(path);
        let mut store = self.store.lock().unwrap();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = format!("{current}/{segment}");
            store.dirs.insert(current.clone());
        }
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        let path = normalize(path);
        self.add_dir(&parent_of(&path));
        self.store.lock().unwrap().files.insert(path, data.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.store.lock().unwrap().files.get(&normalize(path)).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.store.lock().unwrap().dirs.contains(&normalize(path))
    }

    pub fn dir_count(&self) -> usize {
        self.store.lock().unwrap().dirs.len()
    }

    /// Verbs received so far, in order (`USER`, `CWD`, ...).
    pub fn verbs(&self) -> Vec<String> {
        self.store.lock().unwrap().commands.clone()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.verbs().iter().filter(|v| v.as_str() == verb).count()
    }
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

fn resolve(cwd: &str, arg: &str) -> String {
    if arg.starts_with('/') {
        normalize(arg)
    } else {
        normalize(&format!("{cwd}/{arg}"))
    }
}

async fn reply(control: &mut Control, line: &str) -> std::io::Result<()> {
    let writer = control.get_mut();
    writer.write_all(format!("{line}\r\n").as_bytes()).await?;
    writer.flush().await
}

fn listing(store: &Store, dir: &str) -> String {
    let mut out = String::from("total 2\r\n");
    for d in store.dirs.iter().filter(|d| d.as_str() != "/" && parent_of(d) == dir) {
        let name = d.rsplit('/').next().unwrap_or(d);
        out.push_str(&format!(
            "drwxr-xr-x    2 ftp      ftp          4096 Jan 05 12:30 {name}\r\n"
        ));
    }
    for (path, data) in store.files.iter().filter(|(p, _)| parent_of(p) == dir) {
        let name = path.rsplit('/').next().unwrap_or(path);
        out.push_str(&format!(
            "-rw-r--r--    1 ftp      ftp    {:>10} Jan 05 12:30 {name}\r\n",
            data.len()
        ));
    }
    out
}

async fn accept_data(
    listener: TcpListener,
    tls: Option<&TlsAcceptor>,
) -> std::io::Result<Box<dyn Io>> {
    let (socket, _) = listener.accept().await?;
    match tls {
        Some(acceptor) => Ok(Box::new(acceptor.accept(socket).await?)),
        None => Ok(Box::new(socket)),
    }
}

/// Write a RETR/LIST payload and end the data connection.
async fn send_data(
    mut data: Box<dyn Io>,
    payload: &[u8],
    abrupt: bool,
) -> std::io::Result<()> {
    data.write_all(payload).await?;
    data.flush().await?;
    if !abrupt {
        data.shutdown().await?;
    }
    Ok(())
}

async fn handle_client(
    socket: TcpStream,
    store: Arc<Mutex<Store>>,
    options: FtpServerOptions,
    acceptor: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let stream: Box<dyn Io> = match (&options.tls, &acceptor) {
        (ServerTls::Implicit, Some(acceptor)) => Box::new(acceptor.accept(socket).await?),
        _ => Box::new(socket),
    };
    let mut control: Control = BufReader::new(stream);

    reply(&mut control, "220 test ftp ready").await?;

    let mut cwd = "/".to_string();
    let mut user_ok = false;
    let mut protected = false;
    let mut passive: Option<TcpListener> = None;

    loop {
        let mut raw = String::new();
        if control.read_line(&mut raw).await? == 0 {
            break;
        }
        let line = raw.trim_end_matches(['\r', '\n']);
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };
        store.lock().unwrap().commands.push(verb.clone());

        let data_tls = acceptor.as_ref().filter(|_| protected);
        let abrupt = options.abrupt_data_close && data_tls.is_some();

        match verb.as_str() {
            "AUTH" if options.tls == ServerTls::Explicit && arg.eq_ignore_ascii_case("TLS") => {
                let Some(acceptor) = acceptor.as_ref() else {
                    reply(&mut control, "502 tls unavailable").await?;
                    continue;
                };
                reply(&mut control, "234 proceed with negotiation").await?;
                let plain = control.into_inner();
                let secured: Box<dyn Io> = Box::new(acceptor.accept(plain).await?);
                control = BufReader::new(secured);
            }
            "PBSZ" => reply(&mut control, "200 PBSZ=0").await?,
            "PROT" => {
                protected = arg.eq_ignore_ascii_case("P") && acceptor.is_some();
                reply(&mut control, "200 protection level set").await?;
            }
            "USER" => {
                user_ok = arg == options.user;
                reply(&mut control, "331 password required").await?;
            }
            "PASS" => {
                if user_ok && arg == options.password {
                    reply(&mut control, "230 logged in").await?;
                } else {
                    reply(&mut control, "530 Login incorrect.").await?;
                }
            }
            "TYPE" => reply(&mut control, "200 type set").await?,
            "PWD" => reply(&mut control, &format!("257 \"{cwd}\" is current directory")).await?,
            "CWD" => {
                let target = resolve(&cwd, &arg);
                let exists = store.lock().unwrap().dirs.contains(&target);
                if exists {
                    cwd = target;
                    reply(&mut control, "250 directory changed").await?;
                } else {
                    reply(&mut control, "550 no such directory").await?;
                }
            }
            "MKD" => {
                let target = resolve(&cwd, &arg);
                let created = {
                    let mut store = store.lock().unwrap();
                    if store.dirs.contains(&target) || !store.dirs.contains(&parent_of(&target)) {
                        false
                    } else {
                        store.dirs.insert(target.clone());
                        true
                    }
                };
                if created {
                    reply(&mut control, &format!("257 \"{target}\" created")).await?;
                } else {
                    reply(&mut control, "550 cannot create directory").await?;
                }
            }
            "EPSV" if options.epsv => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                passive = Some(listener);
                reply(
                    &mut control,
                    &format!("229 Entering Extended Passive Mode (|||{port}|)"),
                )
                .await?;
            }
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                passive = Some(listener);
                reply(
                    &mut control,
                    &format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{})",
                        port >> 8,
                        port & 0xff
                    ),
                )
                .await?;
            }
            "LIST" => {
                let Some(listener) = passive.take() else {
                    reply(&mut control, "425 use PASV first").await?;
                    continue;
                };
                let dir = if arg.is_empty() { cwd.clone() } else { resolve(&cwd, &arg) };
                let text = listing(&store.lock().unwrap(), &dir);

                reply(&mut control, "150 here comes the listing").await?;
                let data = accept_data(listener, data_tls).await?;
                send_data(data, text.as_bytes(), abrupt).await?;
                reply(&mut control, "226 directory send ok").await?;
            }
            "STOR" => {
                let Some(listener) = passive.take() else {
                    reply(&mut control, "425 use PASV first").await?;
                    continue;
                };
                let target = resolve(&cwd, &arg);
                let parent_exists = store.lock().unwrap().dirs.contains(&parent_of(&target));
                if !parent_exists {
                    reply(&mut control, "553 could not create file").await?;
                    continue;
                }

                reply(&mut control, "150 ok to send data").await?;
                let mut data = accept_data(listener, data_tls).await?;
                let mut received = Vec::new();
                data.read_to_end(&mut received).await?;
                drop(data);
                store.lock().unwrap().files.insert(target, received);
                reply(&mut control, "226 transfer complete").await?;
            }
            "RETR" => {
                let Some(listener) = passive.take() else {
                    reply(&mut control, "425 use PASV first").await?;
                    continue;
                };
                let target = resolve(&cwd, &arg);
                let contents = store.lock().unwrap().files.get(&target).cloned();
                let Some(contents) = contents else {
                    reply(&mut control, "550 file not found").await?;
                    continue;
                };

                reply(&mut control, "150 opening data connection").await?;
                let data = accept_data(listener, data_tls).await?;
                send_data(data, &contents, abrupt).await?;
                reply(&mut control, "226 transfer complete").await?;
            }
            "QUIT" => {
                reply(&mut control, "221 goodbye").await?;
                break;
            }
            _ => reply(&mut control, "502 command not implemented").await?,
        }
    }

    Ok(())
}
