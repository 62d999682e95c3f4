//! TLS client setup for FTPS.
//!
//! Server certificates are accepted without chain or name validation so that
//! self-signed FTPS endpoints work. Handshake signatures are still checked
//! against the presented certificate.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::stream::{bounded, FtpStream};
use super::FtpError;

#[derive(Debug)]
struct AcceptAnyCertificate {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Connector shared by the control and data connections of every session,
/// so data channels can resume the control channel's TLS session.
#[derive(Clone)]
pub struct FtpTls {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl FtpTls {
    pub fn new(host: &str) -> Result<Self, FtpError> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let verifier = AcceptAnyCertificate {
            algorithms: provider.signature_verification_algorithms,
        };

        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| FtpError::InvalidServerName(host.to_string()))?;

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
        })
    }

    pub async fn wrap(
        &self,
        tcp: TcpStream,
        limit: std::time::Duration,
    ) -> Result<FtpStream, FtpError> {
        let tls = bounded(limit, self.connector.connect(self.server_name.clone(), tcp)).await?;
        Ok(FtpStream::Tls(Box::new(tls)))
    }
}
