mod incoming;
mod settings;

use std::path::PathBuf;

pub use incoming::{MaybeTlsIncoming, MaybeTlsListener, MaybeTlsStream};
pub use settings::{TlsConfig, server_config};

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Could not read {note} file {filename:?}: {err}")]
    FileReadFailed {
        note: &'static str,
        filename: PathBuf,
        err: std::io::Error,
    },
    #[error("Certificate file {0:?} contains no certificates")]
    MissingCertificate(PathBuf),
    #[error("Could not parse certificate in {filename:?}: {err}")]
    CertificateParse {
        filename: PathBuf,
        err: std::io::Error,
    },
    #[error("Could not parse private key in {filename:?}: {err}")]
    PrivateKeyParse {
        filename: PathBuf,
        err: std::io::Error,
    },
    #[error("Certificate and private key do not match: {0}")]
    KeyMismatch(rustls::Error),
    #[error("Error building TLS config: {0}")]
    TlsBuild(rustls::Error),
    #[error("TLS handshake failed: {0}")]
    Handshake(std::io::Error),
    #[error("Incoming listener failed: {0}")]
    IncomingListener(std::io::Error),
    #[error("TCP bind failed: {0}")]
    TcpBind(std::io::Error),
}
