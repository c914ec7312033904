use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{fs, io};

use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
};
use rustls::server::ResolvesServerCert;
use rustls::sign::CertifiedKey;
use rustls::{InconsistentKeys, ServerConfig};

use super::TlsError;

/// A certificate chain and the private key that goes with it, both PEM
/// encoded on disk.
#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsConfig {
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
        }
    }

    /// Read both files and build the signing material for a server.
    pub fn certified_key(&self) -> Result<CertifiedKey, TlsError> {
        let certs = load_certs(&self.cert)?;
        if certs.is_empty() {
            return Err(TlsError::MissingCertificate(self.cert.clone()));
        }

        let key = load_private_key(&self.key)?;
        let signing_key =
            rustls::crypto::ring::sign::any_supported_type(&key).map_err(TlsError::TlsBuild)?;

        let certified = CertifiedKey::new(certs, signing_key);
        match certified.keys_match() {
            // some key types cannot expose their public half
            Ok(()) | Err(rustls::Error::InconsistentKeys(InconsistentKeys::Unknown)) => {
                Ok(certified)
            }
            Err(err) => Err(TlsError::KeyMismatch(err)),
        }
    }
}

/// Build a server config which asks `resolver` for the certificate on every
/// handshake, so swapping what the resolver returns takes effect for new
/// connections without rebinding the listener.
pub fn server_config(resolver: Arc<dyn ResolvesServerCert>) -> Result<ServerConfig, TlsError> {
    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(TlsError::TlsBuild)?
            .with_no_client_auth()
            .with_cert_resolver(resolver);

    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(config)
}

fn load_certs(filename: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let content = fs::read(filename).map_err(|err| TlsError::FileReadFailed {
        note: "certificate",
        filename: filename.to_path_buf(),
        err,
    })?;

    let certs = pem::parse_many(content)
        .map_err(|err| TlsError::CertificateParse {
            filename: filename.to_path_buf(),
            err: io::Error::new(io::ErrorKind::InvalidData, err),
        })?
        .into_iter()
        .filter(|p| p.tag() == "CERTIFICATE")
        .map(|p| CertificateDer::from(p.into_contents()))
        .collect::<Vec<_>>();

    Ok(certs)
}

fn load_private_key(filename: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let content = fs::read(filename).map_err(|err| TlsError::FileReadFailed {
        note: "private key",
        filename: filename.to_path_buf(),
        err,
    })?;

    let parsed = pem::parse_many(content).map_err(|err| TlsError::PrivateKeyParse {
        filename: filename.to_path_buf(),
        err: io::Error::new(io::ErrorKind::InvalidData, err),
    })?;

    for p in parsed {
        let key = match p.tag() {
            "PRIVATE KEY" => PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(p.into_contents())),
            "RSA PRIVATE KEY" => PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(p.into_contents())),
            "EC PRIVATE KEY" => PrivateKeyDer::Sec1(PrivateSec1KeyDer::from(p.into_contents())),
            _ => continue,
        };

        return Ok(key);
    }

    Err(TlsError::PrivateKeyParse {
        filename: filename.to_path_buf(),
        err: io::Error::new(
            io::ErrorKind::InvalidData,
            "no private key found in PEM file",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_generated_pair() {
        let dir = testify::temp_dir();
        let pair = testify::tls::generate(&dir, "localhost");

        let certified = TlsConfig::new(&pair.cert, &pair.key)
            .certified_key()
            .unwrap();
        assert_eq!(certified.cert.len(), 1);
    }

    #[test]
    fn mismatched_key() {
        let dir = testify::temp_dir();
        let first = testify::tls::generate(&dir.join("first"), "localhost");
        let second = testify::tls::generate(&dir.join("second"), "localhost");

        let err = TlsConfig::new(&first.cert, &second.key)
            .certified_key()
            .unwrap_err();
        assert!(matches!(err, TlsError::KeyMismatch(_)), "{err}");
    }

    #[test]
    fn missing_files() {
        let dir = testify::temp_dir();

        let err = TlsConfig::new(dir.join("nope.crt"), dir.join("nope.key"))
            .certified_key()
            .unwrap_err();
        assert!(
            matches!(
                err,
                TlsError::FileReadFailed {
                    note: "certificate",
                    ..
                }
            ),
            "{err}"
        );
    }

    #[test]
    fn empty_certificate_file() {
        let dir = testify::temp_dir();
        let pair = testify::tls::generate(&dir, "localhost");
        let empty = dir.join("empty.crt");
        fs::write(&empty, "").unwrap();

        let err = TlsConfig::new(&empty, &pair.key)
            .certified_key()
            .unwrap_err();
        assert!(matches!(err, TlsError::MissingCertificate(_)), "{err}");
    }

    #[test]
    fn key_file_without_key() {
        let dir = testify::temp_dir();
        let pair = testify::tls::generate(&dir, "localhost");

        // a certificate where the key should be
        let err = TlsConfig::new(&pair.cert, &pair.cert)
            .certified_key()
            .unwrap_err();
        assert!(matches!(err, TlsError::PrivateKeyParse { .. }), "{err}");
    }
}
