use std::fs;
use std::path::{Path, PathBuf};

use rcgen::{CertificateParams, KeyPair};

/// A self signed certificate and its key, written to disk.
pub struct CertPair {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub cert_pem: String,
}

/// Generate a self signed certificate for `host` and write `server.crt`
/// and `server.key` into `dir`, which is created when missing.
pub fn generate(dir: &Path, host: &str) -> CertPair {
    let key_pair = KeyPair::generate().expect("generate key pair");
    let cert = CertificateParams::new(vec![host.to_string()])
        .expect("certificate params")
        .self_signed(&key_pair)
        .expect("self sign certificate");

    let cert_pem = cert.pem();
    let key_pem = key_pair.serialize_pem();

    fs::create_dir_all(dir).expect("create cert dir");
    let cert = dir.join("server.crt");
    let key = dir.join("server.key");
    fs::write(&cert, &cert_pem).expect("write certificate");
    fs::write(&key, key_pem).expect("write private key");

    CertPair {
        cert,
        key,
        cert_pem,
    }
}
