//! Process wide state which can be swapped at runtime.
//!
//! Both cells hold an `Arc`, readers clone it and never block a reload for
//! longer than the pointer swap.

use std::sync::Arc;

use framework::ShutdownSignal;
use framework::tls::{TlsConfig, TlsError};
use parking_lot::RwLock;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use tokio::sync::{mpsc, oneshot};

use crate::config::{ConfigError, ConfigPaths, InjectorConfig};

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error("certificate reloader is not running")]
    Closed,
}

/// Hands the latest committed certificate to every TLS handshake.
#[derive(Debug)]
pub struct CertResolver {
    current: RwLock<Arc<CertifiedKey>>,
}

impl CertResolver {
    pub fn new(key: CertifiedKey) -> Self {
        Self {
            current: RwLock::new(Arc::new(key)),
        }
    }

    pub fn current(&self) -> Arc<CertifiedKey> {
        self.current.read().clone()
    }

    fn swap(&self, key: CertifiedKey) {
        *self.current.write() = Arc::new(key);
    }
}

impl ResolvesServerCert for CertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.current())
    }
}

pub struct ConfigStore {
    paths: ConfigPaths,
    tls: TlsConfig,

    injector: RwLock<Arc<InjectorConfig>>,
    certs: Arc<CertResolver>,
}

impl ConfigStore {
    /// Load the injector config and the certificate, either failure is
    /// fatal here since there is nothing to fall back to.
    pub fn load(paths: ConfigPaths, tls: TlsConfig) -> Result<Self, ReloadError> {
        let injector = InjectorConfig::load(&paths)?;
        let key = tls.certified_key()?;

        Ok(Self {
            paths,
            tls,
            injector: RwLock::new(Arc::new(injector)),
            certs: Arc::new(CertResolver::new(key)),
        })
    }

    /// Snapshot of the injector config, later reloads do not affect it.
    pub fn injector(&self) -> Arc<InjectorConfig> {
        self.injector.read().clone()
    }

    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        self.certs.current()
    }

    pub fn resolver(&self) -> Arc<CertResolver> {
        Arc::clone(&self.certs)
    }

    pub fn reload_config(&self) -> Result<(), ConfigError> {
        let config = InjectorConfig::load(&self.paths)?;
        let kind = config.kind;

        *self.injector.write() = Arc::new(config);

        info!(message = "injector config reloaded", %kind);

        Ok(())
    }

    pub fn reload_certs(&self) -> Result<(), TlsError> {
        let key = self.tls.certified_key()?;
        self.certs.swap(key);

        info!(
            message = "certificates reloaded",
            cert = ?self.tls.cert,
            key = ?self.tls.key
        );

        Ok(())
    }
}

type CertReloadRequest = oneshot::Sender<Result<(), ReloadError>>;

/// Serializes certificate reloads in one task, callers wait for the
/// outcome of their own request.
pub struct CertReloader {
    store: Arc<ConfigStore>,
    requests: mpsc::Receiver<CertReloadRequest>,
}

#[derive(Clone)]
pub struct CertReloadHandle {
    tx: mpsc::Sender<CertReloadRequest>,
}

impl CertReloadHandle {
    pub async fn reload(&self) -> Result<(), ReloadError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(tx).await.map_err(|_| ReloadError::Closed)?;

        rx.await.map_err(|_| ReloadError::Closed)?
    }
}

pub fn cert_reloader(store: Arc<ConfigStore>) -> (CertReloader, CertReloadHandle) {
    let (tx, rx) = mpsc::channel(4);

    (
        CertReloader {
            store,
            requests: rx,
        },
        CertReloadHandle { tx },
    )
}

impl CertReloader {
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        loop {
            let reply = tokio::select! {
                _ = &mut shutdown => break,
                reply = self.requests.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
            };

            let result = self.store.reload_certs().map_err(ReloadError::from);
            // the caller may have gone away already
            let _ = reply.send(result);
        }

        debug!(message = "certificate reloader stopped");
    }
}

/// Result of one reload, the two parts succeed or fail independently.
#[derive(Debug)]
pub struct ReloadOutcome {
    pub config: Result<(), ReloadError>,
    pub certs: Result<(), ReloadError>,
}

impl ReloadOutcome {
    pub fn is_ok(&self) -> bool {
        self.config.is_ok() && self.certs.is_ok()
    }

    /// One line per failed part.
    pub fn failures(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Err(err) = &self.config {
            lines.push(format!("failed to reload config: {err}"));
        }
        if let Err(err) = &self.certs {
            lines.push(format!("failed to reload certs: {err}"));
        }

        lines
    }
}

/// Reloads the injector config, then the certificates. Shared by the
/// reload endpoint and SIGHUP.
#[derive(Clone)]
pub struct Reloader {
    store: Arc<ConfigStore>,
    certs: CertReloadHandle,
}

impl Reloader {
    pub fn new(store: Arc<ConfigStore>, certs: CertReloadHandle) -> Self {
        Self { store, certs }
    }

    pub async fn reload(&self) -> ReloadOutcome {
        let config = self.store.reload_config().map_err(ReloadError::from);
        if let Err(err) = &config {
            error!(message = "failed to reload config", %err);
        }

        let certs = self.certs.reload().await;
        if let Err(err) = &certs {
            error!(message = "failed to reload certs", %err);
        }

        ReloadOutcome { config, certs }
    }
}
