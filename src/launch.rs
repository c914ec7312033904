use std::io::IsTerminal;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use argh::FromArgs;
use exitcode::ExitCode;
use framework::tls::{MaybeTlsListener, TlsConfig};
use framework::{ShutdownSignal, SignalTo, signal};
use futures::StreamExt;
use logsidecar_injector::admission::AdmissionHandler;
use logsidecar_injector::built_info::{PKG_NAME, PKG_VERSION};
use logsidecar_injector::config::ConfigPaths;
use logsidecar_injector::server;
use logsidecar_injector::store::{ConfigStore, Reloader, cert_reloader};
use tracing::{error, info, warn};

use crate::validate;

const LOG_ENV: &str = "LOGSIDECAR_INJECTOR_LOG";

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8443))
}

fn default_reload_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9443))
}

#[derive(FromArgs)]
#[argh(
    description = "Mutating admission webhook which injects a log shipping sidecar into pods",
    help_triggers("-h", "--help")
)]
pub struct RootCommand {
    #[argh(switch, short = 'v', description = "show version")]
    version: bool,

    #[argh(
        option,
        short = 'l',
        default = "\"info\".to_string()",
        description = "log level, overridden by env LOGSIDECAR_INJECTOR_LOG"
    )]
    log_level: String,

    #[argh(switch, description = "output logs in json format")]
    log_json: bool,

    #[argh(
        option,
        short = 't',
        default = "default_worker_threads()",
        description = "specify how many threads the Tokio runtime will use"
    )]
    threads: usize,

    #[argh(
        option,
        default = "PathBuf::from(\"/etc/logsidecar-injector/certs/server.crt\")",
        description = "file containing the x509 certificate for HTTPS"
    )]
    tls_cert_file: PathBuf,

    #[argh(
        option,
        default = "PathBuf::from(\"/etc/logsidecar-injector/certs/server.key\")",
        description = "file containing the x509 private key matching --tls-cert-file"
    )]
    tls_private_key_file: PathBuf,

    #[argh(
        option,
        default = "PathBuf::from(\"/etc/logsidecar-injector/config/sidecar.yaml\")",
        description = "sidecar configuration file"
    )]
    sidecar_config_file: PathBuf,

    #[argh(
        option,
        default = "PathBuf::from(\"/etc/logsidecar-injector/config/filebeat.yaml\")",
        description = "filebeat configuration template"
    )]
    filebeat_config_file: PathBuf,

    #[argh(
        option,
        default = "PathBuf::from(\"/etc/logsidecar-injector/config/vector.yaml\")",
        description = "vector configuration template"
    )]
    vector_config_file: PathBuf,

    #[argh(
        option,
        default = "default_listen()",
        description = "address the admission webhook listens on"
    )]
    listen: SocketAddr,

    #[argh(
        option,
        default = "default_reload_listen()",
        description = "address the plain http reload endpoint listens on"
    )]
    reload_listen: SocketAddr,

    #[argh(subcommand)]
    sub_commands: Option<SubCommands>,
}

impl RootCommand {
    #![allow(clippy::print_stdout)]
    fn show_version(&self) {
        println!("{PKG_NAME} {PKG_VERSION}");
    }

    fn config_paths(&self) -> ConfigPaths {
        ConfigPaths {
            sidecar: self.sidecar_config_file.clone(),
            filebeat: self.filebeat_config_file.clone(),
            vector: self.vector_config_file.clone(),
        }
    }

    fn tls_config(&self) -> TlsConfig {
        TlsConfig::new(&self.tls_cert_file, &self.tls_private_key_file)
    }

    pub fn run(&self) -> Result<(), ExitCode> {
        if self.version {
            self.show_version();
            return Ok(());
        }

        if let Some(sub_command) = &self.sub_commands {
            return sub_command.run(self);
        }

        let log_level = std::env::var(LOG_ENV).unwrap_or(self.log_level.clone());
        let color = std::io::stdout().is_terminal();
        framework::trace::init(color, self.log_json, &log_level);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("injector-worker")
            .worker_threads(self.threads)
            .enable_io()
            .enable_time()
            .build()
            .map_err(|err| {
                error!(message = "build tokio runtime failed", %err);
                exitcode::OSERR
            })?;

        runtime.block_on(self.serve())?;

        runtime.shutdown_timeout(Duration::from_secs(5));

        Ok(())
    }

    async fn serve(&self) -> Result<(), ExitCode> {
        let store = ConfigStore::load(self.config_paths(), self.tls_config()).map_err(|err| {
            error!(message = "load configuration failed", %err);
            exitcode::CONFIG
        })?;
        let store = Arc::new(store);

        let server_config = framework::tls::server_config(store.resolver()).map_err(|err| {
            error!(message = "build tls server config failed", %err);
            exitcode::CONFIG
        })?;
        let webhook_listener = MaybeTlsListener::bind(&self.listen, Some(Arc::new(server_config)))
            .await
            .map_err(|err| {
                error!(message = "bind webhook listener failed", listen = %self.listen, %err);
                exitcode::OSERR
            })?;
        let reload_listener = MaybeTlsListener::bind(&self.reload_listen, None)
            .await
            .map_err(|err| {
                error!(message = "bind reload listener failed", listen = %self.reload_listen, %err);
                exitcode::OSERR
            })?;

        let signals = signal::os_signals().map_err(|err| {
            error!(message = "register signal handlers failed", %err);
            exitcode::OSERR
        })?;
        tokio::pin!(signals);

        let (trigger, shutdown) = ShutdownSignal::new();
        let (cert_reloader, certs) = cert_reloader(Arc::clone(&store));
        let reloader = Reloader::new(Arc::clone(&store), certs);

        let reloader_task = tokio::spawn(cert_reloader.run(shutdown.clone()));
        let webhook_task = tokio::spawn(server::serve_webhook(
            webhook_listener,
            Arc::new(AdmissionHandler::new(Arc::clone(&store))),
            shutdown.clone(),
        ));
        let reload_task = tokio::spawn(server::serve_reload(
            reload_listener,
            reloader.clone(),
            shutdown,
        ));

        info!(
            message = "start logsidecar injector",
            version = PKG_VERSION,
            threads = self.threads,
            listen = %self.listen,
            reload_listen = %self.reload_listen,
            sidecar = %store.injector().kind,
        );

        let signal = loop {
            match signals.next().await {
                Some(SignalTo::Reload) => {
                    let outcome = reloader.reload().await;
                    if outcome.is_ok() {
                        info!(message = "reload finished");
                    } else {
                        warn!(message = "reload finished with errors", failures = ?outcome.failures());
                    }
                }
                Some(signal) => break signal,
                None => break SignalTo::Shutdown,
            }
        };

        match signal {
            SignalTo::Shutdown => {
                info!(message = "Shutdown signal received");
                trigger.cancel();

                let stopped = async {
                    let (webhook, reload, _) = tokio::join!(webhook_task, reload_task, reloader_task);
                    for result in [webhook, reload] {
                        match result {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => error!(message = "server exited with error", %err),
                            Err(err) => error!(message = "server task failed", %err),
                        }
                    }
                };

                tokio::select! {
                    _ = stopped => (),
                    // a second signal skips the graceful part
                    _ = signals.next() => {}
                }
            }

            _ => {
                info!(message = "Quit signal received");
            }
        }

        Ok(())
    }
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum SubCommands {
    Validate(validate::Validate),
}

impl SubCommands {
    fn run(&self, root: &RootCommand) -> Result<(), ExitCode> {
        match self {
            SubCommands::Validate(validate) => {
                match validate.run(&root.config_paths(), &root.tls_config()) {
                    exitcode::OK => Ok(()),
                    other => Err(other),
                }
            }
        }
    }
}
