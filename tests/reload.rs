mod util;

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

use framework::tls::MaybeTlsListener;
use framework::{ShutdownSignal, ShutdownTrigger};
use http::{Method, StatusCode};
use logsidecar_injector::config::SidecarType;
use logsidecar_injector::server::{self, RELOAD_PATH};
use logsidecar_injector::store::{ConfigStore, Reloader, cert_reloader};
use pretty_assertions::assert_eq;
use util::{Fixture, HttpClient, body_bytes};

struct ReloadServer {
    addr: SocketAddr,
    store: Arc<ConfigStore>,
    trigger: ShutdownTrigger,
}

impl ReloadServer {
    async fn start(fixture: &Fixture) -> Self {
        let store =
            Arc::new(ConfigStore::load(fixture.paths.clone(), fixture.tls.clone()).unwrap());

        let (trigger, shutdown) = ShutdownSignal::new();
        let (certs, handle) = cert_reloader(Arc::clone(&store));
        tokio::spawn(certs.run(shutdown.clone()));

        let addr = testify::next_addr();
        let listener = MaybeTlsListener::bind(&addr, None).await.unwrap();
        let reloader = Reloader::new(Arc::clone(&store), handle);
        tokio::spawn(server::serve_reload(listener, reloader, shutdown));

        testify::wait_for_tcp(addr).await;

        Self {
            addr,
            store,
            trigger,
        }
    }
}

impl Drop for ReloadServer {
    fn drop(&mut self) {
        self.trigger.cancel();
    }
}

#[tokio::test]
async fn reload_success() {
    let dir = testify::temp_dir();
    let fixture = Fixture::new(&dir);
    let server = ReloadServer::start(&fixture).await;
    let client = HttpClient::new();

    let before = server.store.certified_key();
    testify::tls::generate(&dir.join("certs"), "localhost");
    fs::write(&fixture.paths.vector, "sources: {}\n").unwrap();
    fs::write(&fixture.paths.sidecar, "type: vector\n").unwrap();

    let resp = client.send(Method::POST, server.addr, RELOAD_PATH, None, "").await;
    assert_eq!(resp.status(), StatusCode::OK);

    assert_eq!(server.store.injector().kind, SidecarType::Vector);
    assert_ne!(server.store.certified_key().cert, before.cert);
}

#[tokio::test]
async fn reload_reports_each_failure() {
    let dir = testify::temp_dir();
    let fixture = Fixture::new(&dir);
    let server = ReloadServer::start(&fixture).await;
    let client = HttpClient::new();

    // the vector template is missing
    fs::write(&fixture.paths.sidecar, "type: vector\n").unwrap();

    let resp = client.send(Method::POST, server.addr, RELOAD_PATH, None, "").await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = String::from_utf8(body_bytes(resp).await.to_vec()).unwrap();
    let lines = body.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 1, "{body}");
    assert!(lines[0].starts_with("failed to reload config: "), "{body}");
    // admissions keep using the previous config
    assert_eq!(server.store.injector().kind, SidecarType::Filebeat);

    fs::write(&fixture.tls.key, "not a key").unwrap();

    let resp = client.send(Method::POST, server.addr, RELOAD_PATH, None, "").await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = String::from_utf8(body_bytes(resp).await.to_vec()).unwrap();
    let lines = body.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2, "{body}");
    assert!(lines[0].starts_with("failed to reload config: "), "{body}");
    assert!(lines[1].starts_with("failed to reload certs: "), "{body}");
}

#[tokio::test]
async fn reload_routes() {
    let dir = testify::temp_dir();
    let fixture = Fixture::new(&dir);
    let server = ReloadServer::start(&fixture).await;
    let client = HttpClient::new();

    let resp = client.send(Method::GET, server.addr, RELOAD_PATH, None, "").await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let resp = client.send(Method::POST, server.addr, "/reload", None, "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
