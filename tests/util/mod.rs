#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use framework::tls::TlsConfig;
use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use logsidecar_injector::config::ConfigPaths;

pub const FILEBEAT_TEMPLATE: &str = r#"filebeat.inputs:
- type: log
  paths:
{%- for path in paths %}
  - {{ path }}
{%- endfor %}
output.console:
  pretty: true
"#;

/// Files of a working injector setup under `dir`.
pub struct Fixture {
    pub paths: ConfigPaths,
    pub tls: TlsConfig,
}

impl Fixture {
    pub fn new(dir: &Path) -> Self {
        let pair = testify::tls::generate(&dir.join("certs"), "localhost");

        let paths = ConfigPaths {
            sidecar: write(dir, "sidecar.yaml", "type: filebeat\n"),
            filebeat: write(dir, "filebeat.yaml", FILEBEAT_TEMPLATE),
            vector: dir.join("vector.yaml"),
        };

        Self {
            paths,
            tls: TlsConfig::new(pair.cert, pair.key),
        }
    }
}

pub fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

pub struct HttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub async fn send(
        &self,
        method: Method,
        addr: SocketAddr,
        path: &str,
        content_type: Option<&str>,
        body: impl Into<Bytes>,
    ) -> Response<Incoming> {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("http://{addr}{path}"));
        if let Some(content_type) = content_type {
            builder = builder.header(http::header::CONTENT_TYPE, content_type);
        }

        let req = builder.body(Full::new(body.into())).unwrap();
        self.client.request(req).await.unwrap()
    }
}

pub async fn body_bytes(resp: Response<Incoming>) -> Bytes {
    resp.into_body().collect().await.unwrap().to_bytes()
}
