use std::sync::Arc;

use bytes::Bytes;
use framework::ShutdownSignal;
use framework::tls::MaybeTlsListener;
use http::header::{CONNECTION, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;

use crate::admission::{AdmissionHandler, Reply};
use crate::store::Reloader;

/// Objects stored in etcd are at most 3MiB, plus the envelope.
const MAX_REVIEW_SIZE: usize = 4 * 1024 * 1024;

pub const RELOAD_PATH: &str = "/-/reload";

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::default())
        .expect("build empty response")
}

/// Serve admission reviews on `POST /`.
pub async fn serve_webhook(
    listener: MaybeTlsListener,
    handler: Arc<AdmissionHandler>,
    shutdown: ShutdownSignal,
) -> framework::Result<()> {
    let service = service_fn(move |req: Request<Incoming>| {
        let handler = Arc::clone(&handler);

        async move {
            if req.uri().path() != "/" {
                return Ok::<_, hyper::Error>(empty(StatusCode::NOT_FOUND));
            }
            if req.method() != Method::POST {
                return Ok(empty(StatusCode::METHOD_NOT_ALLOWED));
            }

            let content_type = req
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            let body = match Limited::new(req.into_body(), MAX_REVIEW_SIZE)
                .collect()
                .await
            {
                Ok(collected) => collected.to_bytes(),
                Err(err) => {
                    warn!(message = "read admission request body failed", %err);

                    return Ok(drop_connection());
                }
            };

            let review = match handler.review(content_type.as_deref(), &body) {
                Reply::Review(review) => review,
                Reply::Drop(reason) => {
                    warn!(message = "drop admission request", %reason);

                    return Ok(drop_connection());
                }
            };

            let resp = match serde_json::to_vec(&review) {
                Ok(data) => Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_TYPE, "application/json")
                    .body(Full::new(Bytes::from(data)))
                    .expect("build review response"),
                Err(err) => {
                    error!(message = "encode admission review failed", %err);

                    empty(StatusCode::INTERNAL_SERVER_ERROR)
                }
            };

            Ok(resp)
        }
    });

    framework::http::serve(listener, service)
        .with_graceful_shutdown(shutdown)
        .await
}

fn drop_connection() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .header(CONNECTION, "close")
        .body(Full::default())
        .expect("build bad request response")
}

/// Serve `POST /-/reload`, which reloads the injector config and the
/// certificates.
pub async fn serve_reload(
    listener: MaybeTlsListener,
    reloader: Reloader,
    shutdown: ShutdownSignal,
) -> framework::Result<()> {
    let service = service_fn(move |req: Request<Incoming>| {
        let reloader = reloader.clone();

        async move {
            if req.uri().path() != RELOAD_PATH {
                return Ok::<_, hyper::Error>(empty(StatusCode::NOT_FOUND));
            }
            if req.method() != Method::POST {
                return Ok(empty(StatusCode::METHOD_NOT_ALLOWED));
            }

            let outcome = reloader.reload().await;
            if outcome.is_ok() {
                return Ok(empty(StatusCode::OK));
            }

            let mut body = outcome.failures().join("\n");
            body.push('\n');

            Ok(Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header(CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("build reload failure response"))
        }
    });

    framework::http::serve(listener, service)
        .with_graceful_shutdown(shutdown)
        .await
}
