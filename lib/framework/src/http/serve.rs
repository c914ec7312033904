use std::net::SocketAddr;

use futures::future::BoxFuture;
use http::{Request, Response};
use hyper::body::{Body, Incoming};
use hyper::rt::{Read, Write};
use hyper::service::Service;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;

use crate::tls::{MaybeTlsListener, MaybeTlsStream};
use crate::{Error, ShutdownSignal};

/// Serve the service with the supplied listener.
pub fn serve<S>(listener: MaybeTlsListener, service: S) -> Serve<S> {
    Serve { listener, service }
}

pub struct Serve<S> {
    listener: MaybeTlsListener,
    service: S,
}

impl<S> Serve<S> {
    /// Prepares a server to handle graceful shutdown when the provided ShutdownSignal future
    /// completes.
    pub fn with_graceful_shutdown(self, shutdown: ShutdownSignal) -> WithGracefulShutdown<S> {
        WithGracefulShutdown {
            listener: self.listener,
            service: self.service,
            shutdown,
        }
    }
}

/// Serve future with graceful shutdown enabled.
pub struct WithGracefulShutdown<S> {
    listener: MaybeTlsListener,
    shutdown: ShutdownSignal,
    service: S,
}

impl<S, B> IntoFuture for WithGracefulShutdown<S>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Error>,
    S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<Error>,
{
    type Output = Result<(), Error>;
    type IntoFuture = BoxFuture<'static, Result<(), Error>>;

    fn into_future(self) -> Self::IntoFuture {
        let WithGracefulShutdown {
            mut listener,
            service,
            mut shutdown,
        } = self;

        Box::pin(async move {
            loop {
                let incoming = tokio::select! {
                    _ = &mut shutdown => break,
                    result = listener.accept() => match result {
                        Ok(incoming) => incoming,
                        Err(err) => {
                            error!(
                                message = "accept new connection failed",
                                %err
                            );

                            continue;
                        }
                    }
                };

                let peer = incoming.peer_addr();
                let shutdown = shutdown.clone();
                let service = ConnectInfo {
                    peer,
                    inner: service.clone(),
                };
                tokio::spawn(async move {
                    let stream = match incoming.handshake().await {
                        Ok(stream) => stream,
                        Err(err) => {
                            debug!(
                                message = "tls handshake failed",
                                %peer,
                                %err
                            );

                            return;
                        }
                    };

                    match stream {
                        MaybeTlsStream::Raw(raw) => {
                            serve_connection(TokioIo::new(raw), peer, service, shutdown).await
                        }
                        MaybeTlsStream::Tls(tls) => {
                            serve_connection(TokioIo::new(tls), peer, service, shutdown).await
                        }
                    }
                });
            }

            Ok(())
        })
    }
}

async fn serve_connection<I, S, B>(
    io: I,
    peer: SocketAddr,
    service: S,
    mut shutdown: ShutdownSignal,
) where
    I: Read + Write + Unpin + Send + 'static,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Error>,
    S: Service<Request<Incoming>, Response = Response<B>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<Error>,
{
    let builder = Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(io, service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(err) = result {
                trace!(
                    message = "failed to serve http connection",
                    %peer,
                    %err
                );
            }

            return;
        }
        _ = &mut shutdown => {
            conn.as_mut().graceful_shutdown();
        }
    }

    if let Err(err) = conn.await {
        trace!(
            message = "failed to drain http connection",
            %peer,
            %err
        );
    }
}

#[derive(Clone)]
struct ConnectInfo<S> {
    peer: SocketAddr,
    inner: S,
}

impl<B, S> Service<Request<B>> for ConnectInfo<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn call(&self, mut req: Request<B>) -> Self::Future {
        req.extensions_mut().insert(self.peer);
        self.inner.call(req)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::{BodyExt, Empty, Full};
    use hyper::service::service_fn;
    use hyper_util::client::legacy::Client;

    use super::*;

    #[tokio::test]
    async fn serve_until_shutdown() {
        let addr = testify::next_addr();
        let listener = MaybeTlsListener::bind(&addr, None).await.unwrap();
        let (trigger, shutdown) = ShutdownSignal::new();

        let service = service_fn(|req: Request<Incoming>| async move {
            let peer = req.extensions().get::<SocketAddr>().copied();
            let body = match peer {
                Some(peer) => peer.ip().to_string(),
                None => String::new(),
            };

            Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(body))))
        });

        let server = tokio::spawn(
            serve(listener, service)
                .with_graceful_shutdown(shutdown)
                .into_future(),
        );
        testify::wait_for_tcp(addr).await;

        let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();
        let resp = client
            .get(format!("http://{addr}/").parse().unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"127.0.0.1"));

        trigger.cancel();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
