use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use rustls::ServerConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

use super::TlsError;

pub struct MaybeTlsListener {
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
}

impl MaybeTlsListener {
    pub async fn bind(addr: &SocketAddr, tls: Option<Arc<ServerConfig>>) -> Result<Self, TlsError> {
        let listener = TcpListener::bind(addr).await.map_err(TlsError::TcpBind)?;

        Ok(Self {
            listener,
            acceptor: tls.map(TlsAcceptor::from),
        })
    }

    /// Accept the next TCP connection. The TLS handshake, if any, is left to
    /// [`MaybeTlsIncoming::handshake`] so a slow client cannot stall the
    /// accept loop.
    pub async fn accept(&mut self) -> Result<MaybeTlsIncoming, TlsError> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(TlsError::IncomingListener)?;

        Ok(MaybeTlsIncoming {
            stream,
            peer_addr,
            acceptor: self.acceptor.clone(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

pub struct MaybeTlsIncoming {
    stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: Option<TlsAcceptor>,
}

pub enum MaybeTlsStream {
    Raw(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl MaybeTlsIncoming {
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub async fn handshake(self) -> Result<MaybeTlsStream, TlsError> {
        match self.acceptor {
            Some(acceptor) => acceptor
                .accept(self.stream)
                .await
                .map(|tls| MaybeTlsStream::Tls(Box::new(tls)))
                .map_err(TlsError::Handshake),
            None => Ok(MaybeTlsStream::Raw(self.stream)),
        }
    }
}
