//! TCP endpoints: a listening [`TcpTransport`] and the client-side [`dial`].

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use crate::{Transport, TransportError};

/// A TCP [`Transport`] that listens for incoming streams.
#[derive(Debug)]
pub struct TcpTransport {
    /// `None` once shut down.
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let local_addr = listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(%local_addr, "TCP transport listening");
        Ok(Self {
            listener: Some(listener),
            local_addr,
        })
    }

    /// Returns the local address the listener was bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        Ok(self.local_addr)
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;
    type Error = TransportError;

    async fn accept(
        &mut self,
    ) -> Result<(Self::Stream, SocketAddr), Self::Error> {
        let listener = self.listener.as_ref().ok_or(TransportError::Shutdown)?;
        let (stream, addr) = listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%addr, error = %e, "could not set TCP_NODELAY");
        }
        tracing::debug!(%addr, "accepted TCP stream");
        Ok((stream, addr))
    }

    async fn shutdown(&mut self) -> Result<(), Self::Error> {
        if self.listener.take().is_some() {
            tracing::info!(local_addr = %self.local_addr, "TCP transport closed");
        }
        Ok(())
    }
}

/// Opens one TCP stream to `addr`.
///
/// With `timeout` set, the attempt is abandoned with
/// [`TransportError::ConnectTimeout`] once it elapses.
pub async fn dial(
    addr: &str,
    timeout: Option<Duration>,
) -> Result<(TcpStream, SocketAddr), TransportError> {
    let connect = TcpStream::connect(addr);
    let stream = match timeout {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| TransportError::ConnectTimeout(addr.to_string()))?,
        None => connect.await,
    }
    .map_err(|source| TransportError::ConnectFailed {
        addr: addr.to_string(),
        source,
    })?;

    let peer = stream
        .peer_addr()
        .map_err(|source| TransportError::ConnectFailed {
            addr: addr.to_string(),
            source,
        })?;
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer, error = %e, "could not set TCP_NODELAY");
    }
    tracing::debug!(%peer, "dialed TCP stream");
    Ok((stream, peer))
}
