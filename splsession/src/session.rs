//! Poignée de session : le transport actif et sa fermeture idempotente.

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// The one active transport handle.
///
/// At most one session exists at a time. `close` is idempotent: both the
/// streaming loop and an external stop request may try to close the same
/// session, and the second attempt must be harmless.
pub struct Session {
    stream: TcpStream,
    peer: SocketAddr,
    closed: bool,
}

impl Session {
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            closed: false,
        }
    }

    /// Adresse du pair connecté.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Shuts the transport down. Safe to call more than once; errors from an
    /// already-dead connection are ignored.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.stream.shutdown().await {
            debug!("session shutdown for {} reported: {}", self.peer, err);
        } else {
            debug!("session with {} closed", self.peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (stream, peer) = listener.accept().await.unwrap();
        let _client = client.await.unwrap();

        let mut session = Session::new(stream, peer);
        session.close().await;
        // Second close must not fail or panic.
        session.close().await;
    }
}
