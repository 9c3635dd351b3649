use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::HttpError;
use crate::shutdown::CancelListener;

use super::Handler;
use super::wire::{ProxyResponse, read_request, write_response};

/// HTTP/1.1 listener that hands each request to a [`Handler`].
///
/// One request is served per connection; responses always carry
/// `Connection: close`.
#[derive(Debug)]
pub struct ProxyServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ProxyServer {
    /// # Errors
    ///
    /// Returns an error when the address cannot be bound.
    pub async fn bind(addr: &str) -> Result<Self, HttpError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| HttpError::Bind {
                addr: addr.to_owned(),
                source: err,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| HttpError::LocalAddr { source: err })?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `cancel` fires. Connections already being
    /// served finish on their own tasks.
    pub async fn serve<H: Handler>(self, handler: Arc<H>, mut cancel: CancelListener) {
        info!(addr = %self.local_addr, "Proxy listening");
        loop {
            let accepted = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            let (socket, peer) = match accepted {
                Ok(result) => result,
                Err(err) => {
                    warn!("Failed to accept proxy connection: {}", err);
                    continue;
                }
            };
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                handle_connection(socket, peer, handler.as_ref()).await;
            });
        }
        info!(addr = %self.local_addr, "Proxy stopped");
    }
}

async fn handle_connection<H: Handler>(mut socket: TcpStream, peer: SocketAddr, handler: &H) {
    let response = match read_request(&mut socket, peer).await {
        Ok(request) => {
            debug!(%peer, method = %request.method, target = %request.target, "Proxy request");
            handler.handle(request).await
        }
        Err(err) => {
            debug!(%peer, status = err.status, "Rejected proxy request: {}", err.message);
            ProxyResponse::error(err.status, &err.message)
        }
    };
    if let Err(err) = write_response(&mut socket, peer, &response).await {
        warn!("{}", err);
    }
}
