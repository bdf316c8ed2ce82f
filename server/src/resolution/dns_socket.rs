use crate::config::AppConfig;

use super::{query_handler::QueryHandler, upstream_selector::UpstreamSelector};
use bytes::Bytes;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::UdpSocket, sync::oneshot};

/// Largest datagram accepted. Leaves room for EDNS0 sized queries.
const MAX_DATAGRAM_SIZE: usize = 4096;

/// Any error related to receiving and sending DNS packets on the UDP socket.
#[derive(thiserror::Error, Debug)]
pub enum DnsSocketError {
    #[error(transparent)]
    IO(#[from] tokio::io::Error),
}

/**
 * DNS UDP socket
 */
#[derive(Debug, Clone)]
pub struct DnsSocket {
    socket: Arc<UdpSocket>,
    handler: QueryHandler,
}

impl DnsSocket {
    /// Binds the socket configured in `config` and answers with the DoH upstreams.
    pub async fn new(config: &AppConfig) -> Result<Self, DnsSocketError> {
        let selector = UpstreamSelector::new(config.upstreams.clone(), config.timeout);
        Self::with_handler(config.address, QueryHandler::new(selector)).await
    }

    pub async fn with_handler(listening: SocketAddr, handler: QueryHandler) -> Result<Self, DnsSocketError> {
        let socket = UdpSocket::bind(listening).await?;
        Ok(Self {
            socket: Arc::new(socket),
            handler,
        })
    }

    /// Address the socket is actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, DnsSocketError> {
        Ok(self.socket.local_addr()?)
    }

    // Send message to address
    pub async fn send_to(&self, buffer: &[u8], target: &SocketAddr) -> tokio::io::Result<usize> {
        self.socket.send_to(buffer, target).await
    }

    /// Starts the receive loop in the background.
    /// Returns the sender to stop the loop again.
    pub fn start_receive_loop(&self) -> oneshot::Sender<()> {
        let cloned = self.clone();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let mut cancel = rx;
            loop {
                tokio::select! {
                    _ = &mut cancel => {
                        tracing::trace!("Stop UDP receive loop.");
                        break;
                    }
                    result = cloned.receive_datagram() => {
                        if let Err(err) = result {
                            tracing::error!("Error while trying to receive. {err}");
                        }
                    }
                }
            }
        });
        tx
    }

    /// Receives one datagram and answers it in its own task.
    async fn receive_datagram(&self) -> Result<(), DnsSocketError> {
        let mut buffer = [0; MAX_DATAGRAM_SIZE];
        let (size, from) = self.socket.recv_from(&mut buffer).await?;
        let data = Bytes::copy_from_slice(&buffer[..size]);

        let socket = self.clone();
        tokio::spawn(async move {
            let Some(reply) = socket.handler.handle_raw(data).await else {
                return;
            };
            if let Err(e) = socket.send_to(&reply, &from).await {
                tracing::warn!("Failed to send reply to {from}. {e}");
            }
        });

        Ok(())
    }
}
