use crate::transport::parse::{parse_complete, CompleteItem};
use crate::transport::{Direction, ReceivedMessage, TpHandle, Transport};
use crate::{Endpoint, EndpointBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::{fmt, io};
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::broadcast;

const UDP: &str = "UDP";
const MAX_MSG_SIZE: usize = u16::MAX as usize;

/// Assumed path MTU, writes over `MTU - MTU_HEADROOM` bytes are refused
const MTU: usize = 1500;
const MTU_HEADROOM: usize = 200;

#[derive(Debug)]
struct Inner {
    bound: SocketAddr,
    socket: UdpSocket,
}

/// Connectionless UDP transport. One socket serves both send and receive.
#[derive(Debug)]
pub struct Udp {
    inner: Arc<Inner>,
}

impl fmt::Display for Udp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "udp:bound={}", self.inner.bound)
    }
}

impl Udp {
    /// Bind to `addr` and register the transport on the endpoint builder.
    ///
    /// Returns the actually bound address.
    pub async fn spawn<A>(builder: &mut EndpointBuilder, addr: A) -> io::Result<SocketAddr>
    where
        A: ToSocketAddrs,
    {
        let socket = UdpSocket::bind(addr).await?;
        let bound = socket.local_addr()?;

        log::info!("Bound UDP to {}", bound);

        let inner = Arc::new(Inner { bound, socket });

        tokio::spawn(receive_task(builder.subscribe(), inner.clone()));

        builder.add_unmanaged_transport(Udp { inner });

        Ok(bound)
    }
}

#[async_trait::async_trait]
impl Transport for Udp {
    fn name(&self) -> &'static str {
        UDP
    }

    fn secure(&self) -> bool {
        false
    }

    fn reliable(&self) -> bool {
        false
    }

    fn bound(&self) -> SocketAddr {
        self.inner.bound
    }

    fn sent_by(&self) -> SocketAddr {
        self.inner.bound
    }

    fn direction(&self) -> Direction {
        Direction::None
    }

    fn max_payload_size(&self) -> Option<usize> {
        Some(MTU - MTU_HEADROOM)
    }

    async fn send(&self, bytes: &[u8], target: &[SocketAddr]) -> io::Result<()> {
        let target = target
            .iter()
            .find(|addr| addr.is_ipv4() == self.bound().is_ipv4());

        if let Some(target) = target {
            self.inner.socket.send_to(bytes, target).await.map(|_| ())
        } else {
            Err(io::Error::other("no compatible address family available"))
        }
    }
}

async fn receive_task(mut endpoint: broadcast::Receiver<Endpoint>, inner: Arc<Inner>) {
    let endpoint = match endpoint.recv().await.ok() {
        Some(endpoint) => endpoint,
        None => return,
    };

    let mut buffer = vec![0u8; MAX_MSG_SIZE];

    loop {
        match inner.socket.recv_from(&mut buffer).await {
            Ok((len, remote)) => handle_msg(&endpoint, &inner, remote, &buffer[..len]),
            Err(e) => log::error!("UDP recv error {:?}", e),
        }
    }
}

fn handle_msg(endpoint: &Endpoint, inner: &Arc<Inner>, remote: SocketAddr, bytes: &[u8]) {
    let item = match parse_complete(bytes) {
        Ok(item) => item,
        Err(e) => {
            // parse errors are logged and the datagram dropped
            log::warn!("dropping malformed datagram from {}, {}", remote, e);
            return;
        }
    };

    match item {
        CompleteItem::KeepAlive => {
            log::trace!("discarding keep-alive from {}", remote);
        }
        CompleteItem::Message {
            line,
            headers,
            body,
            buffer,
        } => {
            let msg = ReceivedMessage::new(
                remote,
                buffer,
                TpHandle::new(Udp {
                    inner: inner.clone(),
                }),
                line,
                headers,
                body,
            );

            endpoint.receive(msg);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn payload_limit() {
        assert_eq!(MTU - MTU_HEADROOM, 1300);
    }
}
