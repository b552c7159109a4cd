use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

/// Abstracts the one socket operation the sender and receiver engines
/// need, so tests can swap in an in-memory double instead of binding a
/// real UDP socket.
pub trait DatagramSocket: Send + Sync {
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl std::future::Future<Output = io::Result<usize>> + Send;

    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl std::future::Future<Output = io::Result<(usize, SocketAddr)>> + Send;
}

impl DatagramSocket for UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }
}

/// What a `LoopbackSocket`'s fault hook decides to do with an outgoing
/// datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramFault {
    /// Deliver the datagram unchanged.
    Pass,
    /// Silently discard it, as if lost on the wire.
    Drop,
    /// Flip the last byte before delivering it, so any integrity tag
    /// covering the datagram fails to verify.
    Corrupt,
}

type FaultHook = Box<dyn Fn(&[u8]) -> DatagramFault + Send>;

/// An in-memory datagram channel pair for deterministic tests: every
/// datagram sent to `peer_addr` is delivered to the other end's
/// `recv_from`, optionally dropped or corrupted by a hook installed with
/// `set_fault`.
pub struct LoopbackSocket {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    outbox: tokio::sync::mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>,
    inbox: Mutex<tokio::sync::mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>>,
    fault: StdMutex<Option<FaultHook>>,
}

impl LoopbackSocket {
    /// Builds a connected pair of loopback sockets, `a` addressed at
    /// `addr_a` and `b` addressed at `addr_b`, each delivering to the
    /// other.
    pub fn pair(addr_a: SocketAddr, addr_b: SocketAddr) -> (Arc<Self>, Arc<Self>) {
        let (tx_a_to_b, rx_a_to_b) = tokio::sync::mpsc::unbounded_channel();
        let (tx_b_to_a, rx_b_to_a) = tokio::sync::mpsc::unbounded_channel();

        let a = Arc::new(LoopbackSocket {
            local_addr: addr_a,
            peer_addr: addr_b,
            outbox: tx_a_to_b,
            inbox: Mutex::new(rx_b_to_a),
            fault: StdMutex::new(None),
        });
        let b = Arc::new(LoopbackSocket {
            local_addr: addr_b,
            peer_addr: addr_a,
            outbox: tx_b_to_a,
            inbox: Mutex::new(rx_a_to_b),
            fault: StdMutex::new(None),
        });
        (a, b)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Installs a hook consulted on every outgoing datagram from this end.
    /// Replaces any previously installed hook.
    pub fn set_fault<F>(&self, hook: F)
    where
        F: Fn(&[u8]) -> DatagramFault + Send + 'static,
    {
        *self.fault.lock().unwrap() = Some(Box::new(hook));
    }

    /// Removes any installed fault hook, restoring unconditional delivery.
    pub fn clear_fault(&self) {
        *self.fault.lock().unwrap() = None;
    }
}

impl DatagramSocket for LoopbackSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        if target != self.peer_addr {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "loopback socket only addresses its fixed peer",
            ));
        }
        let len = buf.len();
        let fault = self.fault.lock().unwrap().as_ref().map(|hook| hook(buf));
        let mut data = buf.to_vec();
        match fault {
            None | Some(DatagramFault::Pass) => {}
            Some(DatagramFault::Drop) => return Ok(len),
            Some(DatagramFault::Corrupt) => {
                if let Some(last) = data.last_mut() {
                    *last ^= 0xff;
                }
            }
        }
        self.outbox
            .send((self.local_addr, data))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer dropped"))?;
        Ok(len)
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut inbox = self.inbox.lock().await;
        match inbox.recv().await {
            Some((from, data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok((len, from))
            }
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "peer socket closed",
            )),
        }
    }
}
