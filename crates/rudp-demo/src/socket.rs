use rand::Rng;
use rudp_core::DatagramSocket;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Wraps a real UDP socket and drops outgoing datagrams with probability
/// `loss_rate`, for exercising the retransmission and congestion-control
/// paths the way the reference driver's synthetic-loss test harness did.
pub struct LossyUdpSocket {
    inner: UdpSocket,
    loss_rate: f64,
}

impl LossyUdpSocket {
    pub fn new(inner: UdpSocket, loss_rate: f64) -> Self {
        LossyUdpSocket { inner, loss_rate }
    }

    fn should_drop(&self) -> bool {
        self.loss_rate > 0.0 && rand::rng().random::<f64>() < self.loss_rate
    }
}

impl DatagramSocket for LossyUdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        if self.should_drop() {
            return Ok(buf.len());
        }
        self.inner.send_to(buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }
}
