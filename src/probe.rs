use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;

/// TCP connect reachability check. No data is exchanged and no retries are made.
#[derive(Debug, Clone, Copy)]
pub struct TcpProber {
    timeout: Duration,
}

impl TcpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns true only if a connection to `ip:port` is established within the timeout.
    /// Timeouts, refusals and unreachable networks all report false.
    pub async fn probe(&self, ip: IpAddr, port: u16) -> bool {
        let addr = SocketAddr::new(ip, port);
        match time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_listener_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let prober = TcpProber::new(Duration::from_millis(500));
        assert!(prober.probe(IpAddr::V4(Ipv4Addr::LOCALHOST), port).await);
    }

    #[tokio::test]
    async fn dropped_listener_is_closed() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let prober = TcpProber::new(Duration::from_millis(500));
        assert!(!prober.probe(IpAddr::V4(Ipv4Addr::LOCALHOST), port).await);
    }
}
