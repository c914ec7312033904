use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::sleep;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const RETRY_DELAY: Duration = Duration::from_millis(5);

/// Wait (for 20s) until `addr` accepts TCP connections, panics otherwise.
pub async fn wait_for_tcp(addr: SocketAddr) {
    let timeout = Duration::from_secs(20);
    let start = Instant::now();

    loop {
        if let Ok(Ok(_conn)) = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await
        {
            break;
        }

        if start.elapsed() > timeout {
            panic!("Timed out waiting for connection to {addr}");
        }

        sleep(RETRY_DELAY).await;
    }
}
