use anyhow::Result;
use if_addrs::{get_if_addrs, IfAddr};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tracing::debug;

/// Ports checked when tagging the local machine's exposed services.
/// Biased toward web-reachable and AI-infra service ports.
const COMMON_PORTS: &[u16] = &[
    21, 22, 80, 443, 1433, 3000, 3306, 5000, 5432, 5900, 6379, 7860, 8000, 8008, 8080, 8081, 8088,
    8443, 8501, 8888, 9000, 9090, 9200, 11211, 11434, 27017,
];

const CONNECT_TIMEOUT: Duration = Duration::from_millis(400);
const CONNECT_CONCURRENCY: usize = 128;

/// Local IPv4 addresses worth probing: loopback plus every non-loopback
/// interface address.
fn local_addresses() -> Result<Vec<Ipv4Addr>> {
    let mut addrs = vec![Ipv4Addr::LOCALHOST];
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if !v4.ip.is_loopback() && !addrs.contains(&v4.ip) {
                addrs.push(v4.ip);
            }
        }
    }
    Ok(addrs)
}

/// Discover open TCP ports on the local machine via bounded async connect
/// attempts, returning `addr:port` strings ready for store insertion.
pub async fn local_open_ports() -> Result<Vec<String>> {
    let addrs = local_addresses()?;
    let sem = Arc::new(Semaphore::new(CONNECT_CONCURRENCY));
    let mut set = JoinSet::new();

    for ip in addrs {
        for &port in COMMON_PORTS {
            let permit = sem.clone().acquire_owned().await.expect("semaphore open");
            set.spawn(async move {
                let _permit = permit;
                let addr = SocketAddr::new(IpAddr::V4(ip), port);
                match time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
                    Ok(Ok(_stream)) => Some(format!("{ip}:{port}")),
                    _ => None,
                }
            });
        }
    }

    let mut open = Vec::new();
    while let Some(res) = set.join_next().await {
        if let Ok(Some(target)) = res {
            debug!(target = %target, "local port open");
            open.push(target);
        }
    }
    open.sort();
    Ok(open)
}
