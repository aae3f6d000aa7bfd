//! CDN host resolution by latency probe.
//!
//! Every host from the server descriptor is probed concurrently with a
//! plain TCP connect (the edge protocol is HTTP on port 80, so a connect
//! measures the round trip without server think time). The lowest-latency
//! success wins.

use crate::progress::CancellationToken;
use crate::{Error, Result};
use futures::future;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Upper bound on a single probe; a host that cannot complete a TCP
/// handshake in this window is useless as an edge anyway.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A probe winner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    /// The selected host, verbatim from the server descriptor.
    pub host: String,
    /// Measured connect latency.
    pub latency: Duration,
}

/// Probe all `hosts` and pick the lowest-latency one.
///
/// All probes are awaited to completion; failures only narrow the
/// candidate set. If every probe fails the pipeline has no usable edge
/// and resolution fails. Cancellation discards in-flight probes.
pub async fn resolve_host(hosts: &[String], token: &CancellationToken) -> Result<ResolvedHost> {
    if hosts.is_empty() {
        return Err(Error::configuration("server descriptor lists no CDN hosts"));
    }
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }

    debug!("probing {} CDN hosts", hosts.len());

    let latencies = tokio::select! {
        latencies = future::join_all(hosts.iter().map(|host| probe(host))) => latencies,
        () = token.cancelled() => return Err(Error::Cancelled),
    };

    let best = hosts
        .iter()
        .zip(latencies)
        .filter_map(|(host, latency)| latency.map(|l| (host, l)))
        .min_by_key(|&(_, latency)| latency);

    match best {
        Some((host, latency)) => {
            debug!("selected CDN host {host} ({latency:?})");
            Ok(ResolvedHost {
                host: host.clone(),
                latency,
            })
        }
        None => Err(Error::configuration("no CDN host answered the latency probe")),
    }
}

/// Time a TCP connect to the host. `None` means unreachable or too slow.
async fn probe(host: &str) -> Option<Duration> {
    // Descriptors normally list bare hostnames; keep an explicit port if
    // one is present.
    let addr = if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:80")
    };

    let started = Instant::now();
    match timeout(PROBE_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => {
            let latency = started.elapsed();
            trace!("probe {addr}: {latency:?}");
            Some(latency)
        }
        Ok(Err(e)) => {
            debug!("probe {addr} failed: {e}");
            None
        }
        Err(_) => {
            debug!("probe {addr} timed out");
            None
        }
    }
}
