use crate::fetch::Fetcher;
use crate::gate::Gate;
use crate::probe::TcpProber;
use crate::sink::Sink;
use crate::types::{HostResult, PortSpec, ProbeError, ProbeErrorKind, SweepSummary};
use ::time::{format_description::well_known, OffsetDateTime};
use anyhow::{Context, Result};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Ports checked for presence only after the web ports of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxPorts {
    pub ssh: u16,
    pub rdp: u16,
}

impl Default for AuxPorts {
    fn default() -> Self {
        Self {
            ssh: crate::ports::DEFAULT_SSH_PORT,
            rdp: crate::ports::DEFAULT_RDP_PORT,
        }
    }
}

/// Scans one host at a time: every web port in table order, then the auxiliary ports.
///
/// Cloning is cheap; all clones share the same gate and HTTP client.
#[derive(Debug, Clone)]
pub struct HostScanner {
    ports: Arc<[PortSpec]>,
    aux: AuxPorts,
    fetcher: Fetcher,
    prober: TcpProber,
    gate: Gate,
}

impl HostScanner {
    pub fn new(ports: Vec<PortSpec>, aux: AuxPorts, fetcher: Fetcher, prober: TcpProber, gate: Gate) -> Self {
        Self {
            ports: ports.into(),
            aux,
            fetcher,
            prober,
            gate,
        }
    }

    pub fn ports(&self) -> &[PortSpec] {
        &self.ports
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Scan `ip` and return its finished record.
    ///
    /// Each port yields either one `PortResult` in the record or one error on `errors`,
    /// never both. The gate slot is held only while probing and is released before return.
    pub async fn scan_host(&self, ip: IpAddr, errors: &mpsc::Sender<ProbeError>) -> HostResult {
        let mut host = HostResult::new(ip.to_string());
        let permit = self.gate.acquire().await;

        for spec in self.ports.iter() {
            match self.fetcher.fetch(ip, *spec).await {
                Ok(result) => host.results.push(result),
                Err(failure) => {
                    let err: ProbeError = failure.into();
                    match err.kind {
                        ProbeErrorKind::PortClosed => trace!(host = %ip, port = spec.port, "port closed"),
                        _ => debug!(host = %ip, port = spec.port, cause = %err.cause, "probe failed"),
                    }
                    // receiver gone means the sweep is tearing down; keep scanning anyway
                    let _ = errors.send(err).await;
                }
            }
        }

        host.ssh_open = self.prober.probe(ip, self.aux.ssh).await;
        host.rdp_open = self.prober.probe(ip, self.aux.rdp).await;
        drop(permit);

        host.timestamp = now_rfc3339();
        host
    }
}

/// Run a full sweep: feed `hosts` to a fixed pool of `workers`, drain host records and probe
/// errors into `sink`, and return the counters once every scan has finished.
///
/// Cancelling `cancel` stops the host feed; scans already admitted still complete and are
/// delivered before this returns. Fails only if the sink cannot be flushed at the end.
pub async fn run_sweep<S, I>(
    scanner: HostScanner,
    workers: usize,
    hosts: I,
    sink: &mut S,
    cancel: CancellationToken,
) -> Result<SweepSummary>
where
    S: Sink + ?Sized,
    I: Iterator<Item = IpAddr> + Send + 'static,
{
    let workers = workers.max(1);
    let (host_tx, host_rx) = mpsc::channel::<IpAddr>(workers);
    let (result_tx, mut result_rx) = mpsc::channel::<HostResult>(workers);
    let (error_tx, mut error_rx) = mpsc::channel::<ProbeError>(workers * scanner.ports().len().max(1));

    let mut set = JoinSet::new();

    let feed_cancel = cancel.clone();
    set.spawn(async move {
        for ip in hosts {
            if feed_cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = feed_cancel.cancelled() => break,
                sent = host_tx.send(ip) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let host_rx = Arc::new(Mutex::new(host_rx));
    for _ in 0..workers {
        let host_rx = host_rx.clone();
        let scanner = scanner.clone();
        let result_tx = result_tx.clone();
        let error_tx = error_tx.clone();
        set.spawn(async move {
            loop {
                let next = host_rx.lock().await.recv().await;
                let Some(ip) = next else { break };
                let host = scanner.scan_host(ip, &error_tx).await;
                if result_tx.send(host).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(result_tx);
    drop(error_tx);

    let mut summary = SweepSummary::default();
    let mut results_open = true;
    let mut errors_open = true;
    let mut cancel_seen = false;
    while results_open || errors_open {
        tokio::select! {
            r = result_rx.recv(), if results_open => match r {
                Some(host) => {
                    summary.record_host(&host);
                    let res = if host.is_empty() {
                        sink.host_empty(&host)
                    } else {
                        sink.host_result(&host)
                    };
                    if let Err(e) = res {
                        warn!(host = %host.host, "failed to record host result: {e:#}");
                    }
                }
                None => results_open = false,
            },
            e = error_rx.recv(), if errors_open => match e {
                Some(err) => {
                    summary.record_error(&err);
                    if let Err(e) = sink.probe_error(&err) {
                        warn!(host = %err.host, port = err.port, "failed to record probe error: {e:#}");
                    }
                }
                None => errors_open = false,
            },
            _ = cancel.cancelled(), if !cancel_seen => {
                cancel_seen = true;
                info!(in_flight = scanner.gate().in_flight(), "stop requested, draining in-flight scans");
            }
        }
    }

    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            warn!("sweep task failed: {e}");
        }
    }
    // per-record write failures are tolerated, but losing the buffered tail is not
    sink.flush().context("failed to flush sink after sweep")?;

    Ok(summary)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
