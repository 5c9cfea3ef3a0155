use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use web_sweep_rs::config::{self, Overrides, SweepConfig};
use web_sweep_rs::scanner;
use web_sweep_rs::sink::FileSink;
use web_sweep_rs::targets;

/// web-sweep-rs: sweep an IPv4 block for web servers and record what they serve.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "web-sweep-rs",
    version,
    about = "Sweep an IPv4 block for HTTP(S) ports and record page titles, body summaries and status codes.",
    long_about = None
)]
struct Cli {
    /// Target expression: IP, CIDR (10.0.0.0/24) or octet ranges (23.96.1-254.1-254). Repeatable.
    #[arg(long = "targets", short = 't')]
    targets: Vec<String>,

    /// File with one target expression per line.
    #[arg(long)]
    targets_file: Option<PathBuf>,

    /// Port table, e.g. "80,443/https,8000-8002". Bare 443/8443 default to https.
    #[arg(long, conflicts_with = "ports_file")]
    ports: Option<String>,

    /// Path to a port table file (one entry or range per line).
    #[arg(long)]
    ports_file: Option<PathBuf>,

    /// Max host scans in flight at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Worker tasks pulling hosts (defaults to --concurrency).
    #[arg(long)]
    workers: Option<usize>,

    /// TCP connect timeout in milliseconds.
    #[arg(long = "probe-timeout-ms")]
    probe_timeout_ms: Option<u64>,

    /// Overall HTTP GET timeout in milliseconds.
    #[arg(long = "fetch-timeout-ms")]
    fetch_timeout_ms: Option<u64>,

    /// Validate TLS certificates (off by default).
    #[arg(long, default_value_t = false, overrides_with = "no_verify_certs")]
    verify_certs: bool,

    /// Skip TLS certificate validation even if the config file enables it.
    #[arg(long, default_value_t = false, overrides_with = "verify_certs")]
    no_verify_certs: bool,

    /// Treat undecodable bodies as parse errors instead of decoding lossily.
    #[arg(long, default_value_t = false, overrides_with = "no_strict_parse")]
    strict_parse: bool,

    /// Decode bodies lossily even if the config file enables strict parsing.
    #[arg(long, default_value_t = false, overrides_with = "strict_parse")]
    no_strict_parse: bool,

    /// Redirects followed from `/` before reporting (0 reports the redirect itself).
    #[arg(long)]
    max_redirects: Option<usize>,

    /// Port checked for SSH presence.
    #[arg(long)]
    ssh_port: Option<u16>,

    /// Port checked for RDP presence.
    #[arg(long)]
    rdp_port: Option<u16>,

    /// Results file (JSON lines, truncated at start).
    #[arg(long)]
    results: Option<PathBuf>,

    /// Errors file (one line per failed probe, truncated at start).
    #[arg(long)]
    errors: Option<PathBuf>,

    /// Do not echo results and progress dots to stdout.
    #[arg(long, short = 'q', default_value_t = false)]
    quiet: bool,

    /// YAML config file. If omitted, loads ./web-sweep.yaml if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter (overrides RUST_LOG), e.g. "info" or "web_sweep_rs=debug".
    #[arg(long)]
    log: Option<String>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            targets: self.targets.clone(),
            targets_file: self.targets_file.clone(),
            ports: self.ports.clone(),
            ports_file: self.ports_file.clone(),
            concurrency: self.concurrency,
            workers: self.workers,
            probe_timeout_ms: self.probe_timeout_ms,
            fetch_timeout_ms: self.fetch_timeout_ms,
            verify_certs: toggle(self.verify_certs, self.no_verify_certs),
            strict_parse: toggle(self.strict_parse, self.no_strict_parse),
            max_redirects: self.max_redirects,
            ssh_port: self.ssh_port,
            rdp_port: self.rdp_port,
            results: self.results.clone(),
            errors: self.errors.clone(),
        }
    }
}

/// `--flag` / `--no-flag` pair to an override; neither given leaves the file value.
fn toggle(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref());

    let file_cfg = config::load_file_config(cli.config.as_deref())?;
    let cfg = SweepConfig::resolve(file_cfg, cli.overrides())?;

    let target_list: Vec<String> = cfg.targets.iter().map(|t| t.to_string()).collect();
    let port_list: Vec<String> = cfg.ports.iter().map(|p| p.to_string()).collect();
    info!(
        targets = %target_list.join(", "),
        hosts = cfg.total_hosts(),
        ports = %port_list.join(","),
        concurrency = cfg.concurrency,
        workers = cfg.workers,
        probe_timeout_ms = cfg.probe_timeout.as_millis() as u64,
        fetch_timeout_ms = cfg.fetch.timeout.as_millis() as u64,
        max_redirects = cfg.fetch.max_redirects,
        ssh_port = cfg.aux.ssh,
        rdp_port = cfg.aux.rdp,
        "sweep configuration"
    );
    if cfg.fetch.accept_invalid_certs {
        warn!("certificate verification disabled");
    }

    // Sinks must open before any scanning starts; failure here is fatal.
    let mut sink = FileSink::create(&cfg.results_path, &cfg.errors_path, !cli.quiet)?;
    let host_scanner = cfg.build_scanner()?;

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let hosts = targets::enumerate(&cfg.targets);
    let summary = scanner::run_sweep(host_scanner, cfg.workers, hosts, &mut sink, cancel.clone()).await?;

    if !cli.quiet {
        println!();
    }
    info!(
        hosts = summary.hosts_scanned,
        with_results = summary.hosts_with_results,
        empty = summary.hosts_empty,
        port_results = summary.port_results,
        closed = summary.closed,
        fetch_failures = summary.fetch_failures,
        parse_failures = summary.parse_failures,
        cancelled = cancel.is_cancelled(),
        results = %sink.results_path().display(),
        errors = %sink.errors_path().display(),
        "sweep finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_map_to_overrides() {
        let cli = Cli::try_parse_from(["web-sweep-rs"]).unwrap();
        assert_eq!(cli.overrides().verify_certs, None);

        let cli = Cli::try_parse_from(["web-sweep-rs", "--no-verify-certs", "--strict-parse"]).unwrap();
        let o = cli.overrides();
        assert_eq!(o.verify_certs, Some(false));
        assert_eq!(o.strict_parse, Some(true));
    }

    #[test]
    fn last_toggle_wins() {
        let cli = Cli::try_parse_from(["web-sweep-rs", "--strict-parse", "--no-strict-parse"]).unwrap();
        assert_eq!(cli.overrides().strict_parse, Some(false));

        let cli = Cli::try_parse_from(["web-sweep-rs", "--no-verify-certs", "--verify-certs"]).unwrap();
        assert_eq!(cli.overrides().verify_certs, Some(true));
    }

    #[test]
    fn max_redirects_flag_is_passed_through() {
        let cli = Cli::try_parse_from(["web-sweep-rs", "--max-redirects", "0"]).unwrap();
        assert_eq!(cli.overrides().max_redirects, Some(0));
    }
}
