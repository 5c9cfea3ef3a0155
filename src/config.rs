use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::{
    FetchConfig, Fetcher, ParseMode, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_REDIRECTS, DEFAULT_USER_AGENT,
};
use crate::gate::Gate;
use crate::ports::{self, DEFAULT_RDP_PORT, DEFAULT_SSH_PORT};
use crate::probe::TcpProber;
use crate::scanner::{AuxPorts, HostScanner};
use crate::targets::{self, TargetSpec, DEFAULT_TARGET};
use crate::types::PortSpec;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "web-sweep.yaml";

pub const DEFAULT_CONCURRENCY: usize = 64;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 2000;

/// Values read from the optional YAML config file. Every field is optional; command-line
/// flags take precedence over anything set here.
#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub targets: Option<Vec<String>>,
    pub targets_file: Option<PathBuf>,
    /// Inline port table, same syntax as `--ports`.
    pub ports: Option<String>,
    pub ports_file: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub workers: Option<usize>,
    pub probe_timeout_ms: Option<u64>,
    pub fetch_timeout_ms: Option<u64>,
    pub verify_certs: Option<bool>,
    pub strict_parse: Option<bool>,
    pub max_body_bytes: Option<usize>,
    pub max_redirects: Option<usize>,
    pub user_agent: Option<String>,
    pub ssh_port: Option<u16>,
    pub rdp_port: Option<u16>,
    pub results: Option<PathBuf>,
    pub errors: Option<PathBuf>,
}

/// Load the config file at `path`, or `./web-sweep.yaml` if it exists.
/// An explicitly named file that is missing or malformed is an error.
pub fn load_file_config(path: Option<&Path>) -> Result<Option<FileConfig>> {
    load_file_config_in(Path::new("."), path)
}

/// Like [`load_file_config`], looking for the default file in `dir` instead of the
/// working directory. A relative explicit `path` is used as given.
pub fn load_file_config_in(dir: &Path, path: Option<&Path>) -> Result<Option<FileConfig>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = dir.join(DEFAULT_CONFIG_FILE);
            if p.exists() {
                p
            } else {
                return Ok(None);
            }
        }
    };
    let s = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s)
        .with_context(|| format!("invalid config file: {}", path.display()))?;
    Ok(Some(cfg))
}

/// Fully resolved sweep settings.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub targets: Vec<TargetSpec>,
    pub ports: Vec<PortSpec>,
    pub aux: AuxPorts,
    /// Gate capacity: host scans allowed in flight at once.
    pub concurrency: usize,
    /// Worker tasks pulling hosts from the enumerator.
    pub workers: usize,
    pub probe_timeout: Duration,
    pub fetch: FetchConfig,
    pub results_path: PathBuf,
    pub errors_path: PathBuf,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            targets: vec![TargetSpec::parse(DEFAULT_TARGET).expect("default target parses")],
            ports: ports::default_port_table(),
            aux: AuxPorts::default(),
            concurrency: DEFAULT_CONCURRENCY,
            workers: DEFAULT_CONCURRENCY,
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            fetch: FetchConfig::default(),
            results_path: PathBuf::from("results"),
            errors_path: PathBuf::from("errors"),
        }
    }
}

/// Command-line overrides, already parsed by clap. `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub targets: Vec<String>,
    pub targets_file: Option<PathBuf>,
    pub ports: Option<String>,
    pub ports_file: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub workers: Option<usize>,
    pub probe_timeout_ms: Option<u64>,
    pub fetch_timeout_ms: Option<u64>,
    /// `Some(false)` turns off a `verify_certs: true` from the file.
    pub verify_certs: Option<bool>,
    pub strict_parse: Option<bool>,
    pub max_redirects: Option<usize>,
    pub ssh_port: Option<u16>,
    pub rdp_port: Option<u16>,
    pub results: Option<PathBuf>,
    pub errors: Option<PathBuf>,
}

impl SweepConfig {
    /// Merge file values and command-line overrides over the defaults, then validate.
    pub fn resolve(file: Option<FileConfig>, cli: Overrides) -> Result<Self> {
        let file = file.unwrap_or_default();
        let mut cfg = SweepConfig::default();

        // targets come from the command line if it names any, otherwise from the file
        let (exprs, targets_file) = if cli.targets.is_empty() && cli.targets_file.is_none() {
            (file.targets.unwrap_or_default(), file.targets_file)
        } else {
            (cli.targets, cli.targets_file)
        };
        let mut target_specs = Vec::new();
        for expr in &exprs {
            target_specs.push(TargetSpec::parse(expr).with_context(|| format!("target {expr}"))?);
        }
        if let Some(path) = targets_file {
            target_specs.extend(targets::load_targets_from_path(path)?);
        }
        if !target_specs.is_empty() {
            cfg.targets = target_specs;
        }

        if let Some(spec) = cli.ports.as_deref() {
            cfg.ports = ports::parse_port_table_str(spec).context("invalid --ports")?;
        } else if let Some(path) = cli.ports_file.as_ref() {
            cfg.ports = ports::load_port_table_from_path(path)?;
        } else if let Some(spec) = file.ports.as_deref() {
            cfg.ports = ports::parse_port_table_str(spec).context("invalid ports in config file")?;
        } else if let Some(path) = file.ports_file.as_ref() {
            cfg.ports = ports::load_port_table_from_path(path)?;
        }

        cfg.concurrency = cli.concurrency.or(file.concurrency).unwrap_or(DEFAULT_CONCURRENCY);
        cfg.workers = cli.workers.or(file.workers).unwrap_or(cfg.concurrency);
        cfg.probe_timeout = Duration::from_millis(
            cli.probe_timeout_ms
                .or(file.probe_timeout_ms)
                .unwrap_or(DEFAULT_PROBE_TIMEOUT_MS),
        );
        let verify = cli.verify_certs.or(file.verify_certs).unwrap_or(false);
        let strict = cli.strict_parse.or(file.strict_parse).unwrap_or(false);
        cfg.fetch = FetchConfig {
            timeout: Duration::from_millis(
                cli.fetch_timeout_ms
                    .or(file.fetch_timeout_ms)
                    .unwrap_or(DEFAULT_FETCH_TIMEOUT_MS),
            ),
            accept_invalid_certs: !verify,
            user_agent: file.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            max_body_bytes: file.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
            max_redirects: cli
                .max_redirects
                .or(file.max_redirects)
                .unwrap_or(DEFAULT_MAX_REDIRECTS),
            parse_mode: if strict { ParseMode::Strict } else { ParseMode::Lenient },
        };
        cfg.aux = AuxPorts {
            ssh: cli.ssh_port.or(file.ssh_port).unwrap_or(DEFAULT_SSH_PORT),
            rdp: cli.rdp_port.or(file.rdp_port).unwrap_or(DEFAULT_RDP_PORT),
        };
        if let Some(p) = cli.results.or(file.results) {
            cfg.results_path = p;
        }
        if let Some(p) = cli.errors.or(file.errors) {
            cfg.errors_path = p;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.probe_timeout.is_zero() || self.fetch.timeout.is_zero() {
            bail!("timeouts must be greater than zero");
        }
        if self.ports.is_empty() {
            bail!("port table is empty");
        }
        if self.aux.ssh == 0 || self.aux.rdp == 0 {
            bail!("auxiliary ports must be in 1..=65535");
        }
        if self.fetch.max_body_bytes == 0 {
            bail!("max_body_bytes must be greater than zero");
        }
        if self.targets.iter().all(|t| t.is_empty()) {
            bail!("no target addresses to scan");
        }
        Ok(())
    }

    /// Build the host scanner these settings describe: one shared HTTP client and gate.
    pub fn build_scanner(&self) -> Result<HostScanner> {
        let prober = TcpProber::new(self.probe_timeout);
        let fetcher = Fetcher::new(self.fetch.clone(), prober)?;
        Ok(HostScanner::new(
            self.ports.clone(),
            self.aux,
            fetcher,
            prober,
            Gate::new(self.concurrency),
        ))
    }

    pub fn total_hosts(&self) -> u64 {
        targets::total_hosts(&self.targets)
    }
}
