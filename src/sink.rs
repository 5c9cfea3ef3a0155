use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};

use crate::types::{HostResult, ProbeError};

/// Receives everything the aggregator drains from a sweep.
///
/// Methods are called from a single loop, in arrival order per channel.
pub trait Sink {
    /// A host with at least one port result.
    fn host_result(&mut self, host: &HostResult) -> Result<()>;

    /// A host that finished with no port results ("no open ports found").
    fn host_empty(&mut self, host: &HostResult) -> Result<()>;

    fn probe_error(&mut self, err: &ProbeError) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Append-only file output: one JSON object per line for hosts with results, one text
/// line per probe error. Optionally echoes a readable summary to stdout.
pub struct FileSink {
    results: LineWriter<File>,
    errors: LineWriter<File>,
    results_path: PathBuf,
    errors_path: PathBuf,
    console: bool,
}

impl FileSink {
    /// Create (truncating) both output files. Failure here is fatal to the caller.
    pub fn create(results: impl AsRef<Path>, errors: impl AsRef<Path>, console: bool) -> Result<Self> {
        let results_path = results.as_ref().to_path_buf();
        let errors_path = errors.as_ref().to_path_buf();
        let results = File::create(&results_path)
            .with_context(|| format!("failed to create results file: {}", results_path.display()))?;
        let errors = File::create(&errors_path)
            .with_context(|| format!("failed to create errors file: {}", errors_path.display()))?;
        Ok(Self {
            results: LineWriter::new(results),
            errors: LineWriter::new(errors),
            results_path,
            errors_path,
            console,
        })
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    pub fn errors_path(&self) -> &Path {
        &self.errors_path
    }
}

impl Sink for FileSink {
    fn host_result(&mut self, host: &HostResult) -> Result<()> {
        if self.console {
            print_host(host);
        }
        let line = serde_json::to_string(host)?;
        writeln!(self.results, "{line}")
            .with_context(|| format!("write to {}", self.results_path.display()))?;
        Ok(())
    }

    fn host_empty(&mut self, _host: &HostResult) -> Result<()> {
        if self.console {
            let mut out = io::stdout().lock();
            write!(out, ".")?;
            out.flush()?;
        }
        Ok(())
    }

    fn probe_error(&mut self, err: &ProbeError) -> Result<()> {
        writeln!(self.errors, "{err}")
            .with_context(|| format!("write to {}", self.errors_path.display()))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.results.flush()?;
        self.errors.flush()?;
        Ok(())
    }
}

fn print_host(host: &HostResult) {
    println!("\nResult:");
    println!(
        "\tHost: {}, ssh {}, rdp {}",
        host.host, host.ssh_open, host.rdp_open
    );
    println!("\tOpen:");
    for (i, r) in host.results.iter().enumerate() {
        println!("\t  [{i}] port {} ({}, {}): {}", r.port, r.protocol, r.code, r.title);
    }
}

/// Collects everything in memory. Useful for tests and library callers.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub hosts: Vec<HostResult>,
    pub empty: Vec<HostResult>,
    pub errors: Vec<ProbeError>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every host record, with or without results.
    pub fn all_hosts(&self) -> impl Iterator<Item = &HostResult> {
        self.hosts.iter().chain(self.empty.iter())
    }

    pub fn errors_for<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a ProbeError> + 'a {
        self.errors.iter().filter(move |e| e.host == host)
    }
}

impl Sink for MemorySink {
    fn host_result(&mut self, host: &HostResult) -> Result<()> {
        self.hosts.push(host.clone());
        Ok(())
    }

    fn host_empty(&mut self, host: &HostResult) -> Result<()> {
        self.empty.push(host.clone());
        Ok(())
    }

    fn probe_error(&mut self, err: &ProbeError) -> Result<()> {
        self.errors.push(err.clone());
        Ok(())
    }
}
