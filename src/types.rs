use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of the port table: which port to probe and whether it speaks TLS.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortSpec {
    pub port: u16,
    pub secure: bool,
}

impl PortSpec {
    pub const fn new(port: u16, secure: bool) -> Self {
        Self { port, secure }
    }

    pub const fn http(port: u16) -> Self {
        Self::new(port, false)
    }

    pub const fn https(port: u16) -> Self {
        Self::new(port, true)
    }

    /// URL scheme used to fetch this port.
    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.scheme())
    }
}

/// Metadata retrieved from one reachable, fetchable web port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortResult {
    pub port: u16,
    pub protocol: String,
    pub code: u16,
    pub title: String,
    pub body_summary: String,
}

/// Aggregated outcome for a single host. Built privately by the host scanner and
/// published once every port and auxiliary check has completed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostResult {
    pub host: String,
    pub ssh_open: bool,
    pub rdp_open: bool,
    pub results: Vec<PortResult>,
    pub timestamp: String,
}

impl HostResult {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ssh_open: false,
            rdp_open: false,
            results: Vec::new(),
            timestamp: String::new(),
        }
    }

    /// True when no port in the table produced a result ("no open ports found").
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Failure category of a single probe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorKind {
    PortClosed,
    Fetch,
    Parse,
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeErrorKind::PortClosed => "port_closed",
            ProbeErrorKind::Fetch => "fetch",
            ProbeErrorKind::Parse => "parse",
        };
        f.write_str(s)
    }
}

/// A failed probe, emitted as soon as it happens and independent of the host record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeError {
    pub host: String,
    pub port: u16,
    pub kind: ProbeErrorKind,
    pub cause: String,
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} [{}] {}", self.host, self.port, self.kind, self.cause)
    }
}

/// Counters collected by the aggregator while a sweep drains.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub hosts_scanned: u64,
    pub hosts_with_results: u64,
    pub hosts_empty: u64,
    pub port_results: u64,
    pub probe_errors: u64,
    pub closed: u64,
    pub fetch_failures: u64,
    pub parse_failures: u64,
}

impl SweepSummary {
    pub fn record_host(&mut self, host: &HostResult) {
        self.hosts_scanned += 1;
        if host.is_empty() {
            self.hosts_empty += 1;
        } else {
            self.hosts_with_results += 1;
            self.port_results += host.results.len() as u64;
        }
    }

    pub fn record_error(&mut self, err: &ProbeError) {
        self.probe_errors += 1;
        match err.kind {
            ProbeErrorKind::PortClosed => self.closed += 1,
            ProbeErrorKind::Fetch => self.fetch_failures += 1,
            ProbeErrorKind::Parse => self.parse_failures += 1,
        }
    }
}
