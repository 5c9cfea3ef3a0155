use std::net::IpAddr;

use thiserror::Error;

use crate::types::{ProbeError, ProbeErrorKind};

/// Why a single (host, port) probe produced no `PortResult`.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("{host}: port {port} is closed")]
    PortClosed { host: IpAddr, port: u16 },

    #[error("{host}:{port}: fetch failed: {source}")]
    Fetch {
        host: IpAddr,
        port: u16,
        #[source]
        source: reqwest::Error,
    },

    #[error("{host}:{port}: unparseable body: {reason}")]
    Parse {
        host: IpAddr,
        port: u16,
        reason: String,
    },
}

impl ProbeFailure {
    pub fn kind(&self) -> ProbeErrorKind {
        match self {
            ProbeFailure::PortClosed { .. } => ProbeErrorKind::PortClosed,
            ProbeFailure::Fetch { .. } => ProbeErrorKind::Fetch,
            ProbeFailure::Parse { .. } => ProbeErrorKind::Parse,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            ProbeFailure::PortClosed { port, .. }
            | ProbeFailure::Fetch { port, .. }
            | ProbeFailure::Parse { port, .. } => *port,
        }
    }

    pub fn host(&self) -> IpAddr {
        match self {
            ProbeFailure::PortClosed { host, .. }
            | ProbeFailure::Fetch { host, .. }
            | ProbeFailure::Parse { host, .. } => *host,
        }
    }
}

impl From<ProbeFailure> for ProbeError {
    fn from(f: ProbeFailure) -> Self {
        // reqwest hides the interesting part (timeout, reset, tls) in the source chain
        let cause = match &f {
            ProbeFailure::PortClosed { .. } => "port is closed".to_string(),
            ProbeFailure::Fetch { source, .. } => error_chain(source),
            ProbeFailure::Parse { reason, .. } => reason.clone(),
        };
        ProbeError {
            host: f.host().to_string(),
            port: f.port(),
            kind: f.kind(),
            cause,
        }
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut cur = err.source();
    while let Some(e) = cur {
        out.push_str(": ");
        out.push_str(&e.to_string());
        cur = e.source();
    }
    out
}
