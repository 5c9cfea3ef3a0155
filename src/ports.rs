use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::types::PortSpec;

/// Auxiliary ports checked for presence only (no fetch).
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_RDP_PORT: u16 = 3389;

/// The web ports probed on every host when no table is configured.
pub fn default_port_table() -> Vec<PortSpec> {
    vec![
        PortSpec::http(80),
        PortSpec::https(443),
        PortSpec::http(8080),
        PortSpec::https(8443),
        PortSpec::http(8000),
        PortSpec::http(1080),
    ]
}

/// Parse a port table from text.
///
/// Entries are separated by newlines or commas. Supported forms:
/// - `80` (scheme guessed: https for 443/8443, http otherwise)
/// - `8443/https`, `8080/http`
/// - inclusive range `8000-8002` or `9443-9445/https`
/// - comments: everything after `#` is ignored
///
/// Duplicate ports keep their first occurrence; order is otherwise preserved.
pub fn parse_port_table_str(s: &str) -> Result<Vec<PortSpec>> {
    let mut out: Vec<PortSpec> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        for entry in line.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (ports, scheme) = match entry.split_once('/') {
                Some((p, sch)) => {
                    let secure = parse_scheme(sch.trim())
                        .with_context(|| format!("line {line_no}: invalid scheme in entry: {entry}"))?;
                    (p.trim(), Some(secure))
                }
                None => (entry, None),
            };

            let (start, end) = match ports.split_once('-') {
                Some((a, b)) => {
                    let start = parse_port_str(a.trim())
                        .with_context(|| format!("line {line_no}: invalid start in range: {a}"))?;
                    let end = parse_port_str(b.trim())
                        .with_context(|| format!("line {line_no}: invalid end in range: {b}"))?;
                    if start > end {
                        bail!("line {line_no}: invalid range {start}-{end} (start > end)");
                    }
                    (start, end)
                }
                None => {
                    let p = parse_port_str(ports)
                        .with_context(|| format!("line {line_no}: invalid port value: {ports}"))?;
                    (p, p)
                }
            };

            for p in start..=end {
                if seen.insert(p) {
                    let secure = scheme.unwrap_or_else(|| guess_secure(p));
                    out.push(PortSpec::new(p, secure));
                }
            }
        }
    }

    Ok(out)
}

/// Load a port table from a file path. Errors if the file cannot be read or parsed.
pub fn load_port_table_from_path(path: impl AsRef<Path>) -> Result<Vec<PortSpec>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    parse_port_table_str(&content)
}

fn guess_secure(port: u16) -> bool {
    matches!(port, 443 | 8443)
}

fn parse_scheme(s: &str) -> Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "http" => Ok(false),
        "https" => Ok(true),
        other => bail!("unknown scheme: {other}"),
    }
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
