use anyhow::{anyhow, bail, Context, Result};
use ipnet::{Ipv4AddrRange, Ipv4Net};
use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::RangeInclusive;
use std::path::Path;
use std::str::FromStr;

/// Sweep used when no targets are configured: every `23.96.X.Y` with X and Y in 1..=254.
pub const DEFAULT_TARGET: &str = "23.96.1-254.1-254";

/// A block of IPv4 addresses to sweep.
///
/// Accepted forms:
/// - a single address: `10.0.0.5`
/// - a CIDR: `10.0.0.0/24` (network and broadcast excluded below /31)
/// - an octet-range pattern, each component `N` or `A-B`: `23.96.1-254.1-254`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    Single(Ipv4Addr),
    Cidr(Ipv4Net),
    Octets([RangeInclusive<u8>; 4]),
}

impl TargetSpec {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("empty target expression");
        }
        if s.contains('/') {
            let net: Ipv4Net = s
                .parse()
                .map_err(|e| anyhow!("invalid CIDR {s}: {e}"))?;
            return Ok(TargetSpec::Cidr(net.trunc()));
        }
        if !s.contains('-') {
            let ip: Ipv4Addr = s.parse().map_err(|e| anyhow!("invalid IPv4 {s}: {e}"))?;
            return Ok(TargetSpec::Single(ip));
        }

        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 4 {
            bail!("octet range {s} must have four components");
        }
        let mut ranges: [RangeInclusive<u8>; 4] = [0..=0, 0..=0, 0..=0, 0..=0];
        for (slot, part) in ranges.iter_mut().zip(parts) {
            *slot = parse_octet_range(part).with_context(|| format!("invalid octet range in {s}"))?;
        }
        Ok(TargetSpec::Octets(ranges))
    }

    /// Number of host addresses this spec yields.
    pub fn len(&self) -> u64 {
        match self {
            TargetSpec::Single(_) => 1,
            TargetSpec::Cidr(net) => {
                let total = 1u64 << (32 - u32::from(net.prefix_len()));
                if net.prefix_len() >= 31 {
                    total
                } else {
                    total - 2
                }
            }
            TargetSpec::Octets(r) => r.iter().map(octet_span).product(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazily walk the addresses of this spec in ascending order, without repeats.
    pub fn hosts(&self) -> Hosts {
        match self {
            TargetSpec::Single(ip) => Hosts::Single(Some(*ip)),
            TargetSpec::Cidr(net) => Hosts::Cidr(net.hosts()),
            TargetSpec::Octets(r) => Hosts::Octets {
                ranges: r.clone(),
                next: 0,
                total: self.len(),
            },
        }
    }
}

impl FromStr for TargetSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        TargetSpec::parse(s)
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSpec::Single(ip) => write!(f, "{ip}"),
            TargetSpec::Cidr(net) => write!(f, "{net}"),
            TargetSpec::Octets(r) => {
                let parts: Vec<String> = r
                    .iter()
                    .map(|o| {
                        if o.start() == o.end() {
                            o.start().to_string()
                        } else {
                            format!("{}-{}", o.start(), o.end())
                        }
                    })
                    .collect();
                f.write_str(&parts.join("."))
            }
        }
    }
}

/// Iterator over the addresses of a single [`TargetSpec`].
#[derive(Debug, Clone)]
pub enum Hosts {
    Single(Option<Ipv4Addr>),
    Cidr(Ipv4AddrRange),
    Octets {
        ranges: [RangeInclusive<u8>; 4],
        next: u64,
        total: u64,
    },
}

impl Iterator for Hosts {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        match self {
            Hosts::Single(ip) => ip.take(),
            Hosts::Cidr(range) => range.next(),
            Hosts::Octets { ranges, next, total } => {
                if *next >= *total {
                    return None;
                }
                // mixed-radix decode, last octet varies fastest
                let mut rem = *next;
                let mut octets = [0u8; 4];
                for i in (0..4).rev() {
                    let span = octet_span(&ranges[i]);
                    octets[i] = *ranges[i].start() + (rem % span) as u8;
                    rem /= span;
                }
                *next += 1;
                Some(Ipv4Addr::from(octets))
            }
        }
    }
}

/// Chain several specs into one lazy host sequence, in the order given.
pub fn enumerate(specs: &[TargetSpec]) -> impl Iterator<Item = IpAddr> + Send + 'static {
    let specs = specs.to_vec();
    specs.into_iter().flat_map(|s| s.hosts()).map(IpAddr::V4)
}

/// Total number of hosts the given specs will yield.
pub fn total_hosts(specs: &[TargetSpec]) -> u64 {
    specs.iter().map(TargetSpec::len).sum()
}

/// Parse target expressions, one per line. Blank lines and `#` comments are ignored.
pub fn parse_targets_str(s: &str) -> Result<Vec<TargetSpec>> {
    let mut out = Vec::new();
    for (idx, raw_line) in s.lines().enumerate() {
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }
        let spec = TargetSpec::parse(line).with_context(|| format!("line {}", idx + 1))?;
        out.push(spec);
    }
    Ok(out)
}

pub fn load_targets_from_path(path: impl AsRef<Path>) -> Result<Vec<TargetSpec>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read targets file: {}", path.as_ref().display()))?;
    parse_targets_str(&content)
}

fn octet_span(r: &RangeInclusive<u8>) -> u64 {
    u64::from(*r.end()) - u64::from(*r.start()) + 1
}

fn parse_octet_range(s: &str) -> Result<RangeInclusive<u8>> {
    let s = s.trim();
    let (a, b) = s.split_once('-').unwrap_or((s, s));
    let start: u8 = a.trim().parse().map_err(|e| anyhow!("{a}: {e}"))?;
    let end: u8 = b.trim().parse().map_err(|e| anyhow!("{b}: {e}"))?;
    if start > end {
        bail!("range {start}-{end} has start > end");
    }
    Ok(start..=end)
}
