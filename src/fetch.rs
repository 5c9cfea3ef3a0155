//! HTTP(S) retrieval and lightweight HTML metadata extraction for reachable web ports.

use anyhow::{Context, Result};
use reqwest::{redirect::Policy, Client, Response};
use scraper::{Html, Selector};
use std::net::{IpAddr, SocketAddr};
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::ProbeFailure;
use crate::probe::TcpProber;
use crate::types::{PortResult, PortSpec};

pub const DEFAULT_USER_AGENT: &str = concat!("web-sweep-rs/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// How to treat a response body that cannot be decoded as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Decode lossily; missing title or body yields empty strings.
    #[default]
    Lenient,
    /// A body that is not valid UTF-8 fails the probe with a parse error.
    Strict,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Overall bound for the GET, body included.
    pub timeout: Duration,
    /// Skip certificate and hostname validation on https ports.
    pub accept_invalid_certs: bool,
    pub user_agent: String,
    pub max_body_bytes: usize,
    /// Redirects followed from `/`; 0 reports the redirect response itself.
    pub max_redirects: usize,
    pub parse_mode: ParseMode,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            accept_invalid_certs: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            parse_mode: ParseMode::Lenient,
        }
    }
}

/// Fetches `/` from a web port after a successful TCP probe and extracts page metadata.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    prober: TcpProber,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig, prober: TcpProber) -> Result<Self> {
        let redirects = match config.max_redirects {
            0 => Policy::none(),
            n => Policy::limited(n),
        };
        let client = Client::builder()
            .redirect(redirects)
            .no_proxy()
            .timeout(config.timeout)
            .connect_timeout(prober.timeout())
            .user_agent(config.user_agent.clone())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .danger_accept_invalid_hostnames(config.accept_invalid_certs)
            .gzip(true)
            .deflate(true)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            prober,
            config,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Probe `ip:port`, then GET `scheme://ip:port/` and extract title, body summary and status.
    /// Redirects are followed up to `max_redirects`; the final response is the one reported.
    pub async fn fetch(&self, ip: IpAddr, spec: PortSpec) -> Result<PortResult, ProbeFailure> {
        let port = spec.port;
        if !self.prober.probe(ip, port).await {
            return Err(ProbeFailure::PortClosed { host: ip, port });
        }

        let url = format!("{}://{}/", spec.scheme(), SocketAddr::new(ip, port));
        let fetch_err = |source| ProbeFailure::Fetch {
            host: ip,
            port,
            source,
        };
        let resp = self.client.get(&url).send().await.map_err(fetch_err)?;
        let code = resp.status().as_u16();
        let (bytes, truncated) = read_body(resp, self.config.max_body_bytes)
            .await
            .map_err(fetch_err)?;

        let text = match decode_body(&bytes, truncated, self.config.parse_mode) {
            Ok(t) => t,
            Err(reason) => {
                return Err(ProbeFailure::Parse {
                    host: ip,
                    port,
                    reason,
                })
            }
        };
        let page = extract_page(&text);

        Ok(PortResult {
            port,
            protocol: spec.scheme().to_string(),
            code,
            title: page.title,
            body_summary: page.body_summary,
        })
    }
}

/// Read the body chunk by chunk, stopping once `limit` bytes are buffered.
async fn read_body(mut resp: Response, limit: usize) -> Result<(Vec<u8>, bool), reqwest::Error> {
    let mut buf = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        let room = limit.saturating_sub(buf.len());
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, false))
}

fn decode_body(bytes: &[u8], truncated: bool, mode: ParseMode) -> std::result::Result<String, String> {
    match mode {
        ParseMode::Lenient => Ok(String::from_utf8_lossy(bytes).into_owned()),
        ParseMode::Strict => match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_string()),
            // a multi-byte sequence cut by the body limit is not a decoding failure
            Err(e) if truncated && e.error_len().is_none() => {
                Ok(String::from_utf8_lossy(&bytes[..e.valid_up_to()]).into_owned())
            }
            Err(e) => Err(format!("body is not valid UTF-8: {e}")),
        },
    }
}

/// Title and normalized body text of one HTML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub title: String,
    pub body_summary: String,
}

pub fn extract_page(html: &str) -> PageInfo {
    let doc = Html::parse_document(html);
    PageInfo {
        title: extract_title(&doc),
        body_summary: extract_body_text(&doc),
    }
}

/// Text of the first `<title>`, trimmed; empty when absent.
pub fn extract_title(doc: &Html) -> String {
    doc.select(title_selector())
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Normalized text of the first `<body>`; empty when absent.
pub fn extract_body_text(doc: &Html) -> String {
    doc.select(body_selector())
        .next()
        .map(|el| normalize_summary(&el.text().collect::<String>()))
        .unwrap_or_default()
}

/// Drop newlines and tabs and collapse every whitespace run to a single space.
/// Applying it twice gives the same string as applying it once.
pub fn normalize_summary(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn title_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("title").expect("static selector"))
}

fn body_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("body").expect("static selector"))
}
