//! Outbound proxy gateway.
//!
//! Backend URLs travel through the browser only in encoded form. Before a
//! request leaves the process the decoded URL must:
//! 1. parse as an `http`/`https` URL whose host is on the allow-list
//! 2. have every `{name}` placeholder filled from the caller's substitutions
//! 3. still resolve to an allowed host after substitution
//!
//! A request that fails any of these never reaches the transport. Redirects
//! are not followed, so a 3xx from an allowed host comes back as an upstream
//! error instead of leading somewhere unchecked.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
};
use reqwest::Method;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderValue, PRAGMA};
use reqwest::redirect::Policy;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use scanproof_common::ProxyError;

/// Caller-facing proxy request: an encoded target plus placeholder values
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub encoded_target: String,
    pub method: Method,
    pub substitutions: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

/// Fully resolved request handed to the transport
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Headers sent on every upstream call; responses must never be cached
pub fn outbound_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

/// Status and body text as received from upstream
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Successful upstream response
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

/// Sends a resolved request upstream
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<RawResponse, ProxyError>;
}

/// reqwest-backed transport
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<RawResponse, ProxyError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamUnreachable(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProxyError::UpstreamUnreachable(e.to_string()))?;

        Ok(RawResponse { status, body })
    }
}

/// Allow-listed, placeholder-aware forwarder
pub struct ProxyGateway {
    transport: Arc<dyn UpstreamTransport>,
    allowed_hosts: HashSet<String>,
    timeout: Duration,
}

impl ProxyGateway {
    pub fn new<I, S>(transport: Arc<dyn UpstreamTransport>, allowed_hosts: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_hosts = allowed_hosts
            .into_iter()
            .map(|h| h.as_ref().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();

        Self {
            transport,
            allowed_hosts,
            timeout,
        }
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        self.allowed_hosts.contains(&host.to_ascii_lowercase())
    }

    /// Decode and forward a caller-supplied request
    pub async fn forward(&self, request: ProxyRequest) -> Result<UpstreamResponse, ProxyError> {
        let template = decode_target(&request.encoded_target)?;
        self.forward_template(
            &template,
            request.method,
            &request.substitutions,
            request.body,
        )
        .await
    }

    /// Forward a plain (already decoded) URL template
    pub async fn forward_template(
        &self,
        template: &str,
        method: Method,
        substitutions: &BTreeMap<String, String>,
        body: Option<Vec<u8>>,
    ) -> Result<UpstreamResponse, ProxyError> {
        self.check_target(template)?;
        let resolved = substitute(template, substitutions)?;
        let url = self.check_target(&resolved)?;

        debug!(
            method = %method,
            host = url.host_str().unwrap_or_default(),
            "Forwarding upstream request"
        );

        let request = OutboundRequest {
            method,
            url,
            headers: outbound_headers(),
            body,
        };
        let raw = tokio::time::timeout(self.timeout, self.transport.send(request))
            .await
            .map_err(|_| {
                ProxyError::UpstreamUnreachable(format!(
                    "timed out after {}s",
                    self.timeout.as_secs_f32()
                ))
            })??;

        interpret(raw)
    }

    /// Parse `raw` and require an allowed http(s) host
    fn check_target(&self, raw: &str) -> Result<Url, ProxyError> {
        let url = Url::parse(raw)
            .map_err(|e| ProxyError::InvalidEncoding(format!("not a valid URL: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidEncoding(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| ProxyError::InvalidEncoding("URL has no host".to_string()))?;

        if !self.is_allowed(host) {
            warn!(host = %host, "Rejected proxy target outside the allow-list");
            return Err(ProxyError::HostNotAllowed(host.to_string()));
        }

        Ok(url)
    }
}

/// Decode a target that arrived base64- or percent-encoded
pub fn decode_target(encoded: &str) -> Result<String, ProxyError> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return Err(ProxyError::InvalidEncoding("url parameter is empty".to_string()));
    }

    let unescaped = urlencoding::decode(trimmed)
        .map_err(|_| ProxyError::InvalidEncoding("url is not valid percent-encoding".to_string()))?;

    if looks_like_url(&unescaped) {
        return Ok(unescaped.into_owned());
    }

    let b64 = unescaped.replace(' ', "+");
    let bytes = [STANDARD, URL_SAFE, STANDARD_NO_PAD, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(&b64).ok())
        .ok_or_else(|| ProxyError::InvalidEncoding("url is not valid base64".to_string()))?;

    String::from_utf8(bytes)
        .map_err(|_| ProxyError::InvalidEncoding("decoded url is not UTF-8".to_string()))
}

/// Base64 form of a backend URL, for the `url` query parameter
pub fn encode_target(url: &str) -> String {
    STANDARD.encode(url)
}

/// Public proxy link for a backend URL
pub fn proxied_link(public_path: &str, url: &str) -> String {
    format!(
        "{public_path}?url={}",
        urlencoding::encode(&encode_target(url))
    )
}

/// Replace every `{name}` with its percent-encoded value
///
/// Substitutions with no matching placeholder are ignored. A placeholder
/// with no substitution fails the whole request.
pub fn substitute(
    template: &str,
    substitutions: &BTreeMap<String, String>,
) -> Result<String, ProxyError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('}') {
            Some(end) if is_placeholder_name(&after[..end]) => {
                let name = &after[..end];
                let value = substitutions
                    .get(name)
                    .ok_or_else(|| ProxyError::MissingPlaceholderValue(name.to_string()))?;
                out.push_str(&urlencoding::encode(value));
                rest = &after[end + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

fn looks_like_url(text: &str) -> bool {
    let lower = text.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn interpret(raw: RawResponse) -> Result<UpstreamResponse, ProxyError> {
    if !(200..300).contains(&raw.status) {
        return Err(ProxyError::UpstreamError {
            status: raw.status,
            body: raw.body,
        });
    }

    if raw.body.trim().is_empty() {
        return Ok(UpstreamResponse {
            status: raw.status,
            body: Value::Null,
        });
    }

    let body = serde_json::from_str(&raw.body).map_err(|e| {
        ProxyError::UpstreamMalformedResponse(format!("body is not JSON: {e}"))
    })?;

    Ok(UpstreamResponse {
        status: raw.status,
        body,
    })
}
