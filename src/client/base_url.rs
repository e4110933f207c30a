//! Externally visible base URL resolution.
//!
//! Behind a reverse proxy the request's own scheme and host describe the hop
//! between proxy and host, not the URL the caller used. The origin is
//! resolved by the first rule in [`ORIGIN_RULES`] that produces one:
//!
//! 1. `Forwarded` (RFC 7239) with a `host` parameter
//! 2. `X-Forwarded-Host`, with `X-Forwarded-Proto` as scheme when present
//! 3. the request's own scheme and authority

use super::ClientError;

/// Read-only access to request headers. Lookups are by header name;
/// implementations over `http` types are case-insensitive.
pub trait HeaderLookup {
    fn header(&self, name: &str) -> Option<&str>;
}

/// An inbound request the host is answering.
pub trait InboundRequest: HeaderLookup + Sync {
    /// Scheme the request arrived with (`http` or `https`).
    fn scheme(&self) -> &str;
    /// `host[:port]` the request was addressed to.
    fn authority(&self) -> Option<&str>;
}

impl HeaderLookup for http::HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }
}

impl<B> HeaderLookup for http::Request<B> {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().header(name)
    }
}

impl<B: Sync> InboundRequest for http::Request<B> {
    fn scheme(&self) -> &str {
        self.uri().scheme_str().unwrap_or("http")
    }

    fn authority(&self) -> Option<&str> {
        self.uri()
            .authority()
            .map(|a| a.as_str())
            .or_else(|| self.headers().header("host"))
    }
}

/// Where management URIs are rooted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseUrl {
    /// Derived from an inbound request: `{origin}/runtime/webhooks/{extension}`.
    Webhook { origin: String, extension: String },
    /// Pre-configured at the client level, used verbatim.
    Configured(String),
}

impl BaseUrl {
    /// Prefix every instance URI starts with, ending in `/instances/`.
    pub fn instances_prefix(&self) -> String {
        match self {
            BaseUrl::Webhook { origin, extension } => {
                format!("{}/runtime/webhooks/{}/instances/", origin.trim_end_matches('/'), extension)
            }
            BaseUrl::Configured(base) => format!("{}/instances/", base.trim_end_matches('/')),
        }
    }
}

type OriginRule = fn(&dyn InboundRequest) -> Option<String>;

/// Ordered origin resolution rules; the first `Some` wins.
pub const ORIGIN_RULES: [OriginRule; 3] = [from_forwarded, from_x_forwarded, from_request];

/// Resolve `scheme://host[:port]` as seen by the original caller.
pub fn resolve_origin(request: &dyn InboundRequest) -> Result<String, ClientError> {
    ORIGIN_RULES
        .iter()
        .find_map(|rule| rule(request))
        .ok_or_else(|| ClientError::Configuration("inbound request carries no host".to_string()))
}

/// `Forwarded: for=1.2.3.4;proto=https;host=example.com, for=...`
///
/// Only the first element (the hop closest to the client) is considered.
/// Once it names a host the rule is final, with the request scheme standing
/// in for a missing `proto`.
pub fn from_forwarded(request: &dyn InboundRequest) -> Option<String> {
    let value = request.header("Forwarded")?;
    let element = value.split(',').next()?;

    let mut proto = None;
    let mut host = None;
    for pair in element.split(';') {
        let Some((key, val)) = pair.split_once('=') else {
            continue;
        };
        let val = val.trim().trim_matches('"');
        if val.is_empty() {
            continue;
        }
        match key.trim().to_ascii_lowercase().as_str() {
            "proto" => proto = Some(val),
            "host" => host = Some(val),
            _ => {}
        }
    }

    let host = host?;
    let proto = proto.unwrap_or_else(|| request.scheme());
    Some(format!("{proto}://{host}"))
}

/// `X-Forwarded-Host` (+ optional `X-Forwarded-Proto`).
///
/// Proxies chaining these headers append values; the first one is the
/// client-facing hop.
pub fn from_x_forwarded(request: &dyn InboundRequest) -> Option<String> {
    let proto = first_value(request.header("X-Forwarded-Proto")).unwrap_or_else(|| request.scheme());
    let host = first_value(request.header("X-Forwarded-Host"))?;
    Some(format!("{proto}://{host}"))
}

pub fn from_request(request: &dyn InboundRequest) -> Option<String> {
    let authority = request.authority()?;
    Some(format!("{}://{}", request.scheme(), authority))
}

fn first_value(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
