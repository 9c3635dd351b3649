use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{HeaderName, HeaderValue};
use tracing::{debug, error};
use url::Url;

use crate::error::HttpError;

use super::wire::{ProxyRequest, ProxyResponse};

/// Connection-scoped headers that must not be forwarded in either direction.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP
        .iter()
        .any(|hop| name.eq_ignore_ascii_case(hop))
}

/// Forwarding target: every request path is appended to `base`'s path.
#[derive(Debug, Clone)]
pub(crate) struct Upstream {
    base: Url,
    client: Client,
}

impl Upstream {
    pub(crate) fn parse(target: &str, client: Client) -> Result<Self, HttpError> {
        let base = Url::parse(target).map_err(|err| HttpError::InvalidUrl {
            url: target.to_owned(),
            source: err,
        })?;
        if base.host_str().is_none() {
            return Err(HttpError::TargetMissingHost {
                url: target.to_owned(),
            });
        }
        Ok(Self { base, client })
    }

    /// `host[:port]` of the target, as used for multi-host routing.
    pub(crate) fn authority(&self) -> String {
        let host = self.base.host_str().unwrap_or_default();
        match self.base.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_owned(),
        }
    }

    pub(crate) const fn base(&self) -> &Url {
        &self.base
    }

    /// URL for a request with `path` and `query` on this upstream.
    pub(crate) fn url_for(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.base.clone();
        let joined = join_paths(self.base.path(), path);
        url.set_path(&joined);
        let merged = match (self.base.query().filter(|q| !q.is_empty()), query) {
            (Some(base), Some(extra)) if !extra.is_empty() => Some(format!("{}&{}", base, extra)),
            (Some(base), _) => Some(base.to_owned()),
            (None, Some(extra)) if !extra.is_empty() => Some(extra.to_owned()),
            (None, _) => None,
        };
        url.set_query(merged.as_deref());
        url
    }

    /// Sends `request` upstream with `path` in place of its own path.
    /// Transport failures become a 502 response.
    pub(crate) async fn forward(&self, request: ProxyRequest, path: &str) -> ProxyResponse {
        let url = self.url_for(path, request.query());
        debug!(method = %request.method, %url, "Forwarding request");

        let mut builder = self.client.request(request.method.clone(), url);
        for (key, value) in &request.headers {
            if is_hop_by_hop(key)
                || key.eq_ignore_ascii_case("host")
                || key.eq_ignore_ascii_case("content-length")
                || key.eq_ignore_ascii_case("x-forwarded-for")
            {
                continue;
            }
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                continue;
            };
            builder = builder.header(name, value);
        }
        if let Some(forwarded_for) = forwarded_for(&request) {
            builder = builder.header("X-Forwarded-For", forwarded_for);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                error!("Upstream request to {} failed: {}", self.base, err);
                return ProxyResponse::error(502, "Bad Gateway");
            }
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect();
        match read_body(response).await {
            Ok(body) => ProxyResponse {
                status,
                headers,
                body,
            },
            Err(err) => {
                error!("Failed to read upstream response from {}: {}", self.base, err);
                ProxyResponse::error(502, "Bad Gateway")
            }
        }
    }
}

async fn read_body(response: reqwest::Response) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }
    Ok(body)
}

fn forwarded_for(request: &ProxyRequest) -> Option<String> {
    let client_ip = request.peer.map(|peer| peer.ip().to_string());
    match (request.header("x-forwarded-for"), client_ip) {
        (Some(prior), Some(ip)) => Some(format!("{}, {}", prior, ip)),
        (Some(prior), None) => Some(prior.to_owned()),
        (None, ip) => ip,
    }
}

/// Joins two paths with exactly one slash between them.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, path.trim_start_matches('/')),
        (false, false) => format!("{}/{}", base, path),
        (true, false) | (false, true) => format!("{}{}", base, path),
    }
}
