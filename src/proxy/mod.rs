//! Rate-limited reverse proxy.
//!
//! Each inbound request waits on the proxy's [`Pacer`] before it is routed
//! and forwarded, so the combined upstream rate stays at or below the
//! configured rate. Rate 0 forwards without waiting.
mod forward;
mod server;
mod wire;


use std::cmp::Reverse;

use async_trait::async_trait;
use reqwest::{Client, redirect};
use tracing::debug;

use crate::error::HttpError;
use crate::rate::{Pacer, Rate};

use forward::Upstream;

pub use server::ProxyServer;
pub use wire::{ProxyRequest, ProxyResponse};

/// Answers one proxied request.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: ProxyRequest) -> ProxyResponse;
}

fn proxy_client() -> Result<Client, HttpError> {
    Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .map_err(|err| HttpError::BuildClientFailed { source: err })
}

/// Forwards everything to one upstream.
#[derive(Debug)]
pub struct SingleHostProxy {
    pacer: Pacer,
    upstream: Upstream,
}

impl SingleHostProxy {
    /// # Errors
    ///
    /// Returns an error when `target` is not an absolute URL with a host or
    /// the HTTP client cannot be built.
    pub fn new(rate: Rate, target: &str) -> Result<Self, HttpError> {
        Self::with_client(rate, target, proxy_client()?)
    }

    /// # Errors
    ///
    /// Returns an error when `target` is not an absolute URL with a host.
    pub fn with_client(rate: Rate, target: &str, client: Client) -> Result<Self, HttpError> {
        Ok(Self {
            pacer: Pacer::new(rate),
            upstream: Upstream::parse(target, client)?,
        })
    }
}

#[async_trait]
impl Handler for SingleHostProxy {
    async fn handle(&self, request: ProxyRequest) -> ProxyResponse {
        self.pacer.admit().await;
        let path = request.path().to_owned();
        self.upstream.forward(request, &path).await
    }
}

#[derive(Debug)]
struct Route {
    prefix: String,
    upstream: Upstream,
}

/// Routes `/<host[:port]>/...` to the matching upstream.
///
/// The route prefix is stripped before forwarding. All routes share one
/// pacer, so the rate applies to the proxy as a whole.
#[derive(Debug)]
pub struct MultiHostProxy {
    pacer: Pacer,
    client: Client,
    routes: Vec<Route>,
}

impl MultiHostProxy {
    /// Registers one route per target, keyed by the target's authority.
    ///
    /// # Errors
    ///
    /// Returns an error when a target is not an absolute URL with a host or
    /// the HTTP client cannot be built.
    pub fn new<I, S>(rate: Rate, targets: I) -> Result<Self, HttpError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut proxy = Self {
            pacer: Pacer::new(rate),
            client: proxy_client()?,
            routes: Vec::new(),
        };
        for target in targets {
            let upstream = Upstream::parse(target.as_ref(), proxy.client.clone())?;
            let prefix = format!("/{}", upstream.authority());
            proxy.insert(prefix, upstream);
        }
        Ok(proxy)
    }

    /// Adds or replaces a route under a custom path prefix.
    ///
    /// # Errors
    ///
    /// Returns an error when `target` is not an absolute URL with a host.
    pub fn route(mut self, prefix: &str, target: &str) -> Result<Self, HttpError> {
        let upstream = Upstream::parse(target, self.client.clone())?;
        let prefix = format!("/{}", prefix.trim_matches('/'));
        self.insert(prefix, upstream);
        Ok(self)
    }

    /// Registered prefixes, longest first.
    #[must_use]
    pub fn prefixes(&self) -> Vec<&str> {
        self.routes.iter().map(|route| route.prefix.as_str()).collect()
    }

    fn insert(&mut self, prefix: String, upstream: Upstream) {
        debug!(%prefix, target = %upstream.base(), "Registering proxy route");
        self.routes.retain(|route| route.prefix != prefix);
        self.routes.push(Route { prefix, upstream });
        self.routes
            .sort_by_key(|route| Reverse(route.prefix.len()));
    }

    /// Upstream and remaining path for `path`.
    fn resolve<'req>(&self, path: &'req str) -> Option<(&Upstream, &'req str)> {
        self.routes.iter().find_map(|route| {
            if route.prefix == "/" {
                return Some((&route.upstream, path));
            }
            let rest = path.strip_prefix(route.prefix.as_str())?;
            if rest.is_empty() {
                Some((&route.upstream, "/"))
            } else if rest.starts_with('/') {
                Some((&route.upstream, rest))
            } else {
                None
            }
        })
    }
}

#[async_trait]
impl Handler for MultiHostProxy {
    async fn handle(&self, request: ProxyRequest) -> ProxyResponse {
        self.pacer.admit().await;
        let path = request.path().to_owned();
        match self.resolve(&path) {
            Some((upstream, rest)) => upstream.forward(request, rest).await,
            None => {
                debug!(%path, "No proxy route");
                ProxyResponse::error(404, "Not Found")
            }
        }
    }
}
