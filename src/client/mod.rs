//! Paced HTTP client and paced tasks.
//!
//! Every call made through one [`PacedClient`] (or any of its clones) waits
//! on the same [`Pacer`], so the combined request rate of all callers stays
//! at or below the configured rate. Rate 0 makes the client a plain
//! `reqwest::Client`.
use std::future::Future;
use std::sync::Arc;

use reqwest::{Client, IntoUrl, Method, Request, Response};
use serde::Serialize;

use crate::error::HttpError;
use crate::rate::{Pacer, Rate};


#[derive(Debug, Clone)]
pub struct PacedClient {
    client: Client,
    pacer: Arc<Pacer>,
}

impl PacedClient {
    /// Builds a client with default `reqwest` settings.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::BuildClientFailed` when the TLS backend cannot be
    /// initialized.
    pub fn new(rate: Rate) -> Result<Self, HttpError> {
        let client = Client::builder()
            .build()
            .map_err(|err| HttpError::BuildClientFailed { source: err })?;
        Ok(Self::with_client(client, rate))
    }

    #[must_use]
    pub fn with_client(client: Client, rate: Rate) -> Self {
        Self {
            client,
            pacer: Arc::new(Pacer::new(rate)),
        }
    }

    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn is_paced(&self) -> bool {
        !self.pacer.is_unlimited()
    }

    /// Waits for a slot, then sends `request`.
    ///
    /// # Errors
    ///
    /// Returns the transport error reported by `reqwest`.
    pub async fn execute(&self, request: Request) -> Result<Response, reqwest::Error> {
        self.pacer.admit().await;
        self.client.execute(request).await
    }

    /// # Errors
    ///
    /// Returns an error when the URL is invalid or the request fails.
    pub async fn get<U: IntoUrl>(&self, url: U) -> Result<Response, reqwest::Error> {
        let request = self.client.get(url).build()?;
        self.execute(request).await
    }

    /// # Errors
    ///
    /// Returns an error when the URL is invalid or the request fails.
    pub async fn head<U: IntoUrl>(&self, url: U) -> Result<Response, reqwest::Error> {
        let request = self.client.request(Method::HEAD, url).build()?;
        self.execute(request).await
    }

    /// Posts `body` with the given content type.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL or content type is invalid or the
    /// request fails.
    pub async fn post<U, B>(
        &self,
        url: U,
        content_type: &str,
        body: B,
    ) -> Result<Response, reqwest::Error>
    where
        U: IntoUrl,
        B: Into<reqwest::Body>,
    {
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .build()?;
        self.execute(request).await
    }

    /// Posts `form` url-encoded.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is invalid, `form` cannot be encoded,
    /// or the request fails.
    pub async fn post_form<U, T>(&self, url: U, form: &T) -> Result<Response, reqwest::Error>
    where
        U: IntoUrl,
        T: Serialize + ?Sized,
    {
        let request = self.client.post(url).form(form).build()?;
        self.execute(request).await
    }
}

/// Runs a caller-supplied async task no faster than the configured rate.
pub struct PacedTask<F> {
    pacer: Pacer,
    task: F,
}

impl<F, Fut> PacedTask<F>
where
    F: Fn() -> Fut,
    Fut: Future,
{
    #[must_use]
    pub fn new(rate: Rate, task: F) -> Self {
        Self {
            pacer: Pacer::new(rate),
            task,
        }
    }

    /// Waits for a slot, then runs the task once.
    pub async fn run_once(&self) -> Fut::Output {
        self.pacer.admit().await;
        (self.task)().await
    }
}
