use async_trait::async_trait;

/// Performs one request. Requesters call it after their token is placed.
///
/// Implementations must be shareable across workers; the pipeline holds a
/// single executor behind an `Arc`.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn execute(&self, request: Self::Request) -> Result<Self::Response, Self::Error>;
}

#[async_trait]
impl Executor for reqwest::Client {
    type Request = reqwest::Request;
    type Response = reqwest::Response;
    type Error = reqwest::Error;

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, reqwest::Error> {
        reqwest::Client::execute(self, request).await
    }
}
