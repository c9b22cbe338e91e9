//! reqwest-backed transport for the portfolio API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, Url};
use serde_json::Value;
use tracing::trace;

use crate::application::error::FetchError;
use crate::application::ports::HttpTransport;

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err)
    }
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
    base: Url,
}

impl ReqwestTransport {
    pub fn new(base: &Url, timeout: Duration) -> Result<Self, FetchError> {
        let base = base.join("/")?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("atelier/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn url(&self, path: &str) -> Result<Url, FetchError> {
        Ok(self.base.join(path)?)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, FetchError> {
        let url = self.url(path)?;
        trace!(%method, %url, "Sending request");

        let mut req = self.client.request(method, url);
        if let Some(b) = body {
            req = req.json(&b);
        }

        let resp = req.send().await?;
        Self::handle(resp).await
    }

    async fn handle(resp: Response) -> Result<Value, FetchError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(FetchError::decode)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_json(&self, path: &str) -> Result<Value, FetchError> {
        self.request(Method::GET, path, None).await
    }

    async fn post_json(&self, path: &str, body: Option<Value>) -> Result<Value, FetchError> {
        self.request(Method::POST, path, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_resolve_against_site_root() {
        let base = Url::parse("https://example.com/portfolio/").expect("url");
        let transport = ReqwestTransport::new(&base, Duration::from_secs(1)).expect("transport");

        assert_eq!(
            transport.url("/api/designs/1/like").expect("url").as_str(),
            "https://example.com/api/designs/1/like"
        );
    }

    #[test]
    fn user_agent_names_the_crate() {
        assert!(ReqwestTransport::user_agent().starts_with("atelier/"));
    }
}
