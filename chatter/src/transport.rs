use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::{
    error::{ConfigError, Result, TransportError},
    models::config::ClientConfig,
};

pub const EVENT_STREAM: &str = "text/event-stream";
pub const APPLICATION_JSON: &str = "application/json";

/// POSTs JSON bodies to the API and hands back the response as soon as its
/// headers arrive. The body is left unread for the caller to stream.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    base_url: String,
    params: HashMap<String, String>,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let header_map = HeaderMap::try_from(&config.headers)
            .map_err(|err| ConfigError::Header(err.to_string()))?;
        let client = reqwest::Client::builder()
            .default_headers(header_map)
            .build()
            .map_err(TransportError::from)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            params: config.params.clone(),
            client,
        })
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    pub async fn post(
        &self,
        endpoint: &str,
        body: &Value,
        accept: &'static str,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        let url = self.url(endpoint);
        debug!("POST {url}");
        let response = self
            .client
            .post(url)
            .query(&self.params)
            .header(ACCEPT, HeaderValue::from_static(accept))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|err| format!("{err:?}"));
            Err(TransportError::Status { status, body })
        }
    }
}
