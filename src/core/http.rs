//! Blocking HTTP downloads for artifacts and platform templates.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::error::{Error, Result};
use crate::services::{FetchAuth, FetchOutcome, Fetcher};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reads the whole response body; 404 is reported as `NotFound`, any other
/// non-success status as an error.
pub struct HttpFetcher {
    client: Option<Client>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(format!("transtats-jobs/{}", VERSION))
            .timeout(Duration::from_secs(300))
            .build()
            .ok();
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, auth: &FetchAuth) -> Result<FetchOutcome> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::http_request_failed(url, "HTTP client could not be created"))?;

        let mut request = client.get(url);
        if let Some((user, password)) = &auth.basic {
            request = request.basic_auth(user, Some(password));
        }
        for (name, value) in &auth.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .map_err(|e| Error::http_request_failed(url, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::NotFound);
        }
        if !status.is_success() {
            return Err(Error::http_request_failed(
                url,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let body = response
            .bytes()
            .map_err(|e| Error::http_request_failed(url, e.to_string()))?;
        Ok(FetchOutcome::Found(body.to_vec()))
    }
}
