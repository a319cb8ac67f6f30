//! REST client for the station observations endpoint.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::FetchError;
use crate::fallback::ObservationSource;
use crate::observation::{decode_rest_body, Observation};

/// Default REST API base URL.
pub const DEFAULT_REST_BASE_URL: &str = "https://swd.weatherflow.com/swd/rest";

/// Largest response body accepted (1 MiB).
const MAX_RESPONSE_BYTES: usize = 1 << 20;

/// How much of an error response body is kept in the error message.
const MAX_ERROR_BODY_BYTES: usize = 512;

/// Fetches the latest observation for one station.
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    station_id: String,
    token: String,
}

impl RestClient {
    /// Build a client with the given per-request timeout.
    pub fn new(
        base_url: &str,
        station_id: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()
            .map_err(|e| FetchError::request(e, token))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            station_id: station_id.to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/observations/station/{}?token={}",
            self.base_url, self.station_id, self.token
        )
    }

    /// GET the station observations and decode the first one.
    pub async fn fetch_observation(&self) -> Result<Observation, FetchError> {
        let mut response = self
            .client
            .get(self.url())
            .send()
            .await
            .map_err(|e| FetchError::request(e, &self.token))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = self.read_prefix(&mut response, MAX_ERROR_BODY_BYTES).await;
            return Err(FetchError::status(
                status.as_u16(),
                &String::from_utf8_lossy(&body),
                &self.token,
            ));
        }

        let body = self.read_body(&mut response, MAX_RESPONSE_BYTES).await?;
        Ok(decode_rest_body(&body)?)
    }

    /// Read the whole body, failing if it exceeds `limit` bytes.
    async fn read_body(
        &self,
        response: &mut reqwest::Response,
        limit: usize,
    ) -> Result<Vec<u8>, FetchError> {
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(FetchError::TooLarge { limit });
        }
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::request(e, &self.token))?
        {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    /// Read at most `limit` bytes of the body, ignoring read errors.
    async fn read_prefix(&self, response: &mut reqwest::Response, limit: usize) -> Vec<u8> {
        let mut body = Vec::new();
        while body.len() < limit {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let take = chunk.len().min(limit - body.len());
                    body.extend_from_slice(&chunk[..take]);
                }
                _ => break,
            }
        }
        body
    }
}

#[async_trait]
impl ObservationSource for RestClient {
    async fn fetch(&self) -> Result<Observation, FetchError> {
        self.fetch_observation().await
    }
}
