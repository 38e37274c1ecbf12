//! Directions API client
//!
//! POST `{base_url}/v2/directions/{profile}/geojson` with
//! `{"coordinates": [[lon, lat], [lon, lat]]}` and the API key in the
//! `Authorization` header. Non-2xx answers carry `{"error": {"code", "message"}}`
//! when the service produced them; anything else is reported with its raw body.

use crate::domain::route::{RoutePayloadError, RouteResult};
use crate::domain::types::RouteRequest;
use crate::infra::Config;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DirectionsError {
    #[error("directions request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to encode directions request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("directions API error (code {code}): {message}")]
    Api { code: u32, message: String },
    #[error("directions API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Payload(#[from] RoutePayloadError),
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: u32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: ErrorDetail,
}

/// Map a non-success answer to the most specific error available
fn error_from_response(status: u16, body: String) -> DirectionsError {
    match serde_json::from_str::<ErrorPayload>(&body) {
        Ok(payload) => {
            DirectionsError::Api { code: payload.error.code, message: payload.error.message }
        }
        Err(_) => DirectionsError::Status { status, body },
    }
}

/// Request body for one origin/destination pair
fn request_body(request: &RouteRequest) -> serde_json::Value {
    json!({ "coordinates": [request.origin.lon_lat(), request.destination.lon_lat()] })
}

#[async_trait]
pub trait DirectionsClient: Send + Sync {
    async fn fetch_route(&self, request: &RouteRequest) -> Result<RouteResult, DirectionsError>;
}

/// openrouteservice-compatible HTTP client
pub struct OrsDirectionsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OrsDirectionsClient {
    pub fn new(config: &Config) -> Result<Self, DirectionsError> {
        let client = reqwest::Client::builder().timeout(config.directions_timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.directions_base_url().trim_end_matches('/').to_string(),
            api_key: config.directions_api_key().to_string(),
        })
    }

    fn url(&self, request: &RouteRequest) -> String {
        format!("{}/v2/directions/{}/geojson", self.base_url, request.profile.as_str())
    }
}

#[async_trait]
impl DirectionsClient for OrsDirectionsClient {
    async fn fetch_route(&self, request: &RouteRequest) -> Result<RouteResult, DirectionsError> {
        let url = self.url(request);
        let body = serde_json::to_vec(&request_body(request))?;
        debug!(
            url = %url,
            origin = %request.origin,
            destination = %request.destination,
            "directions_request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.api_key)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(error_from_response(status.as_u16(), text));
        }

        Ok(RouteResult::from_body(&text)?)
    }
}
