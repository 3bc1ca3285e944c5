// Geocoding collaborator - free-text address → coordinate

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Coordinate { lat, lng }
    }
}

/// Why an address could not be placed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeocodeError {
    /// Provider answered with a non-OK status (ZERO_RESULTS, OVER_QUERY_LIMIT, ...)
    #[error("{0}")]
    Status(String),

    #[error("request failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Coordinate, GeocodeError>;
}

/// Google Geocoding HTTP API
pub struct GoogleGeocoder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: Coordinate,
}

impl GoogleGeocoder {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;

        Ok(GoogleGeocoder {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<Coordinate, GeocodeError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(transport)?;

        let body: GeocodeResponse = response.json().await.map_err(transport)?;

        first_location(body)
    }
}

/// The request URL carries the API key, so it never reaches the error text
fn transport(e: reqwest::Error) -> GeocodeError {
    GeocodeError::Transport(e.without_url().to_string())
}

fn first_location(body: GeocodeResponse) -> Result<Coordinate, GeocodeError> {
    if body.status != "OK" {
        return Err(GeocodeError::Status(body.status));
    }

    body.results
        .into_iter()
        .next()
        .map(|r| r.geometry.location)
        .ok_or_else(|| GeocodeError::Status("ZERO_RESULTS".to_string()))
}
