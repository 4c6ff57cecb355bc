//! Places provider HTTP client.
//!
//! Wraps the two calls the search layer makes: autocomplete (many per session)
//! and details (one, terminating the session). The orchestrator talks to the
//! [`PlacesApi`] trait so it can be exercised without the network.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::PlacesConfig;
use crate::constants;
use crate::domain::{PlaceId, SessionId};
use crate::models::{BoundingBox, GeoPoint, Suggestion};

#[derive(Debug, Error)]
pub enum PlacesError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Places API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed response body: {0}")]
    Decode(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Provider-level outcome reported inside a 200 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PlacesStatus {
    Ok,
    ZeroResults,
    OverQueryLimit,
    RequestDenied,
    InvalidRequest,
    NotFound,
    UnknownError,
    Other(String),
}

impl PlacesStatus {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Statuses that mean the integration itself is broken (key, quota) rather
    /// than the query having no matches.
    #[must_use]
    pub const fn needs_operator(&self) -> bool {
        matches!(self, Self::OverQueryLimit | Self::RequestDenied)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ok => "OK",
            Self::ZeroResults => "ZERO_RESULTS",
            Self::OverQueryLimit => "OVER_QUERY_LIMIT",
            Self::RequestDenied => "REQUEST_DENIED",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for PlacesStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "OK" => Self::Ok,
            "ZERO_RESULTS" => Self::ZeroResults,
            "OVER_QUERY_LIMIT" => Self::OverQueryLimit,
            "REQUEST_DENIED" => Self::RequestDenied,
            "INVALID_REQUEST" => Self::InvalidRequest,
            "NOT_FOUND" => Self::NotFound,
            "UNKNOWN_ERROR" => Self::UnknownError,
            _ => Self::Other(s),
        }
    }
}

impl From<PlacesStatus> for String {
    fn from(status: PlacesStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for PlacesStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location bias attached to an autocomplete request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocationBias {
    pub center: GeoPoint,
    pub radius_m: u32,
    pub bounds: BoundingBox,
    pub strict_bounds: bool,
}

impl LocationBias {
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn around(center: GeoPoint, radius_km: f64, strict_bounds: bool) -> Self {
        Self {
            center,
            radius_m: (radius_km * 1000.0).round() as u32,
            bounds: BoundingBox::around(center, radius_km),
            strict_bounds,
        }
    }
}

/// Everything an autocomplete request carries except the API key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutocompleteParams {
    pub input: String,
    pub language: String,
    pub types: Option<String>,
    pub location_bias: Option<LocationBias>,
    /// ISO 3166-1 alpha-2 code, sent as `components=country:xx`.
    pub country: Option<String>,
    pub session_token: Option<SessionId>,
}

impl AutocompleteParams {
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("input", self.input.clone()),
            ("language", self.language.clone()),
        ];

        if let Some(types) = &self.types {
            pairs.push(("types", types.clone()));
        }

        if let Some(bias) = &self.location_bias {
            pairs.push(("location", bias.center.to_param()));
            pairs.push(("radius", bias.radius_m.to_string()));
            pairs.push(("bounds", bias.bounds.to_param()));
            if bias.strict_bounds {
                pairs.push(("strictbounds", "true".to_string()));
            }
        }

        if let Some(token) = &self.session_token {
            pairs.push(("sessiontoken", token.to_string()));
        }

        if let Some(country) = &self.country {
            pairs.push(("components", format!("country:{country}")));
        }

        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailsParams {
    pub place_id: PlaceId,
    pub fields: String,
    pub session_token: Option<SessionId>,
}

impl DetailsParams {
    #[must_use]
    pub fn new(place_id: PlaceId, session_token: Option<SessionId>) -> Self {
        Self {
            place_id,
            fields: constants::places::DETAILS_FIELDS.to_string(),
            session_token,
        }
    }

    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("place_id", self.place_id.to_string()),
            ("fields", self.fields.clone()),
        ];

        if let Some(token) = &self.session_token {
            pairs.push(("sessiontoken", token.to_string()));
        }

        pairs
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutocompleteResponse {
    pub status: PlacesStatus,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// The constructors below build canned responses for in-process
/// [`PlacesApi`] implementations such as test fakes; the HTTP client only
/// ever deserializes.
impl AutocompleteResponse {
    #[must_use]
    pub const fn ok(predictions: Vec<Prediction>) -> Self {
        Self {
            status: PlacesStatus::Ok,
            predictions,
            error_message: None,
        }
    }

    #[must_use]
    pub const fn with_status(status: PlacesStatus) -> Self {
        Self {
            status,
            predictions: Vec::new(),
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub description: String,
    pub place_id: String,
    #[serde(default)]
    pub structured_formatting: StructuredFormatting,
}

impl Prediction {
    /// Builds a prediction for a canned [`AutocompleteResponse`].
    #[must_use]
    pub fn new(description: impl Into<String>, place_id: impl Into<String>) -> Self {
        let suggestion = Suggestion::new(description, PlaceId::new(place_id));

        Self {
            description: suggestion.description,
            place_id: suggestion.place_id.to_string(),
            structured_formatting: StructuredFormatting {
                main_text: suggestion.main_text,
                secondary_text: suggestion.secondary_text,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StructuredFormatting {
    #[serde(default)]
    pub main_text: String,
    #[serde(default)]
    pub secondary_text: String,
}

impl From<Prediction> for Suggestion {
    fn from(p: Prediction) -> Self {
        Self {
            description: p.description,
            place_id: PlaceId::from(p.place_id),
            main_text: p.structured_formatting.main_text,
            secondary_text: p.structured_formatting.secondary_text,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetailsResponse {
    pub status: PlacesStatus,
    #[serde(default)]
    pub result: Option<PlaceDetails>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Canned responses for in-process [`PlacesApi`] implementations.
impl DetailsResponse {
    #[must_use]
    pub fn ok(location: GeoPoint, formatted_address: impl Into<String>) -> Self {
        Self {
            status: PlacesStatus::Ok,
            result: Some(PlaceDetails {
                geometry: Some(Geometry {
                    location: LatLng {
                        lat: location.latitude,
                        lng: location.longitude,
                    },
                }),
                formatted_address: Some(formatted_address.into()),
            }),
            error_message: None,
        }
    }

    #[must_use]
    pub const fn with_status(status: PlacesStatus) -> Self {
        Self {
            status,
            result: None,
            error_message: None,
        }
    }

    #[must_use]
    pub fn location(&self) -> Option<GeoPoint> {
        self.result
            .as_ref()
            .and_then(|r| r.geometry.as_ref())
            .map(|g| GeoPoint::new(g.location.lat, g.location.lng))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceDetails {
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub formatted_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// The two provider calls the search layer depends on.
#[async_trait::async_trait]
pub trait PlacesApi: Send + Sync {
    async fn autocomplete(
        &self,
        params: &AutocompleteParams,
    ) -> Result<AutocompleteResponse, PlacesError>;

    async fn details(&self, params: &DetailsParams) -> Result<DetailsResponse, PlacesError>;
}

#[derive(Clone)]
pub struct PlacesClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PlacesClient {
    pub fn new(config: &PlacesConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
            .user_agent(constants::places::USER_AGENT)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build places HTTP client: {e}"))?;

        Ok(Self::with_client(
            client,
            config.base_url.clone(),
            config.api_key.clone(),
        ))
    }

    #[must_use]
    pub const fn with_client(client: Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn endpoint(&self, path: &str, pairs: &[(&str, String)]) -> Result<Url, PlacesError> {
        let mut url = Url::parse(&format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path
        ))?;

        {
            let mut query = url.query_pairs_mut();
            for (key, value) in pairs {
                query.append_pair(key, value);
            }
            query.append_pair("key", &self.api_key);
        }

        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, PlacesError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PlacesError::Http { status, body });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PlacesError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl PlacesApi for PlacesClient {
    async fn autocomplete(
        &self,
        params: &AutocompleteParams,
    ) -> Result<AutocompleteResponse, PlacesError> {
        let url = self.endpoint("autocomplete/json", &params.query_pairs())?;
        debug!(input = %params.input, session = ?params.session_token, "Places autocomplete request");
        self.get_json(url).await
    }

    async fn details(&self, params: &DetailsParams) -> Result<DetailsResponse, PlacesError> {
        let url = self.endpoint("details/json", &params.query_pairs())?;
        debug!(place_id = %params.place_id, session = ?params.session_token, "Places details request");
        self.get_json(url).await
    }
}
