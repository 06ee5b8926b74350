//! Google Places API (New) client

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::{PlaceLookupOracle, PlaceMatch, check_status, http_client, require_key};
use crate::config::PlacesConfig;
use crate::models::{Coordinates, PriceLevel};
use crate::{CompanionError, Result};

const SEARCH_FIELDS: &str = "places.id,places.displayName,places.formattedAddress,places.location,\
places.rating,places.priceLevel,places.currentOpeningHours,places.regularOpeningHours";

/// Largest location-bias radius the API accepts
const MAX_BIAS_RADIUS_M: f64 = 50_000.0;

pub struct PlacesClient {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
}

impl PlacesClient {
    pub fn new(config: &PlacesConfig) -> Result<Self> {
        let api_key = require_key(config.api_key.as_deref(), "places.api_key")?;
        Ok(Self {
            client: http_client(config.timeout(), config.max_retries)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn details(&self, place_id: &str, field_mask: &str) -> Result<PlaceDetails> {
        let url = format!("{}/places/{}", self.base_url, urlencoding::encode(place_id));
        let response = self
            .client
            .get(url)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", field_mask)
            .send()
            .await?;
        let response = check_status(response, "Places API").await?;
        Ok(response.json().await?)
    }
}

fn search_body(name: &str, bias: Option<Coordinates>, radius_m: f64) -> serde_json::Value {
    let mut body = json!({
        "textQuery": name,
        "maxResultCount": 1,
    });
    if let Some(center) = bias {
        body["locationBias"] = json!({
            "circle": {
                "center": {"latitude": center.latitude, "longitude": center.longitude},
                "radius": radius_m.clamp(0.0, MAX_BIAS_RADIUS_M),
            }
        });
    }
    body
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    places: Vec<PlaceResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceResponse {
    id: String,
    #[serde(default)]
    display_name: Option<LocalizedText>,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    location: Option<LatLng>,
    #[serde(default)]
    rating: Option<f32>,
    #[serde(default)]
    price_level: Option<String>,
    #[serde(default)]
    current_opening_hours: Option<OpeningHours>,
    #[serde(default)]
    regular_opening_hours: Option<OpeningHours>,
}

#[derive(Debug, Deserialize)]
struct LocalizedText {
    text: String,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpeningHours {
    #[serde(default)]
    open_now: Option<bool>,
    #[serde(default)]
    weekday_descriptions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceDetails {
    #[serde(default)]
    photos: Vec<Photo>,
    #[serde(default)]
    user_rating_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    name: String,
}

fn price_level(level: &str) -> Option<PriceLevel> {
    let value = match level {
        "PRICE_LEVEL_INEXPENSIVE" => 1,
        "PRICE_LEVEL_MODERATE" => 2,
        "PRICE_LEVEL_EXPENSIVE" => 3,
        "PRICE_LEVEL_VERY_EXPENSIVE" => 4,
        _ => return None,
    };
    PriceLevel::new(value)
}

/// A result without a usable location cannot ground a recommendation
fn into_match(place: PlaceResponse, queried: &str) -> Option<PlaceMatch> {
    let location = place.location?;
    let coordinates = Coordinates::new(location.latitude, location.longitude);
    if !coordinates.is_valid() {
        return None;
    }

    let open_now = place
        .current_opening_hours
        .as_ref()
        .and_then(|hours| hours.open_now);
    let hours = place
        .current_opening_hours
        .iter()
        .chain(place.regular_opening_hours.iter())
        .map(|hours| &hours.weekday_descriptions)
        .find(|days| !days.is_empty())
        .map(|days| days.join("; "));

    Some(PlaceMatch {
        place_id: place.id,
        name: place
            .display_name
            .map(|n| n.text)
            .unwrap_or_else(|| queried.to_string()),
        address: place.formatted_address.unwrap_or_default(),
        coordinates,
        open_now,
        rating: place.rating,
        price_level: place.price_level.as_deref().and_then(price_level),
        hours,
    })
}

#[async_trait]
impl PlaceLookupOracle for PlacesClient {
    #[instrument(skip(self))]
    async fn find_place(
        &self,
        name: &str,
        bias: Option<Coordinates>,
        radius_m: f64,
    ) -> Result<Option<PlaceMatch>> {
        let body = serde_json::to_vec(&search_body(name, bias, radius_m))
            .map_err(|e| CompanionError::general(format!("Failed to encode place search: {e}")))?;

        debug!("Calling the places API");
        let response = self
            .client
            .post(format!("{}/places:searchText", self.base_url))
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", SEARCH_FIELDS)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let response = check_status(response, "Places API").await?;
        let result: SearchResponse = response.json().await?;

        Ok(result
            .places
            .into_iter()
            .next()
            .and_then(|place| into_match(place, name)))
    }

    /// Photo resource names; the media URL is built by whoever renders them
    async fn photos(&self, place_id: &str, limit: usize) -> Result<Vec<String>> {
        let details = self.details(place_id, "photos").await?;
        Ok(details
            .photos
            .into_iter()
            .take(limit)
            .map(|photo| photo.name)
            .collect())
    }

    async fn review_count(&self, place_id: &str) -> Result<u32> {
        self.details(place_id, "userRatingCount")
            .await?
            .user_rating_count
            .ok_or_else(|| CompanionError::not_found(format!("no review count for {place_id}")))
    }
}
