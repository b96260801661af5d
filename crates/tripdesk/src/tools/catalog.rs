//! The travel tool catalog: argument types and definitions for every
//! operation the assistant can call.
//!
//! Only [`SendReservationRequest`] runs in-process. The other operations
//! (user lookup, geocoding, hotel inventory, pricing) are backed by external
//! services; [`ToolDispatcher::with_travel_catalog`] registers them as
//! [`UnavailableTool`]s so the model sees the full catalog, and deployments
//! replace them with real backends through [`FnTool`](super::FnTool) or a
//! custom [`Tool`] implementation.

use super::core::{Tool, ToolDispatcher, ToolFuture, UnavailableTool, parse_tool_args};
use crate::{ToolDef, json_schema_for};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

pub const RESOLVE_USER_AND_TRIPS: &str = "resolve_user_and_trips";
pub const MAPBOX_SEARCH: &str = "mapbox_search";
pub const GET_HOTELS_BY_CORPORATE_GEO: &str = "get_hotels_by_corporate_geo";
pub const SEARCH_HOTELS: &str = "search_hotels";
pub const CHECK_AVAILABILITY: &str = "check_availability";
pub const GET_FULL_HOTEL_DETAILS: &str = "get_full_hotel_details";
pub const DISPLAY_FULL_HOTEL_DETAILS: &str = "display_full_hotel_details";
pub const DISPLAY_HOTEL_IMAGES: &str = "display_hotel_images";
pub const SEND_RESERVATION_REQUEST: &str = "send_reservation_request";

// ── Argument types ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResolveUserAndTripsArgs {
    pub email: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MapboxSearchArgs {
    /// A clear place name, POI, or address, e.g. 'Marriott Berlin' or 'Gare du Nord'.
    pub query: String,
    /// Optional 2-letter country code (e.g. 'FR', 'GB', 'US').
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(length(min = 2, max = 2))]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CorporateGeoArgs {
    /// The unique ID of the corporation.
    pub corporate_id: i64,
    /// Latitude of the destination.
    pub lat: f64,
    /// Longitude of the destination.
    pub long: f64,
    /// Search radius in meters.
    #[serde(default = "default_radius_meters")]
    pub radius_meters: f64,
}

fn default_radius_meters() -> f64 {
    7000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchHotelsArgs {
    /// Free-text description of hotel preferences, e.g. 'quiet modern hotel with a gym and breakfast'.
    pub preference_text: String,
    /// Geographic coordinates of the search center.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<Coordinates>,
    /// Search radius in kilometers around the location.
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
    /// Optional hotel chain filter (e.g. 'Hilton').
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    /// Minimum star rating (e.g. 4.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<f64>,
    /// Maximum number of hotels to return.
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_radius_km() -> f64 {
    10.0
}

fn default_limit() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckAvailabilityArgs {
    /// Check-in date in YYYY-MM-DD format.
    pub in_date: String,
    /// Check-out date in YYYY-MM-DD format.
    pub out_date: String,
    /// Hotel property ID as returned by hotel search.
    pub property_id: String,
}

/// Arguments shared by the single-property operations.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PropertyArgs {
    /// Hotel property ID as returned by hotel search.
    pub property_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReservationArgs {
    pub hotel_name: String,
    /// Check-in date (YYYY-MM-DD).
    pub check_in: String,
    /// Check-out date (YYYY-MM-DD).
    pub check_out: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traveler_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traveler_email: Option<String>,
}

// ── Definitions ────────────────────────────────────────────────────

pub fn resolve_user_and_trips_def() -> ToolDef {
    ToolDef::new(
        RESOLVE_USER_AND_TRIPS,
        "Checks if the user exists and retrieves any upcoming flights/train rides",
        json_schema_for::<ResolveUserAndTripsArgs>(),
    )
}

pub fn mapbox_search_def() -> ToolDef {
    ToolDef::new(
        MAPBOX_SEARCH,
        "Look up a geographic location or POI using a clear place name (not full sentence). \
         Returns an array of suggestions with coordinates and context. \
         Include a country code (ISO 3166-1 alpha-2) if known to improve accuracy.",
        json_schema_for::<MapboxSearchArgs>(),
    )
}

pub fn get_hotels_by_corporate_geo_def() -> ToolDef {
    ToolDef::new(
        GET_HOTELS_BY_CORPORATE_GEO,
        "Find hotels frequently booked by a corporation near a geographic location.",
        json_schema_for::<CorporateGeoArgs>(),
    )
}

pub fn search_hotels_def() -> ToolDef {
    ToolDef::new(
        SEARCH_HOTELS,
        "Search hotels near a location that match the user's preferences. \
         You can filter by chain, star rating, and proximity. \
         Preferences should be a free-text description of hotel features the user wants.",
        json_schema_for::<SearchHotelsArgs>(),
    )
}

pub fn check_availability_def() -> ToolDef {
    ToolDef::new(
        CHECK_AVAILABILITY,
        "Get room rate and availability information for a hotel given its property ID \
         and check-in/check-out dates.",
        json_schema_for::<CheckAvailabilityArgs>(),
    )
}

pub fn get_full_hotel_details_def() -> ToolDef {
    ToolDef::new(
        GET_FULL_HOTEL_DETAILS,
        "Get full details about a hotel.",
        json_schema_for::<PropertyArgs>(),
    )
}

pub fn display_full_hotel_details_def() -> ToolDef {
    ToolDef::new(
        DISPLAY_FULL_HOTEL_DETAILS,
        "Reply with full details about a single hotel.",
        json_schema_for::<PropertyArgs>(),
    )
}

pub fn display_hotel_images_def() -> ToolDef {
    ToolDef::new(
        DISPLAY_HOTEL_IMAGES,
        "Reply with nicely structured hotel images.",
        json_schema_for::<PropertyArgs>(),
    )
}

pub fn send_reservation_request_def() -> ToolDef {
    ToolDef::new(
        SEND_RESERVATION_REQUEST,
        "Sends a reservation request for a hotel stay based on provided details.",
        json_schema_for::<ReservationArgs>(),
    )
}

/// Definitions of the externally backed operations.
pub fn external_defs() -> Vec<ToolDef> {
    vec![
        resolve_user_and_trips_def(),
        mapbox_search_def(),
        get_hotels_by_corporate_geo_def(),
        search_hotels_def(),
        check_availability_def(),
        get_full_hotel_details_def(),
        display_full_hotel_details_def(),
        display_hotel_images_def(),
    ]
}

// ── In-process tools ───────────────────────────────────────────────

/// Records a reservation request and acknowledges it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendReservationRequest;

impl Tool for SendReservationRequest {
    fn definition(&self) -> ToolDef {
        send_reservation_request_def()
    }

    fn execute(&self, arguments: Value) -> ToolFuture<'_> {
        Box::pin(async move {
            let args: ReservationArgs = parse_tool_args(arguments)?;
            info!(
                hotel = %args.hotel_name,
                check_in = %args.check_in,
                check_out = %args.check_out,
                traveler = args.traveler_name.as_deref().unwrap_or("-"),
                email = args.traveler_email.as_deref().unwrap_or("-"),
                "Reservation request received"
            );
            Ok(Value::String("Success".into()))
        })
    }
}

impl ToolDispatcher {
    /// Register the full travel catalog.
    ///
    /// Externally backed operations are registered as [`UnavailableTool`]s
    /// unless a tool with that name is already present, so real backends
    /// may be registered before or after this call.
    pub fn with_travel_catalog(mut self) -> Self {
        for def in external_defs() {
            if !self.contains(def.name()) {
                let reason = format!("no backend configured for {}", def.name());
                self.register(UnavailableTool::new(def, reason));
            }
        }
        if !self.contains(SEND_RESERVATION_REQUEST) {
            self.register(SendReservationRequest);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnTool;
    use serde_json::json;

    #[test]
    fn catalog_lists_every_operation() {
        let tools = ToolDispatcher::new().with_travel_catalog();
        let names: Vec<String> = tools
            .definitions()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names.len(), 9);
        for name in [
            RESOLVE_USER_AND_TRIPS,
            MAPBOX_SEARCH,
            GET_HOTELS_BY_CORPORATE_GEO,
            SEARCH_HOTELS,
            CHECK_AVAILABILITY,
            GET_FULL_HOTEL_DETAILS,
            DISPLAY_FULL_HOTEL_DETAILS,
            DISPLAY_HOTEL_IMAGES,
            SEND_RESERVATION_REQUEST,
        ] {
            assert!(names.iter().any(|n| n == name), "missing {name}");
        }
    }

    #[test]
    fn schemas_mark_required_fields() {
        let schema = search_hotels_def().function.parameters;
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("preference_text")));
        assert!(!required.contains(&json!("radius_km")));

        let schema = send_reservation_request_def().function.parameters;
        let required = schema["required"].as_array().unwrap();
        for field in ["hotel_name", "check_in", "check_out"] {
            assert!(required.contains(&json!(field)), "{field}");
        }
    }

    #[test]
    fn search_defaults_apply() {
        let args: SearchHotelsArgs =
            serde_json::from_value(json!({"preference_text": "gym"})).unwrap();
        assert_eq!(args.radius_km, 10.0);
        assert_eq!(args.limit, 10);
        assert!(args.coords.is_none());

        let args: CorporateGeoArgs =
            serde_json::from_value(json!({"corporate_id": 7, "lat": 51.5, "long": -0.12}))
                .unwrap();
        assert_eq!(args.radius_meters, 7000.0);
    }

    #[tokio::test]
    async fn reservation_request_succeeds() {
        let tools = ToolDispatcher::new().with_travel_catalog();
        let result = tools
            .dispatch(
                SEND_RESERVATION_REQUEST,
                r#"{"hotel_name":"Hotel Adlon","check_in":"2026-11-02","check_out":"2026-11-05"}"#,
            )
            .await;
        assert_eq!(result, json!("Success"));
    }

    #[tokio::test]
    async fn external_operations_fail_until_wired() {
        let tools = ToolDispatcher::new().with_travel_catalog();
        let result = tools
            .dispatch(MAPBOX_SEARCH, r#"{"query":"Gare du Nord"}"#)
            .await;
        assert_eq!(result, json!({"error": "error"}));
    }

    #[tokio::test]
    async fn registered_backends_are_kept() {
        let tools = ToolDispatcher::new()
            .with(FnTool::new(mapbox_search_def(), |args: MapboxSearchArgs| async move {
                Ok::<_, crate::tools::ToolError>(json!([{ "name": args.query, "lat": 48.88 }]))
            }))
            .with_travel_catalog();
        let result = tools
            .dispatch(MAPBOX_SEARCH, r#"{"query":"Gare du Nord","country":"FR"}"#)
            .await;
        assert_eq!(result[0]["name"], "Gare du Nord");
    }
}
