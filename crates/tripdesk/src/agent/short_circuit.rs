//! Short circuits: tool results that are already a final answer.
//!
//! After each tool call the engine asks a [`ShortCircuit`] whether the
//! result can go straight to the user. `Some(text)` ends the turn with that
//! text and skips the next model call; `None` feeds the result back to the
//! model. Formatting failures and error results never end a turn.

use crate::tools::catalog::{
    CHECK_AVAILABILITY, DISPLAY_FULL_HOTEL_DETAILS, DISPLAY_HOTEL_IMAGES,
    GET_HOTELS_BY_CORPORATE_GEO, RESOLVE_USER_AND_TRIPS, SEARCH_HOTELS, SEND_RESERVATION_REQUEST,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A formatter could not render a tool result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("{tool} result is not {expected}")]
    UnexpectedShape {
        tool: &'static str,
        expected: &'static str,
    },
}

/// Decides whether a tool result ends the turn.
pub trait ShortCircuit: Send + Sync {
    /// Render `result` of `tool_name` as a final answer, or `None` to let the
    /// model continue.
    fn format(&self, tool_name: &str, result: &Value) -> Result<Option<String>, FormatError>;

    /// [`format`](Self::format) with the turn-loop rules applied: results
    /// carrying an `"error"` key never short-circuit, and formatter errors are
    /// logged and treated as `None`.
    fn resolve(&self, tool_name: &str, result: &Value) -> Option<String> {
        if result.get("error").is_some() {
            return None;
        }
        match self.format(tool_name, result) {
            Ok(reply) => {
                if reply.is_some() {
                    debug!("Short circuit on {tool_name}");
                }
                reply
            }
            Err(e) => {
                warn!("Short-circuit formatting failed for {tool_name}: {e}");
                None
            }
        }
    }
}

/// Formatter signature used by [`ShortCircuitTable`].
pub type FormatFn = fn(&Value) -> Result<Option<String>, FormatError>;

/// Tool name → formatter lookup. Tools without an entry never short-circuit.
#[derive(Debug, Clone, Default)]
pub struct ShortCircuitTable {
    formatters: HashMap<String, FormatFn>,
}

impl ShortCircuitTable {
    /// An empty table: every result goes back to the model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Formatters for the travel catalog.
    pub fn travel() -> Self {
        Self::new()
            .with(RESOLVE_USER_AND_TRIPS, upcoming_trips)
            .with(GET_HOTELS_BY_CORPORATE_GEO, company_hotels)
            .with(SEARCH_HOTELS, hotel_list)
            .with(CHECK_AVAILABILITY, availability_rates)
            .with(DISPLAY_FULL_HOTEL_DETAILS, hotel_details)
            .with(DISPLAY_HOTEL_IMAGES, hotel_images)
            .with(SEND_RESERVATION_REQUEST, booking_confirmation)
    }

    /// Add or replace the formatter for `tool_name`.
    pub fn with(mut self, tool_name: impl Into<String>, formatter: FormatFn) -> Self {
        self.formatters.insert(tool_name.into(), formatter);
        self
    }

    pub fn len(&self) -> usize {
        self.formatters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }
}

impl ShortCircuit for ShortCircuitTable {
    fn format(&self, tool_name: &str, result: &Value) -> Result<Option<String>, FormatError> {
        match self.formatters.get(tool_name) {
            Some(formatter) => formatter(result),
            None => Ok(None),
        }
    }
}

// ── Built-in formatters ────────────────────────────────────────────

/// Confirmation shown once a reservation request has been sent.
pub const BOOKING_CONFIRMATION: &str = "<div class=\"booking-confirmed\">\
<h3>Booking Confirmed</h3>\
<p>Your booking has been successfully confirmed. We look forward to welcoming you soon!</p>\
</div>";

/// Reply when a hotel search returns nothing.
pub const NO_HOTELS_FOUND: &str =
    "I couldn't find any hotels for your search criteria. Try adjusting your location or dates.";

/// Reply when no past company booking is near the destination.
pub const NO_COMPANY_HOTELS: &str = "I couldn't find any hotels based on your company's past \
bookings for this destination. Would you like me to search for other available hotels in the area?";

/// Reply when the availability lookup returned nothing at all.
pub const AVAILABILITY_UNKNOWN: &str = "I couldn't check availability for those dates. Please try \
different dates or contact the hotel directly.";

/// Reply when the hotel has no rooms for the requested dates.
pub const NO_AVAILABILITY: &str = "Unfortunately, this hotel doesn't have availability for your \
selected dates. Would you like me to check other hotels or suggest alternative dates?";

/// Reply when the detail lookup returned nothing.
pub const DETAILS_UNAVAILABLE: &str =
    "Hotel details not available at the moment. Please try again later.";

/// Reply when the image lookup returned nothing.
pub const IMAGES_UNAVAILABLE: &str =
    "Hotel images not available at the moment. Please try again later.";

/// Rates listed by [`availability_rates`]: the cheapest, the dearest and
/// three in between.
pub const SHOWN_RATES: usize = 5;

/// Amenities listed by [`hotel_details`].
pub const SHOWN_AMENITIES: usize = 10;

/// Room types listed by [`hotel_details`].
pub const SHOWN_ROOM_TYPES: usize = 3;

/// Images listed per gallery section by [`hotel_images`].
pub const SHOWN_IMAGES_PER_SECTION: usize = 6;

pub fn booking_confirmation(_result: &Value) -> Result<Option<String>, FormatError> {
    Ok(Some(BOOKING_CONFIRMATION.to_string()))
}

/// Hotel list ordered by rank (unranked last).
pub fn hotel_list(result: &Value) -> Result<Option<String>, FormatError> {
    let hotels = result.as_array().ok_or(FormatError::UnexpectedShape {
        tool: SEARCH_HOTELS,
        expected: "a list of hotels",
    })?;
    if hotels.is_empty() {
        return Ok(Some(NO_HOTELS_FOUND.to_string()));
    }

    let mut ranked: Vec<&Value> = hotels.iter().collect();
    ranked.sort_by(|a, b| {
        let rank = |h: &Value| h.get("rank").and_then(Value::as_f64).unwrap_or(f64::INFINITY);
        rank(a).partial_cmp(&rank(b)).unwrap_or(Ordering::Equal)
    });

    let city = ranked[0]
        .pointer("/location/city")
        .and_then(Value::as_str)
        .unwrap_or("your destination");

    let mut out = format!(
        "<p>I found {} hotels in {}:</p>\n<ul>\n",
        ranked.len(),
        escape_html(city)
    );
    for hotel in ranked {
        let name = str_field(hotel, "name").unwrap_or("Hotel");
        let rating = hotel.get("rating").and_then(Value::as_f64).unwrap_or(0.0);
        let rating = if rating > 0.0 {
            format!("{rating}★")
        } else {
            "not rated".to_string()
        };
        out.push_str(&format!("<li><strong>{}</strong> ({rating})", escape_html(name)));
        if let Some(brand) = brand_label(hotel) {
            out.push_str(&format!(" - {}", escape_html(&brand)));
        }
        let address = address_line(hotel);
        if !address.is_empty() {
            out.push_str(&format!("<br />{}", escape_html(&address)));
        }
        let price = str_field(hotel, "average_price").unwrap_or("Unknown");
        out.push_str(&format!("<br />Price per night: {}</li>\n", escape_html(price)));
    }
    out.push_str(
        "</ul>\n<p>Would you like to check availability or see full details for any of these?</p>",
    );
    Ok(Some(out))
}

/// Hotels the user's company has booked near the destination, closest first.
pub fn company_hotels(result: &Value) -> Result<Option<String>, FormatError> {
    if is_blank(result) {
        return Ok(Some(NO_COMPANY_HOTELS.to_string()));
    }
    let hotels = result.as_array().ok_or(FormatError::UnexpectedShape {
        tool: GET_HOTELS_BY_CORPORATE_GEO,
        expected: "a list of hotels",
    })?;

    let distance = |h: &Value| h.get("distance_meters").and_then(Value::as_f64);
    let mut nearest: Vec<&Value> = hotels.iter().collect();
    nearest.sort_by(|a, b| {
        let (a, b) = (distance(a).unwrap_or(f64::INFINITY), distance(b).unwrap_or(f64::INFINITY));
        a.partial_cmp(&b).unwrap_or(Ordering::Equal)
    });

    let mut out = format!(
        "<p>{} hotels your company has booked near your destination:</p>\n<ul>\n",
        nearest.len()
    );
    for hotel in nearest {
        let name = str_field(hotel, "name").unwrap_or("Hotel");
        let bookings = hotel.get("booking_count").and_then(Value::as_u64).unwrap_or(0);
        let away = distance(hotel).map_or_else(|| "unknown".to_string(), format_distance);
        let rate = hotel
            .get("average_daily_rate")
            .and_then(Value::as_f64)
            .filter(|r| *r > 0.0)
            .map_or_else(|| "Price TBD".to_string(), |r| format!("£{r:.0}"));
        let last_booked = str_field(hotel, "latest_booking")
            .map_or_else(|| "Recently".to_string(), format_booking_date);
        out.push_str(&format!(
            "<li><strong>{}</strong> ({})<br />Distance: {away}<br />Average rate: {} per night\
             <br />Last booked: {}<br />Company bookings: {bookings}</li>\n",
            escape_html(name),
            popularity(bookings),
            escape_html(&rate),
            escape_html(&last_booked),
        ));
    }
    out.push_str("</ul>\n<p>Select a hotel to check availability for your dates.</p>");
    Ok(Some(out))
}

/// Rates for one hotel: the cheapest, the dearest and a spread in between.
pub fn availability_rates(result: &Value) -> Result<Option<String>, FormatError> {
    if is_blank(result) {
        return Ok(Some(AVAILABILITY_UNKNOWN.to_string()));
    }
    if !result.is_object() {
        return Err(FormatError::UnexpectedShape {
            tool: CHECK_AVAILABILITY,
            expected: "an object",
        });
    }
    let rates = result
        .get("availability")
        .and_then(Value::as_array)
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("rates"))
        .and_then(Value::as_array)
        .filter(|rates| !rates.is_empty());
    let Some(rates) = rates else {
        return Ok(Some(NO_AVAILABILITY.to_string()));
    };

    let mut by_price: Vec<&Value> = rates.iter().collect();
    by_price.sort_by(|a, b| {
        total_price(a)
            .partial_cmp(&total_price(b))
            .unwrap_or(Ordering::Equal)
    });
    let shown = spread(&by_price);
    let cheapest = by_price[0];
    let dearest = by_price[by_price.len() - 1];

    let mut out = format!(
        "<h3>Available Rooms</h3>\n<p>{} rooms available, {}{:.0} - {}{:.0} per night</p>\n<ul>\n",
        rates.len(),
        escape_html(&currency_prefix(cheapest)),
        total_price(cheapest),
        escape_html(&currency_prefix(cheapest)),
        total_price(dearest),
    );
    for (i, rate) in shown.iter().enumerate() {
        let room = str_field(rate, "room_description").unwrap_or("Standard Room");
        let label = if i == 0 {
            " (lowest price)"
        } else if i == shown.len() - 1 {
            " (premium option)"
        } else {
            ""
        };
        let refundable = rate.get("refundable").and_then(Value::as_bool).unwrap_or(false);
        let policy = if refundable { "Refundable" } else { "Non-refundable" };
        out.push_str(&format!(
            "<li><strong>{}</strong>{label}: {}{:.0} per night, {policy}</li>\n",
            escape_html(room),
            escape_html(&currency_prefix(rate)),
            total_price(rate),
        ));
    }
    out.push_str("</ul>\n<p>Tell me which room you would like to book.</p>");
    Ok(Some(out))
}

/// Full description of one property from a `{property_id: details}` object.
pub fn hotel_details(result: &Value) -> Result<Option<String>, FormatError> {
    if is_blank(result) {
        return Ok(Some(DETAILS_UNAVAILABLE.to_string()));
    }
    let hotel = result
        .as_object()
        .and_then(|properties| properties.values().next())
        .filter(|hotel| hotel.is_object())
        .ok_or(FormatError::UnexpectedShape {
            tool: DISPLAY_FULL_HOTEL_DETAILS,
            expected: "an object keyed by property id",
        })?;

    let name = str_field(hotel, "name").unwrap_or("Hotel Name Not Available");
    let mut out = format!("<h3>{}</h3>\n", escape_html(name));
    if let Some(brand) = hotel.pointer("/brand/name").and_then(Value::as_str) {
        out.push_str(&format!("<p>{}</p>\n", escape_html(brand)));
    }

    let rating = hotel.pointer("/ratings/property/rating").and_then(number);
    let address = hotel.get("address").map(joined_address).unwrap_or_default();
    out.push_str("<p>");
    match rating.filter(|r| *r > 0.0) {
        Some(rating) => {
            let scale = hotel
                .pointer("/ratings/property/type")
                .and_then(Value::as_str)
                .unwrap_or("Star");
            out.push_str(&format!("{rating}/5 {}", escape_html(scale)));
        }
        None => out.push_str("Not rated"),
    }
    if !address.is_empty() {
        out.push_str(&format!("<br />{}", escape_html(&address)));
    }
    out.push_str("</p>\n");

    let facts = property_facts(hotel);
    if !facts.is_empty() {
        out.push_str(&format!("<p>{}</p>\n", escape_html(&facts.join(", "))));
    }

    let amenities: Vec<&str> = object_values(hotel, "amenities")
        .filter_map(|amenity| str_field(amenity, "name"))
        .take(SHOWN_AMENITIES)
        .collect();
    if !amenities.is_empty() {
        out.push_str("<h4>Amenities</h4>\n<ul>\n");
        for amenity in amenities {
            out.push_str(&format!("<li>{}</li>\n", escape_html(amenity)));
        }
        out.push_str("</ul>\n");
    }

    let rooms: Vec<String> = object_values(hotel, "rooms")
        .take(SHOWN_ROOM_TYPES)
        .map(room_summary)
        .collect();
    if !rooms.is_empty() {
        out.push_str("<h4>Room types</h4>\n<ul>\n");
        for room in rooms {
            out.push_str(&format!("<li>{}</li>\n", escape_html(&room)));
        }
        out.push_str("</ul>\n");
    }

    let sections = [("location", "Location"), ("amenities", "Overview"), ("dining", "Dining")];
    for (key, title) in sections {
        if let Some(text) = hotel.get("descriptions").and_then(|d| str_field(d, key)) {
            out.push_str(&format!("<p><strong>{title}:</strong> {}</p>\n", escape_html(text)));
        }
    }
    out.push_str("<p>Would you like to check availability or see photos of this hotel?</p>");
    Ok(Some(out))
}

/// Photo gallery grouped into hero, rooms, lobby, reception, amenities and
/// everything else.
pub fn hotel_images(result: &Value) -> Result<Option<String>, FormatError> {
    if is_blank(result) {
        return Ok(Some(IMAGES_UNAVAILABLE.to_string()));
    }
    let (name, images) = gallery_source(result).ok_or(FormatError::UnexpectedShape {
        tool: DISPLAY_HOTEL_IMAGES,
        expected: "a hotel with images",
    })?;
    let name = name.unwrap_or("Hotel Name Not Available");
    if images.is_empty() {
        return Ok(Some(format!("<p>No images available for {}</p>", escape_html(name))));
    }

    let mut sections: [(&str, Vec<&Value>); 6] = [
        ("Main view", Vec::new()),
        ("Rooms", Vec::new()),
        ("Lobby and common areas", Vec::new()),
        ("Reception", Vec::new()),
        ("Amenities and features", Vec::new()),
        ("Additional views", Vec::new()),
    ];
    for image in images {
        sections[image_section(image)].1.push(image);
    }

    let mut out = format!(
        "<h3>{} photos of {}</h3>\n",
        images.len(),
        escape_html(name)
    );
    for (title, section) in &sections {
        if section.is_empty() {
            continue;
        }
        out.push_str(&format!("<h4>{title} ({})</h4>\n<ul>\n", section.len()));
        for image in section.iter().take(SHOWN_IMAGES_PER_SECTION) {
            let url = str_field(image, "url").unwrap_or("");
            let caption = str_field(image, "room_name")
                .or_else(|| str_field(image, "caption"))
                .unwrap_or("Hotel image");
            out.push_str(&format!(
                "<li><img src=\"{}\" alt=\"{}\" loading=\"lazy\" /></li>\n",
                escape_html(url),
                escape_html(caption),
            ));
        }
        let hidden = section.len().saturating_sub(SHOWN_IMAGES_PER_SECTION);
        if hidden > 0 {
            out.push_str(&format!("<li>+{hidden} more</li>\n"));
        }
        out.push_str("</ul>\n");
    }
    Ok(Some(out))
}

/// Upcoming trips for a resolved user. No short circuit when the user was
/// not found or has no trips, so the model can carry on with manual input.
pub fn upcoming_trips(result: &Value) -> Result<Option<String>, FormatError> {
    if !result.is_object() {
        return Err(FormatError::UnexpectedShape {
            tool: RESOLVE_USER_AND_TRIPS,
            expected: "an object",
        });
    }
    let has_user = result
        .get("user_uuid")
        .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
    let trips = result
        .get("upcoming_flights")
        .and_then(Value::as_array)
        .filter(|t| !t.is_empty());
    let (true, Some(trips)) = (has_user, trips) else {
        return Ok(None);
    };

    let mut out = String::from("<h3>Your Upcoming Trips</h3>\n<ul>\n");
    for (i, trip) in trips.iter().enumerate() {
        let origin = str_field(trip, "origin").unwrap_or("");
        let destination = str_field(trip, "destination").unwrap_or("");
        let arrival = str_field(trip, "arrival_time")
            .map(format_arrival)
            .unwrap_or_else(|| "Date TBD".to_string());
        out.push_str(&format!("<li><strong>Trip {}:</strong> ", i + 1));
        if let Some(flight) = str_field(trip, "flight_number") {
            out.push_str(&format!("<strong>Flight:</strong> {} ", escape_html(flight)));
        }
        out.push_str(&format!(
            "{} → {}<br /><strong>Arrival:</strong> {}</li>\n",
            escape_html(origin),
            escape_html(destination),
            escape_html(&arrival)
        ));
    }
    out.push_str("</ul>\n<p>Select a trip to get hotel recommendations.</p>");
    Ok(Some(out))
}

// ── Helpers ────────────────────────────────────────────────────────

/// Null, empty containers and empty strings carry nothing to show.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// A number, or a string holding one.
fn number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn object_values<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|map| map.values())
}

fn brand_label(hotel: &Value) -> Option<String> {
    match (str_field(hotel, "brand_name"), str_field(hotel, "chain_name")) {
        (Some(brand), Some(chain)) if brand != chain => Some(format!("{brand} ({chain})")),
        (Some(brand), _) => Some(brand.to_string()),
        (None, Some(chain)) => Some(chain.to_string()),
        (None, None) => None,
    }
}

fn address_line(hotel: &Value) -> String {
    let Some(location) = hotel.get("location") else {
        return String::new();
    };
    ["line_1", "line_2", "postal_code", "city"]
        .iter()
        .filter_map(|key| str_field(location, key))
        .collect::<Vec<_>>()
        .join(", ")
}

fn joined_address(address: &Value) -> String {
    ["line_1", "city", "postal_code"]
        .iter()
        .filter_map(|key| str_field(address, key))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{meters:.0}m")
    } else {
        format!("{:.1}km", meters / 1000.0)
    }
}

fn popularity(bookings: u64) -> &'static str {
    match bookings {
        10.. => "popular choice",
        5..=9 => "frequently booked",
        _ => "available option",
    }
}

fn total_price(rate: &Value) -> f64 {
    rate.get("total_price").and_then(number).unwrap_or(0.0)
}

/// `£` for pounds (the default), otherwise the ISO code and a space.
fn currency_prefix(rate: &Value) -> String {
    match str_field(rate, "currency") {
        None | Some("GBP") => "£".to_string(),
        Some(code) => format!("{code} "),
    }
}

/// At most [`SHOWN_RATES`] rates from a price-sorted list: first, last, and
/// the quartile, median and upper-quartile entries between them.
fn spread<'a>(by_price: &[&'a Value]) -> Vec<&'a Value> {
    let n = by_price.len();
    if n <= SHOWN_RATES {
        return by_price.to_vec();
    }
    let quarter = n / 4;
    let mut picked = vec![by_price[0]];
    picked.extend([quarter, n / 2, n - quarter - 1].map(|i| by_price[i]));
    picked.push(by_price[n - 1]);
    picked
}

/// Built year, room count and floors from the `statistics` map.
fn property_facts(hotel: &Value) -> Vec<String> {
    let mut facts = Vec::new();
    for stat in object_values(hotel, "statistics") {
        let (Some(name), Some(value)) = (str_field(stat, "name"), stat.get("value")) else {
            continue;
        };
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if name.contains("Total number of rooms") {
            facts.push(format!("{value} rooms"));
        } else if name.contains("Year Built") {
            facts.push(format!("built {value}"));
        } else if name.contains("Number of floors") {
            facts.push(format!("{value} floors"));
        }
    }
    facts
}

/// `Deluxe King (1 King Bed) - 320 sq ft`
fn room_summary(room: &Value) -> String {
    let mut summary = str_field(room, "name").unwrap_or("Room").to_string();
    if let Some(beds) = object_values(room, "bed_groups")
        .next()
        .and_then(|group| str_field(group, "description"))
    {
        summary.push_str(&format!(" ({beds})"));
    }
    if let Some(area) = room
        .pointer("/area/square_feet")
        .and_then(number)
        .filter(|a| *a > 0.0)
    {
        summary.push_str(&format!(" - {area:.0} sq ft"));
    }
    summary
}

/// Hotel name and image list from the shapes the image lookup returns:
/// `[{hotel_name, images}]`, `{property_id: {name, images}}` or
/// `{hotel_name, images}`.
fn gallery_source(result: &Value) -> Option<(Option<&str>, &Vec<Value>)> {
    let hotel = match result {
        Value::Array(items) => items.first()?,
        Value::Object(fields) if !fields.contains_key("images") => {
            fields.values().find(|v| v.is_object())?
        }
        other => other,
    };
    let name = str_field(hotel, "hotel_name").or_else(|| str_field(hotel, "name"));
    let images = hotel.get("images").and_then(Value::as_array)?;
    Some((name, images))
}

/// Index into the gallery sections of [`hotel_images`].
fn image_section(image: &Value) -> usize {
    const ROOM: u64 = 21001;
    const LOBBY: u64 = 10001;
    const RECEPTION: u64 = 10002;
    const AMENITY: u64 = 22009;

    if image.get("hero_image").and_then(Value::as_bool).unwrap_or(false) {
        return 0;
    }
    let category = image.get("category").and_then(Value::as_u64).unwrap_or(0);
    let caption = str_field(image, "caption").unwrap_or("").to_lowercase();
    if category == ROOM || caption.contains("room") {
        1
    } else if category == LOBBY || caption.contains("lobby") {
        2
    } else if category == RECEPTION || caption.contains("reception") {
        3
    } else if category == AMENITY || caption.contains("amenity") {
        4
    } else {
        5
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|pattern| NaiveDateTime::parse_from_str(raw, pattern).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// `2026-03-14T09:30:00Z` → `March 14, 2026 09:30 AM`. Unparseable input is
/// returned as-is.
fn format_arrival(raw: &str) -> String {
    parse_timestamp(raw).map_or_else(
        || raw.to_string(),
        |dt| dt.format("%B %d, %Y %I:%M %p").to_string(),
    )
}

/// `2025-06-01 12:00:00` → `Jun 01, 2025`. Unparseable input keeps its first
/// word.
fn format_booking_date(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(dt) => dt.format("%b %d, %Y").to_string(),
        None => raw.split(' ').next().unwrap_or(raw).to_string(),
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
