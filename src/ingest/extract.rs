// src/ingest/extract.rs
//! Decoded node -> typed `SeismicEvent`.
//!
//! Mandatory fields (latitude, longitude, magnitude) must be present and
//! finite. Depth and time are optional, but when present they must parse.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::FieldExtractionError;
use crate::ingest::types::{FeedEntry, SeismicEvent};
use crate::ingest::xml::{Schema, XmlNode};

/// Word offset of the magnitude token in INGV Atom titles.
pub const DEFAULT_TITLE_MAGNITUDE_WORD: usize = 6;

#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    pub schema: Schema,
    pub title_magnitude_word: usize,
}

impl Extractor {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            title_magnitude_word: DEFAULT_TITLE_MAGNITUDE_WORD,
        }
    }

    pub fn with_title_magnitude_word(mut self, word: usize) -> Self {
        self.title_magnitude_word = word;
        self
    }

    pub fn extract(&self, node: &XmlNode) -> Result<SeismicEvent, FieldExtractionError> {
        match self.schema {
            Schema::CatalogEvents => extract_catalog_event(node),
            Schema::AtomGeoFeed => {
                let entry = extract_feed_entry(node)?;
                let magnitude = magnitude_from_title(&entry.title, self.title_magnitude_word)?;
                tracing::debug!(target: "ingest", place = entry.place().unwrap_or("?"), magnitude, "feed entry");
                Ok(SeismicEvent {
                    time: entry.updated,
                    latitude: entry.latitude,
                    longitude: entry.longitude,
                    depth: None,
                    magnitude,
                })
            }
        }
    }
}

/// QuakeML `event` node. Uses the preferred origin/magnitude when the event names one.
pub fn extract_catalog_event(event: &XmlNode) -> Result<SeismicEvent, FieldExtractionError> {
    let origin = preferred(event, "origin", "preferredOriginID");
    let mag = preferred(event, "magnitude", "preferredMagnitudeID");

    let origin_text = |field: &str| origin.and_then(|o| o.text_at(&[field, "value"]));

    Ok(SeismicEvent {
        latitude: required_number("latitude", origin_text("latitude"))?,
        longitude: required_number("longitude", origin_text("longitude"))?,
        magnitude: required_number("magnitude", mag.and_then(|m| m.text_at(&["mag", "value"])))?,
        depth: optional_number("depth", origin_text("depth"))?,
        time: optional_time("time", origin_text("time"))?,
    })
}

/// Atom `entry` node with a `geo:Point`.
pub fn extract_feed_entry(entry: &XmlNode) -> Result<FeedEntry, FieldExtractionError> {
    Ok(FeedEntry {
        latitude: required_number("latitude", entry.text_at(&["Point", "lat"]))?,
        longitude: required_number("longitude", entry.text_at(&["Point", "long"]))?,
        title: entry
            .text_at(&["title"])
            .ok_or_else(|| FieldExtractionError::missing("title"))?
            .to_string(),
        updated: optional_time("time", entry.text_at(&["updated"]))?,
    })
}

/// Fixed-offset token of a space-split title. Brittle against title format
/// changes; the offset is configurable for that reason.
pub fn magnitude_from_title(title: &str, word: usize) -> Result<f64, FieldExtractionError> {
    let token = title
        .split(' ')
        .nth(word)
        .ok_or_else(|| FieldExtractionError::missing("magnitude"))?;
    parse_number(token).ok_or_else(|| FieldExtractionError::invalid("magnitude", token))
}

fn preferred<'a>(event: &'a XmlNode, name: &'a str, preferred_id: &str) -> Option<&'a XmlNode> {
    event
        .text_at(&[preferred_id])
        .and_then(|id| {
            event
                .children_named(name)
                .find(|c| c.attr("publicID") == Some(id))
        })
        .or_else(|| event.child(name))
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn required_number(field: &'static str, raw: Option<&str>) -> Result<f64, FieldExtractionError> {
    let raw = raw.ok_or_else(|| FieldExtractionError::missing(field))?;
    parse_number(raw).ok_or_else(|| FieldExtractionError::invalid(field, raw))
}

fn optional_number(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<f64>, FieldExtractionError> {
    raw.map(|r| parse_number(r).ok_or_else(|| FieldExtractionError::invalid(field, r)))
        .transpose()
}

fn optional_time(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, FieldExtractionError> {
    raw.map(|r| {
        parse_time(r).ok_or_else(|| FieldExtractionError {
            field,
            reason: format!("not a timestamp: {r:?}"),
        })
    })
    .transpose()
}

/// RFC 3339, or a naive ISO 8601 timestamp taken as UTC (INGV omits the zone).
pub fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}
