// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::FetchError;
use crate::ingest::window::TimeWindow;

/// One observed event. Latitude, longitude and magnitude are always finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeismicEvent {
    pub time: Option<DateTime<Utc>>,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: Option<f64>, // metres for QuakeML, absent for the Atom feed
    pub magnitude: f64,
}

/// Geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub long: f64,
}

impl Point {
    pub fn new(lat: f64, long: f64) -> Self {
        Self { lat, long }
    }
}

/// Raw Atom entry before the magnitude is pulled out of the title.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub latitude: f64,
    pub longitude: f64,
    pub title: String,
    pub updated: Option<DateTime<Utc>>,
}

impl FeedEntry {
    /// Title text after the " - " separator, e.g. "5 km W Norcia (PG)".
    pub fn place(&self) -> Option<&str> {
        self.title
            .split_once(" - ")
            .map(|(_, place)| place.trim())
            .filter(|p| !p.is_empty())
    }
}

/// Result of one network attempt for a window. Failures never reach the decoder.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub window: TimeWindow,
    pub result: Result<String, FetchError>,
}

/// The unit persisted to storage.
#[derive(Debug, Clone)]
pub struct OutputRecord {
    pub window: TimeWindow,
    pub path: PathBuf,
    pub events: Vec<SeismicEvent>,
}
