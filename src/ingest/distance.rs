// src/ingest/distance.rs
//! Great-circle distance from a reference point and distance-weighted magnitude.

use crate::ingest::types::{Point, SeismicEvent};

/// Mean Earth radius, km.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub distance_km: f64,
    /// `100000 * magnitude / distance²`; `None` at distance zero.
    pub weighted_magnitude: Option<f64>,
}

/// Haversine distance in km.
pub fn haversine_km(a: Point, b: Point) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.long - a.long).to_radians();

    let h = ((d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2))
    .min(1.0);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

pub fn score(reference: Point, event: Point, magnitude: f64) -> Score {
    let distance_km = haversine_km(reference, event);
    let weighted_magnitude =
        (distance_km > 0.0).then(|| 100_000.0 * magnitude / (distance_km * distance_km));
    Score {
        distance_km,
        weighted_magnitude,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DistanceFilter {
    pub reference: Point,
    pub radius_km: f64,
}

impl DistanceFilter {
    pub fn new(reference: Point, radius_km: f64) -> Self {
        Self {
            reference,
            radius_km,
        }
    }

    /// Keep events strictly inside the radius, replace their magnitude with the
    /// weighted score and rank them by it (highest first, stable on ties).
    /// Returns the kept events and how many were dropped.
    pub fn apply(&self, events: Vec<SeismicEvent>) -> (Vec<SeismicEvent>, usize) {
        let total = events.len();
        let mut kept: Vec<SeismicEvent> = events
            .into_iter()
            .filter_map(|mut ev| {
                let s = score(
                    self.reference,
                    Point::new(ev.latitude, ev.longitude),
                    ev.magnitude,
                );
                if s.distance_km >= self.radius_km {
                    return None;
                }
                let weighted = s.weighted_magnitude?;
                if !weighted.is_finite() {
                    return None;
                }
                ev.magnitude = weighted;
                Some(ev)
            })
            .collect();
        kept.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
        let dropped = total - kept.len();
        (kept, dropped)
    }
}
