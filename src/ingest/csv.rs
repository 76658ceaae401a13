// src/ingest/csv.rs
//! Flat CSV rendering of events plus an atomic file writer.
//!
//! Columns: `latitude,longitude,magnitude,depth` (optionally prefixed by the
//! event time). No header, `\n` terminated, shortest round-trip float text.

use chrono::SecondsFormat;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{Error, FieldExtractionError, Result};
use crate::ingest::extract::parse_time;
use crate::ingest::types::SeismicEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsvLayout {
    pub time_column: bool,
}

pub fn serialize(events: &[SeismicEvent], layout: CsvLayout) -> String {
    let mut out = String::with_capacity(events.len() * 48);
    for ev in events {
        if layout.time_column {
            if let Some(t) = ev.time {
                out.push_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true));
            }
            out.push(',');
        }
        // f64 Display is the shortest text that parses back to the same value
        let _ = write!(out, "{},{},{},", ev.latitude, ev.longitude, ev.magnitude);
        if let Some(d) = ev.depth {
            let _ = write!(out, "{d}");
        }
        out.push('\n');
    }
    out
}

/// Inverse of [`serialize`] for the same layout.
pub fn parse(text: &str, layout: CsvLayout) -> std::result::Result<Vec<SeismicEvent>, FieldExtractionError> {
    let mut events = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let mut cols = line.split(',').map(str::trim);
        let time = if layout.time_column {
            match cols.next() {
                Some("") | None => None,
                Some(raw) => Some(parse_time(raw).ok_or_else(|| FieldExtractionError {
                    field: "time",
                    reason: format!("not a timestamp: {raw:?}"),
                })?),
            }
        } else {
            None
        };
        let latitude = number("latitude", cols.next())?;
        let longitude = number("longitude", cols.next())?;
        let magnitude = number("magnitude", cols.next())?;
        let depth = match cols.next() {
            Some("") | None => None,
            raw => Some(number("depth", raw)?),
        };
        events.push(SeismicEvent {
            time,
            latitude,
            longitude,
            depth,
            magnitude,
        });
    }
    Ok(events)
}

fn number(field: &'static str, raw: Option<&str>) -> std::result::Result<f64, FieldExtractionError> {
    let raw = raw.ok_or_else(|| FieldExtractionError::missing(field))?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FieldExtractionError::invalid(field, raw))
}

/// Temp sibling used while writing `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write to a temp sibling, fsync, then rename over `path`. Readers see either
/// the old file or the complete new one, never a truncated one.
pub async fn write_atomic(path: &Path, text: &str) -> Result<()> {
    let tmp = temp_path(path);
    if let Err(e) = write_and_sync(&tmp, text.as_bytes()).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::io(&tmp, e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::io(path, e));
    }
    Ok(())
}

async fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut f = tokio::fs::File::create(path).await?;
    f.write_all(bytes).await?;
    f.sync_all().await?;
    Ok(())
}
