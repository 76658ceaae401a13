// tests/extract_fields.rs
use chrono::{TimeZone, Utc};
use seismic_ingest::ingest::extract::{extract_feed_entry, magnitude_from_title, Extractor};
use seismic_ingest::ingest::xml::{decode, parse_tree, Schema};

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

#[test]
fn quakeml_fixture_fields() {
    let tree = decode(&fixture("quakeml_window.xml"), Schema::CatalogEvents).unwrap();
    let events = tree.records();
    let ex = Extractor::new(Schema::CatalogEvents);

    let first = ex.extract(events[0]).unwrap();
    assert_eq!(first.latitude, 43.612);
    assert_eq!(first.longitude, 12.493);
    assert_eq!(first.magnitude, 1.7);
    assert_eq!(first.depth, Some(7700.0));
    let expected = Utc.with_ymd_and_hms(2010, 1, 1, 1, 12, 44).unwrap()
        + chrono::Duration::milliseconds(550);
    assert_eq!(first.time, Some(expected));

    // preferred origin/magnitude win over the first ones listed
    let second = ex.extract(events[1]).unwrap();
    assert_eq!(second.latitude, 42.345);
    assert_eq!(second.longitude, 13.387);
    assert_eq!(second.depth, Some(9800.0));
    assert_eq!(second.magnitude, 2.4);

    let third = ex.extract(events[2]).unwrap_err();
    assert_eq!(third.field, "magnitude");

    let fourth = ex.extract(events[3]).unwrap();
    assert_eq!(fourth.depth, None);
    assert_eq!(fourth.magnitude, 0.9);
}

#[test]
fn non_numeric_latitude_names_the_field() {
    let node = parse_tree(
        "<event><origin><latitude><value>north</value></latitude><longitude><value>13</value></longitude></origin>\
         <magnitude><mag><value>2</value></mag></magnitude></event>",
    )
    .unwrap();
    let err = Extractor::new(Schema::CatalogEvents).extract(&node).unwrap_err();
    assert_eq!(err.field, "latitude");
}

#[test]
fn nan_magnitude_is_rejected() {
    let node = parse_tree(
        "<event><origin><latitude><value>1</value></latitude><longitude><value>2</value></longitude></origin>\
         <magnitude><mag><value>NaN</value></mag></magnitude></event>",
    )
    .unwrap();
    let err = Extractor::new(Schema::CatalogEvents).extract(&node).unwrap_err();
    assert_eq!(err.field, "magnitude");
}

#[test]
fn feed_entries_take_magnitude_from_title() {
    let tree = decode(&fixture("atom_feed.xml"), Schema::AtomGeoFeed).unwrap();
    let entries = tree.records();
    let ex = Extractor::new(Schema::AtomGeoFeed);

    let ev = ex.extract(entries[0]).unwrap();
    assert_eq!(ev.magnitude, 2.3);
    assert_eq!(ev.latitude, 42.79);
    assert_eq!(ev.depth, None);
    assert_eq!(ev.time, Some(Utc.with_ymd_and_hms(2024, 1, 12, 10, 11, 12).unwrap()));

    let entry = extract_feed_entry(entries[0]).unwrap();
    assert_eq!(entry.place(), Some("5 km W Norcia (PG)"));

    let err = ex.extract(entries[3]).unwrap_err();
    assert_eq!(err.field, "magnitude");
}

#[test]
fn title_offset_is_configurable() {
    let title = "M 4.1 - 10 km N Teramo";
    assert_eq!(magnitude_from_title(title, 1).unwrap(), 4.1);
    assert_eq!(magnitude_from_title(title, 40).unwrap_err().field, "magnitude");
}
