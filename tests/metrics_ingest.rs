// tests/metrics_ingest.rs
// Own test binary: the Prometheus recorder is process-global.
use chrono::{TimeZone, Utc};
use seismic_ingest::metrics::Metrics;
use seismic_ingest::{Error, Orchestrator, PipelineConfig};
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn metrics_exposed_after_run() {
    // Install a local recorder for the test
    let metrics = Metrics::init().expect("recorder");

    // a second recorder is a runtime failure, not a configuration one
    let again = Metrics::init().err().expect("second install fails");
    assert!(matches!(again, Error::Metrics(_)));
    assert!(!again.is_fatal());

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("starttime", "2010-01-01T06:00:00"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(1)
        .mount(&server)
        .await;
    let xml = std::fs::read_to_string("tests/fixtures/quakeml_window.xml").expect("fixture");
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(xml))
        .mount(&server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let textfile = out.path().join("ingest.prom");
    let cfg = PipelineConfig {
        base_url: format!("{}/query", server.uri()),
        start_date: Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap(),
        end_date: Utc.with_ymd_and_hms(2010, 1, 1, 12, 0, 0).unwrap(),
        output_dir: out.path().to_path_buf(),
        min_request_interval_ms: 0,
        max_retries: 0,
        metrics_textfile: Some(textfile.clone()),
        ..PipelineConfig::default()
    };
    let summary = Orchestrator::new(cfg).unwrap().run().await.unwrap();
    assert_eq!(summary.windows_failed, 1);

    // Scrape metrics text and check series presence by substring
    let text = metrics.render();
    for name in [
        "ingest_windows_succeeded_total",
        "ingest_windows_failed_total",
        "ingest_events_extracted_total",
        "ingest_events_skipped_total",
        "ingest_fetch_errors_total",
        "ingest_fetch_ms",
        "ingest_decode_ms",
        "ingest_last_run_ts",
    ] {
        assert!(text.contains(name), "missing {name}");
    }

    metrics.write_textfile(&textfile).await.unwrap();
    let written = std::fs::read_to_string(&textfile).unwrap();
    assert!(written.contains("ingest_windows_succeeded_total"));
}
