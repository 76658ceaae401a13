// tests/pipeline_config.rs
use seismic_ingest::config::pipeline::ENV_CONFIG_PATH;
use seismic_ingest::{Error, Mode, PipelineConfig};
use std::{env, fs};

const OVERRIDES: [&str; 6] = [
    "SEISMIC_MODE",
    "SEISMIC_START_DATE",
    "SEISMIC_END_DATE",
    "SEISMIC_OUTPUT_DIR",
    "SEISMIC_WINDOW_HOURS",
    "SEISMIC_MAX_CONCURRENCY",
];

fn clear_env() {
    env::remove_var(ENV_CONFIG_PATH);
    for k in OVERRIDES {
        env::remove_var(k);
    }
}

#[test]
fn parse_toml_and_json_paths() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("seismic.toml");
    fs::write(
        &p_toml,
        r#"
base_url = "https://webservices.ingv.it/fdsnws/event/1/query?minmag=2"
start_date = "2012-05-20T00:00:00"
end_date = "2012-05-21T00:00:00"
window_hours = 3
max_concurrency = 4
"#,
    )
    .unwrap();
    let c = PipelineConfig::load_from(&p_toml).unwrap();
    assert_eq!(c.window_hours, 3);
    assert_eq!(c.max_concurrency, 4);
    assert_eq!(c.request_timeout_ms, 30_000);
    c.validate().unwrap();

    let p_json = dir.path().join("seismic.json");
    fs::write(
        &p_json,
        r#"{"mode":"atom_feed","reference_point":{"lat":44.149,"long":10.386},"distance_radius_km":80}"#,
    )
    .unwrap();
    let cj = PipelineConfig::load_from(&p_json).unwrap();
    assert_eq!(cj.mode, Mode::AtomFeed);
    assert_eq!(cj.distance_radius_km, 80.0);
}

#[test]
fn unparsable_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("seismic.toml");
    fs::write(&p, "window_hours = \"six\"").unwrap();
    let err = PipelineConfig::load_from(&p).unwrap_err();
    assert!(matches!(err, Error::Config { .. }));

    let missing = dir.path().join("nope.toml");
    assert!(PipelineConfig::load_from(&missing).unwrap_err().is_fatal());
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // keep the repo's own config/ out of the way
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    // 1) nothing on disk: built-in defaults
    let c = PipelineConfig::load_default().unwrap();
    assert_eq!(c.window_hours, 6);

    // 2) ./config/seismic.json when there is no TOML
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("seismic.json"), r#"{"window_hours": 12}"#).unwrap();
    assert_eq!(PipelineConfig::load_default().unwrap().window_hours, 12);

    // 3) TOML wins over JSON
    fs::write(cfg_dir.join("seismic.toml"), "window_hours = 2").unwrap();
    assert_eq!(PipelineConfig::load_default().unwrap().window_hours, 2);

    // 4) the env path wins over both
    let p_env = tmp.path().join("elsewhere.toml");
    fs::write(&p_env, "window_hours = 24").unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    assert_eq!(PipelineConfig::load_default().unwrap().window_hours, 24);

    // 5) a dangling env path is an error, not a silent fallback
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(PipelineConfig::load_default().unwrap_err().is_fatal());

    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn env_overrides_apply_on_top_of_file() {
    clear_env();
    env::set_var("SEISMIC_MODE", "atom");
    env::set_var("SEISMIC_START_DATE", "2016-08-24T00:00:00");
    env::set_var("SEISMIC_END_DATE", "2016-08-25T00:00:00Z");
    env::set_var("SEISMIC_OUTPUT_DIR", "/tmp/seismic-out");
    env::set_var("SEISMIC_WINDOW_HOURS", "1");
    env::set_var("SEISMIC_MAX_CONCURRENCY", "3");

    let mut c = PipelineConfig::default();
    c.apply_env_overrides().unwrap();
    assert_eq!(c.mode, Mode::AtomFeed);
    assert_eq!(c.start_date.to_rfc3339(), "2016-08-24T00:00:00+00:00");
    assert_eq!(c.end_date - c.start_date, chrono::Duration::hours(24));
    assert_eq!(c.output_dir, std::path::PathBuf::from("/tmp/seismic-out"));
    assert_eq!(c.window_hours, 1);
    assert_eq!(c.max_concurrency, 3);

    env::set_var("SEISMIC_MAX_CONCURRENCY", "many");
    let err = PipelineConfig::default().apply_env_overrides().unwrap_err();
    assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "max_concurrency"));

    clear_env();
}
