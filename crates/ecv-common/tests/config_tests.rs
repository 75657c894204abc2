//! Loading a complete engine configuration from disk.

use std::io::Write;

use ecv_common::{
    ColourMapName, Crs, DatasetId, Dimensionality, EngineConfig, EngineError,
};

const CONFIG: &str = r#"
api_base_url: https://data.example.org/ecv
cache_capacities:
  metadata: 16
prefetch:
  debounce_ms: 150
  time_lookahead: 1
datasets:
  - id: sea_ice
    title: Sea ice concentration
    store_path: sea_ice_polar
    variable: ice_conc
    aux_variables: [total_standard_error]
    crs: polar
    levels: ["0", "1", "2", "3"]
    dimensionality: time-yx
    value_range: { vmin: 0.0, vmax: 100.0 }
    unit: "%"
    fill_policy: { sentinel: -1.0 }
    default_colour_map: YlGnBu
    default_smoothing: 1
    time_origin: "1979-01"
  - id: permafrost
    store_path: permafrost_multiyear
    variable: pfr
    crs: web
    levels: ["0", "1", "2", "3", "4", "5"]
    dimensionality: year-month-yx
    value_range: { vmin: 0.0, vmax: 100.0 }
    fill_policy: { floor_threshold: null }
    default_colour_map: YlOrRd
    year_range: { start: 1997, end: 2019 }
"#;

#[test]
fn test_load_config_file_and_build_registry() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();

    let config = EngineConfig::from_file(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.cache_capacities.metadata, 16);
    assert_eq!(config.cache_capacities.raw, 128);
    assert_eq!(config.prefetch.debounce_ms, 150);
    assert_eq!(config.prefetch.time_lookbehind, 2);

    let registry = config.build_registry().unwrap();
    assert_eq!(registry.len(), 2);

    let ice = registry.require(&DatasetId::new("sea_ice")).unwrap();
    assert_eq!(ice.crs, Crs::Polar);
    assert_eq!(ice.max_level(), 3);
    assert_eq!(ice.default_colour_map, ColourMapName::YlGnBu);
    assert_eq!(ice.fill_policy.floor_threshold, Some(0.0));
    assert!(ice.fill_policy.is_no_data(-1.0));
    assert_eq!(ice.display_title(), "Sea ice concentration");

    let pf = registry.require(&DatasetId::new("permafrost")).unwrap();
    assert_eq!(pf.dimensionality, Dimensionality::YearMonthYx);
    assert_eq!(pf.fill_policy.floor_threshold, None);
    assert!(!pf.fill_policy.is_no_data(0.0));
}

#[test]
fn test_invalid_dataset_fails_registry_build() {
    let yaml = CONFIG.replace("year_range: { start: 1997, end: 2019 }", "");
    let config = EngineConfig::from_yaml(&yaml).unwrap();
    assert!(matches!(config.build_registry(), Err(EngineError::Config(_))));
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EngineConfig::from_file(dir.path().join("nope.yaml")).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn test_malformed_yaml_is_config_error() {
    let err = EngineConfig::from_yaml("datasets: [ {id: ").unwrap_err();
    assert_eq!(err.kind(), "config");
}
