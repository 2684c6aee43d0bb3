use std::io::Write;

use flotilla_nav::NavConfig;

fn write_yaml(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write yaml");
    file
}

#[test]
fn partial_yaml_keeps_defaults_for_missing_keys() {
    let file = write_yaml(
        "rules:\n  weapon_radius: 6.0\nschedule:\n  soft_budget_ms: 250\n",
    );
    let config = NavConfig::load(file.path()).expect("config loads");

    assert_eq!(config.rules.weapon_radius, 6.0);
    assert_eq!(config.rules.agent_radius, 0.5);
    assert_eq!(config.schedule.soft_budget_ms, 250);
    assert_eq!(config.schedule.degraded_window_deg, 3);
    assert_eq!(config.grid.definition, 4);
    assert_eq!(config.scoring.lookahead_samples, 8);
}

#[test]
fn invalid_values_are_rejected_with_the_path_in_context() {
    let file = write_yaml("grid:\n  definition: 0\n");
    let err = NavConfig::load(file.path()).expect_err("zero definition");
    let message = format!("{err:#}");
    assert!(message.contains("grid.definition"), "{message}");
    assert!(message.contains(&file.path().display().to_string()), "{message}");
}

#[test]
fn malformed_yaml_is_an_error() {
    let file = write_yaml("rules: [not, a, map]\n");
    assert!(NavConfig::load(file.path()).is_err());
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = NavConfig::load_or_default(&dir.path().join("flotilla.yaml")).expect("defaults");
    assert_eq!(config, NavConfig::default());
}

#[test]
fn config_round_trips_through_yaml() {
    let mut config = NavConfig::default();
    config.field.edge_margin = 2.5;
    config.scoring.tie_epsilon = 0.5;

    let yaml = serde_yaml::to_string(&config).expect("serialize");
    let file = write_yaml(&yaml);
    assert_eq!(NavConfig::load(file.path()).expect("reload"), config);
}
