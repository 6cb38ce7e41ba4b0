//! Loading settings from TOML

use crate::prelude::*;
use similar_asserts::assert_eq;

#[test]
fn load_reads_engine_and_bus_tables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rebus.toml");
    std::fs::write(
        &path,
        r#"
[engine]
default_unref_dispose = "250ms"

[bus]
detach_on_clean_exit = true
close_on_release = false
"#,
    )
    .unwrap();

    let config = RebusConfig::load(&path).unwrap();
    assert_eq!(
        config.engine.default_unref_dispose,
        Duration::from_millis(250)
    );
    assert!(config.bus.detach_on_clean_exit);
    assert!(!config.bus.close_on_release);
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = RebusConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}

#[tokio::test(start_paused = true)]
async fn loaded_grace_period_applies_to_directives() {
    let config = RebusConfig::parse("[engine]\ndefault_unref_dispose = \"1s\"\n").unwrap();
    let bus = Bus::from_config(&config);
    let (instance, reference) = bus
        .add_directive(Boilerplate::new("x").shared(), RecordingHandler::new().shared())
        .unwrap();

    reference.release();
    assert!(!instance.is_released());
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(instance.is_released());
}
