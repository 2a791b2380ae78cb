//! Layered configuration loading

use crate::integration::test_utils::with_env;
use capes::config::{CapesConfig, ConfigLoader};
use std::fs;
use tempfile::TempDir;

fn write(path: &std::path::Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn test_defaults_without_files() {
    let dir = TempDir::new().unwrap();
    let config = with_env(&dir, &[], || ConfigLoader::load(dir.path()).unwrap());
    assert_eq!(config, CapesConfig::default());
}

#[test]
fn test_workspace_file_and_env_overlay() {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("config/config.toml"),
        r#"
[resolver]
freshness_window_secs = 60
public_base_url = "http://localhost:8080"
"#,
    );
    write(
        &dir.path().join("config/staging.toml"),
        r#"
[resolver]
freshness_window_secs = 120
"#,
    );

    let base = with_env(&dir, &[], || ConfigLoader::load(dir.path()).unwrap());
    assert_eq!(base.resolver.freshness_window_secs, 60);
    assert_eq!(base.resolver.public_base_url, "http://localhost:8080");

    let staging = with_env(&dir, &[("CAPES_ENV", "staging")], || {
        ConfigLoader::load(dir.path()).unwrap()
    });
    assert_eq!(staging.resolver.freshness_window_secs, 120);
    assert_eq!(staging.resolver.public_base_url, "http://localhost:8080");
    assert_eq!(staging.resolver.upstream_timeout_ms, 10_000);
}

#[test]
fn test_environment_variables_win() {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("config/config.toml"),
        "[resolver]\nfreshness_window_secs = 60\n",
    );

    let config = with_env(
        &dir,
        &[("CAPES__RESOLVER__FRESHNESS_WINDOW_SECS", "5")],
        || ConfigLoader::load(dir.path()).unwrap(),
    );
    assert_eq!(config.resolver.freshness_window_secs, 5);
}

#[test]
fn test_global_file_under_workspace_file() {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("xdg/capes/config.toml"),
        r#"
[resolver]
upstream_timeout_ms = 2500
freshness_window_secs = 30

[identity]
user_agent = "capes-test"
"#,
    );
    write(
        &dir.path().join("config/config.toml"),
        "[resolver]\nfreshness_window_secs = 90\n",
    );

    let (config, global_path) = with_env(&dir, &[], || {
        (
            ConfigLoader::load(dir.path()).unwrap(),
            ConfigLoader::xdg_config_path().unwrap(),
        )
    });

    assert_eq!(global_path, dir.path().join("xdg/capes/config.toml"));
    assert_eq!(config.resolver.upstream_timeout_ms, 2_500);
    assert_eq!(config.resolver.freshness_window_secs, 90);
    assert_eq!(config.identity.user_agent, "capes-test");
}

#[test]
fn test_added_provider_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("config/config.toml"),
        r#"
[providers.minecraftcapes]
url = "https://api.minecraftcapes.net/profile/{id}/cape"

[providers.minecraftcapes.capabilities]
supports_animation = true
"#,
    );

    let config = with_env(&dir, &[], || ConfigLoader::load(dir.path()).unwrap());

    assert!(config.providers.contains_key("optifine"));
    let added = &config.providers["minecraftcapes"];
    assert!(added.enabled);
    assert!(added.capabilities.supports_animation);
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_from_file_ignores_other_sources() {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("config/config.toml"),
        "[resolver]\nfreshness_window_secs = 60\n",
    );
    let explicit = dir.path().join("explicit.toml");
    write(&explicit, "[storage]\nrecords_path = \"/var/lib/capes/records\"\n");

    let config = with_env(&dir, &[], || ConfigLoader::load_from_file(&explicit).unwrap());

    assert_eq!(config.resolver.freshness_window_secs, 600);
    assert_eq!(
        config.storage.records_path,
        std::path::PathBuf::from("/var/lib/capes/records")
    );
}

#[test]
fn test_invalid_values_fail_validation() {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("config/config.toml"),
        "[resolver]\nupstream_timeout_ms = 0\n\n[logging]\nformat = \"xml\"\n",
    );

    let config = with_env(&dir, &[], || ConfigLoader::load(dir.path()).unwrap());
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 2);
}
