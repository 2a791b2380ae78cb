//! Command dispatch through RunContext

use crate::integration::test_utils::with_env;
use capes::cli::{exit_code, Commands, RunContext};
use tempfile::TempDir;

fn context(dir: &TempDir) -> RunContext {
    with_env(dir, &[], || RunContext::new(dir.path().to_path_buf(), None).unwrap())
}

#[tokio::test]
async fn test_types_lists_configured_providers() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let out = ctx.execute(&Commands::Types).await.unwrap();
    assert!(out.contains("optifine"));
    assert!(dir.path().join(".capes/content").is_dir());
}

#[tokio::test]
async fn test_config_prints_effective_toml() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let out = ctx.execute(&Commands::Config).await.unwrap();
    assert!(out.contains("freshness_window_secs = 600"));
    assert!(out.contains("[providers.optifine]"));
}

#[tokio::test]
async fn test_stats_on_empty_store() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let json = ctx
        .execute(&Commands::Stats {
            format: "json".to_string(),
        })
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["total"], 0);

    let err = ctx
        .execute(&Commands::Stats {
            format: "yaml".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(exit_code(&err), 1);
}

#[tokio::test]
async fn test_unknown_record_and_bad_type() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let err = ctx
        .execute(&Commands::Get {
            record_id: "0".repeat(64),
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No record with id"));

    let err = ctx
        .execute(&Commands::Resolve {
            player: "Notch".to_string(),
            cape_type: Some("labymod".to_string()),
        })
        .await
        .unwrap_err();
    assert_eq!(exit_code(&err), 2);
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("config")).unwrap();
    std::fs::write(
        dir.path().join("config/config.toml"),
        "[providers.optifine]\nurl = \"http://s.optifine.net/capes/{name}.png\"\nenabled = false\n",
    )
    .unwrap();

    let result = with_env(&dir, &[], || RunContext::new(dir.path().to_path_buf(), None));
    let err = result.err().unwrap();
    assert!(format!("{:#}", err).contains("at least one provider must be enabled"));
}
