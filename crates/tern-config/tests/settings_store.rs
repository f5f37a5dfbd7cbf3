use anyhow::Result;
use tern_config::{ConfigError, LogFormatSetting, Settings, SettingsStore};
use tern_core::{BootstrapNode, ProxyType, SEED_NODES};

#[tokio::test]
async fn missing_file_loads_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SettingsStore::in_directory(dir.path());
    assert_eq!(store.load().await?, Settings::default());
    Ok(())
}

#[tokio::test]
async fn saved_settings_load_back() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));
    let (host, port, key) = SEED_NODES[2];
    let settings = Settings {
        udp_enabled: true,
        proxy_type: ProxyType::Http,
        proxy_address: "proxy.local".into(),
        proxy_port: 8080,
        bootstrap_nodes: vec![BootstrapNode::parse(host, port, key)?],
        log_level: "debug".into(),
        log_format: LogFormatSetting::Json,
    };
    store.save(&settings).await?;
    assert_eq!(store.load().await?, settings);
    assert!(!store.path().with_extension("json.tmp").exists());
    Ok(())
}

#[tokio::test]
async fn proxy_type_is_persisted_as_integer() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SettingsStore::in_directory(dir.path());
    store
        .update(|settings| settings.proxy_type = ProxyType::Socks5)
        .await?;
    let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(store.path())?)?;
    assert_eq!(raw["proxy_type"], serde_json::json!(2));
    Ok(())
}

#[tokio::test]
async fn out_of_range_proxy_type_falls_back_to_none() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SettingsStore::in_directory(dir.path());
    std::fs::write(
        store.path(),
        br#"{"proxy_type": 42, "proxy_address": "x", "udp_enabled": true}"#,
    )?;
    let settings = store.load().await?;
    assert_eq!(settings.proxy_type, ProxyType::None);
    assert!(settings.udp_enabled);
    Ok(())
}

#[tokio::test]
async fn corrupt_document_is_an_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SettingsStore::in_directory(dir.path());
    std::fs::write(store.path(), b"[1, 2, 3]")?;
    assert!(matches!(
        store.load().await,
        Err(ConfigError::InvalidDocument { .. })
    ));
    Ok(())
}
