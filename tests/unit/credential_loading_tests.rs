//! Unit tests for platform credential loading.
//!
//! The keychain is unavailable in CI, so these exercise the env-var
//! fallback path. `serial_test` keeps the shared env var race-free.

use care_relay::config::GlobalConfig;
use serial_test::serial;

const MINIMAL: &str = r#"
[inference]
endpoint = "http://localhost:11434"
model = "child-risk-screener"

[platform]
base_url = "https://platform.example"
"#;

#[tokio::test]
#[serial]
async fn env_var_fallback_populates_token() {
    std::env::set_var("PLATFORM_API_TOKEN", "tok-123");

    let mut config = GlobalConfig::from_toml_str(MINIMAL).expect("valid config");
    config.load_credentials().await.expect("credentials");

    assert_eq!(config.platform.api_token, "tok-123");
    std::env::remove_var("PLATFORM_API_TOKEN");
}

#[tokio::test]
#[serial]
async fn missing_credential_is_a_config_error() {
    std::env::remove_var("PLATFORM_API_TOKEN");

    let mut config = GlobalConfig::from_toml_str(MINIMAL).expect("valid config");
    let result = config.load_credentials().await;

    assert!(result.is_err(), "expected credential load failure");
}
