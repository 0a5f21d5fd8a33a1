use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use url::Url;

use crate::error::StoreError;

pub const DEFAULT_RETURN_URL: &str = "app://xpayment.com.xsolla.unitysample";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub token_endpoint_base: String,
    pub return_url: String,
    pub sandbox: bool,
    /// Unset means the token request waits for the transport indefinitely.
    pub token_request_timeout_secs: Option<u64>,
    pub price_placeholder: String,
    pub firebase_api_key: Option<String>,
    pub firebase_auth_base: String,
    pub xsolla_project_id: Option<String>,
    pub xsolla_store_api: String,
    pub catalog_limit: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            token_endpoint_base: "http://127.0.0.1:5001/demo-project/us-central1".into(),
            return_url: DEFAULT_RETURN_URL.into(),
            sandbox: true,
            token_request_timeout_secs: None,
            price_placeholder: String::new(),
            firebase_api_key: None,
            firebase_auth_base: "https://identitytoolkit.googleapis.com/v1".into(),
            xsolla_project_id: None,
            xsolla_store_api: "https://store.xsolla.com".into(),
            catalog_limit: 50,
        }
    }
}

impl StoreSettings {
    pub fn token_request_timeout(&self) -> Option<Duration> {
        self.token_request_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        for (name, value) in [
            ("token_endpoint_base", &self.token_endpoint_base),
            ("firebase_auth_base", &self.firebase_auth_base),
            ("xsolla_store_api", &self.xsolla_store_api),
        ] {
            let parsed = Url::parse(value)
                .map_err(|err| StoreError::Config(format!("{name} '{value}': {err}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(StoreError::Config(format!(
                    "{name} must be an http(s) url, got '{value}'"
                )));
            }
        }
        if self.catalog_limit == 0 {
            return Err(StoreError::Config(
                "catalog_limit must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

pub fn load_settings(path: &Path) -> anyhow::Result<StoreSettings> {
    load_settings_with_env(path, |key| std::env::var(key).ok())
}

pub(crate) fn load_settings_with_env(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<StoreSettings> {
    let mut settings = if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        toml::from_str::<StoreSettings>(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?
    } else {
        StoreSettings::default()
    };

    apply_env_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

// `APP__*` keys win over the plain ones.
fn lookup(env: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter().rev().find_map(|key| env(key))
}

pub(crate) fn apply_env_overrides(
    settings: &mut StoreSettings,
    env: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup(&env, &["STORE_TOKEN_ENDPOINT_BASE", "APP__TOKEN_ENDPOINT_BASE"]) {
        settings.token_endpoint_base = v;
    }
    if let Some(v) = lookup(&env, &["STORE_RETURN_URL", "APP__RETURN_URL"]) {
        settings.return_url = v;
    }
    if let Some(v) = lookup(&env, &["STORE_SANDBOX", "APP__SANDBOX"]) {
        match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => settings.sandbox = true,
            "0" | "false" | "no" => settings.sandbox = false,
            _ => {}
        }
    }
    if let Some(v) = lookup(
        &env,
        &["STORE_TOKEN_TIMEOUT_SECS", "APP__TOKEN_TIMEOUT_SECS"],
    ) {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.token_request_timeout_secs = Some(parsed);
        }
    }
    if let Some(v) = lookup(&env, &["STORE_PRICE_PLACEHOLDER", "APP__PRICE_PLACEHOLDER"]) {
        settings.price_placeholder = v;
    }
    if let Some(v) = lookup(&env, &["FIREBASE_API_KEY", "APP__FIREBASE_API_KEY"]) {
        settings.firebase_api_key = Some(v);
    }
    if let Some(v) = lookup(&env, &["FIREBASE_AUTH_BASE", "APP__FIREBASE_AUTH_BASE"]) {
        settings.firebase_auth_base = v;
    }
    if let Some(v) = lookup(&env, &["XSOLLA_PROJECT_ID", "APP__XSOLLA_PROJECT_ID"]) {
        settings.xsolla_project_id = Some(v);
    }
    if let Some(v) = lookup(&env, &["XSOLLA_STORE_API", "APP__XSOLLA_STORE_API"]) {
        settings.xsolla_store_api = v;
    }
    if let Some(v) = lookup(&env, &["STORE_CATALOG_LIMIT", "APP__CATALOG_LIMIT"]) {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.catalog_limit = parsed;
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
