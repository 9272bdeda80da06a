use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use shared::protocol::DEFAULT_VOICE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: Option<String>,
    pub auth_url: Option<String>,
    pub auth_anon_key: Option<String>,
    pub site_origin: String,
    pub handoff_database_url: String,
    pub voice: String,
    pub advance_grace_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: None,
            auth_url: None,
            auth_anon_key: None,
            site_origin: "http://localhost:3000".into(),
            handoff_database_url: "sqlite://./data/presenter.db".into(),
            voice: DEFAULT_VOICE.into(),
            advance_grace_ms: 1500,
        }
    }
}

impl Settings {
    pub fn advance_grace(&self) -> Duration {
        Duration::from_millis(self.advance_grace_ms)
    }
}

/// Keys accepted in `presenter.toml`; all optional.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_url: Option<String>,
    auth_url: Option<String>,
    auth_anon_key: Option<String>,
    site_origin: Option<String>,
    handoff_database_url: Option<String>,
    voice: Option<String>,
    advance_grace_ms: Option<u64>,
}

pub fn load_settings(config_path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    if config_path.exists() {
        let raw = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file {}", config_path.display()))?;
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if file_cfg.api_url.is_some() {
        settings.api_url = file_cfg.api_url;
    }
    if file_cfg.auth_url.is_some() {
        settings.auth_url = file_cfg.auth_url;
    }
    if file_cfg.auth_anon_key.is_some() {
        settings.auth_anon_key = file_cfg.auth_anon_key;
    }
    if let Some(v) = file_cfg.site_origin {
        settings.site_origin = v;
    }
    if let Some(v) = file_cfg.handoff_database_url {
        settings.handoff_database_url = v;
    }
    if let Some(v) = file_cfg.voice {
        settings.voice = v;
    }
    if let Some(v) = file_cfg.advance_grace_ms {
        settings.advance_grace_ms = v;
    }
    Ok(())
}

/// Later keys win: the `APP__` form overrides the plain one.
fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    let first = |keys: &[&str]| {
        keys.iter()
            .rev()
            .find_map(|key| var(key).filter(|value| !value.trim().is_empty()))
    };

    if let Some(v) = first(&["PRESENTATION_API_URL", "APP__API_URL"]) {
        settings.api_url = Some(v);
    }
    if let Some(v) = first(&["AUTH_URL", "APP__AUTH_URL"]) {
        settings.auth_url = Some(v);
    }
    if let Some(v) = first(&["AUTH_ANON_KEY", "APP__AUTH_ANON_KEY"]) {
        settings.auth_anon_key = Some(v);
    }
    if let Some(v) = first(&["SITE_ORIGIN", "APP__SITE_ORIGIN"]) {
        settings.site_origin = v;
    }
    if let Some(v) = first(&["HANDOFF_DATABASE_URL", "APP__HANDOFF_DATABASE_URL"]) {
        settings.handoff_database_url = v;
    }
    if let Some(v) = first(&["APP__VOICE"]) {
        settings.voice = v;
    }
    if let Some(v) = first(&["APP__ADVANCE_GRACE_MS"]) {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.advance_grace_ms = parsed;
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
