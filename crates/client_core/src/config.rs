use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "kinrecall.toml";
const CHECKOUT_PATH: &str = "/api/create-checkout-session";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub site_url: String,
    pub checkout_url: Option<String>,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_anon_key: None,
            site_url: "http://localhost:5173".into(),
            checkout_url: None,
            log_level: "info".into(),
        }
    }
}

/// Where the remote identity/data service lives.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub url: Url,
    pub anon_key: String,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

impl Settings {
    /// `None` unless both the service url and the anon key are set.
    pub fn remote(&self) -> anyhow::Result<Option<RemoteConfig>> {
        let (Some(url), Some(anon_key)) = (
            non_empty(self.supabase_url.as_deref()),
            non_empty(self.supabase_anon_key.as_deref()),
        ) else {
            return Ok(None);
        };

        let url = Url::parse(url).with_context(|| format!("invalid supabase url '{url}'"))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("supabase url must be http(s), got '{url}'");
        }
        Ok(Some(RemoteConfig {
            url,
            anon_key: anon_key.to_string(),
        }))
    }

    pub fn checkout_endpoint(&self) -> anyhow::Result<Url> {
        if let Some(raw) = non_empty(self.checkout_url.as_deref()) {
            return Url::parse(raw).with_context(|| format!("invalid checkout url '{raw}'"));
        }
        let site = Url::parse(self.site_url.trim())
            .with_context(|| format!("invalid site url '{}'", self.site_url))?;
        site.join(CHECKOUT_PATH)
            .with_context(|| format!("cannot derive checkout url from '{site}'"))
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| keys.iter().find_map(|key| lookup(*key));

        if let Some(v) = first(&["APP__SUPABASE_URL", "SUPABASE_URL", "VITE_SUPABASE_URL"]) {
            self.supabase_url = Some(v);
        }
        if let Some(v) = first(&[
            "APP__SUPABASE_ANON_KEY",
            "SUPABASE_ANON_KEY",
            "VITE_SUPABASE_ANON_KEY",
        ]) {
            self.supabase_anon_key = Some(v);
        }
        if let Some(v) = first(&["APP__SITE_URL"]) {
            self.site_url = v;
        }
        if let Some(v) = first(&["APP__CHECKOUT_URL"]) {
            self.checkout_url = Some(v);
        }
        if let Some(v) = first(&["APP__LOG_LEVEL"]) {
            self.log_level = v;
        }
    }
}

pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("KINRECALL_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Defaults, then the TOML file if it exists, then environment overrides.
pub fn load_settings(explicit: Option<&Path>) -> anyhow::Result<Settings> {
    let path = config_path(explicit);
    let mut settings = read_settings_file(&path)?;
    settings.apply_overrides(|key| std::env::var(key).ok());
    Ok(settings)
}

fn read_settings_file(path: &Path) -> anyhow::Result<Settings> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };
    toml::from_str(&raw).with_context(|| format!("failed to parse '{}'", path.display()))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
