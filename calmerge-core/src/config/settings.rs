//! Engine settings loaded from defaults, an optional TOML file and `CALMERGE_*` env vars.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{CalMergeError, CalMergeResult};

/// Top-level settings, at ~/.config/calmerge/config.toml by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fetch: FetchSettings,
    pub budget: BudgetSettings,
    pub merge: MergeSettings,
    pub site: SiteSettings,
    pub meetup: MeetupSettings,
    pub domain_configs: DomainConfigSettings,
    /// TOML catalog of merged calendars and their sources.
    pub calendars_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub freshness_secs: u64,
    pub max_stale_secs: u64,
    pub default_timeout_secs: u64,
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            freshness_secs: FETCH_FRESHNESS_SECS,
            max_stale_secs: FETCH_MAX_STALE_SECS,
            default_timeout_secs: FETCH_DEFAULT_TIMEOUT_SECS,
            user_agent: USER_AGENT.to_string(),
            accept: ACCEPT.to_string(),
            accept_language: ACCEPT_LANGUAGE.to_string(),
        }
    }
}

impl FetchSettings {
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    pub fn max_stale(&self) -> Duration {
        Duration::from_secs(self.max_stale_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    pub max_total_secs: u64,
    pub safety_buffer_secs: u64,
    pub min_per_source_secs: u64,
    /// Stop starting new sources once `max_total_secs` has elapsed.
    pub enforce_deadline: bool,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        BudgetSettings {
            max_total_secs: MAX_TOTAL_TIMEOUT_SECS,
            safety_buffer_secs: SAFETY_BUFFER_SECS,
            min_per_source_secs: MIN_PER_SOURCE_TIMEOUT_SECS,
            enforce_deadline: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
    pub default_refresh_secs: u64,
    pub min_refresh_secs: u64,
    pub cache_bypass_secs: u64,
    pub cache_bypass_ttl_secs: u64,
    pub free_tier_max_age_secs: u64,
}

impl Default for MergeSettings {
    fn default() -> Self {
        MergeSettings {
            default_refresh_secs: DEFAULT_REFRESH_SECS,
            min_refresh_secs: MIN_REFRESH_SECS,
            cache_bypass_secs: CACHE_BYPASS_SECS,
            cache_bypass_ttl_secs: CACHE_BYPASS_TTL_SECS,
            free_tier_max_age_secs: FREE_TIER_MAX_AGE_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    /// Public base URL; feeds on this host are treated as local references.
    pub base_url: String,
    pub product_name: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        SiteSettings {
            base_url: SITE_URL.to_string(),
            product_name: PRODUCT_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetupSettings {
    pub api_base_url: String,
    pub timeout_secs: u64,
}

impl Default for MeetupSettings {
    fn default() -> Self {
        MeetupSettings {
            api_base_url: MEETUP_API_BASE_URL.to_string(),
            timeout_secs: MEETUP_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfigSettings {
    /// Environment variable holding the base64 decryption key.
    pub key_env: String,
    /// Base64 encrypted blobs, one per domain.
    pub encrypted: Vec<String>,
}

impl Default for DomainConfigSettings {
    fn default() -> Self {
        DomainConfigSettings {
            key_env: DOMAIN_CONFIG_KEY_ENV.to_string(),
            encrypted: Vec::new(),
        }
    }
}

impl Settings {
    pub fn config_path() -> CalMergeResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalMergeError::Config("Could not determine config directory".into()))?
            .join("calmerge");

        Ok(config_dir.join("config.toml"))
    }

    /// The calendar catalog: `calendars_file`, or `calendars.toml` next to the config file.
    pub fn calendars_path(&self) -> CalMergeResult<PathBuf> {
        match &self.calendars_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_path()?.with_file_name("calendars.toml")),
        }
    }

    /// Load from the default config path (if present) and the environment.
    pub fn load() -> CalMergeResult<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load from `path` (optional) layered under `CALMERGE_*` environment variables.
    pub fn load_from(path: &Path) -> CalMergeResult<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix("CALMERGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CalMergeError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalMergeError::Config(e.to_string()))?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let settings = Settings::default();
        assert_eq!(settings.fetch.freshness(), Duration::from_secs(120));
        assert_eq!(settings.fetch.max_stale(), Duration::from_secs(7 * 24 * 3600));
        assert_eq!(settings.budget.max_total_secs, 60);
        assert_eq!(settings.merge.default_refresh_secs, 43_200);
        assert!(settings.budget.enforce_deadline);
    }

    #[test]
    fn test_load_from_partial_toml_file() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "calendars_file = \"/srv/calendars.toml\"\n\n\
             [budget]\nmin_per_source_secs = 8\n\n\
             [site]\nbase_url = \"https://merge.example.org\"\n",
        )
        .expect("Should write config");

        let settings = Settings::load_from(&path).expect("Should load settings");

        assert_eq!(settings.budget.min_per_source_secs, 8);
        assert_eq!(settings.budget.max_total_secs, 60, "Unset keys keep defaults");
        assert_eq!(settings.site.base_url, "https://merge.example.org");
        assert_eq!(
            settings.calendars_file.as_deref(),
            Some(Path::new("/srv/calendars.toml"))
        );
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let settings =
            Settings::load_from(&dir.path().join("nope.toml")).expect("Should load defaults");
        assert_eq!(settings.fetch.default_timeout_secs, 30);
    }
}
