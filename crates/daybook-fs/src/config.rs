use crate::workspace::WorkspacePaths;
use daybook_core::{DaybookError, DaybookResult, StoreMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_PROFILE: &str = "default";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:54321";
pub const API_KEY_ENV: &str = "DAYBOOK_API_KEY";

const DEFAULT_TABLE: &str = "notes";
const DEFAULT_BUCKET: &str = "images";
const DEFAULT_PAGE_SIZE: usize = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_UPLOAD_MAX_DIMENSION: u32 = 1280;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub version: u32,
    pub active_profile: String,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub mode: StoreMode,
    #[serde(default = "default_upload_max_dimension")]
    pub upload_max_dimension: u32,
}

impl ProfileConfig {
    pub fn with_server(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            api_key: None,
            table: default_table(),
            bucket: default_bucket(),
            page_size: DEFAULT_PAGE_SIZE,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            mode: StoreMode::default(),
            upload_max_dimension: DEFAULT_UPLOAD_MAX_DIMENSION,
        }
    }
}

/// Optional overrides for `profile set`. Unset fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct ProfileSettings {
    pub server: Option<String>,
    pub api_key: Option<String>,
    pub mode: Option<StoreMode>,
    pub page_size: Option<usize>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub name: String,
    pub active: bool,
    pub server: String,
    pub mode: StoreMode,
    pub has_api_key: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedProfile {
    pub name: String,
    pub server: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub table: String,
    pub bucket: String,
    pub page_size: usize,
    pub connect_timeout_secs: u64,
    pub mode: StoreMode,
    pub upload_max_dimension: u32,
}

impl WorkspaceConfig {
    pub fn with_default_server(server: impl Into<String>) -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            DEFAULT_PROFILE.to_string(),
            ProfileConfig::with_server(server),
        );

        Self {
            version: CONFIG_VERSION,
            active_profile: DEFAULT_PROFILE.to_string(),
            profiles,
        }
    }

    pub fn ensure_defaults(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }

        if self.profiles.is_empty() {
            self.profiles.insert(
                DEFAULT_PROFILE.to_string(),
                ProfileConfig::with_server(DEFAULT_SERVER_URL),
            );
        }

        for profile in self.profiles.values_mut() {
            if profile.page_size == 0 {
                profile.page_size = DEFAULT_PAGE_SIZE;
            }
            if profile.upload_max_dimension == 0 {
                profile.upload_max_dimension = DEFAULT_UPLOAD_MAX_DIMENSION;
            }
        }

        if !self.profiles.contains_key(&self.active_profile) {
            self.active_profile = self
                .profiles
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        }
    }
}

pub fn load_config(paths: &WorkspacePaths) -> DaybookResult<WorkspaceConfig> {
    let contents = fs::read_to_string(&paths.config_path).map_err(|err| {
        DaybookError::io(format!(
            "failed to read workspace config '{}': {}",
            paths.config_path.display(),
            err
        ))
    })?;

    let mut config: WorkspaceConfig = toml::from_str(&contents).map_err(|err| {
        DaybookError::usage(format!(
            "failed to parse workspace config '{}': {}",
            paths.config_path.display(),
            err
        ))
    })?;
    config.ensure_defaults();
    Ok(config)
}

pub fn save_config(paths: &WorkspacePaths, config: &WorkspaceConfig) -> DaybookResult<()> {
    let serialized = toml::to_string_pretty(config)
        .map_err(|err| DaybookError::io(format!("failed to encode config.toml: {err}")))?;

    fs::write(&paths.config_path, serialized).map_err(|err| {
        DaybookError::io(format!(
            "failed to write workspace config '{}': {}",
            paths.config_path.display(),
            err
        ))
    })
}

pub fn list_profiles(config: &WorkspaceConfig) -> Vec<ProfileView> {
    config
        .profiles
        .iter()
        .map(|(name, profile)| ProfileView {
            name: name.clone(),
            active: name == &config.active_profile,
            server: profile.server.clone(),
            mode: profile.mode,
            has_api_key: profile.api_key.is_some(),
        })
        .collect()
}

pub fn set_active_profile(config: &mut WorkspaceConfig, name: &str) -> DaybookResult<()> {
    if !config.profiles.contains_key(name) {
        return Err(DaybookError::usage(format!(
            "profile '{name}' not found in workspace config"
        )));
    }

    config.active_profile = name.to_string();
    Ok(())
}

/// Creates the profile when missing; otherwise only the server changes.
pub fn set_profile_server(config: &mut WorkspaceConfig, name: &str, server: &str) {
    config
        .profiles
        .entry(name.to_string())
        .and_modify(|profile| profile.server = server.to_string())
        .or_insert_with(|| ProfileConfig::with_server(server));

    if config.active_profile.is_empty() {
        config.active_profile = name.to_string();
    }
}

pub fn apply_profile_settings(
    config: &mut WorkspaceConfig,
    name: &str,
    settings: &ProfileSettings,
) -> DaybookResult<()> {
    if let Some(server) = settings.server.as_deref() {
        set_profile_server(config, name, server);
    }

    let profile = config.profiles.get_mut(name).ok_or_else(|| {
        DaybookError::usage(format!(
            "profile '{name}' not found; pass --server to create it"
        ))
    })?;

    if let Some(api_key) = settings.api_key.as_deref() {
        profile.api_key = Some(api_key.trim().to_string()).filter(|key| !key.is_empty());
    }
    if let Some(mode) = settings.mode {
        profile.mode = mode;
    }
    if let Some(page_size) = settings.page_size {
        if page_size == 0 {
            return Err(DaybookError::usage("page size must be greater than zero"));
        }
        profile.page_size = page_size;
    }
    if let Some(timeout) = settings.connect_timeout_secs {
        profile.connect_timeout_secs = timeout;
    }

    Ok(())
}

pub fn resolve_profile(
    config: &WorkspaceConfig,
    profile_override: Option<&str>,
    server_override: Option<&str>,
) -> DaybookResult<ResolvedProfile> {
    let requested_profile = profile_override.unwrap_or(&config.active_profile);
    let profile = config.profiles.get(requested_profile).ok_or_else(|| {
        DaybookError::usage(format!(
            "profile '{requested_profile}' not found in workspace config"
        ))
    })?;

    let server = server_override
        .unwrap_or(profile.server.as_str())
        .to_string();
    let api_key = std::env::var(API_KEY_ENV)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .or_else(|| profile.api_key.clone());

    Ok(ResolvedProfile {
        name: requested_profile.to_string(),
        server,
        api_key,
        table: profile.table.clone(),
        bucket: profile.bucket.clone(),
        page_size: profile.page_size,
        connect_timeout_secs: profile.connect_timeout_secs,
        mode: profile.mode,
        upload_max_dimension: profile.upload_max_dimension,
    })
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_upload_max_dimension() -> u32 {
    DEFAULT_UPLOAD_MAX_DIMENSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_profile_table_gets_defaults() {
        let mut config: WorkspaceConfig = toml::from_str(
            r#"
version = 1
active_profile = "home"

[profiles.home]
server = "https://db.example"
page_size = 0
"#,
        )
        .expect("parse config");
        config.ensure_defaults();

        let home = config.profiles.get("home").expect("home profile");
        assert_eq!(home.table, "notes");
        assert_eq!(home.bucket, "images");
        assert_eq!(home.page_size, 10);
        assert_eq!(home.connect_timeout_secs, 10);
        assert_eq!(home.mode, StoreMode::Auto);
        assert_eq!(home.upload_max_dimension, 1280);
    }

    #[test]
    fn missing_active_profile_falls_back_to_first() {
        let mut config = WorkspaceConfig::with_default_server("https://a.example");
        config.active_profile = "gone".to_string();
        config.ensure_defaults();
        assert_eq!(config.active_profile, DEFAULT_PROFILE);
    }

    #[test]
    fn server_override_wins() {
        let config = WorkspaceConfig::with_default_server("https://a.example");
        let resolved =
            resolve_profile(&config, None, Some("https://b.example")).expect("resolve profile");
        assert_eq!(resolved.server, "https://b.example");
        assert_eq!(resolved.page_size, 10);
    }

    #[test]
    fn settings_require_existing_profile_or_server() {
        let mut config = WorkspaceConfig::with_default_server("https://a.example");
        let err = apply_profile_settings(
            &mut config,
            "work",
            &ProfileSettings {
                mode: Some(StoreMode::Local),
                ..ProfileSettings::default()
            },
        )
        .expect_err("unknown profile");
        assert_eq!(err.kind, daybook_core::ErrorKind::Usage);

        apply_profile_settings(
            &mut config,
            "work",
            &ProfileSettings {
                server: Some("https://work.example".to_string()),
                mode: Some(StoreMode::Local),
                api_key: Some("secret".to_string()),
                ..ProfileSettings::default()
            },
        )
        .expect("create profile");
        let work = config.profiles.get("work").expect("work profile");
        assert_eq!(work.mode, StoreMode::Local);
        assert_eq!(work.api_key.as_deref(), Some("secret"));
    }
}
