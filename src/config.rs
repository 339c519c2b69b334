use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::Cli;
use crate::controller::{Strategy, strategies_with_timeouts};
use crate::provider::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, validate_model_name};
use crate::retry::RetryPolicy;
use crate::search::DEFAULT_SERPER_BASE_URL;

pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const SERPER_API_KEY_ENV: &str = "SERPER_API_KEY";

const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SEARCH_RESULTS: usize = 10;
const MAX_SEARCH_RESULTS: usize = 20;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub profile: String,
    pub config_path: String,
    pub model: String,
    pub temperature: f32,
    pub gemini_base_url: String,
    pub serper_base_url: String,
    /// Bound on a single HTTP request; the strategy timeout bounds the whole attempt.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub strategies: Vec<Strategy>,
    pub search_results: usize,
    pub output_dir: String,
    pub telemetry_enabled: bool,
    pub telemetry_path: String,
    pub show_sensitive_config: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub gemini_base_url: Option<String>,
    pub serper_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub base_delay_secs: Option<u64>,
    pub max_delay_secs: Option<u64>,
    pub overload_floor_secs: Option<u64>,
    pub jitter_min: Option<f64>,
    pub jitter_max: Option<f64>,
    pub full_timeout_secs: Option<u64>,
    pub quick_timeout_secs: Option<u64>,
    pub emergency_timeout_secs: Option<u64>,
    pub search_results: Option<usize>,
    pub output_dir: Option<String>,
    pub telemetry_enabled: Option<bool>,
    pub telemetry_path: Option<String>,
}

pub fn load_profiles(config_path: &str) -> Result<ProfilesFile> {
    let path = Path::new(config_path);
    if !path.exists() {
        return Ok(ProfilesFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile config file at '{}'", path.display()))?;
    toml::from_str::<ProfilesFile>(&content).with_context(|| {
        format!(
            "invalid profile configuration in '{}'. Check field names and value types.",
            path.display()
        )
    })
}

fn select_profile(cli: &Cli, profiles: &ProfilesFile) -> Result<ProfileConfig> {
    let selected = cli.profile.trim();
    if selected.is_empty() {
        return Err(anyhow::anyhow!(
            "profile name cannot be empty. Set --profile <name>."
        ));
    }
    if selected == "default" && !profiles.profiles.contains_key("default") {
        return Ok(ProfileConfig::default());
    }

    profiles.profiles.get(selected).cloned().ok_or_else(|| {
        let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
        names.sort();
        if names.is_empty() {
            anyhow::anyhow!(
                "profile '{}' not found in '{}'. No profiles are defined yet.",
                selected,
                cli.config_path
            )
        } else {
            anyhow::anyhow!(
                "profile '{}' not found in '{}'. Available profiles: {}",
                selected,
                cli.config_path,
                names.join(", ")
            )
        }
    })
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

/// Resolve settings with precedence CLI > profile > built-in default.
pub fn resolve_runtime_config(cli: &Cli, profiles: &ProfilesFile) -> Result<RuntimeConfig> {
    let profile = select_profile(cli, profiles)?;
    let defaults = RetryPolicy::default();

    let model = cli
        .model
        .clone()
        .or(profile.model)
        .map(|model| model.trim().to_string())
        .filter(|model| !model.is_empty())
        .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
    validate_model_name(&model)?;

    let temperature = cli
        .temperature
        .or(profile.temperature)
        .unwrap_or(DEFAULT_TEMPERATURE);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(anyhow::anyhow!(
            "temperature {} is out of range; expected 0.0..=2.0",
            temperature
        ));
    }

    let max_delay = profile
        .max_delay_secs
        .map(secs)
        .unwrap_or(defaults.max_delay);
    let retry = RetryPolicy {
        max_retries: cli
            .max_retries
            .or(profile.max_retries)
            .unwrap_or(defaults.max_retries),
        base_delay: cli
            .base_delay_secs
            .or(profile.base_delay_secs)
            .map(secs)
            .unwrap_or(defaults.base_delay),
        max_delay,
        // An unset floor follows a lowered cap; an explicit one must fit under it.
        overload_floor: profile
            .overload_floor_secs
            .map(secs)
            .unwrap_or(defaults.overload_floor.min(max_delay)),
        jitter_min: profile.jitter_min.unwrap_or(defaults.jitter_min),
        jitter_max: profile.jitter_max.unwrap_or(defaults.jitter_max),
    };
    retry
        .validate()
        .with_context(|| format!("invalid retry settings for profile '{}'", cli.profile.trim()))?;

    let strategies = strategies_with_timeouts(
        secs(profile.full_timeout_secs.unwrap_or(600)),
        secs(profile.quick_timeout_secs.unwrap_or(300)),
        secs(profile.emergency_timeout_secs.unwrap_or(120)),
    );
    if let Some(strategy) = strategies.iter().find(|s| s.timeout.is_zero()) {
        return Err(anyhow::anyhow!(
            "timeout for '{}' must be at least 1 second",
            strategy.name
        ));
    }

    Ok(RuntimeConfig {
        profile: cli.profile.trim().to_string(),
        config_path: cli.config_path.clone(),
        model,
        temperature,
        gemini_base_url: profile
            .gemini_base_url
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
        serper_base_url: profile
            .serper_base_url
            .unwrap_or_else(|| DEFAULT_SERPER_BASE_URL.to_string()),
        request_timeout: secs(
            profile
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
                .max(1),
        ),
        retry,
        strategies,
        search_results: cli
            .search_results
            .or(profile.search_results)
            .unwrap_or(DEFAULT_SEARCH_RESULTS)
            .clamp(1, MAX_SEARCH_RESULTS),
        output_dir: cli
            .output_dir
            .clone()
            .or(profile.output_dir)
            .unwrap_or_else(|| ".".to_string()),
        telemetry_enabled: cli
            .telemetry_enabled
            .or(profile.telemetry_enabled)
            .unwrap_or(false),
        telemetry_path: cli
            .telemetry_path
            .clone()
            .or(profile.telemetry_path)
            .unwrap_or_else(|| ".analyzer/telemetry/events.jsonl".to_string()),
        show_sensitive_config: cli.show_sensitive_config,
    })
}

/// API keys for the two external services, loaded once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub google_api_key: String,
    pub serper_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("google_api_key", &"<redacted>")
            .field("serper_api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing required API keys: {}", .missing.join(", "))]
pub struct MissingCredentials {
    pub missing: Vec<&'static str>,
}

impl Credentials {
    pub fn from_env() -> std::result::Result<Self, MissingCredentials> {
        load_credentials_from(|key| std::env::var(key).ok())
    }
}

/// Every missing key is reported at once; blank values count as missing.
pub fn load_credentials_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> std::result::Result<Credentials, MissingCredentials> {
    let read = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    let google = read(GOOGLE_API_KEY_ENV);
    let serper = read(SERPER_API_KEY_ENV);

    match (google, serper) {
        (Some(google_api_key), Some(serper_api_key)) => Ok(Credentials {
            google_api_key,
            serper_api_key,
        }),
        (google, serper) => {
            let mut missing = Vec::new();
            if google.is_none() {
                missing.push(GOOGLE_API_KEY_ENV);
            }
            if serper.is_none() {
                missing.push(SERPER_API_KEY_ENV);
            }
            Err(MissingCredentials { missing })
        }
    }
}

pub fn display_base_url(url: &str, show_sensitive: bool) -> String {
    if show_sensitive {
        return url.to_string();
    }
    // Keys are sent as headers, but a user may still paste one into a query string.
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?<redacted>"),
        None => url.to_string(),
    }
}

pub fn run_profiles_list(profiles: &ProfilesFile, cfg: &RuntimeConfig) -> Result<()> {
    let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
    if !names.iter().any(|name| name == "default") {
        names.push("default".to_string());
    }
    names.sort();

    println!("Configured profiles (active='{}'):", cfg.profile);
    for name in names {
        let marker = if name == cfg.profile { "*" } else { " " };
        let source = if profiles.profiles.contains_key(&name) {
            "configured"
        } else {
            "implicit"
        };
        println!("{marker} {name} ({source})");
    }

    Ok(())
}

pub fn run_profiles_show(cfg: &RuntimeConfig) -> Result<()> {
    println!("Active profile: {}", cfg.profile);
    println!("Config path: {}", cfg.config_path);
    println!("Model: {}", cfg.model);
    println!("Temperature: {}", cfg.temperature);
    println!(
        "Gemini base URL: {}",
        display_base_url(&cfg.gemini_base_url, cfg.show_sensitive_config)
    );
    println!(
        "Serper base URL: {}",
        display_base_url(&cfg.serper_base_url, cfg.show_sensitive_config)
    );
    println!("Request timeout (secs): {}", cfg.request_timeout.as_secs());
    println!("Max retries per strategy: {}", cfg.retry.max_retries);
    println!(
        "Retry delay (secs): base={} max={} overload_floor={}",
        cfg.retry.base_delay.as_secs(),
        cfg.retry.max_delay.as_secs(),
        cfg.retry.overload_floor.as_secs()
    );
    println!(
        "Retry jitter: {}..{}",
        cfg.retry.jitter_min, cfg.retry.jitter_max
    );
    for strategy in &cfg.strategies {
        println!(
            "Strategy: {} (scope={} timeout={}s)",
            strategy.name,
            strategy.scope,
            strategy.timeout.as_secs()
        );
    }
    println!("Search results per query: {}", cfg.search_results);
    println!("Output directory: {}", cfg.output_dir);
    println!("Telemetry enabled: {}", cfg.telemetry_enabled);
    println!("Telemetry path: {}", cfg.telemetry_path);
    Ok(())
}
