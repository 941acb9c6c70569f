// src/config/mod.rs
//! Runtime settings: defaults < TOML file < environment.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::cursor::DEFAULT_CURSOR_PATH;
use crate::dispatch::Pacing;
use crate::error::{RelayError, Result};
use crate::feed::ResolvePolicy;
use crate::notify::telegram::DEFAULT_API_BASE;
use crate::sources::http::HttpSettings;
use crate::sources::{self, AdapterOptions, COUPONSCORPION, DEFAULT_ORDER, DISCUDEMY, REALDISCOUNT};
use file::FileConfig;

pub const DEFAULT_PORT: u16 = 10_000;
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Everything one source needs at runtime.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub id: String,
    pub page_limit: usize,
    pub policy: ResolvePolicy,
    pub adapter: AdapterOptions,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bot_token: String,
    pub channel_id: String,
    pub telegram_api_base: String,
    pub port: u16,
    pub monitor_interval: Duration,
    pub cursor_path: PathBuf,
    pub request_timeout_secs: u64,
    pub telegram_retries: u8,
    pub pacing: Pacing,
    /// Sources in priority order.
    pub sources: Vec<SourceSettings>,
}

impl Settings {
    /// Load `.env`-populated process env on top of the default config file.
    pub fn load() -> Result<Self> {
        let file = file::load_default()?;
        Self::resolve(file, |k| std::env::var(k).ok(), true)
    }

    /// Same as [`Settings::load`] but credentials may be absent (dry runs).
    pub fn load_without_credentials() -> Result<Self> {
        let file = file::load_default()?;
        Self::resolve(file, |k| std::env::var(k).ok(), false)
    }

    /// Merge a file layer with an env lookup.
    pub fn resolve<F>(file: FileConfig, env: F, require_credentials: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = lookup("BOT_TOKEN").or(file.bot_token.clone()).unwrap_or_default();
        let channel_id = lookup("CHANNEL_ID").or(file.channel_id.clone()).unwrap_or_default();
        if require_credentials {
            let missing: Vec<&str> = [("BOT_TOKEN", &bot_token), ("CHANNEL_ID", &channel_id)]
                .into_iter()
                .filter(|(_, v)| v.is_empty())
                .map(|(k, _)| k)
                .collect();
            if !missing.is_empty() {
                return Err(RelayError::config(format!(
                    "missing required settings: {}",
                    missing.join(", ")
                )));
            }
        }

        let port = parsed(&lookup, "PORT")?.or(file.port).unwrap_or(DEFAULT_PORT);
        let interval_secs = parsed(&lookup, "MONITOR_INTERVAL_SECONDS")?
            .or(file.monitor_interval_secs)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        if interval_secs == 0 {
            return Err(RelayError::config("MONITOR_INTERVAL_SECONDS must be > 0"));
        }
        let cursor_path = lookup("CURSOR_PATH")
            .map(PathBuf::from)
            .or(file.cursor_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CURSOR_PATH));
        let request_timeout_secs = parsed(&lookup, "REQUEST_TIMEOUT_SECS")?
            .or(file.request_timeout_secs)
            .unwrap_or(15);
        let telegram_retries = parsed(&lookup, "TELEGRAM_RETRIES")?
            .or(file.telegram_retries)
            .unwrap_or(3);

        let pacing = Pacing::new(
            Duration::from_millis(parsed(&lookup, "PACING_MIN_MS")?.or(file.pacing_min_ms).unwrap_or(600)),
            Duration::from_millis(parsed(&lookup, "PACING_MAX_MS")?.or(file.pacing_max_ms).unwrap_or(1_600)),
        )?;

        let fallback_cap = parsed(&lookup, "FALLBACK_CAP")?
            .or(file.fallback_cap)
            .unwrap_or(ResolvePolicy::DEFAULT_FALLBACK_CAP);
        let missing_coupon_means_free = parsed_bool(&lookup, "MISSING_COUPON_MEANS_FREE")?
            .or(file.missing_coupon_means_free)
            .unwrap_or(true);

        let order: Vec<String> = match lookup("SOURCES") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => file
                .sources
                .clone()
                .unwrap_or_else(|| DEFAULT_ORDER.iter().map(|s| s.to_string()).collect()),
        };

        let mut seen = std::collections::HashSet::new();
        let mut source_settings = Vec::with_capacity(order.len());
        for id in order {
            if !sources::is_known_source(&id) {
                return Err(RelayError::config(format!("unknown source '{id}'")));
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            let over = file.source.get(&id).cloned().unwrap_or_default();
            let pages_env = match id.as_str() {
                REALDISCOUNT => "REALDISCOUNT_PAGES",
                COUPONSCORPION => "COUPONSCORP_PAGES",
                DISCUDEMY => "DISCUD_PAGES",
                _ => unreachable!("checked by is_known_source"),
            };
            let page_limit = parsed(&lookup, pages_env)?.or(over.pages).unwrap_or(1).max(1);

            let mut adapter = AdapterOptions::for_source(&id);
            adapter.missing_coupon_means_free = missing_coupon_means_free;
            adapter.http = HttpSettings {
                timeout: Duration::from_secs(request_timeout_secs),
                ..HttpSettings::default()
            };
            if let Some(base) = over.base_url {
                adapter.base_url = base;
            }
            if let Some(n) = over.max_posts {
                adapter.max_posts = n;
            }
            if let Some(ms) = over.request_delay_ms {
                adapter.request_delay = Duration::from_millis(ms);
            }

            source_settings.push(SourceSettings {
                policy: ResolvePolicy {
                    fallback_cap: over.fallback_cap.unwrap_or(fallback_cap),
                    initial_limit: over.initial_limit,
                },
                id,
                page_limit,
                adapter,
            });
        }

        Ok(Self {
            bot_token,
            channel_id,
            telegram_api_base: lookup("TELEGRAM_API_BASE")
                .or(file.telegram_api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            port,
            monitor_interval: Duration::from_secs(interval_secs),
            cursor_path,
            request_timeout_secs,
            telegram_retries,
            pacing,
            sources: source_settings,
        })
    }
}

fn parsed<T, L>(lookup: &L, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    L: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| RelayError::config(format!("{key}={v:?} is invalid: {e}")))
        })
        .transpose()
}

fn parsed_bool<L>(lookup: &L, key: &str) -> Result<Option<bool>>
where
    L: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(RelayError::config(format!("{key}={v:?} is not a boolean"))),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    fn creds() -> Vec<(&'static str, &'static str)> {
        vec![("BOT_TOKEN", "123:abc"), ("CHANNEL_ID", "@deals")]
    }

    #[test]
    fn defaults_match_legacy_deployment() {
        let s = Settings::resolve(FileConfig::default(), env(&creds()), true).unwrap();
        assert_eq!(s.port, 10_000);
        assert_eq!(s.monitor_interval, Duration::from_secs(60));
        assert_eq!(s.cursor_path, PathBuf::from("data/last_sent.json"));
        let ids: Vec<&str> = s.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["realdiscount", "couponscorpion", "discudemy"]);
        assert!(s.sources.iter().all(|s| s.page_limit == 1 && s.policy.fallback_cap == 10));
    }

    #[test]
    fn missing_credentials_are_fatal() {
        let err = Settings::resolve(FileConfig::default(), env(&[("BOT_TOKEN", "x")]), true).unwrap_err();
        assert!(err.to_string().contains("CHANNEL_ID"));
        assert!(Settings::resolve(FileConfig::default(), env(&[]), false).is_ok());
    }

    #[test]
    fn env_overrides_file() {
        let file = file::parse(
            r#"
            port = 9000
            fallback_cap = 4
            sources = ["realdiscount"]
            [source.discudemy]
            fallback_cap = 2
            initial_limit = 5
            "#,
        )
        .unwrap();
        let mut pairs = creds();
        pairs.extend([("PORT", "9100"), ("SOURCES", "discudemy, realdiscount"), ("DISCUD_PAGES", "3")]);
        let s = Settings::resolve(file, env(&pairs), true).unwrap();

        assert_eq!(s.port, 9100);
        assert_eq!(s.sources[0].id, "discudemy");
        assert_eq!(s.sources[0].page_limit, 3);
        assert_eq!(s.sources[0].policy.fallback_cap, 2);
        assert_eq!(s.sources[0].policy.initial_limit, Some(5));
        assert_eq!(s.sources[1].policy.fallback_cap, 4);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let mut pairs = creds();
        pairs.push(("PORT", "http"));
        assert!(matches!(
            Settings::resolve(FileConfig::default(), env(&pairs), true),
            Err(RelayError::Config(_))
        ));

        let mut pairs = creds();
        pairs.push(("SOURCES", "udemyfreebies"));
        assert!(Settings::resolve(FileConfig::default(), env(&pairs), true).is_err());

        let mut pairs = creds();
        pairs.extend([("PACING_MIN_MS", "2000"), ("PACING_MAX_MS", "100")]);
        assert!(Settings::resolve(FileConfig::default(), env(&pairs), true).is_err());
    }

    #[test]
    fn free_heuristic_toggle_reaches_adapters() {
        let mut pairs = creds();
        pairs.push(("MISSING_COUPON_MEANS_FREE", "off"));
        let s = Settings::resolve(FileConfig::default(), env(&pairs), true).unwrap();
        assert!(s.sources.iter().all(|s| !s.adapter.missing_coupon_means_free));
    }
}
