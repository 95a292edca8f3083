use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::warn;

use crate::{errors::Error, router::normalize_symbol, Result};

pub const DEFAULT_DAILY_LIMIT: u32 = 3;
pub const DEFAULT_QUOTE_SYMBOLS: &str = "XAUUSD";

/// Typed process configuration.
///
/// Only the chat token is mandatory. Every other credential is optional and
/// its absence puts the matching feature into a degraded mode.
#[derive(Clone, Debug)]
pub struct Config {
    // Chat transport
    pub telegram_bot_token: String,

    // Vision model
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub vision_max_tokens: u32,
    pub vision_timeout: Duration,

    // Quote source
    pub fmp_api_key: Option<String>,
    pub fmp_base_url: String,
    pub quote_timeout: Duration,
    pub quote_symbols: Vec<String>,

    // Persistence
    pub supabase: Option<SupabaseCredentials>,
    pub quota_in_memory: bool,

    // Policy / runtime
    pub daily_analysis_limit: u32,
    pub temp_dir: PathBuf,
    pub session_file: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupabaseCredentials {
    pub url: String,
    pub key: String,
}

impl Config {
    /// Load `.env` (if present) and read the process environment.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let cfg = Self::from_lookup(|key| env::var(key).ok())?;
        fs::create_dir_all(&cfg.temp_dir)?;
        Ok(cfg)
    }

    /// Build a config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("BOT_TOKEN")
            .or_else(|| get("TELEGRAM_BOT_TOKEN"))
            .ok_or_else(|| {
                Error::Config("BOT_TOKEN environment variable is required".to_string())
            })?;

        let openai_api_key = get("OPENAI_API_KEY");
        let openai_model = get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".to_string());
        let openai_base_url =
            get("OPENAI_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let vision_max_tokens = parse_or(&get, "VISION_MAX_TOKENS", 600u32);
        let vision_timeout = Duration::from_secs(parse_or(&get, "VISION_TIMEOUT_SECS", 60u64));

        let fmp_api_key = get("FMP_API_KEY");
        let fmp_base_url = get("FMP_BASE_URL")
            .unwrap_or_else(|| "https://financialmodelingprep.com".to_string());
        let quote_timeout = Duration::from_secs(parse_or(&get, "QUOTE_TIMEOUT_SECS", 10u64));
        let quote_symbols = parse_symbols(
            get("QUOTE_SYMBOLS")
                .as_deref()
                .unwrap_or(DEFAULT_QUOTE_SYMBOLS),
        );

        // Both halves of the pair are needed; a lone URL or key is treated as absent.
        let supabase = match (get("SUPABASE_URL"), get("SUPABASE_KEY")) {
            (Some(url), Some(key)) => Some(SupabaseCredentials { url, key }),
            _ => None,
        };
        let quota_in_memory = get("QUOTA_IN_MEMORY")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        let daily_analysis_limit = parse_or(&get, "DAILY_ANALYSIS_LIMIT", DEFAULT_DAILY_LIMIT);
        let temp_dir = PathBuf::from(get("TEMP_DIR").unwrap_or_else(|| "/tmp/cbh-bot".to_string()));
        let session_file = PathBuf::from(
            get("SESSION_FILE").unwrap_or_else(|| "/tmp/cbh-bot-sessions.json".to_string()),
        );

        Ok(Self {
            telegram_bot_token,
            openai_api_key,
            openai_model,
            openai_base_url,
            vision_max_tokens,
            vision_timeout,
            fmp_api_key,
            fmp_base_url,
            quote_timeout,
            quote_symbols,
            supabase,
            quota_in_memory,
            daily_analysis_limit,
            temp_dir,
            session_file,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue;
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    get(key)
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Entries that could not round-trip through a quote button are dropped.
fn parse_symbols(v: &str) -> Vec<String> {
    let out: Vec<String> = v
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| {
            let symbol = normalize_symbol(s);
            if symbol.is_none() {
                warn!(symbol = s.trim(), "ignoring invalid quote symbol");
            }
            symbol
        })
        .collect();
    if out.is_empty() {
        return vec![DEFAULT_QUOTE_SYMBOLS.to_string()];
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn missing_bot_token_is_fatal() {
        let err = cfg_from(&[("OPENAI_API_KEY", "sk")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = cfg_from(&[("BOT_TOKEN", "   ")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn defaults_when_only_token_is_set() {
        let cfg = cfg_from(&[("BOT_TOKEN", "t")]).unwrap();
        assert_eq!(cfg.telegram_bot_token, "t");
        assert!(cfg.openai_api_key.is_none());
        assert!(cfg.fmp_api_key.is_none());
        assert!(cfg.supabase.is_none());
        assert!(!cfg.quota_in_memory);
        assert_eq!(cfg.daily_analysis_limit, 3);
        assert_eq!(cfg.vision_max_tokens, 600);
        assert_eq!(cfg.quote_timeout, Duration::from_secs(10));
        assert_eq!(cfg.quote_symbols, vec!["XAUUSD".to_string()]);
        assert_eq!(cfg.openai_model, "gpt-4o");
    }

    #[test]
    fn telegram_token_alias_is_accepted() {
        let cfg = cfg_from(&[("TELEGRAM_BOT_TOKEN", "alias")]).unwrap();
        assert_eq!(cfg.telegram_bot_token, "alias");
    }

    #[test]
    fn supabase_requires_both_halves() {
        let cfg = cfg_from(&[("BOT_TOKEN", "t"), ("SUPABASE_URL", "https://x.supabase.co")])
            .unwrap();
        assert!(cfg.supabase.is_none());

        let cfg = cfg_from(&[
            ("BOT_TOKEN", "t"),
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_KEY", "k"),
        ])
        .unwrap();
        assert_eq!(
            cfg.supabase,
            Some(SupabaseCredentials {
                url: "https://x.supabase.co".to_string(),
                key: "k".to_string()
            })
        );
    }

    #[test]
    fn parses_symbols_limits_and_flags() {
        let cfg = cfg_from(&[
            ("BOT_TOKEN", "t"),
            ("QUOTE_SYMBOLS", " xauusd, eurusd ,,btcusd"),
            ("DAILY_ANALYSIS_LIMIT", "5"),
            ("QUOTA_IN_MEMORY", "yes"),
            ("VISION_MAX_TOKENS", "not-a-number"),
        ])
        .unwrap();
        assert_eq!(cfg.quote_symbols, vec!["XAUUSD", "EURUSD", "BTCUSD"]);
        assert_eq!(cfg.daily_analysis_limit, 5);
        assert!(cfg.quota_in_memory);
        assert_eq!(cfg.vision_max_tokens, 600);
    }

    #[test]
    fn invalid_symbols_are_dropped() {
        let cfg = cfg_from(&[
            ("BOT_TOKEN", "t"),
            ("QUOTE_SYMBOLS", "xauusd,XAU/USD,eur_usd,brk-b"),
        ])
        .unwrap();
        assert_eq!(cfg.quote_symbols, vec!["XAUUSD", "BRK-B"]);

        let cfg = cfg_from(&[("BOT_TOKEN", "t"), ("QUOTE_SYMBOLS", "XAU/USD")]).unwrap();
        assert_eq!(cfg.quote_symbols, vec!["XAUUSD"]);
    }

    #[test]
    fn strips_matching_quotes_only() {
        assert_eq!(strip_quotes("\"abc\""), "abc");
        assert_eq!(strip_quotes("'abc'"), "abc");
        assert_eq!(strip_quotes("\"abc'"), "\"abc'");
    }
}
