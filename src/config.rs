use crate::cache::CacheScope;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    pub administrator_ids: Vec<u64>,
    pub command_prefix: String,
    pub resolver_url: String,
    pub resolver_timeout: Duration,
    pub cache_scope: CacheScope,
    pub log_level: String,
}

const DEFAULT_RESOLVER_URL: &str = "https://www.amputatorbot.com/api/v1";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/amputator.db".to_string()),
            administrator_ids: parse_id_list(
                &env::var("ADMINISTRATOR_IDS").unwrap_or_default(),
            ),
            command_prefix: env::var("COMMAND_PREFIX")
                .ok()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| "!amputator".to_string()),
            resolver_url: env::var("RESOLVER_URL")
                .unwrap_or_else(|_| DEFAULT_RESOLVER_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            resolver_timeout: humantime::parse_duration(
                &env::var("RESOLVER_TIMEOUT").unwrap_or_else(|_| "15s".to_string()),
            )
            .map_err(|e| anyhow::anyhow!("RESOLVER_TIMEOUT must be a duration like 15s: {}", e))?,
            cache_scope: env::var("CACHE_SCOPE")
                .unwrap_or_else(|_| "server".to_string())
                .parse()?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn is_administrator(&self, user_id: u64) -> bool {
        self.administrator_ids.contains(&user_id)
    }
}

fn parse_id_list(raw: &str) -> Vec<u64> {
    raw.split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("database_url", &self.database_url)
            .field("administrator_ids", &self.administrator_ids)
            .field("command_prefix", &self.command_prefix)
            .field("resolver_url", &self.resolver_url)
            .field("resolver_timeout", &self.resolver_timeout)
            .field("cache_scope", &self.cache_scope)
            .field("log_level", &self.log_level)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
/// Embed description limit is 4096 characters
pub const DISCORD_EMBED_LIMIT: usize = 4096;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("1, 2,x,,3"), vec![1, 2, 3]);
        assert!(parse_id_list("").is_empty());
    }

    #[test]
    fn test_config_logic() {
        // 1. Test missing vars
        env::remove_var("DISCORD_TOKEN");
        let result = Config::build();
        assert!(result.is_err(), "Should fail when DISCORD_TOKEN is missing");

        // 2. Test defaults
        env::set_var("DISCORD_TOKEN", "test_token");
        env::remove_var("CACHE_SCOPE");
        env::remove_var("RESOLVER_TIMEOUT");
        env::remove_var("COMMAND_PREFIX");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "test_token");
        assert_eq!(config.command_prefix, "!amputator");
        assert_eq!(config.cache_scope, CacheScope::Server);
        assert_eq!(config.resolver_timeout, Duration::from_secs(15));

        // 3. Test overrides
        env::set_var("CACHE_SCOPE", "global");
        env::set_var("RESOLVER_TIMEOUT", "2s 500ms");
        env::set_var("ADMINISTRATOR_IDS", "42,43");
        let config = Config::build().unwrap();
        assert_eq!(config.cache_scope, CacheScope::Global);
        assert_eq!(config.resolver_timeout, Duration::from_millis(2500));
        assert!(config.is_administrator(43));
        assert!(!config.is_administrator(44));

        // 4. Test debug redaction
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("test_token"));
        assert!(debug_output.contains("[REDACTED]"));

        // 5. Invalid scope is rejected
        env::set_var("CACHE_SCOPE", "planet");
        assert!(Config::build().is_err());

        // Cleanup
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("CACHE_SCOPE");
        env::remove_var("RESOLVER_TIMEOUT");
        env::remove_var("ADMINISTRATOR_IDS");
    }
}
