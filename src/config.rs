use dotenv::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub log_level: String,
    pub jwt_secret: String,
    pub blob_dir: String,
    pub balance_cache_ttl_secs: u64,
    pub max_attachment_bytes: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_url", &"<redacted>")
            .field("log_level", &self.log_level)
            .field("jwt_secret", &"<redacted>")
            .field("blob_dir", &self.blob_dir)
            .field("balance_cache_ttl_secs", &self.balance_cache_ttl_secs)
            .field("max_attachment_bytes", &self.max_attachment_bytes)
            .finish()
    }
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    fn from_env() -> Self {
        dotenv().ok();

        Self {
            port: parsed_or("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| ":memory:".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string()),
            blob_dir: env::var("BLOB_DIR").unwrap_or_else(|_| "./attachments".to_string()),
            balance_cache_ttl_secs: parsed_or("BALANCE_CACHE_TTL_SECS", 300),
            max_attachment_bytes: parsed_or("MAX_ATTACHMENT_BYTES", 10 * 1024 * 1024),
        }
    }

    pub fn balance_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.balance_cache_ttl_secs)
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_secrets() {
        let config = Config {
            port: 3000,
            database_url: "/var/lib/tripsplit.db".to_string(),
            log_level: "info".to_string(),
            jwt_secret: "hunter2".to_string(),
            blob_dir: "./attachments".to_string(),
            balance_cache_ttl_secs: 300,
            max_attachment_bytes: 1024,
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("tripsplit.db"));
        assert_eq!(config.balance_cache_ttl(), Duration::from_secs(300));
    }
}
