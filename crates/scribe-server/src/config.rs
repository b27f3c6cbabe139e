use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
    "secret",
];

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_ttl_days: i64,
    pub upload_dir: PathBuf,
    pub temp_retention_days: u64,
    pub cleanup_interval_secs: u64,
    pub admin: Option<AdminSeed>,
}

/// Credentials for the admin account created at startup.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("SCRIBE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("SCRIBE_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let admin = match (get("SCRIBE_ADMIN_EMAIL"), get("SCRIBE_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed { email, password }),
            (None, None) => None,
            _ => bail!("SCRIBE_ADMIN_EMAIL and SCRIBE_ADMIN_PASSWORD must be set together"),
        };

        let config = Self {
            host: get("SCRIBE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&get, "SCRIBE_PORT", 5000)?,
            db_path: get("SCRIBE_DB_PATH").unwrap_or_else(|| "scribe.db".into()).into(),
            jwt_secret,
            jwt_ttl_days: parsed(&get, "SCRIBE_JWT_TTL_DAYS", 30)?,
            upload_dir: get("SCRIBE_UPLOAD_DIR").unwrap_or_else(|| "./uploads".into()).into(),
            temp_retention_days: parsed(&get, "SCRIBE_TEMP_RETENTION_DAYS", 1)?,
            cleanup_interval_secs: parsed(&get, "SCRIBE_CLEANUP_INTERVAL_SECS", SECS_PER_DAY)?,
            admin,
        };

        if config.jwt_ttl_days <= 0 {
            bail!("SCRIBE_JWT_TTL_DAYS must be positive");
        }
        if config.cleanup_interval_secs == 0 {
            bail!("SCRIBE_CLEANUP_INTERVAL_SECS must be positive");
        }
        Ok(config)
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn temp_retention(&self) -> Duration {
        Duration::from_secs(self.temp_retention_days * SECS_PER_DAY)
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[("SCRIBE_JWT_SECRET", "a-real-secret")]).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.db_path, PathBuf::from("scribe.db"));
        assert_eq!(config.jwt_ttl_days, 30);
        assert_eq!(config.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(config.temp_retention(), Duration::from_secs(SECS_PER_DAY));
        assert_eq!(config.cleanup_interval_secs, SECS_PER_DAY);
        assert!(config.admin.is_none());
        assert_eq!(config.addr().unwrap().port(), 5000);
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        assert!(load(&[]).is_err());
        assert!(load(&[("SCRIBE_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let err = load(&[("SCRIBE_JWT_SECRET", "s3cr3t!"), ("SCRIBE_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("SCRIBE_PORT"));

        assert!(load(&[("SCRIBE_JWT_SECRET", "s3cr3t!"), ("SCRIBE_JWT_TTL_DAYS", "0")]).is_err());
    }

    #[test]
    fn admin_seed_needs_both_halves() {
        let config = load(&[
            ("SCRIBE_JWT_SECRET", "s3cr3t!"),
            ("SCRIBE_ADMIN_EMAIL", "root@scribe.io"),
            ("SCRIBE_ADMIN_PASSWORD", "hunter22"),
        ])
        .unwrap();
        assert_eq!(config.admin.unwrap().email, "root@scribe.io");

        assert!(
            load(&[
                ("SCRIBE_JWT_SECRET", "s3cr3t!"),
                ("SCRIBE_ADMIN_EMAIL", "root@scribe.io"),
            ])
            .is_err()
        );
    }
}
