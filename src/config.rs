use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub foods_db: String,
    pub requests_db: String,
    pub token_secret: String,
    pub host: String,
    pub port: u16,
    pub client_origin: String,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = match get("DATABASE_URL") {
            Some(url) => url,
            None => {
                let user = get("DB_USER").ok_or(ConfigError::Missing("DATABASE_URL or DB_USER"))?;
                let password = get("DB_PASSWORD").ok_or(ConfigError::Missing("DB_PASSWORD"))?;
                let host = get("DB_HOST").ok_or(ConfigError::Missing("DB_HOST"))?;
                format!("mongodb+srv://{user}:{password}@{host}/?retryWrites=true&w=majority")
            }
        };

        let token_secret = get("ACCESS_TOKEN_SECRET")
            .or_else(|| get("JWT_SECRET"))
            .ok_or(ConfigError::Missing("ACCESS_TOKEN_SECRET"))?;

        let port = match get("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value: raw })?,
            None => 5001,
        };

        let cookie_secure = match get("COOKIE_SECURE") {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => return Err(ConfigError::Invalid { key: "COOKIE_SECURE", value: raw }),
            },
            None => true,
        };

        Ok(Config {
            database_url,
            foods_db: get("FOODS_DB").unwrap_or_else(|| "foodSharingDB".to_string()),
            requests_db: get("REQUESTS_DB").unwrap_or_else(|| "foodRequestDB".to_string()),
            token_secret,
            host: get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            client_origin: get("CLIENT_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string()),
            cookie_secure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let config = load(&[
            ("DATABASE_URL", "mongodb://localhost:27017"),
            ("ACCESS_TOKEN_SECRET", "s3cret"),
        ])
        .unwrap();

        assert_eq!(config.port, 5001);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.client_origin, "http://localhost:5173");
        assert_eq!(config.foods_db, "foodSharingDB");
        assert_eq!(config.requests_db, "foodRequestDB");
        assert!(config.cookie_secure);
    }

    #[test]
    fn database_url_is_assembled_from_credentials() {
        let config = load(&[
            ("DB_USER", "alice"),
            ("DB_PASSWORD", "pw"),
            ("DB_HOST", "cluster0.example.net"),
            ("JWT_SECRET", "fallback"),
        ])
        .unwrap();

        assert_eq!(
            config.database_url,
            "mongodb+srv://alice:pw@cluster0.example.net/?retryWrites=true&w=majority"
        );
        assert_eq!(config.token_secret, "fallback");
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = load(&[("DATABASE_URL", "mongodb://localhost")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ACCESS_TOKEN_SECRET")));
    }

    #[test]
    fn blank_secret_counts_as_missing() {
        let err = load(&[
            ("DATABASE_URL", "mongodb://localhost"),
            ("ACCESS_TOKEN_SECRET", "  "),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = load(&[
            ("DATABASE_URL", "mongodb://localhost"),
            ("ACCESS_TOKEN_SECRET", "s"),
            ("PORT", "eighty"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn cookie_secure_can_be_disabled_for_local_http() {
        let config = load(&[
            ("DATABASE_URL", "mongodb://localhost"),
            ("ACCESS_TOKEN_SECRET", "s"),
            ("COOKIE_SECURE", "false"),
        ])
        .unwrap();
        assert!(!config.cookie_secure);
    }
}
