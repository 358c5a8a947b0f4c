use std::{env, fmt::Display, str::FromStr};

/// Runtime configuration, loaded once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP listener binds to.
    pub bind_addr: String,

    /// Path of the SQLite database file.
    pub database_path: String,

    /// Secret used to sign and verify bearer tokens.
    pub jwt_secret: String,

    /// Token lifetime in minutes.
    pub token_ttl_minutes: i64,
}

impl Config {
    pub fn load() -> Self {
        let jwt_secret = match env::var("CALCBOARD_JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                log::warn!(
                    "CALCBOARD_JWT_SECRET not set, using an insecure development secret"
                );
                "insecure-dev-secret".to_string()
            }
        };

        Self {
            bind_addr: try_load("CALCBOARD_BIND_ADDR", "127.0.0.1:3000"),
            database_path: try_load("CALCBOARD_DB_PATH", "database/calcboard.db"),
            jwt_secret,
            token_ttl_minutes: try_load("CALCBOARD_TOKEN_TTL_MINUTES", "30"),
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            log::info!("{} not set, using default: {}", key, default);
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            log::warn!("Invalid {} value: {}", key, e);
        })
        .expect("Environment misconfigured!")
}
