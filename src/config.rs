use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Base url the browser reaches us on, used for OAuth redirect uris.
    pub public_url: String,
    pub client_secret_path: PathBuf,
    pub session_inactivity_minutes: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let bind_addr = var("BIND_ADDR", "0.0.0.0:8080");
        let bind_addr = bind_addr
            .parse()
            .with_context(|| format!("BIND_ADDR {bind_addr:?} is not a socket address"))?;

        let minutes = var("SESSION_INACTIVITY_MINUTES", "60");
        let session_inactivity_minutes: i64 = minutes
            .parse()
            .with_context(|| format!("SESSION_INACTIVITY_MINUTES {minutes:?} is not a number"))?;
        if session_inactivity_minutes <= 0 {
            anyhow::bail!("SESSION_INACTIVITY_MINUTES must be positive");
        }

        Ok(Config {
            database_url: var("DATABASE_URL", "sqlite://roomchat.db?mode=rwc"),
            bind_addr,
            public_url: var("PUBLIC_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_owned(),
            client_secret_path: var("CLIENT_SECRET_PATH", "client_secret.json").into(),
            session_inactivity_minutes,
        })
    }
}
