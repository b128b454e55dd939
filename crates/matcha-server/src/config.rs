use std::net::SocketAddr;

use anyhow::{Context, bail};

use matcha_api::ApiConfig;
use matcha_api::oauth::GoogleConfig;
use matcha_api::subscriber::DEFAULT_CHAT_WORKERS;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "dev-secret-change-me", "secret"];

pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub redis_addr: Option<String>,
    pub smtp_from: String,
    pub chat_workers: usize,
    pub api: ApiConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let addr = var("SERVER_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".into())
            .parse()
            .context("SERVER_ADDR is not a socket address")?;
        let chat_workers = match var("CHAT_WORKERS") {
            Some(n) => n.parse().context("CHAT_WORKERS is not a number")?,
            None => DEFAULT_CHAT_WORKERS,
        };

        let google = match (
            var("GOOGLE_CLIENT_ID"),
            var("GOOGLE_CLIENT_SECRET"),
            var("REDIRECT_URI"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_uri,
            }),
            _ => None,
        };

        Ok(Self {
            addr,
            database_url: var("DATABASE_URL").unwrap_or_else(|| "matcha.db".into()),
            redis_addr: var("REDIS_ADDR").filter(|a| !a.is_empty()),
            smtp_from: var("SMTP_FROM").unwrap_or_else(|| "no-reply@matcha.local".into()),
            chat_workers,
            api: ApiConfig {
                jwt_signing_key: secret(&var, "JWT_SIGNING_KEY")?,
                hmac_secret: secret(&var, "HMAC_SECRET_KEY")?,
                base_url: var("BASE_URL").unwrap_or_else(|| "http://localhost:8080".into()),
                google,
            },
        })
    }
}

fn secret(var: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    match var(key) {
        Some(value) if !value.is_empty() && !PLACEHOLDER_SECRETS.contains(&value.as_str()) => {
            Ok(value)
        }
        _ => bail!("{key} is unset or still a placeholder"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const SECRETS: [(&str, &str); 2] = [
        ("JWT_SIGNING_KEY", "a-real-signing-key"),
        ("HMAC_SECRET_KEY", "a-real-hmac-key"),
    ];

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&SECRETS)).unwrap();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.database_url, "matcha.db");
        assert!(config.redis_addr.is_none());
        assert!(config.api.google.is_none());
        assert_eq!(config.chat_workers, DEFAULT_CHAT_WORKERS);
    }

    #[test]
    fn placeholder_secrets_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("JWT_SIGNING_KEY", "change-me"),
            ("HMAC_SECRET_KEY", "a-real-hmac-key"),
        ]))
        .err()
        .unwrap();
        assert!(err.to_string().contains("JWT_SIGNING_KEY"));

        assert!(Config::from_lookup(lookup(&[("JWT_SIGNING_KEY", "a-real-signing-key")])).is_err());
    }

    #[test]
    fn google_needs_all_three_settings() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("GOOGLE_CLIENT_ID", "id"));
        pairs.push(("GOOGLE_CLIENT_SECRET", "shh"));
        assert!(Config::from_lookup(lookup(&pairs)).unwrap().api.google.is_none());

        pairs.push(("REDIRECT_URI", "http://localhost:3000/callback"));
        let google = Config::from_lookup(lookup(&pairs)).unwrap().api.google.unwrap();
        assert_eq!(google.client_id, "id");
    }
}
