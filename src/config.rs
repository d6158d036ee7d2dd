use std::time::Duration;

pub const MAX_SECRET_BYTES: usize = 72;
pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_NAME_LENGTH: usize = 50;
pub const MAX_NICK_LENGTH: usize = 50;
pub const MAX_EMAIL_LENGTH: usize = 50;
pub const MAX_TITLE_LENGTH: usize = 50;
pub const MAX_POST_LENGTH: usize = 300;

const DEFAULT_TOKEN_EXPIRATION_HOURS: u64 = 6;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Process configuration, built once at start-up and only ever read after.
#[derive(Clone)]
pub struct Config {
    pub secret_key: Vec<u8>,
    pub token_ttl: Duration,
    pub bind_addr: String,
}

impl Config {
    pub fn new(secret_key: impl Into<Vec<u8>>) -> Self {
        Self {
            secret_key: secret_key.into(),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_EXPIRATION_HOURS * 3600),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self {
            secret_key: std::env::var("PLAZA_SECRET_KEY")
                .unwrap_or_default()
                .into_bytes(),
            token_ttl: Duration::from_secs(token_expiration_hours() * 3600),
            bind_addr: std::env::var("PLAZA_BIND_ADDR")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
        }
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }
}

// Keeps the secret out of debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("secret_key", &format_args!("<{} bytes>", self.secret_key.len()))
            .field("token_ttl", &self.token_ttl)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

fn token_expiration_hours() -> u64 {
    std::env::var("PLAZA_TOKEN_EXPIRATION_HOURS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|h| *h > 0)
        .unwrap_or(DEFAULT_TOKEN_EXPIRATION_HOURS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_secret() {
        let config = Config::new("super-secret-value");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("super-secret-value"));
        assert!(printed.contains("<18 bytes>"));
    }

    #[test]
    fn default_ttl_is_six_hours() {
        let config = Config::new("k");
        assert_eq!(config.token_ttl, Duration::from_secs(6 * 3600));
    }
}
