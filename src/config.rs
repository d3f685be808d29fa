use rand::RngCore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TellerConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub rpc_port: u16,
    pub db_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    #[serde(default = "default_lockout_threshold")]
    pub lockout_threshold: u32,
    #[serde(default = "default_lockout_window_secs")]
    pub lockout_window_secs: u64,
    #[serde(default = "default_commit_retry_limit")]
    pub commit_retry_limit: u32,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// Hex-encoded HMAC secret for session tokens. A fresh one is generated
    /// when the default config file is created.
    #[serde(default)]
    pub token_secret: String,
}

fn default_lockout_threshold() -> u32 {
    5
}

fn default_lockout_window_secs() -> u64 {
    30 * 60
}

fn default_commit_retry_limit() -> u32 {
    5
}

fn default_token_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn generate_token_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl Default for TellerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                rpc_port: 9400,
                db_path: "./data/teller".to_string(),
                log_level: "info".to_string(),
            },
            security: SecurityConfig {
                lockout_threshold: default_lockout_threshold(),
                lockout_window_secs: default_lockout_window_secs(),
                commit_retry_limit: default_commit_retry_limit(),
                token_ttl_secs: default_token_ttl_secs(),
                token_secret: generate_token_secret(),
            },
        }
    }
}

impl TellerConfig {
    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str::<TellerConfig>(&s) {
                    Ok(mut c) => {
                        println!("Config loaded from {}", path);
                        if c.security.token_secret.is_empty() {
                            eprintln!(
                                "No token_secret in config; generating an ephemeral one. \
                                 Tokens will not survive a restart."
                            );
                            c.security.token_secret = generate_token_secret();
                        }
                        c
                    }
                    Err(e) => {
                        eprintln!("Error parsing config: {}. Using Defaults.", e);
                        Self::default()
                    }
                },
                Err(e) => {
                    eprintln!("Error reading config: {}. Using Defaults.", e);
                    Self::default()
                }
            }
        } else {
            println!("Config file not found at '{}'. Creating default.", path);
            let config = Self::default();
            if let Ok(s) = toml::to_string_pretty(&config) {
                let _ = std::fs::write(path, s);
            }
            config
        }
    }

    pub fn lockout_window_ms(&self) -> u64 {
        self.security.lockout_window_secs * 1000
    }

    pub fn token_ttl_ms(&self) -> u64 {
        self.security.token_ttl_secs * 1000
    }
}
