use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
        }
    }
}

/// How a generation request decides to report a simulated overload.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub enum OverloadPolicy {
    Always,
    Never,
    Random(f64),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    pub simulate_delay: bool,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub overload: OverloadPolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            simulate_delay: true,
            delay_min_ms: 1000,
            delay_max_ms: 2000,
            overload: OverloadPolicy::Random(0.2),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// Prefix for asset links, e.g. `https://cdn.example.com`.
    pub base_url: Option<String>,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub generation: GenerationConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data.sqlite".into());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not configured")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "style-studio".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "style-studio-users".into()),
            ttl_minutes: parse_env("JWT_TTL_MINUTES").unwrap_or(60 * 24 * 7),
        };

        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: parse_env("PASSWORD_MEMORY_KIB").unwrap_or(defaults.memory_kib),
            iterations: parse_env("PASSWORD_ITERATIONS").unwrap_or(defaults.iterations),
        };

        let overload = match std::env::var("FORCE_OVERLOAD").ok().as_deref() {
            Some("1") | Some("true") => OverloadPolicy::Always,
            Some("0") | Some("false") => OverloadPolicy::Never,
            _ => OverloadPolicy::Random(
                parse_env::<f64>("OVERLOAD_PROBABILITY")
                    .unwrap_or(0.2)
                    .clamp(0.0, 1.0),
            ),
        };
        let generation = GenerationConfig {
            simulate_delay: !flag_env("SKIP_GENERATION_DELAY"),
            overload,
            ..GenerationConfig::default()
        };

        Ok(Self {
            database_url,
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_env("APP_PORT").unwrap_or(4000),
            base_url: std::env::var("BASE_URL").ok().filter(|v| !v.is_empty()),
            jwt,
            password,
            generation,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

fn flag_env(key: &str) -> bool {
    matches!(
        std::env::var(key).ok().as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}
