//! Startup configuration.
//!
//! Read once from the process environment (optionally seeded from a `.env`
//! file). Both endpoint profiles are immutable after loading.

use std::time::Duration;

use crate::models::connection::{ConnectionProfile, Target};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HEALTH_INTERVAL_MS: u64 = 5000;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Name reported in logs and response metadata.
    pub service_name: String,
    /// Listen address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Read-write endpoint.
    pub primary: ConnectionProfile,
    /// Read-only endpoint.
    pub replica: ConnectionProfile,
    /// Period between health probes, in milliseconds.
    pub health_interval_ms: u64,
}

impl AppConfig {
    /// Loads configuration for the named service from the environment.
    pub fn load_with_service(service_name: &str) -> Self {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("SERVER_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let health_interval_ms = lookup("HEALTH_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_HEALTH_INTERVAL_MS);

        Self {
            service_name: service_name.to_string(),
            host: lookup("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            primary: profile_from(&lookup, Target::Primary),
            replica: profile_from(&lookup, Target::Replica),
            health_interval_ms,
        }
    }

    /// Health probe period.
    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }
}

/// Reads `PRIMARY_*` / `REPLICA_*` variables. The primary also accepts the
/// older `MASTER_*` spelling.
fn profile_from<F>(lookup: &F, target: Target) -> ConnectionProfile
where
    F: Fn(&str) -> Option<String>,
{
    let prefixes: &[&str] = match target {
        Target::Primary => &["PRIMARY", "MASTER"],
        Target::Replica => &["REPLICA"],
    };
    let get = |suffix: &str| {
        prefixes
            .iter()
            .find_map(|prefix| lookup(&format!("{prefix}_{suffix}")))
            .filter(|v| !v.is_empty())
    };

    ConnectionProfile::new(
        get("HOST").unwrap_or_else(|| "localhost".to_string()),
        get("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| target.default_port()),
        get("USER").unwrap_or_else(|| "postgres".to_string()),
        get("PASSWORD").unwrap_or_default(),
        get("DB").unwrap_or_else(|| "postgres".to_string()),
    )
}

/// Load `.env` from the working directory (best-effort, no error if missing).
///
/// Variables already present in the environment are left untouched.
pub fn load_dotenv() {
    let env_path = std::path::Path::new(".env");
    let Ok(content) = std::fs::read_to_string(env_path) else {
        return;
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"');
            if std::env::var(key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }
}
