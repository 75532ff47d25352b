//! Connection endpoint models.
//!
//! The gateway talks to exactly two endpoints: a read-write primary and a
//! read-only replica. [`Target`] names one of them; [`ConnectionProfile`]
//! describes how to reach it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Database endpoint a statement is routed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Read-write endpoint.
    Primary,
    /// Read-only endpoint.
    Replica,
}

impl Target {
    /// Maps the external `explicit_replica` flag to an override.
    ///
    /// `None` leaves the decision to statement classification.
    pub fn from_replica_flag(explicit_replica: Option<bool>) -> Option<Self> {
        explicit_replica.map(|replica| {
            if replica {
                Target::Replica
            } else {
                Target::Primary
            }
        })
    }

    /// Conventional port of this endpoint.
    pub fn default_port(self) -> u16 {
        match self {
            Target::Primary => 5432,
            Target::Replica => 5433,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Target::Primary => "primary",
            Target::Replica => "replica",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" | "master" => Ok(Target::Primary),
            "replica" => Ok(Target::Replica),
            other => Err(format!("unknown endpoint: {other}")),
        }
    }
}

/// Immutable descriptor of one database endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ConnectionProfile {
    host: String,
    port: u16,
    user: String,
    /// Never serialized.
    #[serde(skip_serializing)]
    password: String,
    database: String,
}

impl ConnectionProfile {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database: database.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// `host:port/database`, safe to log.
    pub fn address(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}
