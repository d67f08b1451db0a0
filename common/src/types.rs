use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Heating policy of a home, as understood by the cloud thermostat API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermostatMode {
    Schedule,
    Away,
    #[serde(rename = "hg", alias = "frostguard")]
    FrostGuard,
}

impl ThermostatMode {
    pub const ALL: [ThermostatMode; 3] = [Self::Schedule, Self::Away, Self::FrostGuard];

    /// Name used on the wire by the thermostat API.
    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Away => "away",
            Self::FrostGuard => "hg",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Away => "away",
            Self::FrostGuard => "frostguard",
        }
    }
}

impl fmt::Display for ThermostatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown thermostat mode `{0}` (expected schedule, away or frostguard)")]
pub struct UnknownMode(pub String);

impl FromStr for ThermostatMode {
    type Err = UnknownMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "schedule" => Ok(Self::Schedule),
            "away" => Ok(Self::Away),
            "hg" | "frostguard" => Ok(Self::FrostGuard),
            _ => Err(UnknownMode(value.to_string())),
        }
    }
}

/// A device record as reported by the network controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub mac: String,
    #[serde(default)]
    pub hostname: Option<String>,
    /// Alias assigned by an administrator on the controller.
    #[serde(default)]
    pub name: Option<String>,
    /// Unix seconds. `None` means the device is not currently associated.
    #[serde(default)]
    pub last_seen: Option<i64>,
}

impl Client {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.hostname.as_deref())
            .unwrap_or(&self.mac)
    }
}

/// Result of looking a configured device up on the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLookup {
    Found(Client),
    /// The controller has no record of the device on this site.
    NotConfigured,
}
