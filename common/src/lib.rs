pub mod config;
pub mod decision;
pub mod presence;
pub mod types;

pub use config::{AppConfig, ConfigError, ConfigFile, NetatmoConfig, TrustPolicy, UnifiConfig};
pub use decision::{decide, Decision};
pub use presence::{ClientVerdict, PresenceEvaluator, PresenceState};
pub use types::{Client, ClientLookup, ThermostatMode, UnknownMode};
