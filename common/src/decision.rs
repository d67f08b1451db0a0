use crate::types::ThermostatMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Switch(ThermostatMode),
    NoChange,
}

/// Next thermostat mode for the current mode and household presence.
///
/// Frost guard is never overridden.
pub fn decide(current: ThermostatMode, anyone_present: bool) -> Decision {
    match (current, anyone_present) {
        (ThermostatMode::Schedule, false) => Decision::Switch(ThermostatMode::Away),
        (ThermostatMode::Away, true) => Decision::Switch(ThermostatMode::Schedule),
        (ThermostatMode::FrostGuard, _) => Decision::NoChange,
        (ThermostatMode::Schedule, true) | (ThermostatMode::Away, false) => Decision::NoChange,
    }
}
