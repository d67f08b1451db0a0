use std::{fmt, time::Duration};

use chrono::Utc;
use presence_common::{
    decide, AppConfig, ClientLookup, ClientVerdict, Decision, PresenceEvaluator, PresenceState, ThermostatMode,
    UnifiConfig,
};
use tracing::{debug, info, warn};

use crate::{
    error::Result,
    http::{cloud_client, controller_client},
    netatmo::{Credentials, ThermostatClient},
    unifi::ControllerSession,
};

/// What a run did, rendered as the status line on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    FrostGuard,
    Unchanged {
        mode: ThermostatMode,
        presence: PresenceState,
    },
    Switched {
        from: ThermostatMode,
        to: ThermostatMode,
        presence: PresenceState,
    },
}

struct PresenceSummary<'a>(&'a PresenceState);

impl fmt::Display for PresenceSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.anyone_present() {
            write!(f, "present: {}", self.0.present.join(", "))
        } else {
            f.write_str("nobody present")
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrostGuard => f.write_str("thermostat is in frost guard mode, leaving it alone"),
            Self::Unchanged { mode, presence } => {
                write!(f, "mode stays {mode} ({})", PresenceSummary(presence))
            }
            Self::Switched { from, to, presence } => write!(
                f,
                "mode switched from {from} to {to} ({})",
                PresenceSummary(presence)
            ),
        }
    }
}

/// One pass: read the thermostat, check presence, switch mode if needed.
pub async fn run(config: &AppConfig) -> Result<RunOutcome> {
    let timeout = Duration::from_secs(config.http_timeout_secs);
    let netatmo = &config.netatmo;

    let mut thermostat = ThermostatClient::new(cloud_client(timeout)?, netatmo.api_url.as_str());
    thermostat
        .authenticate(&Credentials {
            client_id: &netatmo.client_id,
            client_secret: &netatmo.client_secret,
            username: &netatmo.username,
            password: &netatmo.password,
        })
        .await?;

    let home_id = thermostat
        .resolve_home_id(netatmo.home_id.as_deref())
        .await?;
    let current = thermostat.get_mode(&home_id).await?;
    info!(home_id = %home_id, mode = %current, "current thermostat mode");

    if current == ThermostatMode::FrostGuard {
        return Ok(RunOutcome::FrostGuard);
    }

    let presence = evaluate_presence(&config.unifi, timeout).await?;

    match decide(current, presence.anyone_present()) {
        Decision::NoChange => Ok(RunOutcome::Unchanged {
            mode: current,
            presence,
        }),
        Decision::Switch(next) => {
            thermostat.set_mode(&home_id, next).await?;
            info!(from = %current, to = %next, "thermostat mode updated");
            Ok(RunOutcome::Switched {
                from: current,
                to: next,
                presence,
            })
        }
    }
}

async fn evaluate_presence(unifi: &UnifiConfig, timeout: Duration) -> Result<PresenceState> {
    let http = controller_client(&unifi.trust, timeout)?;
    let session = ControllerSession::login(
        http,
        &unifi.address,
        &unifi.site,
        &unifi.username,
        &unifi.password,
    )
    .await?;
    debug!(address = %unifi.address, site = %unifi.site, "controller session opened");

    // Nothing between login and logout may return early.
    let presence = collect_presence(&session, unifi).await;

    if let Err(err) = session.logout().await {
        warn!("controller logout failed: {err}");
    }
    Ok(presence)
}

async fn collect_presence(session: &ControllerSession, unifi: &UnifiConfig) -> PresenceState {
    let evaluator = PresenceEvaluator::new(unifi.offline_seconds);
    let now = Utc::now().timestamp();

    if unifi.clients.is_empty() {
        warn!("no clients configured, assuming nobody is present");
    }

    let mut presence = PresenceState::default();
    for mac in &unifi.clients {
        let lookup = match session.query_client(mac).await {
            Ok(lookup) => lookup,
            Err(err) => {
                warn!(mac = %mac, "client lookup failed, skipping: {err}");
                ClientLookup::NotConfigured
            }
        };

        let verdict = evaluator.verdict(now, &lookup);
        match (&lookup, verdict) {
            (ClientLookup::Found(client), ClientVerdict::Present { elapsed_secs }) => debug!(
                mac = %mac,
                name = client.display_name(),
                elapsed_secs,
                "client present"
            ),
            (ClientLookup::Found(client), ClientVerdict::Away { elapsed_secs }) => debug!(
                mac = %mac,
                name = client.display_name(),
                elapsed_secs = ?elapsed_secs,
                "client away"
            ),
            _ => info!(mac = %mac, "client not configured on controller"),
        }
        presence.record(mac, verdict);
    }

    info!(
        present = ?presence.present,
        away = presence.away,
        skipped = presence.skipped,
        threshold_secs = evaluator.offline_threshold_secs(),
        "presence evaluated"
    );
    presence
}
