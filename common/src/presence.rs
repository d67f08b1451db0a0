use crate::types::{Client, ClientLookup};

/// How a single device contributes to the household presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientVerdict {
    Present { elapsed_secs: i64 },
    Away { elapsed_secs: Option<i64> },
    /// Not known to the controller; counts neither way.
    Skipped,
}

/// Aggregated presence for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceState {
    pub present: Vec<String>,
    pub away: usize,
    pub skipped: usize,
}

impl PresenceState {
    pub fn anyone_present(&self) -> bool {
        !self.present.is_empty()
    }

    pub fn record(&mut self, mac: &str, verdict: ClientVerdict) {
        match verdict {
            ClientVerdict::Present { .. } => self.present.push(mac.to_string()),
            ClientVerdict::Away { .. } => self.away += 1,
            ClientVerdict::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceEvaluator {
    offline_threshold_secs: i64,
}

impl PresenceEvaluator {
    pub fn new(offline_threshold_secs: i64) -> Self {
        Self {
            offline_threshold_secs,
        }
    }

    pub fn offline_threshold_secs(&self) -> i64 {
        self.offline_threshold_secs
    }

    /// `now` is captured once per batch so every elapsed value shares a reference point.
    pub fn verdict(&self, now: i64, lookup: &ClientLookup) -> ClientVerdict {
        match lookup {
            ClientLookup::NotConfigured => ClientVerdict::Skipped,
            ClientLookup::Found(client) => self.client_verdict(now, client),
        }
    }

    fn client_verdict(&self, now: i64, client: &Client) -> ClientVerdict {
        match client.last_seen {
            Some(last_seen) => {
                let elapsed_secs = now.saturating_sub(last_seen);
                if elapsed_secs < self.offline_threshold_secs {
                    ClientVerdict::Present { elapsed_secs }
                } else {
                    ClientVerdict::Away {
                        elapsed_secs: Some(elapsed_secs),
                    }
                }
            }
            None => ClientVerdict::Away { elapsed_secs: None },
        }
    }

    pub fn evaluate<'a, I>(&self, now: i64, lookups: I) -> PresenceState
    where
        I: IntoIterator<Item = (&'a str, &'a ClientLookup)>,
    {
        let mut state = PresenceState::default();
        for (mac, lookup) in lookups {
            state.record(mac, self.verdict(now, lookup));
        }
        state
    }
}
