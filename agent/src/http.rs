use std::time::Duration;

use presence_common::{ConfigError, TrustPolicy};
use reqwest::{Certificate, Client, ClientBuilder};
use tracing::warn;

use crate::error::Result;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

fn base_builder(timeout: Duration) -> ClientBuilder {
    Client::builder().user_agent(USER_AGENT).timeout(timeout)
}

/// Client for the cloud API, platform trust roots only.
pub fn cloud_client(timeout: Duration) -> Result<Client> {
    Ok(base_builder(timeout).build()?)
}

/// Client for the local controller: keeps the session cookie and applies the trust policy.
pub fn controller_client(trust: &TrustPolicy, timeout: Duration) -> Result<Client> {
    let builder = base_builder(timeout).cookie_store(true);

    let builder = match trust {
        TrustPolicy::System => builder,
        TrustPolicy::Pinned(path) => {
            let pem = std::fs::read(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let certificate = Certificate::from_pem(&pem).map_err(|err| ConfigError::Invalid {
                key: "UNIFI_CA_CERT",
                reason: err.to_string(),
            })?;
            builder
                .tls_built_in_root_certs(false)
                .add_root_certificate(certificate)
        }
        TrustPolicy::Insecure => {
            warn!("controller certificate validation is disabled");
            builder.danger_accept_invalid_certs(true)
        }
    };

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::error::Error;

    #[test]
    fn missing_pinned_certificate_is_a_config_error() {
        let trust = TrustPolicy::Pinned(PathBuf::from("/nonexistent/unifi.pem"));
        let err = controller_client(&trust, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Io { .. })));
    }

    #[test]
    fn builds_default_clients() {
        assert!(cloud_client(Duration::from_secs(1)).is_ok());
        assert!(controller_client(&TrustPolicy::System, Duration::from_secs(1)).is_ok());
        assert!(controller_client(&TrustPolicy::Insecure, Duration::from_secs(1)).is_ok());
    }
}
