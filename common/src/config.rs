use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

pub const DEFAULT_SITE: &str = "default";
pub const DEFAULT_OFFLINE_SECONDS: i64 = 900;
pub const DEFAULT_NETATMO_API_URL: &str = "https://api.netatmo.com";
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Keys that must be present and non-empty, in the order they are checked.
pub const MANDATORY_KEYS: [&str; 7] = [
    "UNIFI_ADDRESS",
    "UNIFI_USERNAME",
    "UNIFI_PASSWORD",
    "NETATMO_CLIENT_ID",
    "NETATMO_CLIENT_SECRET",
    "NETATMO_USERNAME",
    "NETATMO_PASSWORD",
];

pub const OPTIONAL_KEYS: [&str; 8] = [
    "UNIFI_SITENAME",
    "UNIFI_CLIENTS",
    "UNIFI_CLIENT_OFFLINE_SECONDS",
    "UNIFI_CA_CERT",
    "UNIFI_INSECURE_TLS",
    "NETATMO_HOME_ID",
    "NETATMO_API_URL",
    "HTTP_TIMEOUT_SECONDS",
];

pub const CONFIG_TEMPLATE: &str = r#"# netatmo-presence configuration
# Lines starting with '#' are comments. Quotes around values are optional.

# Network controller
UNIFI_ADDRESS="192.168.1.1"
UNIFI_USERNAME="presence"
UNIFI_PASSWORD="secret"
UNIFI_SITENAME="default"
# Space-separated MAC addresses of the devices that indicate someone is home
UNIFI_CLIENTS="aa:bb:cc:dd:ee:01 aa:bb:cc:dd:ee:02"
# A device unseen for this many seconds counts as away
UNIFI_CLIENT_OFFLINE_SECONDS=900
# Trust a self-signed controller certificate by pinning it (PEM file).
# The host name is still verified: the certificate must list UNIFI_ADDRESS
# (host name or IP) in its subject alternative names.
#UNIFI_CA_CERT="/etc/netatmo-presence/unifi.pem"
# Or skip certificate validation entirely (not recommended)
#UNIFI_INSECURE_TLS=false

# Thermostat cloud API (create an app at dev.netatmo.com)
NETATMO_CLIENT_ID="client-id"
NETATMO_CLIENT_SECRET="client-secret"
NETATMO_USERNAME="user@example.com"
NETATMO_PASSWORD="secret"
# Defaults to the first home of the account
#NETATMO_HOME_ID=""

# Timeout applied to every HTTP request
#HTTP_TIMEOUT_SECONDS=10
"#;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: expected KEY=VALUE")]
    Syntax { line: usize },
    #[error("missing mandatory config key {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("the thermostat account has no homes; set NETATMO_HOME_ID")]
    NoHome,
}

/// Raw key/value pairs from a config file, last definition wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    values: BTreeMap<String, String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut values = BTreeMap::new();

        for (index, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Syntax { line: index + 1 });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::Syntax { line: index + 1 });
            }
            values.insert(key.to_string(), unquote(value.trim()).to_string());
        }

        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Keys present in the file that nothing reads.
    pub fn unknown_keys(&self) -> Vec<&str> {
        self.values
            .keys()
            .map(String::as_str)
            .filter(|key| !MANDATORY_KEYS.contains(key) && !OPTIONAL_KEYS.contains(key))
            .collect()
    }

    fn require(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key)
            .map(str::to_string)
            .ok_or(ConfigError::Missing(key))
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// How the controller's TLS certificate is checked.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrustPolicy {
    /// Platform trust roots.
    #[default]
    System,
    /// Only the certificate in this PEM file is trusted.
    Pinned(PathBuf),
    /// Certificate validation disabled.
    Insecure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiConfig {
    pub address: String,
    pub username: String,
    pub password: String,
    pub site: String,
    pub clients: Vec<String>,
    pub offline_seconds: i64,
    pub trust: TrustPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetatmoConfig {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub home_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub unifi: UnifiConfig,
    pub netatmo: NetatmoConfig,
    pub http_timeout_secs: u64,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_file(&ConfigFile::load(path)?)
    }

    pub fn from_file(file: &ConfigFile) -> Result<Self, ConfigError> {
        if let Some(missing) = MANDATORY_KEYS
            .iter()
            .copied()
            .find(|key| file.get(key).is_none())
        {
            return Err(ConfigError::Missing(missing));
        }

        let unifi = UnifiConfig {
            address: normalize_address(&file.require("UNIFI_ADDRESS")?),
            username: file.require("UNIFI_USERNAME")?,
            password: file.require("UNIFI_PASSWORD")?,
            site: file.get("UNIFI_SITENAME").unwrap_or(DEFAULT_SITE).to_string(),
            clients: parse_clients(file.get("UNIFI_CLIENTS").unwrap_or_default())?,
            offline_seconds: parse_positive(file, "UNIFI_CLIENT_OFFLINE_SECONDS")?
                .unwrap_or(DEFAULT_OFFLINE_SECONDS),
            trust: parse_trust(file)?,
        };

        let netatmo = NetatmoConfig {
            api_url: file
                .get("NETATMO_API_URL")
                .unwrap_or(DEFAULT_NETATMO_API_URL)
                .trim_end_matches('/')
                .to_string(),
            client_id: file.require("NETATMO_CLIENT_ID")?,
            client_secret: file.require("NETATMO_CLIENT_SECRET")?,
            username: file.require("NETATMO_USERNAME")?,
            password: file.require("NETATMO_PASSWORD")?,
            home_id: file.get("NETATMO_HOME_ID").map(str::to_string),
        };

        let http_timeout_secs = parse_positive(file, "HTTP_TIMEOUT_SECONDS")?
            .map(|secs| secs as u64)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECONDS);

        Ok(Self {
            unifi,
            netatmo,
            http_timeout_secs,
        })
    }
}

fn normalize_address(address: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.contains("://") {
        address.to_string()
    } else {
        format!("https://{address}")
    }
}

fn parse_clients(raw: &str) -> Result<Vec<String>, ConfigError> {
    let mut clients: Vec<String> = Vec::new();
    for mac in raw.split_whitespace() {
        if !is_valid_mac(mac) {
            return Err(ConfigError::Invalid {
                key: "UNIFI_CLIENTS",
                reason: format!("`{mac}` is not a MAC address"),
            });
        }
        let mac = mac.to_ascii_lowercase();
        if !clients.contains(&mac) {
            clients.push(mac);
        }
    }
    Ok(clients)
}

fn is_valid_mac(value: &str) -> bool {
    let octets: Vec<&str> = value.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()))
}

fn parse_positive(file: &ConfigFile, key: &'static str) -> Result<Option<i64>, ConfigError> {
    let Some(raw) = file.get(key) else {
        return Ok(None);
    };
    match raw.parse::<i64>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(ConfigError::Invalid {
            key,
            reason: format!("`{raw}` is not a positive integer"),
        }),
    }
}

fn parse_bool(file: &ConfigFile, key: &'static str) -> Result<bool, ConfigError> {
    match file.get(key).map(str::to_ascii_lowercase).as_deref() {
        None | Some("false" | "no" | "0") => Ok(false),
        Some("true" | "yes" | "1") => Ok(true),
        Some(other) => Err(ConfigError::Invalid {
            key,
            reason: format!("`{other}` is not a boolean"),
        }),
    }
}

fn parse_trust(file: &ConfigFile) -> Result<TrustPolicy, ConfigError> {
    let insecure = parse_bool(file, "UNIFI_INSECURE_TLS")?;
    match (file.get("UNIFI_CA_CERT"), insecure) {
        (Some(_), true) => Err(ConfigError::Invalid {
            key: "UNIFI_INSECURE_TLS",
            reason: "cannot be combined with UNIFI_CA_CERT".to_string(),
        }),
        (Some(path), false) => Ok(TrustPolicy::Pinned(PathBuf::from(path))),
        (None, true) => Ok(TrustPolicy::Insecure),
        (None, false) => Ok(TrustPolicy::System),
    }
}
