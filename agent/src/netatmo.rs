use std::fmt;

use presence_common::{ConfigError, ThermostatMode};
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use crate::error::{Error, Result};

const SCOPE: &str = "read_thermostat write_thermostat";

/// `error` field of a cloud API response: a bare code on the OAuth endpoint,
/// an object everywhere else.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiError {
    Detailed { code: i64, message: String },
    Code(String),
    Other(serde_json::Value),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detailed { code, message } => write!(f, "{message} (code {code})"),
            Self::Code(code) => f.write_str(code),
            Self::Other(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(flatten)]
    payload: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct HomesDataResponse {
    body: HomesDataBody,
}

#[derive(Debug, Deserialize)]
struct HomesDataBody {
    #[serde(default)]
    homes: Vec<Home>,
}

#[derive(Debug, Deserialize)]
struct Home {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HomeStatusResponse {
    body: HomeStatusBody,
}

#[derive(Debug, Deserialize)]
struct HomeStatusBody {
    home: HomeStatus,
}

#[derive(Debug, Deserialize)]
struct HomeStatus {
    #[serde(default)]
    therm_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
}

/// Bearer token for the cloud API. Never logged.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

#[derive(Debug, Clone)]
pub struct Credentials<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

/// Thermostat cloud API client. Owns the access token for the lifetime of one run.
pub struct ThermostatClient {
    http: HttpClient,
    base_url: String,
    token: Option<AccessToken>,
}

impl ThermostatClient {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// OAuth2 password grant. The token is kept for every later call.
    pub async fn authenticate(&mut self, credentials: &Credentials<'_>) -> Result<AccessToken> {
        let url = format!("{}/oauth2/token", self.base_url);
        debug!(url = %url, user = credentials.username, "requesting access token");

        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", credentials.client_id),
                ("client_secret", credentials.client_secret),
                ("username", credentials.username),
                ("password", credentials.password),
                ("scope", SCOPE),
            ])
            .send()
            .await?;

        let token: TokenResponse = read_payload(resp).await.map_err(|err| match err {
            Error::Remote(message) => Error::Auth(message),
            other => other,
        })?;
        debug!(expires_in = ?token.expires_in, "access token granted");

        let token = AccessToken::new(token.access_token);
        self.token = Some(token.clone());
        Ok(token)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .token
            .as_ref()
            .ok_or(Error::Precondition("thermostat API called before authentication"))?;
        Ok(request.bearer_auth(&token.0))
    }

    /// Uses `configured` when set, otherwise the first home of the account.
    pub async fn resolve_home_id(&self, configured: Option<&str>) -> Result<String> {
        if let Some(home_id) = configured {
            return Ok(home_id.to_string());
        }

        let url = format!("{}/api/homesdata", self.base_url);
        debug!(url = %url, "listing homes");
        let resp = self.authorized(self.http.get(&url))?.send().await?;
        let homes: HomesDataResponse = read_payload(resp).await?;

        let home = homes
            .body
            .homes
            .into_iter()
            .next()
            .ok_or(ConfigError::NoHome)?;
        debug!(home_id = %home.id, name = ?home.name, "using first home of the account");
        Ok(home.id)
    }

    pub async fn get_mode(&self, home_id: &str) -> Result<ThermostatMode> {
        let url = format!("{}/api/homestatus", self.base_url);
        debug!(url = %url, home_id, "fetching home status");
        let request = self.http.get(&url).query(&[("home_id", home_id)]);
        let resp = self.authorized(request)?.send().await?;
        let status: HomeStatusResponse = read_payload(resp).await?;

        let mode = status
            .body
            .home
            .therm_mode
            .ok_or_else(|| Error::Remote("home status has no thermostat mode".into()))?;
        mode.parse()
            .map_err(|_| Error::Remote(format!("unrecognised thermostat mode `{mode}`")))
    }

    pub async fn set_mode(&self, home_id: &str, mode: ThermostatMode) -> Result<()> {
        let url = format!("{}/api/setthermmode", self.base_url);
        debug!(url = %url, home_id, mode = %mode, "setting thermostat mode");
        let request = self
            .http
            .post(&url)
            .form(&[("home_id", home_id), ("mode", mode.as_api_str())]);
        let resp = self.authorized(request)?.send().await?;
        let status: StatusResponse = read_payload(resp).await?;

        match status.status.as_deref() {
            Some("ok") => Ok(()),
            Some(other) => Err(Error::Remote(format!("setthermmode returned status `{other}`"))),
            None => Err(Error::Remote("setthermmode reply has no status".into())),
        }
    }

    /// Same as [`set_mode`](Self::set_mode) for a mode given by name.
    pub async fn set_mode_named(&self, home_id: &str, mode: &str) -> Result<()> {
        let mode: ThermostatMode = mode.parse()?;
        self.set_mode(home_id, mode).await
    }
}

async fn read_payload<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await?;

    let envelope: Envelope<T> = serde_json::from_str(&body)
        .map_err(|err| Error::Remote(format!("unexpected response ({status}): {err}")))?;

    if let Some(error) = envelope.error {
        return Err(Error::Remote(error.to_string()));
    }
    if !status.is_success() {
        return Err(Error::Remote(format!("request failed with {status}")));
    }
    envelope
        .payload
        .ok_or_else(|| Error::Remote(format!("unexpected response shape: {body}")))
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::{
        matchers::{body_string_contains, header, method, path, query_param},
        Mock, MockServer, Request, Respond, ResponseTemplate,
    };

    use super::*;
    use crate::http::cloud_client;

    const CREDENTIALS: Credentials<'static> = Credentials {
        client_id: "id",
        client_secret: "secret",
        username: "user@example.com",
        password: "hunter2",
    };

    fn client(server: &MockServer) -> ThermostatClient {
        let http = cloud_client(Duration::from_secs(5)).unwrap();
        ThermostatClient::new(http, server.uri())
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("scope=read_thermostat+write_thermostat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "token-1",
                "refresh_token": "refresh-1",
                "expires_in": 10800
            })))
            .mount(server)
            .await;
    }

    async fn authenticated(server: &MockServer) -> ThermostatClient {
        mount_token(server).await;
        let mut thermostat = client(server);
        thermostat.authenticate(&CREDENTIALS).await.unwrap();
        thermostat
    }

    /// One home whose mode survives between requests.
    struct FakeHome {
        mode: Arc<Mutex<String>>,
    }

    impl Respond for FakeHome {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let mut mode = self.mode.lock().unwrap();
            if request.url.path() == "/api/setthermmode" {
                let body = String::from_utf8_lossy(&request.body);
                if let Some(value) = body.split('&').find_map(|pair| pair.strip_prefix("mode=")) {
                    *mode = value.to_string();
                }
                return ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "ok", "time_server": 1}));
            }
            ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "body": {"home": {"id": "home-1", "therm_mode": *mode}}
            }))
        }
    }

    #[tokio::test]
    async fn authenticate_stores_token() {
        let server = MockServer::start().await;
        let thermostat = authenticated(&server).await;
        assert!(thermostat.is_authenticated());
    }

    #[tokio::test]
    async fn token_error_field_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let mut thermostat = client(&server);
        let err = thermostat.authenticate(&CREDENTIALS).await.unwrap_err();
        assert!(matches!(err, Error::Auth(ref message) if message == "invalid_grant"), "{err}");
        assert!(!thermostat.is_authenticated());
    }

    #[tokio::test]
    async fn calls_without_token_never_reach_the_network() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let thermostat = client(&server);
        assert!(matches!(
            thermostat.get_mode("home-1").await,
            Err(Error::Precondition(_))
        ));
        assert!(matches!(
            thermostat.set_mode("home-1", ThermostatMode::Away).await,
            Err(Error::Precondition(_))
        ));
        assert!(matches!(
            thermostat.resolve_home_id(None).await,
            Err(Error::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn configured_home_id_skips_discovery() {
        let server = MockServer::start().await;
        let thermostat = authenticated(&server).await;
        Mock::given(path("/api/homesdata"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(
            thermostat.resolve_home_id(Some("home-9")).await.unwrap(),
            "home-9"
        );
    }

    #[tokio::test]
    async fn resolves_first_home() {
        let server = MockServer::start().await;
        let thermostat = authenticated(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/homesdata"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "body": {"homes": [{"id": "home-1", "name": "Flat"}, {"id": "home-2"}]}
            })))
            .mount(&server)
            .await;

        assert_eq!(thermostat.resolve_home_id(None).await.unwrap(), "home-1");
    }

    #[tokio::test]
    async fn account_without_homes_is_config_error() {
        let server = MockServer::start().await;
        let thermostat = authenticated(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/homesdata"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "ok", "body": {"homes": []}})),
            )
            .mount(&server)
            .await;

        let err = thermostat.resolve_home_id(None).await.unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::NoHome)), "{err}");
    }

    #[tokio::test]
    async fn get_mode_reads_home_status() {
        let server = MockServer::start().await;
        let thermostat = authenticated(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/homestatus"))
            .and(query_param("home_id", "home-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "body": {"home": {"id": "home-1", "therm_mode": "hg"}}
            })))
            .mount(&server)
            .await;

        assert_eq!(
            thermostat.get_mode("home-1").await.unwrap(),
            ThermostatMode::FrostGuard
        );
    }

    #[tokio::test]
    async fn get_mode_error_field_is_remote_error() {
        let server = MockServer::start().await;
        let thermostat = authenticated(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/homestatus"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 2, "message": "Invalid access_token"}
            })))
            .mount(&server)
            .await;

        let err = thermostat.get_mode("home-1").await.unwrap_err();
        assert!(matches!(err, Error::Remote(_)), "{err}");
        assert!(err.to_string().contains("Invalid access_token"));
    }

    #[tokio::test]
    async fn get_mode_without_or_with_unknown_mode_is_remote_error() {
        for home in [json!({"id": "home-1"}), json!({"id": "home-1", "therm_mode": "off"})] {
            let server = MockServer::start().await;
            let thermostat = authenticated(&server).await;
            Mock::given(method("GET"))
                .and(path("/api/homestatus"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({"status": "ok", "body": {"home": home}})),
                )
                .mount(&server)
                .await;

            let err = thermostat.get_mode("home-1").await.unwrap_err();
            assert!(matches!(err, Error::Remote(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn set_mode_then_get_mode_round_trips() {
        let server = MockServer::start().await;
        let thermostat = authenticated(&server).await;
        let mode = Arc::new(Mutex::new("schedule".to_string()));
        Mock::given(header("authorization", "Bearer token-1"))
            .respond_with(FakeHome { mode: mode.clone() })
            .mount(&server)
            .await;

        assert_eq!(
            thermostat.get_mode("home-1").await.unwrap(),
            ThermostatMode::Schedule
        );
        thermostat
            .set_mode("home-1", ThermostatMode::Away)
            .await
            .unwrap();
        assert_eq!(
            thermostat.get_mode("home-1").await.unwrap(),
            ThermostatMode::Away
        );
        assert_eq!(mode.lock().unwrap().as_str(), "away");
    }

    #[tokio::test]
    async fn set_mode_error_field_is_remote_error() {
        let server = MockServer::start().await;
        let thermostat = authenticated(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/setthermmode"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 21, "message": "Invalid mode"}
            })))
            .mount(&server)
            .await;

        let err = thermostat
            .set_mode("home-1", ThermostatMode::Schedule)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote(_)), "{err}");
    }

    #[tokio::test]
    async fn invalid_mode_name_is_rejected_before_any_request() {
        let server = MockServer::start().await;
        let thermostat = authenticated(&server).await;
        Mock::given(path("/api/setthermmode"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = thermostat
            .set_mode_named("home-1", "vacation")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
    }

    #[tokio::test]
    async fn set_mode_without_status_is_remote_error() {
        let server = MockServer::start().await;
        let thermostat = authenticated(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/setthermmode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"time_server": 1})))
            .mount(&server)
            .await;

        let err = thermostat
            .set_mode("home-1", ThermostatMode::Away)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote(_)), "{err}");
    }
}
