use presence_common::{Client, ClientLookup};
use reqwest::{Client as HttpClient, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

const CSRF_HEADER: &str = "x-csrf-token";
const UNKNOWN_CLIENT: &str = "api.err.UnknownUser";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    password: &'a str,
    username: &'a str,
}

#[derive(Debug, Deserialize)]
struct Meta {
    rc: String,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientDetailResponse {
    meta: Meta,
    #[serde(default)]
    data: Vec<Client>,
}

/// Authenticated session with the network controller.
///
/// The cookie lives in the HTTP client's store; the session owns that client.
pub struct ControllerSession {
    http: HttpClient,
    base_url: String,
    site: String,
    csrf_token: Option<String>,
}

impl ControllerSession {
    pub async fn login(
        http: HttpClient,
        address: &str,
        site: &str,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let url = format!("{address}/api/auth/login");
        debug!(url = %url, user = username, "logging in to controller");

        let resp = http
            .post(&url)
            .json(&LoginRequest { password, username })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Auth(format!("controller login returned {status}")));
        }

        let csrf_token = resp
            .headers()
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = resp.text().await?;
        serde_json::from_str::<serde_json::Value>(&body)
            .map_err(|_| Error::Auth("controller login returned a malformed response".into()))?;

        Ok(Self {
            http,
            base_url: address.to_string(),
            site: site.to_string(),
            csrf_token,
        })
    }

    fn site_url(&self, path: &str) -> String {
        format!("{}/proxy/network/api/s/{}/{path}", self.base_url, self.site)
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.http.get(url);
        match &self.csrf_token {
            Some(token) => request.header(CSRF_HEADER, token),
            None => request,
        }
    }

    /// Looks a device up by MAC address.
    pub async fn query_client(&self, mac: &str) -> Result<ClientLookup> {
        let url = self.site_url(&format!("stat/user/{mac}"));
        debug!(url = %url, "querying controller client");

        let resp = self.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        let detail: ClientDetailResponse = serde_json::from_str(&body).map_err(|err| {
            Error::Remote(format!(
                "client lookup for {mac} returned {status} with an unexpected body: {err}"
            ))
        })?;

        match detail.meta.rc.as_str() {
            "ok" => Ok(detail
                .data
                .into_iter()
                .next()
                .map_or(ClientLookup::NotConfigured, ClientLookup::Found)),
            _ if detail.meta.msg.as_deref() == Some(UNKNOWN_CLIENT) => {
                Ok(ClientLookup::NotConfigured)
            }
            rc => Err(Error::Remote(format!(
                "client lookup for {mac} failed: {}",
                detail.meta.msg.as_deref().unwrap_or(rc)
            ))),
        }
    }

    pub async fn logout(self) -> Result<()> {
        let url = self.site_url("logout");
        debug!(url = %url, "logging out of controller");
        self.get(&url).send().await?.error_for_status()?;
        Ok(())
    }
}
