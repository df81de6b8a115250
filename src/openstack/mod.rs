//! REST adapter implementing [`ComputeApi`] against a real OpenStack cloud.
//!
//! Identity goes through Keystone (v2.0 or v3), servers, flavors and floating
//! IPs through Nova, networks through Neutron and images through Glance.

mod auth;
mod wait;
mod wire;

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::backend::{ApiFuture, ComputeApi, TaggedServerRequest};
use crate::error::OpenstackError;
use crate::model::{ActionResponse, Flavor, FloatingIp, Image, Network, Server};
use crate::session::Credentials;

use wire::{
    AllocateBody, CreateServerBody, CreatedEnvelope, FlavorsEnvelope, FloatingIpEnvelope,
    FloatingIpsEnvelope, ImagesPage, NetworksEnvelope, ServerAction, ServerEnvelope,
    ServersEnvelope,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Token issued by the identity service. Never printed.
#[derive(Clone, Eq, PartialEq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wraps a token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Public service URLs picked from the catalogue.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoints {
    /// Nova, usually including the project id.
    pub compute: String,
    /// Neutron root.
    pub network: String,
    /// Glance root.
    pub image: String,
}

/// Authenticated OpenStack REST client.
#[derive(Clone, Debug)]
pub struct OpenstackApi {
    token: AuthToken,
    endpoints: Endpoints,
    poll_interval: Duration,
}

impl OpenstackApi {
    /// Issues a token and resolves the service catalogue.
    ///
    /// # Errors
    ///
    /// Returns [`OpenstackError::Authentication`] when the identity service
    /// rejects the credentials, or [`OpenstackError::Provider`] when it is
    /// unreachable or a required service is missing from the catalogue.
    pub async fn authenticate(credentials: &Credentials) -> Result<Self, OpenstackError> {
        let (token, endpoints) = auth::authenticate(credentials).await?;
        Ok(Self::new(token, endpoints))
    }

    /// Builds a client from an existing token and endpoints.
    #[must_use]
    pub const fn new(token: AuthToken, endpoints: Endpoints) -> Self {
        Self {
            token,
            endpoints,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the interval between status polls while booting.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Resolved service endpoints.
    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn compute_url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoints.compute)
    }

    async fn send(&self, builder: RequestBuilder, url: &str) -> Result<Response, OpenstackError> {
        let response = builder
            .header(AUTH_TOKEN_HEADER, self.token.expose())
            .timeout(HTTP_TIMEOUT)
            .send()
            .await
            .map_err(OpenstackError::provider)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(OpenstackError::Authentication {
                endpoint: url.to_owned(),
                message: String::from("token rejected"),
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(
        context: &str,
        response: Response,
    ) -> Result<T, OpenstackError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OpenstackError::provider(format!(
                "{context} returned {status}: {text}"
            )));
        }
        response.json().await.map_err(OpenstackError::provider)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, OpenstackError> {
        let response = self.send(HTTP_CLIENT.get(url), url).await?;
        Self::decode(&format!("GET {url}"), response).await
    }

    /// Turns a non-2xx response into an action failure carrying its text.
    async fn expect_success(what: &str, response: Response) -> Result<Response, OpenstackError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(OpenstackError::action_failed(format!(
            "failed to {what}: {status} {text}"
        )))
    }

    async fn fetch_server(&self, id: &str) -> Result<Option<Server>, OpenstackError> {
        let url = self.compute_url(&format!("/servers/{id}"));
        let response = self.send(HTTP_CLIENT.get(&url), &url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: ServerEnvelope = Self::decode(&format!("GET {url}"), response).await?;
        Ok(Some(envelope.server.into()))
    }

    async fn create_server(&self, request: &TaggedServerRequest) -> Result<String, OpenstackError> {
        let url = self.compute_url("/servers");
        let body = CreateServerBody::new(request);
        let response = self.send(HTTP_CLIENT.post(&url).json(&body), &url).await?;
        let created = Self::expect_success("create server", response).await?;
        let envelope: CreatedEnvelope = created.json().await.map_err(OpenstackError::provider)?;
        Ok(envelope.server.id)
    }

    async fn server_action(
        &self,
        server_id: &str,
        action: ServerAction<'_>,
    ) -> Result<(), OpenstackError> {
        let url = self.compute_url(&format!("/servers/{server_id}/action"));
        let response = self.send(HTTP_CLIENT.post(&url).json(&action), &url).await?;
        Self::expect_success(action.describe(), response).await?;
        Ok(())
    }

    async fn images(&self) -> Result<Vec<Image>, OpenstackError> {
        let root = self.endpoints.image.trim_end_matches("/v2");
        let mut url = format!("{root}/v2/images");
        let mut images = Vec::new();
        loop {
            let page: ImagesPage = self.get_json(&url).await?;
            images.extend(page.images.into_iter().map(Image::from));
            let Some(next) = page.next else {
                return Ok(images);
            };
            let next_url = if next.starts_with("http") {
                next
            } else {
                format!("{root}{next}")
            };
            if next_url == url {
                warn!(%url, "Image listing links back to the same page, stopping");
                return Ok(images);
            }
            url = next_url;
        }
    }
}

impl ComputeApi for OpenstackApi {
    fn list_networks(&self) -> ApiFuture<'_, Vec<Network>> {
        Box::pin(async move {
            let url = format!("{}/v2.0/networks", self.endpoints.network);
            let envelope: NetworksEnvelope = self.get_json(&url).await?;
            Ok(envelope.networks.into_iter().map(Network::from).collect())
        })
    }

    fn list_images(&self) -> ApiFuture<'_, Vec<Image>> {
        Box::pin(self.images())
    }

    fn list_flavors(&self) -> ApiFuture<'_, Vec<Flavor>> {
        Box::pin(async move {
            let envelope: FlavorsEnvelope =
                self.get_json(&self.compute_url("/flavors/detail")).await?;
            Ok(envelope.flavors.into_iter().map(Flavor::from).collect())
        })
    }

    fn list_servers(&self) -> ApiFuture<'_, Vec<Server>> {
        Box::pin(async move {
            let envelope: ServersEnvelope =
                self.get_json(&self.compute_url("/servers/detail")).await?;
            Ok(envelope.servers.into_iter().map(Server::from).collect())
        })
    }

    fn get_server<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Option<Server>> {
        Box::pin(self.fetch_server(id))
    }

    fn boot_and_wait_active<'a>(
        &'a self,
        request: &'a TaggedServerRequest,
        timeout: Duration,
    ) -> ApiFuture<'a, Server> {
        Box::pin(async move {
            let id = self.create_server(request).await?;
            Ok(self
                .wait_for_terminal(&id, &request.request().name, timeout)
                .await)
        })
    }

    fn delete_server<'a>(&'a self, id: &'a str) -> ApiFuture<'a, ActionResponse> {
        Box::pin(async move {
            let url = self.compute_url(&format!("/servers/{id}"));
            let response = self.send(HTTP_CLIENT.delete(&url), &url).await?;
            let status = response.status();
            if status.is_success() {
                return Ok(ActionResponse::success(status.as_u16()));
            }
            let text = response.text().await.unwrap_or_default();
            Ok(ActionResponse::failure(status.as_u16(), text))
        })
    }

    fn list_floating_ips(&self) -> ApiFuture<'_, Vec<FloatingIp>> {
        Box::pin(async move {
            let envelope: FloatingIpsEnvelope =
                self.get_json(&self.compute_url("/os-floating-ips")).await?;
            Ok(envelope
                .floating_ips
                .into_iter()
                .map(FloatingIp::from)
                .collect())
        })
    }

    fn allocate_floating_ip<'a>(&'a self, pool: Option<&'a str>) -> ApiFuture<'a, FloatingIp> {
        Box::pin(async move {
            let url = self.compute_url("/os-floating-ips");
            let body = AllocateBody { pool };
            let response = self.send(HTTP_CLIENT.post(&url).json(&body), &url).await?;
            let allocated = Self::expect_success("allocate floating IP", response).await?;
            let envelope: FloatingIpEnvelope =
                allocated.json().await.map_err(OpenstackError::provider)?;
            Ok(envelope.floating_ip.into())
        })
    }

    fn add_floating_ip<'a>(&'a self, server_id: &'a str, address: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(self.server_action(server_id, ServerAction::AddFloatingIp { address }))
    }

    fn remove_floating_ip<'a>(
        &'a self,
        server_id: &'a str,
        address: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(self.server_action(server_id, ServerAction::RemoveFloatingIp { address }))
    }

    fn deallocate_floating_ip<'a>(&'a self, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.compute_url(&format!("/os-floating-ips/{id}"));
            let response = self.send(HTTP_CLIENT.delete(&url), &url).await?;
            Self::expect_success("deallocate floating IP", response).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests;
