//! Keystone token issue and service catalogue resolution.
//!
//! The identity API version follows the endpoint: a path ending in `/v3`
//! uses the v3 password flow, anything else the v2.0 tenant flow.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::error::OpenstackError;
use crate::session::Credentials;

use super::{AuthToken, Endpoints, HTTP_CLIENT, HTTP_TIMEOUT};

const DEFAULT_DOMAIN: &str = "Default";
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(super) enum IdentityVersion {
    V2,
    V3,
}

impl IdentityVersion {
    pub(super) fn detect(endpoint: &str) -> Self {
        if endpoint.trim_end_matches('/').ends_with("/v3") {
            Self::V3
        } else {
            Self::V2
        }
    }
}

/// One service from the catalogue, reduced to what endpoint selection needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct CatalogService {
    pub(super) service_type: String,
    pub(super) endpoints: Vec<CatalogEndpoint>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct CatalogEndpoint {
    pub(super) region: Option<String>,
    pub(super) url: String,
}

pub(super) async fn authenticate(
    credentials: &Credentials,
) -> Result<(AuthToken, Endpoints), OpenstackError> {
    let base = credentials.endpoint.trim_end_matches('/');
    let (token, catalog) = match IdentityVersion::detect(base) {
        IdentityVersion::V2 => authenticate_v2(base, credentials).await?,
        IdentityVersion::V3 => authenticate_v3(base, credentials).await?,
    };
    let endpoints = resolve_endpoints(&catalog, credentials.region.as_deref())?;
    Ok((token, endpoints))
}

async fn post_identity(
    url: &str,
    credentials: &Credentials,
    body: &serde_json::Value,
) -> Result<reqwest::Response, OpenstackError> {
    let response = HTTP_CLIENT
        .post(url)
        .json(body)
        .timeout(HTTP_TIMEOUT)
        .send()
        .await
        .map_err(OpenstackError::provider)?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(OpenstackError::Authentication {
            endpoint: credentials.endpoint.clone(),
            message: format!("{status}: {text}"),
        });
    }
    Err(OpenstackError::provider(format!(
        "identity service returned {status}: {text}"
    )))
}

#[derive(Debug, Deserialize)]
struct V2Envelope {
    access: V2Access,
}

#[derive(Debug, Deserialize)]
struct V2Access {
    token: V2Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<V2Service>,
}

#[derive(Debug, Deserialize)]
struct V2Token {
    id: String,
}

#[derive(Debug, Deserialize)]
struct V2Service {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<V2Endpoint>,
}

#[derive(Debug, Deserialize)]
struct V2Endpoint {
    #[serde(default)]
    region: Option<String>,
    #[serde(rename = "publicURL")]
    public_url: String,
}

async fn authenticate_v2(
    base: &str,
    credentials: &Credentials,
) -> Result<(AuthToken, Vec<CatalogService>), OpenstackError> {
    let body = json!({
        "auth": {
            "passwordCredentials": {
                "username": credentials.identity.principal,
                "password": credentials.credential.expose(),
            },
            "tenantName": credentials.identity.project,
        }
    });
    let response = post_identity(&format!("{base}/tokens"), credentials, &body).await?;
    let envelope: V2Envelope = response.json().await.map_err(OpenstackError::provider)?;

    let catalog = envelope
        .access
        .service_catalog
        .into_iter()
        .map(|service| CatalogService {
            service_type: service.service_type,
            endpoints: service
                .endpoints
                .into_iter()
                .map(|endpoint| CatalogEndpoint {
                    region: endpoint.region,
                    url: endpoint.public_url,
                })
                .collect(),
        })
        .collect();
    Ok((AuthToken::new(envelope.access.token.id), catalog))
}

#[derive(Debug, Deserialize)]
struct V3Envelope {
    token: V3Token,
}

#[derive(Debug, Deserialize)]
struct V3Token {
    #[serde(default)]
    catalog: Vec<V3Service>,
}

#[derive(Debug, Deserialize)]
struct V3Service {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<V3Endpoint>,
}

#[derive(Debug, Deserialize)]
struct V3Endpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

async fn authenticate_v3(
    base: &str,
    credentials: &Credentials,
) -> Result<(AuthToken, Vec<CatalogService>), OpenstackError> {
    let body = json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": credentials.identity.principal,
                        "domain": {"name": DEFAULT_DOMAIN},
                        "password": credentials.credential.expose(),
                    }
                }
            },
            "scope": {
                "project": {
                    "name": credentials.identity.project,
                    "domain": {"name": DEFAULT_DOMAIN},
                }
            }
        }
    });
    let response = post_identity(&format!("{base}/auth/tokens"), credentials, &body).await?;
    let token = response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| {
            OpenstackError::provider(format!("identity response lacks {SUBJECT_TOKEN_HEADER}"))
        })?;
    let envelope: V3Envelope = response.json().await.map_err(OpenstackError::provider)?;

    let catalog = envelope
        .token
        .catalog
        .into_iter()
        .map(|service| CatalogService {
            service_type: service.service_type,
            endpoints: service
                .endpoints
                .into_iter()
                .filter(|endpoint| endpoint.interface == "public")
                .map(|endpoint| CatalogEndpoint {
                    region: endpoint.region_id.or(endpoint.region),
                    url: endpoint.url,
                })
                .collect(),
        })
        .collect();
    Ok((AuthToken::new(token), catalog))
}

pub(super) fn resolve_endpoints(
    catalog: &[CatalogService],
    region: Option<&str>,
) -> Result<Endpoints, OpenstackError> {
    Ok(Endpoints {
        compute: select_endpoint(catalog, "compute", region)?,
        network: select_endpoint(catalog, "network", region)?,
        image: select_endpoint(catalog, "image", region)?,
    })
}

/// First endpoint of the service, restricted to `region` when one is given.
fn select_endpoint(
    catalog: &[CatalogService],
    service_type: &str,
    region: Option<&str>,
) -> Result<String, OpenstackError> {
    catalog
        .iter()
        .filter(|service| service.service_type == service_type)
        .flat_map(|service| service.endpoints.iter())
        .find(|endpoint| region.is_none_or(|wanted| endpoint.region.as_deref() == Some(wanted)))
        .map(|endpoint| endpoint.url.trim_end_matches('/').to_owned())
        .ok_or_else(|| {
            let scope = region.map_or_else(String::new, |wanted| format!(" in region {wanted}"));
            OpenstackError::provider(format!(
                "service catalogue has no {service_type} endpoint{scope}"
            ))
        })
}
