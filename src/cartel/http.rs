//! HTTP implementation of [`CartelClient`] for the Cartel v3 JSON API.
//!
//! Every action is a `POST {host}/v3/api/{action}` carrying the host names
//! in `name_tag`. The client expects a pre-issued token; obtaining one is the
//! caller's concern.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ConfigError, ProviderConfig};

use super::{CartelClient, CartelError, CartelFuture, CreateAck, CreateRequest, DeploymentState, Instance};

const API_PREFIX: &str = "v3/api";

#[derive(Serialize)]
struct NamesBody<'a> {
    name_tag: Vec<&'a str>,
}

#[derive(Serialize)]
struct TagsBody<'a> {
    name_tag: Vec<&'a str>,
    tags: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct UserGroupsBody<'a> {
    name_tag: Vec<&'a str>,
    ldap_groups: &'a [String],
}

#[derive(Serialize)]
struct SecurityGroupsBody<'a> {
    name_tag: Vec<&'a str>,
    security_groups: &'a [String],
}

#[derive(Deserialize)]
struct CreateResponse {
    #[serde(default)]
    result: Option<CreateAck>,
}

#[derive(Deserialize)]
struct DeploymentStatusResponse {
    deployment_state: String,
}

/// Cartel client speaking JSON over HTTPS.
#[derive(Clone, Debug)]
pub struct HttpCartelClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    bastion_host: String,
}

impl HttpCartelClient {
    /// Builds a client from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration fails validation or the
    /// HTTP client cannot be constructed.
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.cartel_request_timeout_secs))
            .build()
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        Ok(Self {
            http,
            base_url: config.cartel_host.trim().trim_end_matches('/').to_owned(),
            token: config.cartel_token.clone(),
            bastion_host: config.cartel_bastion_host.clone().unwrap_or_default(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{API_PREFIX}/{action}", self.base_url)
    }

    async fn send<B>(&self, action: &str, body: &B) -> Result<(u16, Vec<u8>), CartelError>
    where
        B: Serialize + Sync + ?Sized,
    {
        debug!(action, "cartel request");
        let response = self
            .http
            .post(self.endpoint(action))
            .header("Authorization", &self.token)
            .json(body)
            .send()
            .await
            .map_err(|err| CartelError::Transport {
                action: action.to_owned(),
                message: err.to_string(),
            })?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| CartelError::Transport {
                action: action.to_owned(),
                message: err.to_string(),
            })?;
        debug!(action, status, "cartel response");
        Ok((status, bytes.to_vec()))
    }

    async fn call<B, T>(&self, action: &str, body: &B) -> Result<T, CartelError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let (status, bytes) = self.send(action, body).await?;
        let payload = interpret(action, status, &bytes)?;
        serde_json::from_slice(payload).map_err(|err| CartelError::Decode {
            action: action.to_owned(),
            message: err.to_string(),
        })
    }

    async fn call_unit<B>(&self, action: &str, body: &B) -> Result<(), CartelError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let (status, bytes) = self.send(action, body).await?;
        if is_success(status) {
            return Ok(());
        }
        Err(failure(action, status, &bytes))
    }
}

const fn is_success(status: u16) -> bool {
    status >= 200 && status < 300
}

/// Classifies a raw Cartel response, returning the body when it carries a
/// usable payload.
pub(crate) fn interpret<'b>(
    action: &str,
    status: u16,
    body: &'b [u8],
) -> Result<&'b [u8], CartelError> {
    if !is_success(status) {
        return Err(failure(action, status, body));
    }
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Err(CartelError::EmptyBody {
            action: action.to_owned(),
            status,
        });
    }
    Ok(body)
}

fn failure(action: &str, status: u16, body: &[u8]) -> CartelError {
    let message = String::from_utf8_lossy(body).trim().to_owned();
    if matches!(status, 400 | 409) && message.to_ascii_lowercase().contains("already exist") {
        return CartelError::AlreadyExists {
            action: action.to_owned(),
            status,
            message,
        };
    }
    CartelError::Status {
        action: action.to_owned(),
        status,
        message,
    }
}

impl CartelClient for HttpCartelClient {
    fn create<'a>(&'a self, request: &'a CreateRequest) -> CartelFuture<'a, CreateAck> {
        Box::pin(async move {
            let response: CreateResponse = self.call("create", request).await?;
            response.result.ok_or_else(|| CartelError::EmptyBody {
                action: String::from("create"),
                status: 200,
            })
        })
    }

    fn destroy<'a>(&'a self, name: &'a str) -> CartelFuture<'a, ()> {
        Box::pin(async move {
            self.call_unit("destroy", &NamesBody { name_tag: vec![name] })
                .await
        })
    }

    fn get_details<'a>(&'a self, name: &'a str) -> CartelFuture<'a, Instance> {
        Box::pin(async move {
            let mut details: BTreeMap<String, Instance> = self
                .call("instance_details", &NamesBody { name_tag: vec![name] })
                .await?;
            let mut instance = details.remove(name).ok_or_else(|| CartelError::Missing {
                action: String::from("instance_details"),
                name: name.to_owned(),
            })?;
            if instance.name.is_empty() {
                name.clone_into(&mut instance.name);
            }
            Ok(instance)
        })
    }

    fn get_deployment_state<'a>(&'a self, name: &'a str) -> CartelFuture<'a, DeploymentState> {
        Box::pin(async move {
            let response: DeploymentStatusResponse = self
                .call("deployment_status", &NamesBody { name_tag: vec![name] })
                .await?;
            Ok(DeploymentState::from(response.deployment_state))
        })
    }

    fn get_all_instances(&self) -> CartelFuture<'_, Vec<Instance>> {
        Box::pin(async move {
            self.call("get_all_instances", &NamesBody { name_tag: vec![] })
                .await
        })
    }

    fn add_tags<'a>(
        &'a self,
        names: &'a [String],
        tags: &'a BTreeMap<String, String>,
    ) -> CartelFuture<'a, ()> {
        Box::pin(async move {
            let body = TagsBody {
                name_tag: names.iter().map(String::as_str).collect(),
                tags,
            };
            self.call_unit("tag_instance", &body).await
        })
    }

    fn add_user_groups<'a>(&'a self, name: &'a str, groups: &'a [String]) -> CartelFuture<'a, ()> {
        Box::pin(async move {
            let body = UserGroupsBody {
                name_tag: vec![name],
                ldap_groups: groups,
            };
            self.call_unit("add_ldap_group", &body).await
        })
    }

    fn remove_user_groups<'a>(
        &'a self,
        name: &'a str,
        groups: &'a [String],
    ) -> CartelFuture<'a, ()> {
        Box::pin(async move {
            let body = UserGroupsBody {
                name_tag: vec![name],
                ldap_groups: groups,
            };
            self.call_unit("remove_ldap_group", &body).await
        })
    }

    fn add_security_groups<'a>(
        &'a self,
        name: &'a str,
        groups: &'a [String],
    ) -> CartelFuture<'a, ()> {
        Box::pin(async move {
            let body = SecurityGroupsBody {
                name_tag: vec![name],
                security_groups: groups,
            };
            self.call_unit("add_security_groups", &body).await
        })
    }

    fn remove_security_groups<'a>(
        &'a self,
        name: &'a str,
        groups: &'a [String],
    ) -> CartelFuture<'a, ()> {
        Box::pin(async move {
            let body = SecurityGroupsBody {
                name_tag: vec![name],
                security_groups: groups,
            };
            self.call_unit("remove_security_groups", &body).await
        })
    }

    fn set_protection<'a>(&'a self, name: &'a str, protect: bool) -> CartelFuture<'a, ()> {
        Box::pin(async move {
            let action = if protect { "protect" } else { "unprotect" };
            self.call_unit(action, &NamesBody { name_tag: vec![name] })
                .await
        })
    }

    fn bastion_host(&self) -> String {
        self.bastion_host.clone()
    }
}
