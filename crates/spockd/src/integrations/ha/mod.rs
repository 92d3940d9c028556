//! Home Assistant host backend.
//!
//! Reads entity states and calls the generic `homeassistant.turn_on` /
//! `homeassistant.turn_off` services over the REST API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use linkme::distributed_slice;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine;
use crate::engine::{HostError, Target};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct EntityState {
    state: String,
}

#[derive(Serialize)]
struct ServiceCall<'a> {
    entity_id: &'a [String],
}

/// Home Assistant REST API host
pub struct HomeAssistantHost {
    base_url: String,
    token: String,
    client: Client,
}

impl HomeAssistantHost {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    async fn error_for(response: reqwest::Response) -> HostError {
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HostError::Auth,
            status => HostError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            },
        }
    }
}

fn transport(e: reqwest::Error) -> HostError {
    HostError::Transport(Box::new(e))
}

#[async_trait]
impl engine::Host for HomeAssistantHost {
    fn name(&self) -> &str {
        "home_assistant"
    }

    async fn get_state(&self, entity_id: &str) -> Result<Option<String>, HostError> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        debug!("Getting state for entity: {}", entity_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::OK => {
                let entity: EntityState = response.json().await.map_err(transport)?;
                debug!("Entity {} = '{}'", entity_id, entity.state);
                Ok(Some(entity.state))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::error_for(response).await),
        }
    }

    async fn set_state(&self, entity_ids: &[String], target: Target) -> Result<(), HostError> {
        let url = format!(
            "{}/api/services/homeassistant/{}",
            self.base_url,
            target.service()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&ServiceCall {
                entity_id: entity_ids,
            })
            .send()
            .await
            .map_err(transport)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_for(response).await)
        }
    }
}

#[distributed_slice(engine::HOST_REGISTRY)]
fn init_home_assistant(ctx: &engine::HostContext) -> engine::HostFactoryResult {
    let ha_config = &ctx.config.home_assistant;

    let token = ha_config
        .token
        .clone()
        .or_else(|| std::env::var("HA_TOKEN").ok())
        .context("Home Assistant token not found in config or HA_TOKEN environment variable")?;

    info!("Initializing Home Assistant host: {}", ha_config.url);
    let host = HomeAssistantHost::new(&ha_config.url, token)
        .context("failed to build Home Assistant HTTP client")?;
    Ok(Some(Arc::new(host)))
}
