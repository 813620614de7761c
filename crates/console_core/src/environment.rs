//! Collaborators the views depend on: the remote environment, the charm
//! store, and the notification sink.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{CharmSchema, CharmUrl, ConfigMap, ConfigValue, Notification, ServiceId},
    error::{ApiError, ErrorCode},
    protocol::{SetConfigRequest, SetConfigResponse},
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};
use url::Url;

/// UI-side handle: fire and forget. The reply comes back later through the
/// owning view's callback.
pub trait EnvironmentHandle: Send + Sync {
    fn set_config(&self, request: SetConfigRequest);
}

/// Backend-side environment connection.
#[async_trait]
pub trait Environment: Send + Sync {
    async fn set_config(&self, request: SetConfigRequest) -> Result<SetConfigResponse>;
}

pub trait CharmStore: Send + Sync {
    fn schema(&self, charm: &CharmUrl) -> Option<CharmSchema>;
}

#[derive(Default)]
pub struct InMemoryCharmStore {
    charms: HashMap<CharmUrl, CharmSchema>,
}

impl InMemoryCharmStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_charm(mut self, charm: CharmUrl, schema: CharmSchema) -> Self {
        self.charms.insert(charm, schema);
        self
    }

    pub fn insert(&mut self, charm: CharmUrl, schema: CharmSchema) {
        self.charms.insert(charm, schema);
    }
}

impl CharmStore for InMemoryCharmStore {
    fn schema(&self, charm: &CharmUrl) -> Option<CharmSchema> {
        self.charms.get(charm).cloned()
    }
}

/// Append-only sink for user-visible messages.
pub trait NotificationSink: Send + Sync {
    fn add(&self, notification: Notification);
}

#[derive(Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn last(&self) -> Option<Notification> {
        self.lock().last().cloned()
    }
}

impl NotificationSink for NotificationLog {
    fn add(&self, notification: Notification) {
        tracing::debug!(
            title = %notification.title,
            level = ?notification.level,
            "notification added"
        );
        self.lock().push(notification);
    }
}

/// Environment kept in process, used by the console host and tests.
pub struct InMemoryEnvironment {
    services: AsyncMutex<HashMap<ServiceId, ConfigMap>>,
    latency: Duration,
}

impl InMemoryEnvironment {
    pub fn new(services: impl IntoIterator<Item = (ServiceId, ConfigMap)>) -> Arc<Self> {
        Self::with_latency(services, Duration::ZERO)
    }

    pub fn with_latency(
        services: impl IntoIterator<Item = (ServiceId, ConfigMap)>,
        latency: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            services: AsyncMutex::new(services.into_iter().collect()),
            latency,
        })
    }

    pub async fn config(&self, service_id: &ServiceId) -> Option<ConfigMap> {
        self.services.lock().await.get(service_id).cloned()
    }
}

#[async_trait]
impl Environment for InMemoryEnvironment {
    async fn set_config(&self, request: SetConfigRequest) -> Result<SetConfigResponse> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut services = self.services.lock().await;
        let Some(config) = services.get_mut(&request.service_id) else {
            return Ok(SetConfigResponse::failed(
                &request,
                ApiError::new(
                    ErrorCode::NotFound,
                    format!("service {} not found", request.service_id),
                ),
            ));
        };

        let changed = match &request.config_file {
            Some(content) => match parse_config_file(&request.service_id, content) {
                Ok(values) => values,
                Err(err) => {
                    return Ok(SetConfigResponse::failed(
                        &request,
                        ApiError::new(ErrorCode::Validation, format!("{err:#}")),
                    ));
                }
            },
            None => request.changed.clone(),
        };

        config.extend(changed.clone());
        info!(
            service = %request.service_id,
            changed = changed.len(),
            "applied configuration"
        );
        Ok(SetConfigResponse::ok(&request, changed))
    }
}

/// Parses a TOML configuration file. Accepts either a flat table of options
/// or a table named after the service.
pub fn parse_config_file(service_id: &ServiceId, content: &str) -> Result<ConfigMap> {
    let table: toml::Table = toml::from_str(content).context("config file is not valid TOML")?;
    let options = match table.get(service_id.as_str()) {
        Some(toml::Value::Table(section)) => section.clone(),
        Some(_) => return Err(anyhow!("section '{service_id}' must be a table")),
        None => table,
    };
    options
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                toml::Value::String(text) => ConfigValue::Text(text),
                toml::Value::Integer(number) => ConfigValue::Int(number),
                toml::Value::Float(number) if number.is_finite() => ConfigValue::Float(number),
                toml::Value::Float(_) => {
                    return Err(anyhow!("option '{key}' must be a finite number"))
                }
                toml::Value::Boolean(flag) => ConfigValue::Bool(flag),
                other => {
                    return Err(anyhow!(
                        "option '{key}' has unsupported value type {}",
                        other.type_str()
                    ))
                }
            };
            Ok((key, value))
        })
        .collect()
}

/// Environment reached over HTTP: `POST {base}/services/{id}/config`.
pub struct HttpEnvironment {
    http: Client,
    base_url: Url,
}

impl HttpEnvironment {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid environment url '{base_url}'"))?;
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    fn config_url(&self, service_id: &ServiceId) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("environment url '{}' cannot be a base", self.base_url))?
            .pop_if_empty()
            .extend(["services", service_id.as_str(), "config"]);
        Ok(url)
    }
}

#[async_trait]
impl Environment for HttpEnvironment {
    async fn set_config(&self, request: SetConfigRequest) -> Result<SetConfigResponse> {
        let url = self.config_url(&request.service_id)?;
        debug!(%url, request_id = request.request_id, "posting set_config");
        let res = self
            .http
            .post(url.clone())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("failed to reach environment at {url}"))?;

        let status = res.status();
        if status.is_success() {
            return res
                .json::<SetConfigResponse>()
                .await
                .context("malformed set_config response");
        }

        let code = match status.as_u16() {
            401 | 403 => ErrorCode::Unauthorized,
            404 => ErrorCode::NotFound,
            400 | 422 => ErrorCode::Validation,
            502..=504 => ErrorCode::Unavailable,
            _ => ErrorCode::Internal,
        };
        let body = res.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            format!("environment returned {status}")
        } else {
            body
        };
        Ok(SetConfigResponse::failed(&request, ApiError::new(code, message)))
    }
}

#[cfg(test)]
#[path = "tests/environment_tests.rs"]
mod tests;
