use serde::{Deserialize, Serialize};

use crate::{
    domain::{ConfigMap, ServiceId},
    error::ApiError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetConfigRequest {
    pub request_id: u64,
    pub service_id: ServiceId,
    /// Options whose submitted value differs from the last confirmed value.
    pub changed: ConfigMap,
    /// Last confirmed values the edit was based on. Informational; the
    /// environment applies `changed` regardless.
    pub previous: ConfigMap,
    /// Raw configuration file content; when present it replaces `changed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetConfigResponse {
    pub request_id: u64,
    pub service_id: ServiceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<ApiError>,
    #[serde(default)]
    pub new_values: ConfigMap,
}

impl SetConfigResponse {
    pub fn ok(request: &SetConfigRequest, new_values: ConfigMap) -> Self {
        Self {
            request_id: request.request_id,
            service_id: request.service_id.clone(),
            err: None,
            new_values,
        }
    }

    pub fn failed(request: &SetConfigRequest, err: ApiError) -> Self {
        Self {
            request_id: request.request_id,
            service_id: request.service_id.clone(),
            err: Some(err),
            new_values: ConfigMap::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }
}
