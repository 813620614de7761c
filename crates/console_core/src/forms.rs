//! Schema-driven helpers for the configuration form: settings extraction,
//! validation, coercion and change detection.

use std::collections::BTreeMap;

use shared::domain::{CharmSchema, ConfigMap, ConfigValue, OptionType};

use crate::error::{ValidationError, ValidationErrorKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSetting {
    pub name: String,
    pub option_type: OptionType,
    pub value: Option<ConfigValue>,
    pub description: Option<String>,
}

impl ServiceSetting {
    pub fn is_bool(&self) -> bool {
        self.option_type == OptionType::Boolean
    }

    pub fn field_value(&self) -> String {
        self.value
            .as_ref()
            .map(ConfigValue::to_field_string)
            .unwrap_or_default()
    }
}

/// One entry per schema option, in schema order, carrying the current value
/// or the schema default.
pub fn extract_service_settings(schema: &CharmSchema, config: &ConfigMap) -> Vec<ServiceSetting> {
    schema
        .iter()
        .map(|(name, option)| ServiceSetting {
            name: name.clone(),
            option_type: option.option_type,
            value: config.get(name).or(option.default.as_ref()).cloned(),
            description: option.description.clone(),
        })
        .collect()
}

/// Schema defaults overlaid with the service's stored values.
pub fn effective_config(schema: &CharmSchema, config: &ConfigMap) -> ConfigMap {
    let mut effective: ConfigMap = schema
        .iter()
        .filter_map(|(name, option)| Some((name.clone(), option.default.clone()?)))
        .collect();
    effective.extend(config.iter().map(|(k, v)| (k.clone(), v.clone())));
    effective
}

/// Checks raw field values against the schema. Numeric options are
/// required; booleans must be `true` or `false`; strings accept anything.
pub fn validate(values: &BTreeMap<String, String>, schema: &CharmSchema) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (key, option) in schema {
        let Some(raw) = values.get(key) else {
            continue;
        };
        let kind = match option.option_type {
            OptionType::String => None,
            ty if ty.is_numeric() && raw.trim().is_empty() => Some(ValidationErrorKind::Required),
            ty => ConfigValue::parse_as(ty, raw)
                .is_none()
                .then(|| ValidationErrorKind::TypeMismatch {
                    expected: ty,
                    value: raw.clone(),
                }),
        };
        if let Some(kind) = kind {
            errors.push(ValidationError {
                key: key.clone(),
                kind,
            });
        }
    }
    errors
}

/// Converts validated raw values into typed config values. Options missing
/// from the schema are passed through as text.
pub fn coerce(values: &BTreeMap<String, String>, schema: &CharmSchema) -> ConfigMap {
    values
        .iter()
        .map(|(key, raw)| {
            let value = schema
                .get(key)
                .and_then(|option| ConfigValue::parse_as(option.option_type, raw))
                .unwrap_or_else(|| ConfigValue::Text(raw.clone()));
            (key.clone(), value)
        })
        .collect()
}

/// Entries of `submitted` that differ from the last confirmed values.
pub fn changed_values(submitted: &ConfigMap, confirmed: &ConfigMap) -> ConfigMap {
    submitted
        .iter()
        .filter(|(key, value)| match confirmed.get(*key) {
            Some(current) => !same_value(current, value),
            None => true,
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Compares by field representation so `"true"` and `true` are equal.
fn same_value(a: &ConfigValue, b: &ConfigValue) -> bool {
    a == b || a.to_field_string() == b.to_field_string()
}
