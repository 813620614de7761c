use std::io;

use shared::{
    domain::{CharmUrl, MachineId, OptionType, ServiceId},
    error::ApiError,
};
use thiserror::Error;

use crate::selector::SelectorError;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("no charm schema registered for '{0}'")]
    UnknownCharm(CharmUrl),
    #[error("no bound field for config option '{0}'")]
    UnboundField(String),
    #[error("view has not been rendered")]
    NotRendered,
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationErrorKind {
    #[error("this field is required")]
    Required,
    #[error("the value \"{value}\" is not a valid {}", .expected.label())]
    TypeMismatch { expected: OptionType, value: String },
}

/// A single rejected form field. Blocks submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{key}: {kind}")]
pub struct ValidationError {
    pub key: String,
    pub kind: ValidationErrorKind,
}

/// The environment refused a configuration change. Field state is kept so
/// the user can retry or cancel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to set configuration for {service_id}: {}", .error.message)]
pub struct SubmissionError {
    pub service_id: ServiceId,
    pub error: ApiError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileReadErrorKind {
    NotFound,
    NotReadable,
    Aborted,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {detail}")]
pub struct FileReadError {
    pub kind: FileReadErrorKind,
    pub detail: String,
}

impl FileReadError {
    pub fn new(kind: FileReadErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn from_io(err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => FileReadErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => FileReadErrorKind::NotReadable,
            io::ErrorKind::Interrupted => FileReadErrorKind::Aborted,
            _ => FileReadErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }

    /// Message shown to the user; aborted reads are silent.
    pub fn user_message(&self) -> Option<&'static str> {
        match self.kind {
            FileReadErrorKind::NotFound => Some("File not found"),
            FileReadErrorKind::NotReadable => Some("File is not readable"),
            FileReadErrorKind::Aborted => None,
            FileReadErrorKind::Other => Some("An error occurred reading this file."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("machine '{0}' is already in the list")]
    DuplicateId(MachineId),
    #[error("machine '{0}' is not in the list")]
    UnknownId(MachineId),
    #[error("index {index} is out of range for a list of {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_read_categories() {
        let not_found = io::Error::new(io::ErrorKind::NotFound, "missing");
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let interrupted = io::Error::new(io::ErrorKind::Interrupted, "stop");
        let other = io::Error::new(io::ErrorKind::InvalidData, "bad utf-8");

        assert_eq!(
            FileReadError::from_io(&not_found).user_message(),
            Some("File not found")
        );
        assert_eq!(
            FileReadError::from_io(&denied).user_message(),
            Some("File is not readable")
        );
        assert_eq!(FileReadError::from_io(&interrupted).user_message(), None);
        assert_eq!(
            FileReadError::from_io(&other).user_message(),
            Some("An error occurred reading this file.")
        );
    }

    #[test]
    fn validation_errors_name_the_field() {
        let err = ValidationError {
            key: "port".into(),
            kind: ValidationErrorKind::TypeMismatch {
                expected: OptionType::Int,
                value: "eighty".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "port: the value \"eighty\" is not a valid int"
        );
    }
}
