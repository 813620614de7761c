//! Events delivered from the backend worker to the UI thread.

use console_core::FileReadError;
use shared::protocol::SetConfigResponse;

#[derive(Debug)]
pub enum UiEvent {
    Info(String),
    SetConfigResult(SetConfigResponse),
    FileLoaded { name: String, content: String },
    FileFailed(FileReadError),
    BackendFailed(String),
}
