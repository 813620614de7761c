//! Backend commands queued from the UI thread to the backend worker.

use std::path::PathBuf;

use shared::protocol::SetConfigRequest;

#[derive(Debug)]
pub enum BackendCommand {
    SetConfig(SetConfigRequest),
    ReadFile { path: PathBuf },
    Shutdown,
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetConfig(_) => "set_config",
            Self::ReadFile { .. } => "read_file",
            Self::Shutdown => "shutdown",
        }
    }
}
