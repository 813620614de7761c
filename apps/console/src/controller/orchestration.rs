//! Command orchestration from UI actions to the backend command queue.

use console_core::EnvironmentHandle;
use crossbeam_channel::{Sender, TrySendError};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{SetConfigRequest, SetConfigResponse},
};

use crate::{backend_bridge::commands::BackendCommand, controller::events::UiEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    QueueFull,
    Disconnected,
}

impl DispatchError {
    pub fn message(self) -> &'static str {
        match self {
            Self::QueueFull => "UI command queue is full; please retry",
            Self::Disconnected => {
                "Backend command processor disconnected (possible startup/runtime failure)"
            }
        }
    }
}

pub fn dispatch_backend_command(
    cmd_tx: &Sender<BackendCommand>,
    cmd: BackendCommand,
) -> Result<(), DispatchError> {
    let cmd_name = cmd.name();
    match cmd_tx.try_send(cmd) {
        Ok(()) => {
            tracing::debug!(command = cmd_name, "queued ui->backend command");
            Ok(())
        }
        Err(TrySendError::Full(_)) => {
            tracing::warn!(command = cmd_name, "backend command queue is full");
            Err(DispatchError::QueueFull)
        }
        Err(TrySendError::Disconnected(_)) => {
            tracing::error!(command = cmd_name, "backend command processor disconnected");
            Err(DispatchError::Disconnected)
        }
    }
}

/// Environment handle for the UI thread. Requests go to the backend worker;
/// when they cannot be queued, a failed reply is posted straight back so
/// the form does not wait forever.
pub struct ChannelEnvironment {
    cmd_tx: Sender<BackendCommand>,
    ui_tx: Sender<UiEvent>,
}

impl ChannelEnvironment {
    pub fn new(cmd_tx: Sender<BackendCommand>, ui_tx: Sender<UiEvent>) -> Self {
        Self { cmd_tx, ui_tx }
    }
}

impl EnvironmentHandle for ChannelEnvironment {
    fn set_config(&self, request: SetConfigRequest) {
        let pending = request.clone();
        if let Err(err) = dispatch_backend_command(&self.cmd_tx, BackendCommand::SetConfig(request))
        {
            let response = SetConfigResponse::failed(
                &pending,
                ApiError::new(ErrorCode::Unavailable, err.message()),
            );
            let _ = self.ui_tx.send(UiEvent::SetConfigResult(response));
        }
    }
}
