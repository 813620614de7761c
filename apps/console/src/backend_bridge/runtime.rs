//! Runtime bridge between the UI command queue and backend event intake.

use std::{path::Path, sync::Arc, thread};

use console_core::{Environment, FileReadError};
use crossbeam_channel::{Receiver, Sender};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{SetConfigRequest, SetConfigResponse},
};

use crate::{backend_bridge::commands::BackendCommand, controller::events::UiEvent};

pub fn launch(
    env: Arc<dyn Environment>,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::error!("failed to build backend runtime: {err}");
                let _ = ui_tx.send(UiEvent::BackendFailed(format!(
                    "backend worker startup failure: {err}"
                )));
                return;
            }
        };
        let _ = ui_tx.send(UiEvent::Info("backend worker started".to_string()));

        runtime.block_on(async move {
            while let Ok(cmd) = cmd_rx.recv() {
                tracing::debug!(command = cmd.name(), "backend received command");
                let event = match cmd {
                    BackendCommand::SetConfig(request) => {
                        UiEvent::SetConfigResult(set_config(env.as_ref(), request).await)
                    }
                    BackendCommand::ReadFile { path } => read_file(&path).await,
                    BackendCommand::Shutdown => break,
                };
                if ui_tx.send(event).is_err() {
                    tracing::warn!("ui event queue closed; stopping backend worker");
                    break;
                }
            }
            tracing::info!("backend worker stopped");
        });
    })
}

/// Transport failures become failed responses so the form always hears
/// back about its request.
async fn set_config(env: &dyn Environment, request: SetConfigRequest) -> SetConfigResponse {
    match env.set_config(request.clone()).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(
                service = %request.service_id,
                request_id = request.request_id,
                "set_config failed: {err:#}"
            );
            SetConfigResponse::failed(
                &request,
                ApiError::new(ErrorCode::Unavailable, format!("{err:#}")),
            )
        }
    }
}

async fn read_file(path: &Path) -> UiEvent {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    match tokio::fs::read_to_string(path).await {
        Ok(content) => UiEvent::FileLoaded { name, content },
        Err(err) => {
            tracing::warn!(path = %path.display(), "failed to read config file: {err}");
            UiEvent::FileFailed(FileReadError::from_io(&err))
        }
    }
}
