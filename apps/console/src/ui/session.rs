//! Line-oriented session driver. Each script line is one user gesture or
//! one remote model change; the session routes it into the views and
//! pumps backend replies back into them.

use std::{
    io::{BufRead, Write},
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context, Result};
use console_core::{
    binding::Resolution,
    viewlet::config::{FileClickAction, FileLoad},
    ConfigViewlet, ConfigViewletDeps, DomEvent, MachineList, MachineViewPanel, NotificationLog,
    SaveOutcome, SubmitResult, ViewletAction,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use shared::{
    domain::{ConfigMap, ConfigValue, Machine, MachineId},
    error::{ApiError, ErrorCode},
    protocol::SetConfigResponse,
};

use crate::{
    backend_bridge::commands::BackendCommand,
    controller::{
        events::UiEvent,
        orchestration::{dispatch_backend_command, ChannelEnvironment},
    },
    fixture::Fixture,
    settings::Settings,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCommand {
    Show,
    Set { key: String, value: String },
    Toggle { key: String },
    Save,
    Cancel,
    Import { path: PathBuf },
    RemoveFile,
    Push { key: String, value: Option<ConfigValue> },
    Resolve { key: String, resolution: Resolution },
    Tick { millis: u64 },
    AddMachine { id: String, parent: Option<String> },
    RemoveMachine { id: String },
    RenameMachine { old: String, new: String },
    SortMachines,
    FullWidth(bool),
    Status,
}

/// Values pushed from the script are read as JSON when they parse, so
/// `8080` is an int and `true` a bool; anything else is text.
fn parse_value(raw: &str) -> ConfigValue {
    serde_json::from_str::<ConfigValue>(raw).unwrap_or_else(|_| ConfigValue::Text(raw.to_string()))
}

impl ScriptCommand {
    /// Parses one script line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let mut args = rest.split_whitespace();
        let mut arg = |name: &str| {
            args.next()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("'{verb}' needs {name}"))
        };

        let command = match verb {
            "show" => Self::Show,
            "set" => {
                let key = arg("a key")?;
                let value = rest[key.len()..].trim().to_string();
                Self::Set { key, value }
            }
            "toggle" => Self::Toggle { key: arg("a key")? },
            "save" => Self::Save,
            "cancel" => Self::Cancel,
            "import" => {
                if rest.is_empty() {
                    bail!("'import' needs a path");
                }
                Self::Import {
                    path: PathBuf::from(rest),
                }
            }
            "remove-file" => Self::RemoveFile,
            "push" => {
                let key = arg("a key")?;
                let raw = rest[key.len()..].trim();
                let value = (!raw.is_empty()).then(|| parse_value(raw));
                Self::Push { key, value }
            }
            "resolve" => {
                let key = arg("a key")?;
                let resolution = match arg("mine or theirs")?.as_str() {
                    "mine" => Resolution::KeepMine,
                    "theirs" => Resolution::TakeTheirs,
                    other => bail!("unknown resolution '{other}'"),
                };
                Self::Resolve { key, resolution }
            }
            "tick" => {
                let millis = arg("milliseconds")?;
                Self::Tick {
                    millis: millis
                        .parse()
                        .with_context(|| format!("'{millis}' is not a duration in ms"))?,
                }
            }
            "add-machine" => {
                let id = arg("an id")?;
                Self::AddMachine {
                    id,
                    parent: arg("a parent").ok(),
                }
            }
            "remove-machine" => Self::RemoveMachine { id: arg("an id")? },
            "rename-machine" => Self::RenameMachine {
                old: arg("the current id")?,
                new: arg("the new id")?,
            },
            "sort-machines" => Self::SortMachines,
            "full-width" => match arg("on or off")?.as_str() {
                "on" => Self::FullWidth(true),
                "off" => Self::FullWidth(false),
                other => bail!("expected on or off, got '{other}'"),
            },
            "status" => Self::Status,
            other => bail!("unknown command '{other}'"),
        };
        Ok(Some(command))
    }
}

pub struct Session<W: Write> {
    viewlet: ConfigViewlet,
    panel: MachineViewPanel,
    machines: MachineList,
    notifications: Arc<NotificationLog>,
    reported: usize,
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    reply_timeout: Duration,
    out: W,
}

impl<W: Write> Session<W> {
    pub fn start(
        fixture: &Fixture,
        settings: &Settings,
        cmd_tx: Sender<BackendCommand>,
        ui_tx: Sender<UiEvent>,
        ui_rx: Receiver<UiEvent>,
        out: W,
    ) -> Result<Self> {
        let notifications = NotificationLog::new();
        let deps = ConfigViewletDeps {
            env: Arc::new(ChannelEnvironment::new(cmd_tx.clone(), ui_tx)),
            notifications: notifications.clone(),
            charms: Arc::new(fixture.charm_store()),
        };
        let mut viewlet = ConfigViewlet::new(deps, settings.viewlet_options())?;
        viewlet.render(fixture.service.clone())?;
        viewlet.show()?;

        let mut machines = MachineList::new();
        machines.add(fixture.machines.iter().cloned())?;
        machines.drain_events();
        let mut panel = MachineViewPanel::new();
        panel.render(&machines)?;

        tracing::info!(
            service = %fixture.service.id,
            machines = machines.len(),
            "console session started"
        );
        Ok(Self {
            viewlet,
            panel,
            machines,
            notifications,
            reported: 0,
            cmd_tx,
            ui_rx,
            reply_timeout: settings.reply_timeout(),
            out,
        })
    }

    pub fn panel(&self) -> &MachineViewPanel {
        &self.panel
    }

    pub fn machines(&self) -> &MachineList {
        &self.machines
    }

    /// Runs every line of `script`. A failing line is reported and the
    /// session carries on with the next one.
    pub fn run(&mut self, script: impl BufRead) -> Result<()> {
        for (number, line) in script.lines().enumerate() {
            let line = line.context("failed to read script")?;
            let outcome = self.drain_pending().and_then(|()| {
                match ScriptCommand::parse(&line)? {
                    Some(command) => self.execute(command),
                    None => Ok(()),
                }
            });
            if let Err(err) = outcome {
                tracing::warn!(line = number + 1, "script command failed: {err:#}");
                writeln!(self.out, "error (line {}): {err:#}", number + 1)?;
            }
            self.report_notifications()?;
        }
        Ok(())
    }

    pub fn execute(&mut self, command: ScriptCommand) -> Result<()> {
        tracing::debug!(?command, "executing script command");
        match command {
            ScriptCommand::Show => self.show()?,
            ScriptCommand::Set { key, value } => {
                let modified = self.viewlet.user_input(&key, &value)?;
                writeln!(self.out, "{key}: {}", if modified { "modified" } else { "clean" })?;
            }
            ScriptCommand::Toggle { key } => {
                let next = self.viewlet.toggle(&key)?;
                writeln!(self.out, "{key}: {next}")?;
            }
            ScriptCommand::Save => self.click(".controls .confirm")?,
            ScriptCommand::Cancel => self.click(".controls .cancel")?,
            ScriptCommand::Import { path } => {
                let input = self.select(".config-file input[type=file]")?;
                self.viewlet
                    .document_mut()
                    .set_value(input, path.display().to_string());
                if let Some(action) = self.viewlet.dispatch(input, DomEvent::Change)? {
                    self.perform(action)?;
                }
            }
            ScriptCommand::RemoveFile => self.click(".config-file .fakebutton")?,
            ScriptCommand::Push { key, value } => {
                let update = self.viewlet.apply_model_change(&key, value)?;
                writeln!(self.out, "{key}: {update:?}")?;
            }
            ScriptCommand::Resolve { key, resolution } => {
                self.viewlet.resolve_conflict(&key, resolution)?;
            }
            ScriptCommand::Tick { millis } => {
                let fired = self.viewlet.advance_timers(Duration::from_millis(millis));
                writeln!(self.out, "timers fired: {fired}")?;
            }
            ScriptCommand::AddMachine { id, parent } => {
                let mut machine = Machine::new(id);
                if let Some(parent) = parent {
                    machine = machine.with_parent(parent);
                }
                self.machines.add([machine])?;
                self.sync_machines()?;
            }
            ScriptCommand::RemoveMachine { id } => {
                self.machines.remove(&MachineId::new(id))?;
                self.sync_machines()?;
            }
            ScriptCommand::RenameMachine { old, new } => {
                self.machines
                    .set_id(&MachineId::new(old), MachineId::new(new))?;
                self.sync_machines()?;
            }
            ScriptCommand::SortMachines => {
                self.machines
                    .sort_by(|a, b| a.display_name.cmp(&b.display_name));
                self.sync_machines()?;
            }
            ScriptCommand::FullWidth(full) => self.panel.set_width_full(full),
            ScriptCommand::Status => self.status()?,
        }
        Ok(())
    }

    fn select(&self, selector: &str) -> Result<console_core::NodeId> {
        let container = self
            .viewlet
            .container()
            .ok_or_else(|| anyhow!("config viewlet is not rendered"))?;
        self.viewlet
            .document()
            .select(container, selector)?
            .ok_or_else(|| anyhow!("nothing matches '{selector}'"))
    }

    fn click(&mut self, selector: &str) -> Result<()> {
        let target = self.select(selector)?;
        match self.viewlet.dispatch(target, DomEvent::Click)? {
            Some(action) => self.perform(action),
            None => Ok(()),
        }
    }

    fn perform(&mut self, action: ViewletAction) -> Result<()> {
        match action {
            ViewletAction::Save(SaveOutcome::Submitted { request_id }) => {
                writeln!(self.out, "submitted request {request_id}")?;
                let waited = self.pump_until(|event| {
                    matches!(event, UiEvent::SetConfigResult(response) if response.request_id == request_id)
                });
                if let Err(err) = waited {
                    self.abandon_request(request_id, &err)?;
                    return Err(err);
                }
            }
            ViewletAction::Save(SaveOutcome::Invalid(errors)) => {
                for error in errors {
                    writeln!(self.out, "invalid: {error}")?;
                }
            }
            ViewletAction::Save(SaveOutcome::Unchanged) => writeln!(self.out, "nothing to save")?,
            ViewletAction::Save(SaveOutcome::Busy) => {
                writeln!(self.out, "a save is already in progress")?
            }
            ViewletAction::Cancelled => writeln!(self.out, "changes discarded")?,
            ViewletAction::FileClick(FileClickAction::Removed) => {
                writeln!(self.out, "config file removed")?
            }
            ViewletAction::FileClick(FileClickAction::OpenPicker) => {
                writeln!(self.out, "no config file loaded; use 'import <path>'")?
            }
            ViewletAction::ReadFile { path } => {
                dispatch_backend_command(
                    &self.cmd_tx,
                    BackendCommand::ReadFile {
                        path: PathBuf::from(path),
                    },
                )
                .map_err(|err| anyhow!(err.message()))?;
                self.pump_until(|event| {
                    matches!(event, UiEvent::FileLoaded { .. } | UiEvent::FileFailed(_))
                })?;
            }
        }
        Ok(())
    }

    /// Feeds backend events into the views until `done` matches one.
    fn pump_until(&mut self, done: impl Fn(&UiEvent) -> bool) -> Result<()> {
        let deadline = Instant::now() + self.reply_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = match self.ui_rx.recv_timeout(remaining) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => bail!("timed out waiting for the backend"),
                Err(RecvTimeoutError::Disconnected) => bail!("backend event queue closed"),
            };
            let finished = done(&event);
            self.handle_event(event)?;
            if finished {
                return Ok(());
            }
        }
    }

    /// Applies backend events that arrived while no command was waiting.
    fn drain_pending(&mut self) -> Result<()> {
        loop {
            match self.ui_rx.try_recv() {
                Ok(event) => self.handle_event(event)?,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => bail!("backend event queue closed"),
            }
        }
    }

    /// Fails a submission the backend did not answer in time so the form
    /// accepts input again. A late reply is then ignored as stale.
    fn abandon_request(&mut self, request_id: u64, reason: &anyhow::Error) -> Result<()> {
        if self.viewlet.in_flight() != Some(request_id) {
            return Ok(());
        }
        let Some(service_id) = self.viewlet.service().map(|service| service.id.clone()) else {
            return Ok(());
        };
        tracing::warn!(request_id, "abandoning set_config request: {reason:#}");
        let response = SetConfigResponse {
            request_id,
            service_id,
            err: Some(ApiError::new(ErrorCode::Unavailable, format!("{reason:#}"))),
            new_values: ConfigMap::new(),
        };
        self.handle_event(UiEvent::SetConfigResult(response))
    }

    fn handle_event(&mut self, event: UiEvent) -> Result<()> {
        match event {
            UiEvent::Info(message) => tracing::info!("{message}"),
            UiEvent::BackendFailed(message) => {
                tracing::error!("{message}");
                writeln!(self.out, "backend failure: {message}")?;
            }
            UiEvent::SetConfigResult(response) => {
                match self.viewlet.on_set_config_result(response)? {
                    SubmitResult::Saved { keys } => {
                        writeln!(self.out, "saved: {}", keys.join(", "))?
                    }
                    SubmitResult::Failed(err) => writeln!(self.out, "save failed: {err}")?,
                    SubmitResult::Stale => writeln!(self.out, "ignored stale reply")?,
                }
            }
            UiEvent::FileLoaded { name, content } => {
                match self.viewlet.on_file_loaded(&name, content)? {
                    FileLoad::Accepted => writeln!(self.out, "loaded config file {name}")?,
                    FileLoad::Rejected => writeln!(self.out, "config file {name} rejected")?,
                }
            }
            UiEvent::FileFailed(err) => self.viewlet.on_file_error(&err),
        }
        Ok(())
    }

    fn sync_machines(&mut self) -> Result<()> {
        let applied = self.panel.sync(&mut self.machines)?;
        let ids: Vec<String> = self
            .machines
            .iter()
            .map(|(_, machine)| machine.id.to_string())
            .collect();
        tracing::debug!(applied, "machine panel synced");
        writeln!(self.out, "machines: {}", ids.join(" "))?;
        Ok(())
    }

    fn show(&mut self) -> Result<()> {
        if let Some(container) = self.viewlet.container() {
            writeln!(self.out, "{}", self.viewlet.document().to_markup(container))?;
        }
        let panel = self.panel.container();
        writeln!(self.out, "{}", self.panel.document().to_markup(panel))?;
        Ok(())
    }

    fn status(&mut self) -> Result<()> {
        let bindings = self.viewlet.bindings();
        let modified = bindings.modified_keys().join(", ");
        let conflicted = bindings.conflicted_keys().join(", ");
        let file = self
            .viewlet
            .config_file()
            .map(|file| file.name.clone())
            .unwrap_or_else(|| "-".to_string());
        let values: Vec<String> = bindings
            .values(self.viewlet.document())
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        writeln!(self.out, "values: {}", values.join(" "))?;
        writeln!(self.out, "modified: [{modified}] conflicts: [{conflicted}] file: {file}")?;
        writeln!(
            self.out,
            "submit: {}",
            if self.viewlet.is_submit_enabled() { "enabled" } else { "disabled" }
        )?;
        Ok(())
    }

    fn report_notifications(&mut self) -> Result<()> {
        let all = self.notifications.snapshot();
        for note in all.iter().skip(self.reported) {
            writeln!(self.out, "! {}: {}", note.title, note.message)?;
        }
        self.reported = all.len();
        Ok(())
    }

    /// Stops the backend worker and tears the views down.
    pub fn shutdown(&mut self) {
        self.viewlet.destroy();
        self.panel.destroy();
        if let Err(err) = dispatch_backend_command(&self.cmd_tx, BackendCommand::Shutdown) {
            tracing::debug!("backend already gone: {}", err.message());
        }
    }

    pub fn into_output(self) -> W {
        self.out
    }
}
