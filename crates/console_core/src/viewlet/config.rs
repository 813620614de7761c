//! Service configuration viewlet.
//!
//! Renders one control per charm option, tracks unsaved edits through the
//! binding engine, and submits only the options that changed. The submit
//! button stays disabled while a request is in flight, which serialises
//! submissions from one form.

use std::{sync::Arc, time::Duration};

use shared::{
    domain::{CharmSchema, ConfigMap, ConfigValue, Notification, Service, ServiceId},
    protocol::{SetConfigRequest, SetConfigResponse},
};
use tracing::{debug, info, warn};

use crate::{
    binding::{BindingEngine, BindingUpdate, FieldKind, Resolution, MODIFIED_CLASS},
    document::{el, Document, NodeId},
    environment::{CharmStore, EnvironmentHandle, NotificationSink},
    error::{FileReadError, SubmissionError, ValidationError, ViewError},
    forms,
    scheduler::Scheduler,
    templates,
    viewlet::{DomEvent, EventBinding, EventTable, ViewletOptions},
};

pub const SAVED_CLASS: &str = "change-saved";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigHandler {
    SaveConfig,
    CancelConfig,
    HandleFileClick,
    HandleFileChange,
}

pub const CONFIG_EVENTS: &[EventBinding<ConfigHandler>] = &[
    EventBinding {
        selector: ".settings-config button.confirm",
        event: DomEvent::Click,
        handler: ConfigHandler::SaveConfig,
    },
    EventBinding {
        selector: ".settings-config button.cancel",
        event: DomEvent::Click,
        handler: ConfigHandler::CancelConfig,
    },
    EventBinding {
        selector: ".config-file .fakebutton",
        event: DomEvent::Click,
        handler: ConfigHandler::HandleFileClick,
    },
    EventBinding {
        selector: ".config-file input[type=file]",
        event: DomEvent::Change,
        handler: ConfigHandler::HandleFileChange,
    },
];

/// Collaborators handed to the viewlet at construction.
#[derive(Clone)]
pub struct ConfigViewletDeps {
    pub env: Arc<dyn EnvironmentHandle>,
    pub notifications: Arc<dyn NotificationSink>,
    pub charms: Arc<dyn CharmStore>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Submitted { request_id: u64 },
    Invalid(Vec<ValidationError>),
    Unchanged,
    Busy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResult {
    Saved { keys: Vec<String> },
    Failed(SubmissionError),
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClickAction {
    /// No file is loaded; the host should open a picker for the file input.
    OpenPicker,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLoad {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewletAction {
    Save(SaveOutcome),
    Cancelled,
    FileClick(FileClickAction),
    /// The file input changed; the host reads `path` and reports back
    /// through `on_file_loaded` or `on_file_error`.
    ReadFile { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub name: String,
    pub content: String,
}

#[derive(Debug)]
enum ViewletTimer {
    ClearSavedHighlight { nodes: Vec<NodeId> },
}

pub struct ConfigViewlet {
    deps: ConfigViewletDeps,
    options: ViewletOptions,
    doc: Document,
    container: Option<NodeId>,
    service: Option<Service>,
    schema: CharmSchema,
    bindings: BindingEngine,
    events: EventTable<ConfigHandler>,
    timers: Scheduler<ViewletTimer>,
    config_file: Option<ConfigFile>,
    in_flight: Option<u64>,
    next_request_id: u64,
}

impl ConfigViewlet {
    pub fn new(deps: ConfigViewletDeps, options: ViewletOptions) -> Result<Self, ViewError> {
        Ok(Self {
            deps,
            options,
            doc: Document::new("div"),
            container: None,
            service: None,
            schema: CharmSchema::new(),
            bindings: BindingEngine::new(options.conflict_policy),
            events: EventTable::compile(CONFIG_EVENTS)?,
            timers: Scheduler::new(),
            config_file: None,
            in_flight: None,
            next_request_id: 1,
        })
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn container(&self) -> Option<NodeId> {
        self.container
    }

    pub fn service(&self) -> Option<&Service> {
        self.service.as_ref()
    }

    pub fn bindings(&self) -> &BindingEngine {
        &self.bindings
    }

    pub fn config_file(&self) -> Option<&ConfigFile> {
        self.config_file.as_ref()
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.pending()
    }

    fn container_or_err(&self) -> Result<NodeId, ViewError> {
        self.container.ok_or(ViewError::NotRendered)
    }

    fn select(&self, selector: &str) -> Result<Option<NodeId>, ViewError> {
        let container = self.container_or_err()?;
        Ok(self.doc.select(container, selector)?)
    }

    fn select_all(&self, selector: &str) -> Result<Vec<NodeId>, ViewError> {
        let container = self.container_or_err()?;
        Ok(self.doc.select_all(container, selector)?)
    }

    /// Last confirmed configuration: schema defaults overlaid with the
    /// service's stored values.
    fn model_config(&self) -> ConfigMap {
        match &self.service {
            Some(service) => forms::effective_config(&self.schema, &service.config),
            None => ConfigMap::new(),
        }
    }

    fn notify(&self, notification: Notification) {
        self.deps.notifications.add(notification);
    }

    pub fn render(&mut self, service: Service) -> Result<(), ViewError> {
        let schema = self
            .deps
            .charms
            .schema(&service.charm)
            .ok_or_else(|| ViewError::UnknownCharm(service.charm.clone()))?;
        let settings = forms::extract_service_settings(&schema, &service.config);

        if let Some(old) = self.container.take() {
            self.doc.remove(old);
        }
        let root = self.doc.root();
        let container = self.doc.build(
            root,
            el("div")
                .class("viewlet service-config")
                .child(templates::service_configuration(
                    &service,
                    &settings,
                    service.exposed,
                )),
        );
        self.container = Some(container);
        self.schema = schema;
        self.service = Some(service);
        self.config_file = None;
        self.in_flight = None;

        let model = self.model_config();
        self.bindings.bind(&mut self.doc, container, &model);
        self.bindings.plug_resizers(self.options.textarea);
        self.bindings.resize_all(&mut self.doc);
        debug!(
            service = ?self.service.as_ref().map(|s| s.id.as_str()),
            fields = self.bindings.len(),
            "rendered config viewlet"
        );
        Ok(())
    }

    /// Unhides the viewlet and resizes the textareas, which can only be
    /// measured while visible.
    pub fn show(&mut self) -> Result<usize, ViewError> {
        let container = self.container_or_err()?;
        self.doc.show(container);
        Ok(self.bindings.resize_all(&mut self.doc))
    }

    pub fn hide(&mut self) -> Result<(), ViewError> {
        let container = self.container_or_err()?;
        self.doc.hide(container);
        Ok(())
    }

    /// Binding callback: the model value for `key` changed.
    pub fn update(
        &mut self,
        key: &str,
        value: Option<&ConfigValue>,
    ) -> Result<BindingUpdate, ViewError> {
        self.bindings.update(&mut self.doc, key, value)
    }

    /// Applies a configuration change pushed by the environment to the
    /// local model and the form.
    pub fn apply_model_change(
        &mut self,
        key: &str,
        value: Option<ConfigValue>,
    ) -> Result<BindingUpdate, ViewError> {
        let service = self.service.as_mut().ok_or(ViewError::NotRendered)?;
        match value {
            Some(value) => {
                service.config.insert(key.to_string(), value);
            }
            None => {
                service.config.remove(key);
            }
        }
        let effective = self.model_config().get(key).cloned();
        self.update(key, effective.as_ref())
    }

    pub fn user_input(&mut self, key: &str, raw: &str) -> Result<bool, ViewError> {
        self.bindings.user_input(&mut self.doc, key, raw)
    }

    /// Flips a checkbox field and returns its new state.
    pub fn toggle(&mut self, key: &str) -> Result<bool, ViewError> {
        let node = self
            .bindings
            .field(key)
            .filter(|field| field.kind == FieldKind::Checkbox)
            .map(|field| field.node)
            .ok_or_else(|| ViewError::UnboundField(key.to_string()))?;
        let next = !self.doc.checked(node);
        self.bindings.user_input(&mut self.doc, key, &next.to_string())?;
        Ok(next)
    }

    pub fn resolve_conflict(&mut self, key: &str, resolution: Resolution) -> Result<(), ViewError> {
        self.bindings.resolve_conflict(&mut self.doc, key, resolution)
    }

    pub fn is_submit_enabled(&self) -> bool {
        self.select(".controls .confirm")
            .ok()
            .flatten()
            .is_some_and(|button| !self.doc.disabled(button))
    }

    fn set_submit_enabled(&mut self, enabled: bool) -> Result<(), ViewError> {
        if let Some(button) = self.select(".controls .confirm")? {
            self.doc.set_disabled(button, !enabled);
        }
        Ok(())
    }

    /// Routes a DOM event raised on `target` through the event table.
    pub fn dispatch(
        &mut self,
        target: NodeId,
        event: DomEvent,
    ) -> Result<Option<ViewletAction>, ViewError> {
        let container = self.container_or_err()?;
        let Some((handler, current)) = self.events.resolve(&self.doc, target, event, container)
        else {
            return Ok(None);
        };
        debug!(?handler, ?event, "dispatching viewlet event");
        let action = match handler {
            ConfigHandler::SaveConfig => ViewletAction::Save(self.save_config()?),
            ConfigHandler::CancelConfig => {
                self.cancel_config();
                ViewletAction::Cancelled
            }
            ConfigHandler::HandleFileClick => {
                ViewletAction::FileClick(self.handle_file_click(current)?)
            }
            ConfigHandler::HandleFileChange => {
                let path = self.doc.value(current).to_string();
                if path.is_empty() {
                    return Ok(None);
                }
                ViewletAction::ReadFile { path }
            }
        };
        Ok(Some(action))
    }

    /// Collects, validates and submits the form.
    pub fn save_config(&mut self) -> Result<SaveOutcome, ViewError> {
        let service_id = self
            .service
            .as_ref()
            .map(|service| service.id.clone())
            .ok_or(ViewError::NotRendered)?;
        if self.in_flight.is_some() || !self.is_submit_enabled() {
            debug!(service = %service_id, "submission already in flight");
            return Ok(SaveOutcome::Busy);
        }
        self.set_submit_enabled(false)?;

        if let Some(file) = self.config_file.clone() {
            let request = SetConfigRequest {
                request_id: self.take_request_id(),
                service_id,
                changed: ConfigMap::new(),
                previous: self.model_config(),
                config_file: Some(file.content),
            };
            info!(
                service = %request.service_id,
                file = %file.name,
                "submitting configuration file"
            );
            return Ok(self.submit(request));
        }

        let values = self.bindings.values(&self.doc);
        let errors = forms::validate(&values, &self.schema);
        if !errors.is_empty() {
            warn!(service = %service_id, ?errors, "error setting config");
            self.notify(Notification::error(
                "Error saving service config",
                "Error saving service config",
            ));
            self.set_submit_enabled(true)?;
            return Ok(SaveOutcome::Invalid(errors));
        }

        let confirmed = self.model_config();
        let changed = forms::changed_values(&forms::coerce(&values, &self.schema), &confirmed);
        if changed.is_empty() {
            debug!(service = %service_id, "no configuration changes to submit");
            self.set_submit_enabled(true)?;
            return Ok(SaveOutcome::Unchanged);
        }

        let request = SetConfigRequest {
            request_id: self.take_request_id(),
            service_id,
            changed,
            previous: confirmed,
            config_file: None,
        };
        info!(
            service = %request.service_id,
            changed = ?request.changed.keys().collect::<Vec<_>>(),
            "submitting configuration"
        );
        Ok(self.submit(request))
    }

    fn take_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn submit(&mut self, request: SetConfigRequest) -> SaveOutcome {
        let request_id = request.request_id;
        self.in_flight = Some(request_id);
        self.deps.env.set_config(request);
        SaveOutcome::Submitted { request_id }
    }

    /// Submission callback.
    pub fn on_set_config_result(
        &mut self,
        response: SetConfigResponse,
    ) -> Result<SubmitResult, ViewError> {
        if self.in_flight != Some(response.request_id) {
            warn!(
                request_id = response.request_id,
                expected = ?self.in_flight,
                "ignoring stale set_config reply"
            );
            return Ok(SubmitResult::Stale);
        }
        self.in_flight = None;

        if let Some(error) = response.err {
            let service_id: ServiceId = response.service_id;
            warn!(service = %service_id, error = %error.message, "set_config failed");
            self.notify(Notification::error(
                "Error setting service configuration",
                format!("Service name: {service_id}"),
            ));
            self.set_submit_enabled(true)?;
            return Ok(SubmitResult::Failed(SubmissionError { service_id, error }));
        }

        self.highlight_saved()?;
        let keys: Vec<String> = response.new_values.keys().cloned().collect();
        if let Some(service) = self.service.as_mut() {
            service.config.extend(response.new_values);
        }
        let model = self.model_config();
        self.bindings.reset_dom_to_model(&mut self.doc, &model);
        self.set_submit_enabled(true)?;
        info!(service = %response.service_id, ?keys, "configuration saved");
        Ok(SubmitResult::Saved { keys })
    }

    /// Drops every unsaved edit.
    pub fn cancel_config(&mut self) {
        let model = self.model_config();
        self.bindings.reset_dom_to_model(&mut self.doc, &model);
    }

    /// Marks modified fields as saved and schedules the class removal.
    fn highlight_saved(&mut self) -> Result<(), ViewError> {
        let nodes = self.select_all(&format!(".{MODIFIED_CLASS}"))?;
        if nodes.is_empty() {
            return Ok(());
        }
        for node in &nodes {
            self.doc.add_class(*node, SAVED_CLASS);
        }
        self.timers.schedule(
            self.options.saved_highlight_delay,
            ViewletTimer::ClearSavedHighlight { nodes },
        );
        Ok(())
    }

    /// Advances the viewlet clock and runs whatever became due. Returns the
    /// number of timers that fired.
    pub fn advance_timers(&mut self, elapsed: Duration) -> usize {
        let due = self.timers.advance(elapsed);
        let fired = due.len();
        for task in due {
            self.run_timer(task);
        }
        fired
    }

    fn run_timer(&mut self, task: ViewletTimer) {
        match task {
            ViewletTimer::ClearSavedHighlight { nodes } => {
                let Some(container) = self.container else {
                    return;
                };
                if !self.doc.is_attached(container) {
                    debug!("viewlet detached; skipping saved highlight clear");
                    return;
                }
                let still_highlighted = self
                    .select_all(&format!(".{SAVED_CLASS}"))
                    .is_ok_and(|found| !found.is_empty());
                if !still_highlighted {
                    return;
                }
                for node in nodes {
                    if self.doc.is_attached(node) && !self.doc.has_class(node, MODIFIED_CLASS) {
                        self.doc.remove_class(node, SAVED_CLASS);
                    }
                }
            }
        }
    }

    /// Clicking the import button either opens the picker or, once a file
    /// is loaded, removes it.
    pub fn handle_file_click(&mut self, button: NodeId) -> Result<FileClickAction, ViewError> {
        if self.doc.text_content(button).contains("Remove") {
            self.on_remove_file()?;
            Ok(FileClickAction::Removed)
        } else {
            Ok(FileClickAction::OpenPicker)
        }
    }

    fn per_field_inputs(&self) -> Result<Vec<NodeId>, ViewError> {
        let mut nodes = self.select_all(".charm-settings")?;
        nodes.extend(self.select_all(".settings-wrapper.toggle")?);
        Ok(nodes)
    }

    /// The file was read. Its content replaces the per-field payload.
    pub fn on_file_loaded(&mut self, filename: &str, content: String) -> Result<FileLoad, ViewError> {
        self.container_or_err()?;
        if content.is_empty() {
            self.notify(Notification::error(
                "Configuration file error",
                "The configuration file loaded is empty.  Do you have read access?",
            ));
            return Ok(FileLoad::Rejected);
        }
        if let Some(button) = self.select(".fakebutton")? {
            self.doc.set_text(button, format!("{filename} - Remove file"));
        }
        for node in self.per_field_inputs()? {
            self.doc.hide(node);
        }
        info!(file = filename, bytes = content.len(), "loaded configuration file");
        self.config_file = Some(ConfigFile {
            name: filename.to_string(),
            content,
        });
        Ok(FileLoad::Accepted)
    }

    pub fn on_remove_file(&mut self) -> Result<(), ViewError> {
        self.container_or_err()?;
        self.config_file = None;
        if let Some(button) = self.select(".fakebutton")? {
            self.doc.set_text(button, templates::IMPORT_LABEL);
        }
        for node in self.per_field_inputs()? {
            self.doc.show(node);
        }
        if let Some(input) = self.select(".config-file input[type=file]")? {
            self.doc.replace(input, templates::file_input());
        }
        Ok(())
    }

    pub fn on_file_error(&mut self, error: &FileReadError) {
        match error.user_message() {
            Some(message) => {
                warn!(kind = ?error.kind, detail = %error.detail, "config file read failed");
                self.notify(Notification::error(
                    "Error reading configuration file",
                    message,
                ));
            }
            None => debug!("config file read aborted"),
        }
    }

    /// Tears the viewlet down: pending timers are dropped, replies for
    /// in-flight requests become stale.
    pub fn destroy(&mut self) {
        self.timers.clear();
        self.in_flight = None;
        self.bindings.clear();
        self.doc.detach();
    }
}

#[cfg(test)]
#[path = "../tests/config_viewlet_tests.rs"]
mod tests;
