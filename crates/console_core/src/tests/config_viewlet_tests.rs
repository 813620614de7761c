use std::sync::Mutex;

use super::*;
use crate::{
    binding::{ConflictPolicy, CONFLICT_CLASS},
    environment::{InMemoryCharmStore, NotificationLog},
    error::{FileReadErrorKind, ValidationErrorKind},
};
use shared::{
    domain::{CharmUrl, OptionSchema, OptionType},
    error::{ApiError, ErrorCode},
};

#[derive(Default)]
struct RecordingEnvironment {
    requests: Mutex<Vec<SetConfigRequest>>,
}

impl RecordingEnvironment {
    fn requests(&self) -> Vec<SetConfigRequest> {
        self.requests.lock().expect("requests").clone()
    }
}

impl EnvironmentHandle for RecordingEnvironment {
    fn set_config(&self, request: SetConfigRequest) {
        self.requests.lock().expect("requests").push(request);
    }
}

struct Harness {
    viewlet: ConfigViewlet,
    env: Arc<RecordingEnvironment>,
    notifications: Arc<NotificationLog>,
}

fn charm() -> CharmUrl {
    CharmUrl::new("cs:precise/wordpress-15")
}

fn schema() -> CharmSchema {
    let option = |option_type, default: Option<ConfigValue>, description: &str| OptionSchema {
        option_type,
        default,
        description: Some(description.to_string()),
    };
    CharmSchema::from([
        (
            "debug".to_string(),
            option(OptionType::Boolean, Some(false.into()), "Enable debug output"),
        ),
        (
            "name".to_string(),
            option(OptionType::String, None, "Blog title"),
        ),
        (
            "port".to_string(),
            option(OptionType::Int, Some(80.into()), "Listening port"),
        ),
    ])
}

fn service() -> Service {
    Service {
        id: ServiceId::new("wordpress"),
        charm: charm(),
        config: ConfigMap::from([
            ("debug".to_string(), ConfigValue::from("false")),
            ("name".to_string(), ConfigValue::from("my blog")),
        ]),
        exposed: false,
    }
}

fn harness_with(options: ViewletOptions) -> Harness {
    let env = Arc::new(RecordingEnvironment::default());
    let notifications = NotificationLog::new();
    let charms = Arc::new(InMemoryCharmStore::new().with_charm(charm(), schema()));
    let deps = ConfigViewletDeps {
        env: env.clone(),
        notifications: notifications.clone(),
        charms,
    };
    let mut viewlet = ConfigViewlet::new(deps, options).expect("viewlet");
    viewlet.render(service()).expect("render");
    Harness {
        viewlet,
        env,
        notifications,
    }
}

fn harness() -> Harness {
    harness_with(ViewletOptions::default())
}

fn field(h: &Harness, key: &str) -> NodeId {
    h.viewlet.bindings().field(key).expect("bound field").node
}

fn find(h: &Harness, selector: &str) -> NodeId {
    let container = h.viewlet.container().expect("rendered");
    h.viewlet
        .document()
        .select(container, selector)
        .expect("selector")
        .unwrap_or_else(|| panic!("no node for {selector}"))
}

fn submitted_id(outcome: SaveOutcome) -> u64 {
    match outcome {
        SaveOutcome::Submitted { request_id } => request_id,
        other => panic!("expected submission, got {other:?}"),
    }
}

#[test]
fn renders_one_prefilled_control_per_option() {
    let h = harness();
    let doc = h.viewlet.document();
    assert_eq!(h.viewlet.bindings().len(), 3);
    assert_eq!(doc.value(field(&h, "name")), "my blog");
    assert_eq!(doc.value(field(&h, "port")), "80");
    assert_eq!(doc.tag(field(&h, "name")), Some("textarea"));
    assert_eq!(doc.attr(field(&h, "debug"), "type"), Some("checkbox"));
    assert!(!doc.checked(field(&h, "debug")));
    assert!(h.viewlet.is_submit_enabled());
}

#[test]
fn unknown_charm_is_an_error() {
    let mut h = harness();
    let mut orphan = service();
    orphan.charm = CharmUrl::new("cs:missing");
    assert!(matches!(
        h.viewlet.render(orphan),
        Err(ViewError::UnknownCharm(_))
    ));
}

#[test]
fn empty_required_field_blocks_submission() {
    let mut h = harness();
    h.viewlet.user_input("port", "").expect("input");

    let outcome = h.viewlet.save_config().expect("save");

    assert_eq!(
        outcome,
        SaveOutcome::Invalid(vec![ValidationError {
            key: "port".into(),
            kind: ValidationErrorKind::Required,
        }])
    );
    assert!(h.env.requests().is_empty());
    let note = h.notifications.last().expect("notification");
    assert_eq!(note.title, "Error saving service config");
    assert!(h.viewlet.is_submit_enabled());
    assert_eq!(h.viewlet.document().value(field(&h, "port")), "");
}

#[test]
fn successful_submit_merges_values_and_clears_modified() {
    let mut h = harness();
    h.viewlet.user_input("name", "new title").expect("input");

    let request_id = submitted_id(h.viewlet.save_config().expect("save"));
    assert!(!h.viewlet.is_submit_enabled());

    let requests = h.env.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.service_id, ServiceId::new("wordpress"));
    assert_eq!(
        request.changed,
        ConfigMap::from([("name".to_string(), ConfigValue::from("new title"))])
    );
    assert_eq!(request.previous["name"], ConfigValue::from("my blog"));
    assert_eq!(request.previous["port"], ConfigValue::Int(80));

    let result = h
        .viewlet
        .on_set_config_result(SetConfigResponse::ok(request, request.changed.clone()))
        .expect("callback");

    assert_eq!(
        result,
        SubmitResult::Saved {
            keys: vec!["name".to_string()]
        }
    );
    assert_eq!(
        h.viewlet.service().expect("service").config["name"],
        ConfigValue::from("new title")
    );
    assert!(h.viewlet.bindings().modified_keys().is_empty());
    assert!(h.viewlet.is_submit_enabled());
    assert_eq!(h.viewlet.in_flight(), None);
    assert_eq!(request.request_id, request_id);
}

#[test]
fn saved_highlight_clears_after_delay() {
    let mut h = harness();
    h.viewlet.user_input("name", "new title").expect("input");
    h.viewlet.save_config().expect("save");
    let request = h.env.requests().remove(0);
    h.viewlet
        .on_set_config_result(SetConfigResponse::ok(&request, request.changed.clone()))
        .expect("callback");

    let name = field(&h, "name");
    assert!(h.viewlet.document().has_class(name, SAVED_CLASS));
    assert!(!h.viewlet.document().has_class(field(&h, "port"), SAVED_CLASS));
    assert_eq!(h.viewlet.pending_timers(), 1);

    assert_eq!(h.viewlet.advance_timers(Duration::from_millis(999)), 0);
    assert!(h.viewlet.document().has_class(name, SAVED_CLASS));

    assert_eq!(h.viewlet.advance_timers(Duration::from_millis(1)), 1);
    assert!(!h.viewlet.document().has_class(name, SAVED_CLASS));
}

#[test]
fn saved_highlight_survives_on_fields_edited_again() {
    let mut h = harness();
    h.viewlet.user_input("name", "new title").expect("input");
    h.viewlet.save_config().expect("save");
    let request = h.env.requests().remove(0);
    h.viewlet
        .on_set_config_result(SetConfigResponse::ok(&request, request.changed.clone()))
        .expect("callback");

    h.viewlet.user_input("name", "another title").expect("input");
    h.viewlet.advance_timers(Duration::from_millis(1000));

    assert!(h.viewlet.document().has_class(field(&h, "name"), SAVED_CLASS));
}

#[test]
fn saved_highlight_timer_is_inert_once_detached() {
    let mut h = harness();
    h.viewlet.user_input("name", "new title").expect("input");
    h.viewlet.save_config().expect("save");
    let request = h.env.requests().remove(0);
    h.viewlet
        .on_set_config_result(SetConfigResponse::ok(&request, request.changed.clone()))
        .expect("callback");

    let name = field(&h, "name");
    h.viewlet.document_mut().detach();
    assert_eq!(h.viewlet.advance_timers(Duration::from_millis(1000)), 1);
    assert!(h.viewlet.document().has_class(name, SAVED_CLASS));
}

#[test]
fn second_submit_waits_for_the_first_callback() {
    let mut h = harness();
    h.viewlet.user_input("name", "one").expect("input");
    submitted_id(h.viewlet.save_config().expect("save"));

    assert_eq!(h.viewlet.save_config().expect("save"), SaveOutcome::Busy);
    assert_eq!(h.env.requests().len(), 1);

    let request = h.env.requests().remove(0);
    h.viewlet
        .on_set_config_result(SetConfigResponse::ok(&request, request.changed.clone()))
        .expect("callback");

    h.viewlet.user_input("name", "two").expect("input");
    submitted_id(h.viewlet.save_config().expect("save"));
    assert_eq!(h.env.requests().len(), 2);
}

#[test]
fn remote_failure_notifies_and_preserves_edits() {
    let mut h = harness();
    h.viewlet.user_input("name", "rejected title").expect("input");
    h.viewlet.save_config().expect("save");
    let request = h.env.requests().remove(0);

    let result = h
        .viewlet
        .on_set_config_result(SetConfigResponse::failed(
            &request,
            ApiError::new(ErrorCode::Validation, "bad value"),
        ))
        .expect("callback");

    match result {
        SubmitResult::Failed(err) => {
            assert_eq!(err.service_id, ServiceId::new("wordpress"));
            assert_eq!(err.error.message, "bad value");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    let note = h.notifications.last().expect("notification");
    assert_eq!(note.title, "Error setting service configuration");
    assert_eq!(note.message, "Service name: wordpress");
    assert_eq!(
        h.viewlet.document().value(field(&h, "name")),
        "rejected title"
    );
    assert_eq!(h.viewlet.bindings().modified_keys(), vec!["name"]);
    assert_eq!(
        h.viewlet.service().expect("service").config["name"],
        ConfigValue::from("my blog")
    );
    assert!(h.viewlet.is_submit_enabled());
}

#[test]
fn stale_replies_are_ignored() {
    let mut h = harness();
    h.viewlet.user_input("name", "title").expect("input");
    h.viewlet.save_config().expect("save");
    let mut request = h.env.requests().remove(0);
    request.request_id += 100;

    let result = h
        .viewlet
        .on_set_config_result(SetConfigResponse::ok(&request, request.changed.clone()))
        .expect("callback");
    assert_eq!(result, SubmitResult::Stale);
    assert!(!h.viewlet.is_submit_enabled());
}

#[test]
fn unchanged_form_is_not_submitted() {
    let mut h = harness();
    assert_eq!(h.viewlet.save_config().expect("save"), SaveOutcome::Unchanged);
    assert!(h.env.requests().is_empty());
    assert!(h.viewlet.is_submit_enabled());
}

#[test]
fn checkbox_toggle_submits_typed_boolean() {
    let mut h = harness();
    h.viewlet.user_input("debug", "true").expect("input");
    h.viewlet.save_config().expect("save");
    let request = h.env.requests().remove(0);
    assert_eq!(
        request.changed,
        ConfigMap::from([("debug".to_string(), ConfigValue::Bool(true))])
    );
}

#[test]
fn toggle_flips_checkboxes_only() {
    let mut h = harness();
    assert!(h.viewlet.toggle("debug").expect("toggle"));
    assert_eq!(h.viewlet.bindings().modified_keys(), vec!["debug"]);
    assert!(!h.viewlet.toggle("debug").expect("toggle back"));
    assert!(h.viewlet.bindings().modified_keys().is_empty());
    assert!(matches!(
        h.viewlet.toggle("name"),
        Err(ViewError::UnboundField(key)) if key == "name"
    ));
}

#[test]
fn cancel_discards_unsaved_edits() {
    let mut h = harness();
    h.viewlet.user_input("name", "draft").expect("input");
    h.viewlet.user_input("debug", "true").expect("input");

    h.viewlet.cancel_config();

    assert_eq!(h.viewlet.document().value(field(&h, "name")), "my blog");
    assert!(!h.viewlet.document().checked(field(&h, "debug")));
    assert!(h.viewlet.bindings().modified_keys().is_empty());
}

#[test]
fn external_change_updates_clean_fields_and_flags_dirty_ones() {
    let mut h = harness();
    h.viewlet
        .apply_model_change("debug", Some(ConfigValue::from("true")))
        .expect("change");
    assert!(h.viewlet.document().checked(field(&h, "debug")));
    let label = find(&h, ".toggle .textvalue");
    assert_eq!(h.viewlet.document().text(label), "true");

    h.viewlet.user_input("name", "mine").expect("input");
    let outcome = h
        .viewlet
        .apply_model_change("name", Some(ConfigValue::from("theirs")))
        .expect("change");
    assert_eq!(outcome, BindingUpdate::Conflicted);
    assert_eq!(h.viewlet.document().value(field(&h, "name")), "mine");
    assert!(h
        .viewlet
        .document()
        .has_class(field(&h, "name"), CONFLICT_CLASS));
}

#[test]
fn saving_over_a_conflict_overwrites_the_remote_value() {
    let mut h = harness();
    h.viewlet.user_input("name", "mine").expect("input");
    h.viewlet
        .apply_model_change("name", Some(ConfigValue::from("theirs")))
        .expect("change");

    h.viewlet.save_config().expect("save");
    let request = h.env.requests().remove(0);
    assert_eq!(request.changed["name"], ConfigValue::from("mine"));
    assert_eq!(request.previous["name"], ConfigValue::from("theirs"));

    h.viewlet
        .on_set_config_result(SetConfigResponse::ok(&request, request.changed.clone()))
        .expect("callback");
    assert!(h.viewlet.bindings().conflicted_keys().is_empty());
    assert_eq!(h.viewlet.document().value(field(&h, "name")), "mine");
}

#[test]
fn overwrite_policy_replaces_dirty_fields() {
    let mut h = harness_with(ViewletOptions {
        conflict_policy: ConflictPolicy::Overwrite,
        ..ViewletOptions::default()
    });
    h.viewlet.user_input("name", "mine").expect("input");
    let outcome = h
        .viewlet
        .apply_model_change("name", Some(ConfigValue::from("theirs")))
        .expect("change");
    assert_eq!(outcome, BindingUpdate::Overwritten);
    assert_eq!(h.viewlet.document().value(field(&h, "name")), "theirs");
}

#[test]
fn removed_option_falls_back_to_schema_default() {
    let mut h = harness();
    h.viewlet
        .apply_model_change("port", Some(ConfigValue::Int(8080)))
        .expect("change");
    assert_eq!(h.viewlet.document().value(field(&h, "port")), "8080");
    h.viewlet.apply_model_change("port", None).expect("change");
    assert_eq!(h.viewlet.document().value(field(&h, "port")), "80");
}

#[test]
fn events_dispatch_through_the_table() {
    let mut h = harness();
    let cancel = find(&h, "button.cancel");
    h.viewlet.user_input("name", "draft").expect("input");
    assert_eq!(
        h.viewlet.dispatch(cancel, DomEvent::Click).expect("dispatch"),
        Some(ViewletAction::Cancelled)
    );
    assert!(h.viewlet.bindings().modified_keys().is_empty());

    let fake = find(&h, ".fakebutton");
    assert_eq!(
        h.viewlet.dispatch(fake, DomEvent::Click).expect("dispatch"),
        Some(ViewletAction::FileClick(FileClickAction::OpenPicker))
    );

    let input = find(&h, ".config-file input[type=file]");
    assert_eq!(
        h.viewlet.dispatch(input, DomEvent::Change).expect("dispatch"),
        None
    );
    h.viewlet.document_mut().set_value(input, "/tmp/wordpress.toml");
    assert_eq!(
        h.viewlet.dispatch(input, DomEvent::Change).expect("dispatch"),
        Some(ViewletAction::ReadFile {
            path: "/tmp/wordpress.toml".to_string()
        })
    );

    let confirm = find(&h, "button.confirm");
    assert_eq!(
        h.viewlet.dispatch(confirm, DomEvent::Change).expect("dispatch"),
        None
    );
    assert_eq!(
        h.viewlet.dispatch(confirm, DomEvent::Click).expect("dispatch"),
        Some(ViewletAction::Save(SaveOutcome::Unchanged))
    );
}

#[test]
fn loaded_file_replaces_field_payload() {
    let mut h = harness();
    let load = h
        .viewlet
        .on_file_loaded("wordpress.toml", "name = \"from file\"\n".to_string())
        .expect("load");
    assert_eq!(load, FileLoad::Accepted);

    let doc = h.viewlet.document();
    assert_eq!(doc.text(find(&h, ".fakebutton")), "wordpress.toml - Remove file");
    assert!(doc.is_hidden(find(&h, ".charm-settings")));
    assert!(doc.is_hidden(find(&h, ".settings-wrapper.toggle")));

    h.viewlet.save_config().expect("save");
    let request = h.env.requests().remove(0);
    assert!(request.changed.is_empty());
    assert_eq!(
        request.config_file.as_deref(),
        Some("name = \"from file\"\n")
    );
}

#[test]
fn removing_the_file_restores_fields() {
    let mut h = harness();
    h.viewlet
        .on_file_loaded("wordpress.toml", "debug = true\n".to_string())
        .expect("load");
    let old_input = find(&h, ".config-file input[type=file]");

    let fake = find(&h, ".fakebutton");
    assert_eq!(
        h.viewlet.handle_file_click(fake).expect("click"),
        FileClickAction::Removed
    );

    let doc = h.viewlet.document();
    assert_eq!(h.viewlet.config_file(), None);
    assert_eq!(doc.text(fake), templates::IMPORT_LABEL);
    assert!(!doc.is_hidden(find(&h, ".charm-settings")));
    assert!(!doc.is_hidden(find(&h, ".settings-wrapper.toggle")));
    let new_input = find(&h, ".config-file input[type=file]");
    assert_ne!(old_input, new_input);
    assert!(!doc.contains(old_input));
}

#[test]
fn empty_file_is_reported_not_accepted() {
    let mut h = harness();
    let load = h
        .viewlet
        .on_file_loaded("empty.toml", String::new())
        .expect("load");
    assert_eq!(load, FileLoad::Rejected);
    assert_eq!(h.viewlet.config_file(), None);
    assert_eq!(
        h.notifications.last().map(|n| n.title),
        Some("Configuration file error".to_string())
    );
    assert!(!h.viewlet.document().is_hidden(find(&h, ".charm-settings")));
}

#[test]
fn file_errors_map_to_messages() {
    let mut h = harness();
    let cases = [
        (FileReadErrorKind::NotFound, Some("File not found")),
        (FileReadErrorKind::NotReadable, Some("File is not readable")),
        (
            FileReadErrorKind::Other,
            Some("An error occurred reading this file."),
        ),
    ];
    for (kind, message) in cases {
        h.viewlet.on_file_error(&FileReadError::new(kind, "detail"));
        let note = h.notifications.last().expect("notification");
        assert_eq!(note.title, "Error reading configuration file");
        assert_eq!(Some(note.message.as_str()), message);
    }

    let before = h.notifications.len();
    h.viewlet
        .on_file_error(&FileReadError::new(FileReadErrorKind::Aborted, "cancelled"));
    assert_eq!(h.notifications.len(), before);
}

#[test]
fn show_resizes_textareas_hidden_at_render() {
    let mut h = harness();
    let container = h.viewlet.container().expect("rendered");
    h.viewlet.hide().expect("hide");
    h.viewlet
        .apply_model_change("name", Some(ConfigValue::from("a\nb\nc")))
        .expect("change");
    let name = field(&h, "name");
    assert_eq!(
        h.viewlet.document().attr(name, crate::textarea::HEIGHT_ATTR),
        Some("18")
    );

    assert_eq!(h.viewlet.show().expect("show"), 1);
    assert!(!h.viewlet.document().is_hidden(container));
    assert_eq!(
        h.viewlet.document().attr(name, crate::textarea::HEIGHT_ATTR),
        Some("54")
    );
}

#[test]
fn destroy_drops_timers_and_pending_replies() {
    let mut h = harness();
    h.viewlet.user_input("name", "title").expect("input");
    h.viewlet.save_config().expect("save");
    let request = h.env.requests().remove(0);

    h.viewlet.destroy();
    assert_eq!(h.viewlet.pending_timers(), 0);
    assert_eq!(
        h.viewlet
            .on_set_config_result(SetConfigResponse::ok(&request, request.changed.clone()))
            .expect("callback"),
        SubmitResult::Stale
    );
    assert!(!h.viewlet.document().is_document_attached());
}
