//! Markup builders. Pure functions from view data to element specs.

use shared::domain::{Machine, OptionType, Service};

use crate::{
    binding::{BIND_ATTR, CONFIG_BIND_PREFIX},
    document::{el, ElementSpec},
    forms::ServiceSetting,
};

pub const IMPORT_LABEL: &str = "Import config file...";
pub const UNPLACED_TITLE: &str = "Unplaced units";
pub const MACHINES_TITLE: &str = "Machines";

fn bind_attr(name: &str) -> String {
    format!("{CONFIG_BIND_PREFIX}{name}")
}

fn setting_field(setting: &ServiceSetting) -> ElementSpec {
    let description = setting.description.clone().unwrap_or_default();
    let control = match setting.option_type {
        OptionType::String => el("textarea").class("config-field"),
        _ => el("input").class("config-field").attr("type", "text"),
    }
    .attr("name", setting.name.as_str())
    .attr(BIND_ATTR, bind_attr(&setting.name))
    .value(setting.field_value());

    el("div")
        .class("settings-wrapper")
        .child(el("label").attr("for", setting.name.as_str()).text(setting.name.as_str()))
        .child(control)
        .child(el("span").class("settings-description").text(description))
}

fn setting_toggle(setting: &ServiceSetting) -> ElementSpec {
    let checked = setting.value.as_ref().is_some_and(|value| value.as_bool());
    el("div")
        .class("settings-wrapper toggle")
        .child(el("label").attr("for", setting.name.as_str()).text(setting.name.as_str()))
        .child(
            el("input")
                .class("config-field")
                .attr("type", "checkbox")
                .attr("name", setting.name.as_str())
                .attr(BIND_ATTR, bind_attr(&setting.name))
                .checked(checked),
        )
        .child(el("span").class("textvalue").text(checked.to_string()))
}

pub fn service_configuration(
    service: &Service,
    settings: &[ServiceSetting],
    exposed: bool,
) -> ElementSpec {
    let exposed_label = if exposed { "Exposed" } else { "Not exposed" };
    el("div")
        .class("settings-config")
        .attr("data-service", service.id.as_str())
        .child(
            el("div")
                .class("service-summary")
                .child(el("span").class("charm-url").text(service.charm.as_str()))
                .child(
                    el("span")
                        .class("exposed")
                        .attr("data-exposed", exposed.to_string())
                        .text(exposed_label),
                ),
        )
        .child(
            el("div")
                .class("config-file")
                .child(el("span").class("fakebutton").text(IMPORT_LABEL))
                .child(file_input()),
        )
        .child(
            el("div")
                .class("charm-settings")
                .children(settings.iter().filter(|s| !s.is_bool()).map(setting_field)),
        )
        .children(settings.iter().filter(|s| s.is_bool()).map(setting_toggle))
        .child(
            el("div")
                .class("controls")
                .child(el("button").class("confirm").text("Save changes"))
                .child(el("button").class("cancel").text("Cancel")),
        )
}

pub fn file_input() -> ElementSpec {
    el("input").attr("type", "file")
}

pub fn machine_panel() -> ElementSpec {
    el("div")
        .class("panel-body")
        .child(
            el("div")
                .class("column unplaced")
                .child(el("div").class("head").child(el("span").class("title").text(UNPLACED_TITLE)))
                .child(el("div").class("content").child(el("ul"))),
        )
        .child(
            el("div")
                .class("column machines")
                .child(el("div").class("head").child(el("span").class("title").text(MACHINES_TITLE)))
                .child(el("div").class("content").child(el("ul"))),
        )
}

pub fn machine_item(machine: &Machine) -> ElementSpec {
    el("li")
        .attr("data-id", machine.id.as_str())
        .text(machine.display_name.as_str())
}
