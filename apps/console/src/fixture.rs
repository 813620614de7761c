//! Startup data for the console: charms, the service to inspect, and the
//! machines shown in the placement panel.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{anyhow, Context, Result};
use console_core::InMemoryCharmStore;
use serde::{Deserialize, Serialize};
use shared::domain::{
    CharmSchema, CharmUrl, ConfigMap, ConfigValue, Machine, OptionSchema, OptionType, Service,
    ServiceId,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub charms: BTreeMap<CharmUrl, CharmSchema>,
    pub service: Service,
    #[serde(default)]
    pub machines: Vec<Machine>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture '{}'", path.display()))?;
        let fixture: Self = serde_json::from_str(&raw)
            .with_context(|| format!("malformed fixture '{}'", path.display()))?;
        fixture.check()?;
        Ok(fixture)
    }

    fn check(&self) -> Result<()> {
        if !self.charms.contains_key(&self.service.charm) {
            return Err(anyhow!(
                "service '{}' uses charm '{}' which the fixture does not define",
                self.service.id,
                self.service.charm
            ));
        }
        Ok(())
    }

    pub fn charm_store(&self) -> InMemoryCharmStore {
        self.charms
            .iter()
            .fold(InMemoryCharmStore::new(), |store, (url, schema)| {
                store.with_charm(url.clone(), schema.clone())
            })
    }

    /// Initial contents of the in-process environment.
    pub fn environment_services(&self) -> Vec<(ServiceId, ConfigMap)> {
        vec![(self.service.id.clone(), self.service.config.clone())]
    }

    /// A small wordpress deployment used when no fixture file is given.
    pub fn demo() -> Self {
        let charm = CharmUrl::new("cs:precise/wordpress-15");
        let option = |option_type, default: Option<ConfigValue>, description: &str| OptionSchema {
            option_type,
            default,
            description: Some(description.to_string()),
        };
        let schema = CharmSchema::from([
            (
                "debug".to_string(),
                option(OptionType::Boolean, Some(false.into()), "Enable debug output"),
            ),
            (
                "engine".to_string(),
                option(OptionType::String, Some("nginx".into()), "Web server engine"),
            ),
            (
                "port".to_string(),
                option(OptionType::Int, Some(80.into()), "Listening port"),
            ),
            (
                "tuning".to_string(),
                option(OptionType::String, Some("single".into()), "Tuning profile"),
            ),
        ]);
        Self {
            charms: BTreeMap::from([(charm.clone(), schema)]),
            service: Service {
                id: ServiceId::new("wordpress"),
                charm,
                config: ConfigMap::from([("debug".to_string(), ConfigValue::from("false"))]),
                exposed: true,
            },
            machines: vec![
                Machine::new("0"),
                Machine::new("1"),
                Machine::new("lxc/0").with_parent("1"),
            ],
        }
    }
}
