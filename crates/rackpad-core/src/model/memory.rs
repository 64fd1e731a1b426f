//! In-memory data model
//!
//! A self-contained [`RackModel`] used by the headless host and by tests.
//! Racks can be built in code or loaded from YAML:
//!
//! ```yaml
//! module_types: [osc, filter, delay]
//! racks:
//!   - id: rack1
//!     display_name: Main
//!     modules:
//!       - id: m1
//!         display_name: Osc
//!         module_type: osc
//!         params:
//!           - { id: freq, display_name: Freq, kind: { type: float, min: 20, max: 2000 }, current: 440 }
//!         pages:
//!           - { id: main, display_name: Main, params: [freq] }
//! ```

use super::{ChangeSource, EntityId, Module, ModelEvent, PresetValue, Rack, RackModel};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryModel {
    racks: Vec<Rack>,
    module_types: Vec<String>,
    #[serde(skip)]
    current_presets: HashMap<EntityId, String>,
    #[serde(skip)]
    active_modules: HashMap<EntityId, EntityId>,
    #[serde(skip)]
    midi_learn: bool,
    #[serde(skip)]
    modulation_learn: bool,
    #[serde(skip)]
    events: Vec<ModelEvent>,
}

impl MemoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model holding `racks` without announcing them
    pub fn with_racks(racks: Vec<Rack>) -> Self {
        Self {
            racks,
            ..Self::default()
        }
    }

    pub fn with_module_types(mut self, types: &[&str]) -> Self {
        self.module_types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Parse a rack description from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse rack description")
    }

    /// Load a rack description file
    pub fn load(path: &Path) -> Result<Self> {
        log::info!("MemoryModel::load: Loading racks from {:?}", path);
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rack file: {:?}", path))?;
        let model = Self::from_yaml_str(&contents)?;
        log::info!("MemoryModel::load: {} rack(s)", model.racks.len());
        Ok(model)
    }

    /// Queue notifications for every entity currently held
    ///
    /// This is how a freshly connected model introduces itself to listeners.
    pub fn announce_all(&mut self, source: ChangeSource) {
        let mut events = Vec::new();
        for rack in &self.racks {
            events.push(ModelEvent::Rack {
                source,
                rack: rack.id.clone(),
            });
            for module in &rack.modules {
                events.extend(announce_module(source, &rack.id, module));
            }
        }
        self.events.extend(events);
    }

    /// Update a named rack resource (e.g. `moduleorder`)
    pub fn set_resource(
        &mut self,
        source: ChangeSource,
        rack_id: &str,
        resource: &str,
        value: &str,
    ) {
        self.events.push(ModelEvent::Resource {
            source,
            rack: rack_id.to_string(),
            resource: resource.to_string(),
            value: value.to_string(),
        });
    }

    pub fn racks(&self) -> &[Rack] {
        &self.racks
    }

    /// Module most recently made active for a rack
    pub fn active_module(&self, rack_id: &str) -> Option<&str> {
        self.active_modules.get(rack_id).map(String::as_str)
    }

    pub fn midi_learn(&self) -> bool {
        self.midi_learn
    }

    pub fn modulation_learn(&self) -> bool {
        self.modulation_learn
    }

    fn rack_mut(&mut self, rack_id: &str) -> Option<&mut Rack> {
        self.racks.iter_mut().find(|r| r.id == rack_id)
    }
}

fn announce_module(source: ChangeSource, rack_id: &str, module: &Module) -> Vec<ModelEvent> {
    let mut events = vec![ModelEvent::Module {
        source,
        rack: rack_id.to_string(),
        module: module.id.clone(),
    }];
    for page in &module.pages {
        events.push(ModelEvent::Page {
            source,
            rack: rack_id.to_string(),
            module: module.id.clone(),
            page: page.id.clone(),
        });
    }
    for param in &module.params {
        events.push(ModelEvent::Param {
            source,
            rack: rack_id.to_string(),
            module: module.id.clone(),
            param: param.id.clone(),
        });
    }
    events
}

impl RackModel for MemoryModel {
    fn rack(&self, rack_id: &str) -> Option<&Rack> {
        self.racks.iter().find(|r| r.id == rack_id)
    }

    fn current_preset(&self, rack_id: &str) -> Option<String> {
        self.current_presets.get(rack_id).cloned()
    }

    fn module_types(&self) -> Vec<String> {
        self.module_types.clone()
    }

    fn change_param(
        &mut self,
        source: ChangeSource,
        rack_id: &str,
        module_id: &str,
        param_id: &str,
        value: f32,
    ) {
        let Some(param) = self
            .rack_mut(rack_id)
            .and_then(|r| r.modules.iter_mut().find(|m| m.id == module_id))
            .and_then(|m| m.params.iter_mut().find(|p| p.id == param_id))
        else {
            log::debug!(
                "MemoryModel: change_param on unknown {}/{}/{}",
                rack_id,
                module_id,
                param_id
            );
            return;
        };

        param.current = param.clamp_value(value);
        self.events.push(ModelEvent::Changed {
            source,
            rack: rack_id.to_string(),
            module: module_id.to_string(),
            param: param_id.to_string(),
        });
    }

    fn set_active_module(&mut self, source: ChangeSource, rack_id: &str, module_id: &str) {
        if self.module(rack_id, module_id).is_none() {
            return;
        }
        self.active_modules
            .insert(rack_id.to_string(), module_id.to_string());
        self.events.push(ModelEvent::ActiveModule {
            source,
            rack: rack_id.to_string(),
            module: module_id.to_string(),
        });
    }

    fn load_module(
        &mut self,
        source: ChangeSource,
        rack_id: &str,
        module_id: &str,
        module_type: &str,
    ) {
        let Some(module) = self
            .rack_mut(rack_id)
            .and_then(|r| r.modules.iter_mut().find(|m| m.id == module_id))
        else {
            return;
        };
        module.module_type = module_type.to_string();
        self.events.push(ModelEvent::LoadModule {
            source,
            rack: rack_id.to_string(),
            module: module_id.to_string(),
            module_type: module_type.to_string(),
        });
    }

    fn save_preset(&mut self, source: ChangeSource, rack_id: &str, preset: &str) {
        let Some(rack) = self.rack_mut(rack_id) else {
            return;
        };
        let snapshot = rack
            .modules
            .iter()
            .flat_map(|m| {
                m.params.iter().map(|p| PresetValue {
                    module: m.id.clone(),
                    param: p.id.clone(),
                    value: p.current,
                })
            })
            .collect();
        rack.presets.insert(preset.to_string(), snapshot);
        self.current_presets
            .insert(rack_id.to_string(), preset.to_string());
        self.events.push(ModelEvent::SavePreset {
            source,
            rack: rack_id.to_string(),
            preset: preset.to_string(),
        });
    }

    fn load_preset(&mut self, source: ChangeSource, rack_id: &str, preset: &str) {
        let Some(values) = self
            .rack(rack_id)
            .and_then(|r| r.presets.get(preset))
            .cloned()
        else {
            log::debug!("MemoryModel: no preset '{}' in rack {}", preset, rack_id);
            return;
        };

        for v in &values {
            self.change_param(ChangeSource::Preset, rack_id, &v.module, &v.param, v.value);
        }
        self.current_presets
            .insert(rack_id.to_string(), preset.to_string());
        self.events.push(ModelEvent::LoadPreset {
            source,
            rack: rack_id.to_string(),
            preset: preset.to_string(),
        });
    }

    fn set_midi_learn(&mut self, source: ChangeSource, active: bool) {
        self.midi_learn = active;
        if active {
            self.modulation_learn = false;
        }
        self.events.push(ModelEvent::MidiLearn { source, active });
    }

    fn set_modulation_learn(&mut self, source: ChangeSource, active: bool) {
        self.modulation_learn = active;
        if active {
            self.midi_learn = false;
        }
        self.events.push(ModelEvent::ModulationLearn { source, active });
    }

    fn drain_events(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Page, Parameter};

    fn sample_rack() -> Rack {
        Rack::new("r1", "Rack").with_module(
            Module::new("m1", "Osc", "osc")
                .with_param(Parameter::float("freq", "Freq", 0.0, 1.0, 0.5))
                .with_param(Parameter::int("oct", "Octave", -2, 2, 0))
                .with_page(Page::new("p1", "Main", &["freq", "oct"])),
        )
    }

    #[test]
    fn test_change_param_clamps_and_notifies() {
        let mut model = MemoryModel::with_racks(vec![sample_rack()]);
        model.change_param(ChangeSource::Local, "r1", "m1", "freq", 3.0);

        assert_eq!(model.param("r1", "m1", "freq").unwrap().current, 1.0);
        assert_eq!(
            model.drain_events(),
            vec![ModelEvent::Changed {
                source: ChangeSource::Local,
                rack: "r1".into(),
                module: "m1".into(),
                param: "freq".into(),
            }]
        );
        assert!(model.drain_events().is_empty());
    }

    #[test]
    fn test_change_unknown_param_is_noop() {
        let mut model = MemoryModel::with_racks(vec![sample_rack()]);
        model.change_param(ChangeSource::Local, "r1", "m1", "nope", 0.3);
        model.change_param(ChangeSource::Local, "r9", "m1", "freq", 0.3);
        assert!(model.drain_events().is_empty());
    }

    #[test]
    fn test_preset_save_and_load() {
        let mut model = MemoryModel::with_racks(vec![sample_rack()]);
        model.save_preset(ChangeSource::Local, "r1", "init");
        model.change_param(ChangeSource::Local, "r1", "m1", "freq", 0.9);
        model.drain_events();

        model.load_preset(ChangeSource::Local, "r1", "init");
        assert_eq!(model.param("r1", "m1", "freq").unwrap().current, 0.5);
        assert_eq!(model.current_preset("r1").as_deref(), Some("init"));
        assert_eq!(model.presets("r1"), vec!["init".to_string()]);

        let events = model.drain_events();
        assert!(matches!(
            events.last(),
            Some(ModelEvent::LoadPreset { preset, .. }) if preset == "init"
        ));
        assert!(events.iter().any(|e| matches!(
            e,
            ModelEvent::Changed { source: ChangeSource::Preset, .. }
        )));
    }

    #[test]
    fn test_learn_modes_are_exclusive() {
        let mut model = MemoryModel::new();
        model.set_midi_learn(ChangeSource::Local, true);
        assert!(model.midi_learn());
        model.set_modulation_learn(ChangeSource::Local, true);
        assert!(model.modulation_learn());
        assert!(!model.midi_learn());
    }

    #[test]
    fn test_announce_all_order() {
        let mut model = MemoryModel::with_racks(vec![sample_rack()]);
        model.announce_all(ChangeSource::Remote);
        let events = model.drain_events();
        assert!(matches!(events[0], ModelEvent::Rack { .. }));
        assert!(matches!(events[1], ModelEvent::Module { .. }));
        assert!(matches!(events[2], ModelEvent::Page { .. }));
        assert_eq!(events.len(), 5);
    }

    #[test]
    fn test_load_module_changes_type() {
        let mut model = MemoryModel::with_racks(vec![sample_rack()]);
        model.load_module(ChangeSource::Local, "r1", "m1", "filter");
        assert_eq!(model.module("r1", "m1").unwrap().module_type, "filter");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
module_types: [osc, filter]
racks:
  - id: rack1
    display_name: Main
    modules:
      - id: m1
        display_name: Osc
        module_type: osc
        params:
          - { id: freq, display_name: Freq, kind: { type: float, min: 20, max: 2000 }, current: 440, unit: Hz }
          - { id: sync, display_name: Sync, kind: { type: bool }, current: 0 }
        pages:
          - { id: main, display_name: Main, params: [freq, sync] }
"#;
        let model = MemoryModel::from_yaml_str(yaml).unwrap();
        assert_eq!(model.module_types(), vec!["osc", "filter"]);
        let freq = model.param("rack1", "m1", "freq").unwrap();
        assert_eq!(freq.unit, "Hz");
        assert_eq!(model.params("rack1", "m1", "main").len(), 2);
    }
}
