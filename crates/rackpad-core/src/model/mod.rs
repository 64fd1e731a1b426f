//! Data-model contract
//!
//! The rack → module → page → parameter hierarchy lives outside the core.
//! The engine only needs to look entities up by id, push parameter changes
//! tagged with a [`ChangeSource`], and receive change notifications, which it
//! forwards to the active mode.
//!
//! Lookups return `Option`/empty collections: the model may legitimately lag
//! behind what the UI is pointing at, so absence is never an error.
//!
//! Notifications are collected in an outbox and pulled by the engine with
//! [`RackModel::drain_events`] after every operation that may have produced
//! some. This keeps delivery on the control thread and avoids re-entrant
//! callbacks into a mode that is itself calling into the model.

mod memory;

pub use memory::MemoryModel;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a rack, module, page or parameter
pub type EntityId = String;

/// Where a change originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// This controller (encoders, remote commands applied here)
    Local,
    /// A MIDI controller mapped by the host
    Midi,
    /// Another client on the network
    Remote,
    /// Applied as part of a preset load
    Preset,
}

/// Value domain of a parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    Float { min: f32, max: f32 },
    Int { min: i32, max: i32 },
    Bool,
}

/// A single controllable parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: EntityId,
    pub display_name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub unit: String,
    pub current: f32,
}

impl Parameter {
    pub fn float(id: &str, display_name: &str, min: f32, max: f32, current: f32) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            kind: ParamKind::Float { min, max },
            unit: String::new(),
            current,
        }
    }

    pub fn int(id: &str, display_name: &str, min: i32, max: i32, current: i32) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            kind: ParamKind::Int { min, max },
            unit: String::new(),
            current: current as f32,
        }
    }

    pub fn toggle(id: &str, display_name: &str, on: bool) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            kind: ParamKind::Bool,
            unit: String::new(),
            current: if on { 1.0 } else { 0.0 },
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    /// Absolute value after moving by `relative`, a fraction of the full range
    ///
    /// The result is clamped to the parameter's range; integers are rounded
    /// and toggles switch on any positive/negative movement.
    pub fn calc_relative(&self, relative: f32) -> f32 {
        match self.kind {
            ParamKind::Float { min, max } => {
                (self.current + relative * (max - min)).clamp(min, max)
            }
            ParamKind::Int { min, max } => {
                let range = (max - min) as f32;
                (self.current + relative * range)
                    .round()
                    .clamp(min as f32, max as f32)
            }
            ParamKind::Bool => {
                if relative > 0.0 {
                    1.0
                } else if relative < 0.0 {
                    0.0
                } else {
                    self.current
                }
            }
        }
    }

    /// Clamp an externally supplied value into range
    pub fn clamp_value(&self, value: f32) -> f32 {
        match self.kind {
            ParamKind::Float { min, max } => value.clamp(min, max),
            ParamKind::Int { min, max } => value.round().clamp(min as f32, max as f32),
            ParamKind::Bool => {
                if value >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Value formatted for the display
    pub fn display_value(&self) -> String {
        match self.kind {
            ParamKind::Float { .. } => format!("{:.2}", self.current),
            ParamKind::Int { .. } => format!("{}", self.current.round() as i64),
            ParamKind::Bool => {
                if self.current >= 0.5 {
                    "on".to_string()
                } else {
                    "off".to_string()
                }
            }
        }
    }
}

/// A page groups up to a screenful of a module's parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: EntityId,
    pub display_name: String,
    /// Parameter ids, in display order
    pub params: Vec<EntityId>,
}

impl Page {
    pub fn new(id: &str, display_name: &str, params: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// A module instance in a rack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: EntityId,
    pub display_name: String,
    pub module_type: String,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub params: Vec<Parameter>,
}

impl Module {
    pub fn new(id: &str, display_name: &str, module_type: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            module_type: module_type.to_string(),
            pages: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.pages.push(page);
        self
    }

    pub fn param(&self, param_id: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.id == param_id)
    }

    pub fn page(&self, page_id: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == page_id)
    }
}

/// One stored parameter value in a preset snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetValue {
    pub module: EntityId,
    pub param: EntityId,
    pub value: f32,
}

/// A rack of modules, plus its stored presets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rack {
    pub id: EntityId,
    pub display_name: String,
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default)]
    pub presets: BTreeMap<String, Vec<PresetValue>>,
}

impl Rack {
    pub fn new(id: &str, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            modules: Vec::new(),
            presets: BTreeMap::new(),
        }
    }

    pub fn with_module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    pub fn module(&self, module_id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == module_id)
    }
}

/// Change notification emitted by the data model
///
/// Entities are referenced by id; receivers look up whatever state they need.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    Rack {
        source: ChangeSource,
        rack: EntityId,
    },
    Module {
        source: ChangeSource,
        rack: EntityId,
        module: EntityId,
    },
    Page {
        source: ChangeSource,
        rack: EntityId,
        module: EntityId,
        page: EntityId,
    },
    Param {
        source: ChangeSource,
        rack: EntityId,
        module: EntityId,
        param: EntityId,
    },
    /// A parameter's value changed
    Changed {
        source: ChangeSource,
        rack: EntityId,
        module: EntityId,
        param: EntityId,
    },
    /// A named rack resource was updated (e.g. `moduleorder`)
    Resource {
        source: ChangeSource,
        rack: EntityId,
        resource: String,
        value: String,
    },
    DeleteRack {
        source: ChangeSource,
        rack: EntityId,
    },
    ActiveModule {
        source: ChangeSource,
        rack: EntityId,
        module: EntityId,
    },
    LoadModule {
        source: ChangeSource,
        rack: EntityId,
        module: EntityId,
        module_type: String,
    },
    SavePreset {
        source: ChangeSource,
        rack: EntityId,
        preset: String,
    },
    LoadPreset {
        source: ChangeSource,
        rack: EntityId,
        preset: String,
    },
    MidiLearn {
        source: ChangeSource,
        active: bool,
    },
    ModulationLearn {
        source: ChangeSource,
        active: bool,
    },
}

/// Everything the engine needs from the data model
pub trait RackModel {
    fn rack(&self, rack_id: &str) -> Option<&Rack>;

    fn module(&self, rack_id: &str, module_id: &str) -> Option<&Module> {
        self.rack(rack_id)?.module(module_id)
    }

    /// Modules of a rack in the model's native order
    fn modules(&self, rack_id: &str) -> Vec<&Module> {
        self.rack(rack_id)
            .map(|r| r.modules.iter().collect())
            .unwrap_or_default()
    }

    fn pages(&self, rack_id: &str, module_id: &str) -> Vec<&Page> {
        self.module(rack_id, module_id)
            .map(|m| m.pages.iter().collect())
            .unwrap_or_default()
    }

    fn page(&self, rack_id: &str, module_id: &str, page_id: &str) -> Option<&Page> {
        self.module(rack_id, module_id)?.page(page_id)
    }

    /// Parameters shown on a page, in page order
    ///
    /// Ids on the page that don't resolve to a parameter are skipped.
    fn params(&self, rack_id: &str, module_id: &str, page_id: &str) -> Vec<&Parameter> {
        let Some(module) = self.module(rack_id, module_id) else {
            return Vec::new();
        };
        let Some(page) = module.page(page_id) else {
            return Vec::new();
        };
        page.params.iter().filter_map(|id| module.param(id)).collect()
    }

    fn param(&self, rack_id: &str, module_id: &str, param_id: &str) -> Option<&Parameter> {
        self.module(rack_id, module_id)?.param(param_id)
    }

    /// Preset names stored for a rack
    fn presets(&self, rack_id: &str) -> Vec<String> {
        self.rack(rack_id)
            .map(|r| r.presets.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Most recently loaded or saved preset for a rack
    fn current_preset(&self, rack_id: &str) -> Option<String>;

    /// Module types that can be loaded into a module slot
    fn module_types(&self) -> Vec<String>;

    fn change_param(
        &mut self,
        source: ChangeSource,
        rack_id: &str,
        module_id: &str,
        param_id: &str,
        value: f32,
    );

    fn set_active_module(&mut self, source: ChangeSource, rack_id: &str, module_id: &str);

    fn load_module(
        &mut self,
        source: ChangeSource,
        rack_id: &str,
        module_id: &str,
        module_type: &str,
    );

    fn save_preset(&mut self, source: ChangeSource, rack_id: &str, preset: &str);

    fn load_preset(&mut self, source: ChangeSource, rack_id: &str, preset: &str);

    fn set_midi_learn(&mut self, source: ChangeSource, active: bool);

    fn set_modulation_learn(&mut self, source: ChangeSource, active: bool);

    /// Take all notifications produced since the last call, oldest first
    fn drain_events(&mut self) -> Vec<ModelEvent>;
}
