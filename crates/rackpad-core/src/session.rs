//! Session cursor and module display order
//!
//! The cursor names the rack/module/page the active mode operates on. It is
//! owned by the engine and only mutated on the control thread.

use crate::model::{EntityId, Module, RackModel};

/// Currently selected rack, module and page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCursor {
    pub rack: Option<EntityId>,
    pub module: Option<EntityId>,
    pub page: Option<EntityId>,
}

/// User-defined module ordering for next/previous navigation
///
/// Built from the rack's `moduleorder` resource, a space-separated id list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleOrder {
    ids: Vec<EntityId>,
}

impl ModuleOrder {
    pub fn parse(value: &str) -> Self {
        Self {
            ids: value.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    /// Modules of `rack_id` in display order
    ///
    /// Listed ids come first (ids unknown to the model are skipped), then
    /// every remaining module in the model's own order.
    pub fn ordered<'m>(&self, model: &'m dyn RackModel, rack_id: &str) -> Vec<&'m Module> {
        let mut ret: Vec<&Module> = Vec::new();
        for id in &self.ids {
            if let Some(module) = model.module(rack_id, id) {
                if !ret.iter().any(|m| m.id == module.id) {
                    ret.push(module);
                }
            }
        }
        for module in model.modules(rack_id) {
            if !ret.iter().any(|m| m.id == module.id) {
                ret.push(module);
            }
        }
        ret
    }
}

/// Control-thread session state shared by all modes
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub cursor: SessionCursor,
    pub module_order: ModuleOrder,
    pub midi_learn: bool,
    pub modulation_learn: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_rack(&self) -> Option<&str> {
        self.cursor.rack.as_deref()
    }

    pub fn current_module(&self) -> Option<&str> {
        self.cursor.module.as_deref()
    }

    pub fn current_page(&self) -> Option<&str> {
        self.cursor.page.as_deref()
    }

    /// Mirror a learn toggle; enabling one learn mode disables the other
    pub fn set_midi_learn(&mut self, active: bool) {
        if active {
            self.modulation_learn = false;
        }
        self.midi_learn = active;
    }

    pub fn set_modulation_learn(&mut self, active: bool) {
        if active {
            self.midi_learn = false;
        }
        self.modulation_learn = active;
    }

    /// Module after the current one in display order, if any
    pub fn next_module_id(&self, model: &dyn RackModel) -> Option<EntityId> {
        let rack = self.current_rack()?;
        let current = self.current_module()?;
        let modules = self.module_order.ordered(model, rack);
        let pos = modules.iter().position(|m| m.id == current)?;
        modules.get(pos + 1).map(|m| m.id.clone())
    }

    /// Module before the current one in display order, if any
    pub fn prev_module_id(&self, model: &dyn RackModel) -> Option<EntityId> {
        let rack = self.current_rack()?;
        let current = self.current_module()?;
        let modules = self.module_order.ordered(model, rack);
        let pos = modules.iter().position(|m| m.id == current)?;
        pos.checked_sub(1).map(|p| modules[p].id.clone())
    }
}
