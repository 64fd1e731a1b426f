//! Parameter view
//!
//! Shows the current page's parameters in a 2×2 grid, one per encoder.
//! Holding button 2 turns encoder 2 into page select and encoder 1 into
//! module select; releasing button 0 opens the main menu.

use super::{ModeContext, ModeHandler, ModeId, Transition};
use crate::display::PARAMS_PER_PAGE;
use crate::model::{ChangeSource, ModelEvent, RackModel};

/// Step scale for the panel's own encoders
pub const ENCODER_PARAM_STEPS: f32 = 128.0;

const MENU_BUTTON: usize = 0;
const SHIFT_BUTTON: usize = 2;
const MODULE_ENCODER: usize = 1;
const PAGE_ENCODER: usize = 2;
const MAX_BUTTONS: usize = 8;

pub struct ParamMode {
    /// Index of the shown page, `None` until one has been selected
    page_idx: Option<usize>,
    /// Type of the current module when last seen
    module_type: String,
    held: [bool; MAX_BUTTONS],
}

impl Default for ParamMode {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamMode {
    pub fn new() -> Self {
        Self {
            page_idx: None,
            module_type: String::new(),
            held: [false; MAX_BUTTONS],
        }
    }

    pub fn page_index(&self) -> Option<usize> {
        self.page_idx
    }

    fn is_held(&self, id: usize) -> bool {
        self.held.get(id).copied().unwrap_or(false)
    }

    fn page_count(ctx: &ModeContext) -> usize {
        match (ctx.session.current_rack(), ctx.session.current_module()) {
            (Some(rack), Some(module)) => ctx.model.pages(rack, module).len(),
            _ => 0,
        }
    }

    /// Select page `idx` of the current module and redraw
    ///
    /// Out-of-range indices are ignored.
    fn set_current_page(&mut self, ctx: &mut ModeContext, idx: usize) {
        if self.page_idx == Some(idx) {
            return;
        }
        let page_id = match (ctx.session.current_rack(), ctx.session.current_module()) {
            (Some(rack), Some(module)) => ctx
                .model
                .pages(rack, module)
                .get(idx)
                .map(|p| p.id.clone()),
            _ => None,
        };
        if let Some(page_id) = page_id {
            self.page_idx = Some(idx);
            ctx.set_current_page(Some(page_id));
            self.display(ctx);
        }
    }

    /// Forget the page so the next page notification or navigation picks page 0
    fn reset_page(&mut self) {
        self.page_idx = None;
    }

    fn draw_param(ctx: &mut ModeContext, slot: usize, param_id: &str) {
        let (Some(rack), Some(module)) = (ctx.session.current_rack(), ctx.session.current_module())
        else {
            return;
        };
        if let Some(param) = ctx.model.param(rack, module, param_id) {
            ctx.panel.display_param_num(slot, param);
        }
    }
}

impl ModeHandler for ParamMode {
    fn activate(&mut self, ctx: &mut ModeContext) {
        self.display(ctx);
    }

    fn display(&mut self, ctx: &mut ModeContext) {
        if ctx.panel.is_yielded() {
            return;
        }
        ctx.panel.clear_display();

        let model: &dyn RackModel = &*ctx.model;
        let rack = ctx.session.current_rack().unwrap_or_default();
        let module_id = ctx.session.current_module().unwrap_or_default();
        let module = model.module(rack, module_id);
        let title = module
            .map(|m| format!("{} : {}", m.id, m.display_name))
            .unwrap_or_default();

        if model.pages(rack, module_id).is_empty() {
            ctx.panel.display_title(&title, "none");
        } else {
            let page_id = ctx.session.current_page().unwrap_or_default();
            let page_name = model
                .page(rack, module_id, page_id)
                .map(|p| p.display_name.as_str())
                .unwrap_or_default();
            ctx.panel.display_title(&title, page_name);

            let params = model.params(rack, module_id, page_id);
            for (slot, param) in params.iter().take(PARAMS_PER_PAGE).enumerate() {
                ctx.panel.display_param_num(slot, param);
            }
            for slot in params.len().min(PARAMS_PER_PAGE)..PARAMS_PER_PAGE {
                ctx.panel.clear_param_num(slot);
            }
        }

        ctx.panel.display_status_bar();
    }

    fn on_button(&mut self, _ctx: &mut ModeContext, id: usize, value: i32) -> Transition {
        if let Some(held) = self.held.get_mut(id) {
            *held = value != 0;
        }
        if id == MENU_BUTTON && value == 0 {
            return Transition::Switch(ModeId::MainMenu);
        }
        Transition::Stay
    }

    fn on_encoder(&mut self, ctx: &mut ModeContext, id: usize, delta: i32) -> Transition {
        if id == PAGE_ENCODER && self.is_held(SHIFT_BUTTON) {
            ctx.panel.set_yield(false);
            if delta > 0 {
                self.next_page(ctx);
            } else {
                self.prev_page(ctx);
            }
        } else if id == MODULE_ENCODER && self.is_held(SHIFT_BUTTON) {
            if delta > 0 {
                ctx.next_module();
            } else {
                ctx.prev_module();
            }
        } else if let Some(slot) = ctx.config.map_encoder(id) {
            self.change_param(ctx, slot, delta as f32, ENCODER_PARAM_STEPS);
        }
        Transition::Stay
    }

    fn next_page(&mut self, ctx: &mut ModeContext) {
        let Some(current) = self.page_idx else {
            self.set_current_page(ctx, 0);
            return;
        };
        let count = Self::page_count(ctx);
        if count == 0 {
            return;
        }
        let next = (current + 1).min(count - 1);
        if next != current {
            self.set_current_page(ctx, next);
        }
    }

    fn prev_page(&mut self, ctx: &mut ModeContext) {
        let Some(current) = self.page_idx else {
            self.set_current_page(ctx, 0);
            return;
        };
        let prev = current.saturating_sub(1);
        if prev != current {
            self.set_current_page(ctx, prev);
        }
    }

    fn change_param(&mut self, ctx: &mut ModeContext, index: usize, rel_value: f32, steps: f32) {
        let (Some(rack), Some(module), Some(page)) = (
            ctx.session.cursor.rack.clone(),
            ctx.session.cursor.module.clone(),
            ctx.session.cursor.page.clone(),
        ) else {
            return;
        };

        let target = ctx
            .model
            .params(&rack, &module, &page)
            .get(index)
            .map(|p| (p.id.clone(), p.calc_relative(rel_value / steps)));
        if let Some((param_id, value)) = target {
            ctx.model
                .change_param(ChangeSource::Local, &rack, &module, &param_id, value);
        }
    }

    fn on_model_event(&mut self, ctx: &mut ModeContext, event: &ModelEvent) -> Transition {
        let current_rack = ctx.session.cursor.rack.clone();
        let current_module = ctx.session.cursor.module.clone();
        let is_current_rack = |rack: &str| current_rack.as_deref() == Some(rack);
        let is_current_module = |rack: &str, module: &str| {
            is_current_rack(rack) && current_module.as_deref() == Some(module)
        };

        match event {
            ModelEvent::ActiveModule {
                source,
                rack,
                module,
            } if is_current_rack(rack.as_str()) => {
                let moved = current_module.as_deref() != Some(module.as_str());
                if *source != ChangeSource::Local && moved {
                    ctx.set_current_module(module);
                }
                self.reset_page();
                self.set_current_page(ctx, 0);
            }
            ModelEvent::Changed {
                rack,
                module,
                param,
                ..
            } if is_current_module(rack.as_str(), module.as_str()) => {
                let slot = ctx.session.current_page().and_then(|page| {
                    ctx.model
                        .params(rack, module, page)
                        .iter()
                        .take(PARAMS_PER_PAGE)
                        .position(|p| p.id == *param)
                });
                if let Some(slot) = slot {
                    Self::draw_param(ctx, slot, param);
                }
            }
            ModelEvent::Module { rack, module, .. }
                if is_current_module(rack.as_str(), module.as_str()) =>
            {
                if let Some(m) = ctx.model.module(rack, module) {
                    if m.module_type != self.module_type {
                        self.module_type = m.module_type.clone();
                        self.reset_page();
                    }
                }
            }
            ModelEvent::Page { rack, module, .. }
                if is_current_module(rack.as_str(), module.as_str()) =>
            {
                if self.page_idx.is_none() {
                    self.set_current_page(ctx, 0);
                }
            }
            ModelEvent::LoadModule {
                rack,
                module,
                module_type,
                ..
            } if is_current_module(rack.as_str(), module.as_str()) => {
                if *module_type != self.module_type {
                    self.module_type = module_type.clone();
                    self.reset_page();
                    self.set_current_page(ctx, 0);
                }
            }
            ModelEvent::LoadPreset { rack, .. } if is_current_rack(rack.as_str()) => {
                self.reset_page();
                self.set_current_page(ctx, 0);
            }
            _ => {}
        }
        Transition::Stay
    }
}
