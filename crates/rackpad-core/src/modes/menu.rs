//! Menu modes
//!
//! All menus share [`MenuList`]: a scrolling list of up to
//! [`TEXT_LINES`] visible entries with the selection shown inverted.
//! Encoders move the selection, releasing button 1 or 2 picks the entry,
//! releasing button 0 cancels back to the parameter view. A menu left
//! untouched for `menu_timeout_ms` also returns to the parameter view.

use super::{ModeContext, ModeHandler, ModeId, Transition};
use crate::display::TEXT_LINES;
use crate::model::{ChangeSource, ModelEvent};
use std::time::Instant;

const CANCEL_BUTTON: usize = 0;

/// Scrolling list shared by every menu
pub struct MenuList {
    items: Vec<String>,
    selected: usize,
    top: usize,
    last_activity: Instant,
}

impl Default for MenuList {
    fn default() -> Self {
        Self::new()
    }
}

impl MenuList {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            selected: 0,
            top: 0,
            last_activity: Instant::now(),
        }
    }

    /// Replace the entries and select `selected` (clamped)
    pub fn reset(&mut self, items: Vec<String>, selected: usize) {
        self.items = items;
        self.selected = selected.min(self.items.len().saturating_sub(1));
        self.top = 0;
        self.scroll_to_selection();
        self.touch();
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Move the selection by `delta` entries, clamped to the list
    pub fn move_by(&mut self, delta: i32) {
        self.touch();
        if self.items.is_empty() {
            return;
        }
        let last = self.items.len() - 1;
        let target = self.selected as i64 + delta as i64;
        self.selected = target.clamp(0, last as i64) as usize;
        self.scroll_to_selection();
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn timed_out(&self, ctx: &ModeContext) -> bool {
        self.last_activity.elapsed() >= ctx.config.menu_timeout()
    }

    fn scroll_to_selection(&mut self) {
        let lines = TEXT_LINES as usize;
        if self.selected < self.top {
            self.top = self.selected;
        } else if self.selected >= self.top + lines {
            self.top = self.selected + 1 - lines;
        }
    }

    /// Redraw the visible window
    pub fn draw(&self, ctx: &mut ModeContext) {
        if ctx.panel.is_yielded() {
            return;
        }
        ctx.panel.clear_display();
        for line in 0..TEXT_LINES {
            let idx = self.top + line as usize;
            let Some(item) = self.items.get(idx) else {
                break;
            };
            ctx.panel.display_line(line, item);
            if idx == self.selected {
                ctx.panel.invert_line(line);
            }
        }
    }

    /// Common input handling; `Some(idx)` when an entry was picked
    fn button(&mut self, id: usize, value: i32) -> Result<Option<usize>, Transition> {
        self.touch();
        if value != 0 {
            return Ok(None);
        }
        match id {
            CANCEL_BUTTON => Err(Transition::Switch(ModeId::Parameter)),
            1 | 2 if !self.items.is_empty() => Ok(Some(self.selected)),
            1 | 2 => Err(Transition::Switch(ModeId::Parameter)),
            _ => Ok(None),
        }
    }
}

/// Shared `on_button`/`on_encoder`/`poll` for menus built on [`MenuList`]
macro_rules! menu_input {
    () => {
        fn poll(&mut self, ctx: &mut ModeContext) -> Transition {
            if self.list.timed_out(ctx) {
                log::debug!("[Engine] menu timed out");
                return Transition::Switch(ModeId::Parameter);
            }
            Transition::Stay
        }

        fn on_button(&mut self, ctx: &mut ModeContext, id: usize, value: i32) -> Transition {
            match self.list.button(id, value) {
                Ok(Some(idx)) => self.select(ctx, idx),
                Ok(None) => Transition::Stay,
                Err(transition) => transition,
            }
        }

        fn on_encoder(&mut self, ctx: &mut ModeContext, _id: usize, delta: i32) -> Transition {
            self.list.move_by(delta);
            self.list.draw(ctx);
            Transition::Stay
        }

        fn display(&mut self, ctx: &mut ModeContext) {
            self.list.draw(ctx);
        }
    };
}

// ─── Main menu ──────────────────────────────────────────────────────

const MAIN_PRESETS: usize = 0;
const MAIN_MODULES: usize = 1;
const MAIN_MODULE_SELECT: usize = 2;
const MAIN_MIDI_LEARN: usize = 3;
const MAIN_MOD_LEARN: usize = 4;

#[derive(Default)]
pub struct MainMenu {
    list: MenuList,
}

impl MainMenu {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(ctx: &ModeContext) -> Vec<String> {
        let learn = |label: &str, active: bool| {
            if active {
                format!("{} [on]", label)
            } else {
                label.to_string()
            }
        };
        vec![
            "Presets".to_string(),
            "Modules".to_string(),
            "Module Select".to_string(),
            learn("MIDI Learn", ctx.session.midi_learn),
            learn("Mod Learn", ctx.session.modulation_learn),
        ]
    }

    fn select(&mut self, ctx: &mut ModeContext, idx: usize) -> Transition {
        match idx {
            MAIN_PRESETS => Transition::Switch(ModeId::PresetMenu),
            MAIN_MODULES => Transition::Switch(ModeId::ModuleMenu),
            MAIN_MODULE_SELECT => Transition::Switch(ModeId::ModuleSelectMenu),
            MAIN_MIDI_LEARN => {
                let active = !ctx.session.midi_learn;
                ctx.model.set_midi_learn(ChangeSource::Local, active);
                Transition::Switch(ModeId::Parameter)
            }
            MAIN_MOD_LEARN => {
                let active = !ctx.session.modulation_learn;
                ctx.model.set_modulation_learn(ChangeSource::Local, active);
                Transition::Switch(ModeId::Parameter)
            }
            _ => Transition::Stay,
        }
    }
}

impl ModeHandler for MainMenu {
    fn activate(&mut self, ctx: &mut ModeContext) {
        self.list.reset(Self::items(ctx), 0);
        self.list.draw(ctx);
    }

    fn on_model_event(&mut self, ctx: &mut ModeContext, event: &ModelEvent) -> Transition {
        if matches!(
            event,
            ModelEvent::MidiLearn { .. } | ModelEvent::ModulationLearn { .. }
        ) {
            let selected = self.list.selected();
            self.list.reset(Self::items(ctx), selected);
            self.list.draw(ctx);
        }
        Transition::Stay
    }

    menu_input!();
}

// ─── Preset menu ────────────────────────────────────────────────────

/// "Save" followed by the rack's presets
#[derive(Default)]
pub struct PresetMenu {
    list: MenuList,
}

impl PresetMenu {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(ctx: &ModeContext) -> Vec<String> {
        let mut items = vec!["Save".to_string()];
        if let Some(rack) = ctx.session.current_rack() {
            items.extend(ctx.model.presets(rack));
        }
        items
    }

    fn select(&mut self, ctx: &mut ModeContext, idx: usize) -> Transition {
        let Some(rack) = ctx.session.cursor.rack.clone() else {
            return Transition::Switch(ModeId::Parameter);
        };
        if idx == 0 {
            let name = ctx
                .model
                .current_preset(&rack)
                .unwrap_or_else(|| format!("preset-{}", ctx.model.presets(&rack).len() + 1));
            log::info!("[Engine] saving preset {}", name);
            ctx.model.save_preset(ChangeSource::Local, &rack, &name);
        } else if let Some(name) = self.list.items().get(idx).cloned() {
            log::info!("[Engine] loading preset {}", name);
            ctx.model.load_preset(ChangeSource::Local, &rack, &name);
        }
        Transition::Switch(ModeId::Parameter)
    }
}

impl ModeHandler for PresetMenu {
    fn activate(&mut self, ctx: &mut ModeContext) {
        let items = Self::items(ctx);
        let current = ctx
            .session
            .current_rack()
            .and_then(|rack| ctx.model.current_preset(rack))
            .and_then(|name| items.iter().skip(1).position(|i| *i == name))
            .map(|pos| pos + 1)
            .unwrap_or(0);
        self.list.reset(items, current);
        self.list.draw(ctx);
    }

    menu_input!();
}

// ─── Module menu ────────────────────────────────────────────────────

/// Module types that can be loaded into the current slot
#[derive(Default)]
pub struct ModuleMenu {
    list: MenuList,
}

impl ModuleMenu {
    pub fn new() -> Self {
        Self::default()
    }

    fn select(&mut self, ctx: &mut ModeContext, idx: usize) -> Transition {
        let (Some(rack), Some(module)) = (
            ctx.session.cursor.rack.clone(),
            ctx.session.cursor.module.clone(),
        ) else {
            return Transition::Switch(ModeId::Parameter);
        };
        if let Some(module_type) = self.list.items().get(idx).cloned() {
            log::info!("[Engine] loading {} into {}", module_type, module);
            ctx.model
                .load_module(ChangeSource::Local, &rack, &module, &module_type);
        }
        Transition::Switch(ModeId::Parameter)
    }
}

impl ModeHandler for ModuleMenu {
    fn activate(&mut self, ctx: &mut ModeContext) {
        let types = ctx.model.module_types();
        let current = match (ctx.session.current_rack(), ctx.session.current_module()) {
            (Some(rack), Some(module)) => ctx
                .model
                .module(rack, module)
                .and_then(|m| types.iter().position(|t| *t == m.module_type))
                .unwrap_or(0),
            _ => 0,
        };
        self.list.reset(types, current);
        self.list.draw(ctx);
    }

    menu_input!();
}

// ─── Module select menu ─────────────────────────────────────────────

/// Modules of the current rack in display order
#[derive(Default)]
pub struct ModuleSelectMenu {
    list: MenuList,
    ids: Vec<String>,
}

impl ModuleSelectMenu {
    pub fn new() -> Self {
        Self::default()
    }

    fn select(&mut self, ctx: &mut ModeContext, idx: usize) -> Transition {
        if let Some(id) = self.ids.get(idx).cloned() {
            ctx.set_current_module(&id);
        }
        Transition::Switch(ModeId::Parameter)
    }
}

impl ModeHandler for ModuleSelectMenu {
    fn activate(&mut self, ctx: &mut ModeContext) {
        let (ids, labels): (Vec<String>, Vec<String>) = match ctx.session.current_rack() {
            Some(rack) => ctx
                .session
                .module_order
                .ordered(&*ctx.model, rack)
                .into_iter()
                .map(|m| (m.id.clone(), format!("{} : {}", m.id, m.display_name)))
                .unzip(),
            None => (Vec::new(), Vec::new()),
        };
        let current = ctx
            .session
            .current_module()
            .and_then(|cur| ids.iter().position(|id| id == cur))
            .unwrap_or(0);
        self.ids = ids;
        self.list.reset(labels, current);
        self.list.draw(ctx);
    }

    menu_input!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelConfig;
    use crate::device::RecordingDevice;
    use crate::display::Panel;
    use crate::model::{MemoryModel, Module, Parameter, Rack, RackModel};
    use crate::session::{ModuleOrder, Session};

    struct Fixture {
        model: MemoryModel,
        panel: Panel,
        session: Session,
        config: PanelConfig,
        dev: RecordingDevice,
    }

    impl Fixture {
        fn new() -> Self {
            let rack = Rack::new("r", "Rack")
                .with_module(
                    Module::new("a", "Alpha", "osc")
                        .with_param(Parameter::float("x", "X", 0.0, 1.0, 0.25)),
                )
                .with_module(Module::new("b", "Beta", "filter"))
                .with_module(Module::new("c", "Gamma", "delay"));
            let model = MemoryModel::with_racks(vec![rack])
                .with_module_types(&["osc", "filter", "delay"]);
            let dev = RecordingDevice::default();
            let mut session = Session::new();
            session.cursor.rack = Some("r".into());
            session.cursor.module = Some("a".into());
            Self {
                model,
                panel: Panel::new(Box::new(dev.clone())),
                session,
                config: PanelConfig::default(),
                dev,
            }
        }

        fn ctx(&mut self) -> ModeContext<'_> {
            ModeContext {
                model: &mut self.model,
                panel: &mut self.panel,
                session: &mut self.session,
                config: &self.config,
            }
        }
    }

    #[test]
    fn test_list_scrolls_with_selection() {
        let mut list = MenuList::new();
        list.reset((0..8).map(|i| format!("item {}", i)).collect(), 0);
        list.move_by(6);
        assert_eq!(list.selected(), 6);
        assert_eq!(list.top, 2);
        list.move_by(-5);
        assert_eq!(list.top, 1);
        list.move_by(100);
        assert_eq!(list.selected(), 7);
        list.move_by(-100);
        assert_eq!(list.selected(), 0);
        assert_eq!(list.top, 0);
    }

    #[test]
    fn test_main_menu_draws_and_navigates() {
        let mut fx = Fixture::new();
        let mut menu = MainMenu::new();
        menu.activate(&mut fx.ctx());
        assert_eq!(fx.dev.line(0), "Presets");
        assert_eq!(fx.dev.line(4), "Mod Learn");
        assert!(fx.dev.is_inverted(0));

        menu.on_encoder(&mut fx.ctx(), 0, 1);
        assert!(fx.dev.is_inverted(1));
        assert!(!fx.dev.is_inverted(0));

        assert_eq!(menu.on_button(&mut fx.ctx(), 1, 1), Transition::Stay);
        assert_eq!(
            menu.on_button(&mut fx.ctx(), 1, 0),
            Transition::Switch(ModeId::ModuleMenu)
        );
    }

    #[test]
    fn test_main_menu_cancel() {
        let mut fx = Fixture::new();
        let mut menu = MainMenu::new();
        menu.activate(&mut fx.ctx());
        assert_eq!(
            menu.on_button(&mut fx.ctx(), 0, 0),
            Transition::Switch(ModeId::Parameter)
        );
    }

    #[test]
    fn test_main_menu_toggles_learn() {
        let mut fx = Fixture::new();
        let mut menu = MainMenu::new();
        menu.activate(&mut fx.ctx());
        menu.on_encoder(&mut fx.ctx(), 0, 3);
        assert_eq!(
            menu.on_button(&mut fx.ctx(), 2, 0),
            Transition::Switch(ModeId::Parameter)
        );
        assert!(fx.model.midi_learn());
    }

    #[test]
    fn test_menu_times_out() {
        let mut fx = Fixture::new();
        fx.config.menu_timeout_ms = 0;
        let mut menu = MainMenu::new();
        menu.activate(&mut fx.ctx());
        assert_eq!(menu.poll(&mut fx.ctx()), Transition::Switch(ModeId::Parameter));

        fx.config.menu_timeout_ms = 60_000;
        menu.activate(&mut fx.ctx());
        assert_eq!(menu.poll(&mut fx.ctx()), Transition::Stay);
    }

    #[test]
    fn test_preset_menu_save_then_load() {
        let mut fx = Fixture::new();
        let mut menu = PresetMenu::new();
        menu.activate(&mut fx.ctx());
        assert_eq!(fx.dev.line(0), "Save");
        menu.on_button(&mut fx.ctx(), 1, 0);
        assert_eq!(fx.model.presets("r"), vec!["preset-1".to_string()]);

        fx.model
            .change_param(ChangeSource::Local, "r", "a", "x", 0.75);
        menu.activate(&mut fx.ctx());
        // the current preset is preselected
        assert_eq!(fx.dev.line(1), "preset-1");
        assert!(fx.dev.is_inverted(1));
        menu.on_button(&mut fx.ctx(), 1, 0);
        assert_eq!(fx.model.param("r", "a", "x").unwrap().current, 0.25);
    }

    #[test]
    fn test_module_menu_loads_type() {
        let mut fx = Fixture::new();
        let mut menu = ModuleMenu::new();
        menu.activate(&mut fx.ctx());
        assert!(fx.dev.is_inverted(0));
        menu.on_encoder(&mut fx.ctx(), 0, 2);
        menu.on_button(&mut fx.ctx(), 1, 0);
        assert_eq!(fx.model.module("r", "a").unwrap().module_type, "delay");
    }

    #[test]
    fn test_module_select_uses_display_order() {
        let mut fx = Fixture::new();
        fx.session.module_order = ModuleOrder::parse("c a");
        let mut menu = ModuleSelectMenu::new();
        menu.activate(&mut fx.ctx());
        assert_eq!(fx.dev.line(0), "c : Gamma");
        assert_eq!(fx.dev.line(1), "a : Alpha");
        assert_eq!(fx.dev.line(2), "b : Beta");
        assert!(fx.dev.is_inverted(1));

        fx.panel.set_yield(true);
        menu.on_encoder(&mut fx.ctx(), 0, -1);
        assert_eq!(
            menu.on_button(&mut fx.ctx(), 2, 0),
            Transition::Switch(ModeId::Parameter)
        );
        assert_eq!(fx.session.current_module(), Some("c"));
        assert!(!fx.panel.is_yielded());
        assert_eq!(fx.model.active_module("r"), Some("c"));
    }

    #[test]
    fn test_empty_menu_select_returns() {
        let mut fx = Fixture::new();
        fx.model = MemoryModel::new();
        let mut menu = ModuleMenu::new();
        menu.activate(&mut fx.ctx());
        assert_eq!(
            menu.on_button(&mut fx.ctx(), 1, 0),
            Transition::Switch(ModeId::Parameter)
        );
    }
}
