//! Mode state machine
//!
//! Exactly one mode owns the display and the controls at any time. The set
//! of modes is closed, so they are variants of [`Mode`]; the behaviour they
//! share lives in the [`ModeHandler`] trait.
//!
//! Handlers never switch modes themselves. Input handlers return a
//! [`Transition`] and the [`ModeMachine`] applies it, calling `activate()` on
//! the target, which performs a full redraw. Any mode may request any other.
//!
//! ```text
//!            button 0 released
//! Parameter ─────────────────────► MainMenu ──► PresetMenu
//!     ▲                               │    └──► ModuleMenu
//!     │   select / cancel / timeout   │    └──► ModuleSelectMenu
//!     └───────────────────────────────┴─────────────┘
//! ```

mod menu;
mod param;

pub use menu::{MainMenu, MenuList, ModuleMenu, ModuleSelectMenu, PresetMenu};
pub use param::{ParamMode, ENCODER_PARAM_STEPS};

use crate::config::PanelConfig;
use crate::display::Panel;
use crate::error::EngineError;
use crate::model::{ChangeSource, EntityId, ModelEvent, RackModel};
use crate::session::Session;

/// Identity of a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeId {
    Parameter,
    MainMenu,
    PresetMenu,
    ModuleMenu,
    ModuleSelectMenu,
}

impl ModeId {
    pub const ALL: [ModeId; 5] = [
        ModeId::Parameter,
        ModeId::MainMenu,
        ModeId::PresetMenu,
        ModeId::ModuleMenu,
        ModeId::ModuleSelectMenu,
    ];
}

/// Outcome of handling an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Switch(ModeId),
}

/// Everything a mode may touch while handling an event
pub struct ModeContext<'a> {
    pub model: &'a mut dyn RackModel,
    pub panel: &'a mut Panel,
    pub session: &'a mut Session,
    pub config: &'a PanelConfig,
}

impl ModeContext<'_> {
    /// Make `module_id` the current module and tell the model about it
    pub fn set_current_module(&mut self, module_id: &str) {
        self.panel.set_yield(false);
        self.session.cursor.module = Some(module_id.to_string());
        if let Some(rack) = self.session.cursor.rack.clone() {
            self.model
                .set_active_module(ChangeSource::Local, &rack, module_id);
        }
    }

    pub fn set_current_page(&mut self, page_id: Option<EntityId>) {
        self.session.cursor.page = page_id;
    }

    /// Step to the next module in display order; no-op at the end
    pub fn next_module(&mut self) {
        self.panel.set_yield(false);
        if let Some(id) = self.session.next_module_id(&*self.model) {
            self.set_current_module(&id);
        }
    }

    /// Step to the previous module in display order; no-op at the start
    pub fn prev_module(&mut self) {
        self.panel.set_yield(false);
        if let Some(id) = self.session.prev_module_id(&*self.model) {
            self.set_current_module(&id);
        }
    }
}

/// Capabilities every mode implements
///
/// Only `activate` and `display` are required; the rest default to doing
/// nothing so each mode handles just what it cares about.
pub trait ModeHandler {
    /// Called on entry; must redraw the whole screen
    fn activate(&mut self, ctx: &mut ModeContext);

    /// Full redraw of this mode's screen
    fn display(&mut self, ctx: &mut ModeContext);

    /// Periodic housekeeping, called every `poll_divisor` ticks
    fn poll(&mut self, _ctx: &mut ModeContext) -> Transition {
        Transition::Stay
    }

    fn on_button(&mut self, _ctx: &mut ModeContext, _id: usize, _value: i32) -> Transition {
        Transition::Stay
    }

    fn on_encoder(&mut self, _ctx: &mut ModeContext, _id: usize, _delta: i32) -> Transition {
        Transition::Stay
    }

    fn next_page(&mut self, _ctx: &mut ModeContext) {}

    fn prev_page(&mut self, _ctx: &mut ModeContext) {}

    /// Move parameter slot `index` of the current page by `rel_value / steps`
    fn change_param(
        &mut self,
        _ctx: &mut ModeContext,
        _index: usize,
        _rel_value: f32,
        _steps: f32,
    ) {
    }

    /// Data-model notification
    fn on_model_event(&mut self, _ctx: &mut ModeContext, _event: &ModelEvent) -> Transition {
        Transition::Stay
    }
}

/// The closed set of modes
pub enum Mode {
    Parameter(ParamMode),
    MainMenu(MainMenu),
    PresetMenu(PresetMenu),
    ModuleMenu(ModuleMenu),
    ModuleSelectMenu(ModuleSelectMenu),
}

impl Mode {
    pub fn id(&self) -> ModeId {
        match self {
            Mode::Parameter(_) => ModeId::Parameter,
            Mode::MainMenu(_) => ModeId::MainMenu,
            Mode::PresetMenu(_) => ModeId::PresetMenu,
            Mode::ModuleMenu(_) => ModeId::ModuleMenu,
            Mode::ModuleSelectMenu(_) => ModeId::ModuleSelectMenu,
        }
    }

    pub fn handler(&mut self) -> &mut dyn ModeHandler {
        match self {
            Mode::Parameter(m) => m,
            Mode::MainMenu(m) => m,
            Mode::PresetMenu(m) => m,
            Mode::ModuleMenu(m) => m,
            Mode::ModuleSelectMenu(m) => m,
        }
    }
}

/// Mode registry plus the current mode
///
/// The registry is filled once at construction and never changes.
pub struct ModeMachine {
    modes: Vec<Mode>,
    current: ModeId,
}

impl ModeMachine {
    /// Registry holding one instance of every mode, starting in `Parameter`
    pub fn new() -> Result<Self, EngineError> {
        Self::with_modes(vec![
            Mode::Parameter(ParamMode::new()),
            Mode::MainMenu(MainMenu::new()),
            Mode::PresetMenu(PresetMenu::new()),
            Mode::ModuleMenu(ModuleMenu::new()),
            Mode::ModuleSelectMenu(ModuleSelectMenu::new()),
        ])
    }

    /// Build from an explicit registry; every [`ModeId`] must be present
    pub fn with_modes(modes: Vec<Mode>) -> Result<Self, EngineError> {
        for id in ModeId::ALL {
            if !modes.iter().any(|m| m.id() == id) {
                return Err(EngineError::MissingMode(id));
            }
        }
        Ok(Self {
            modes,
            current: ModeId::Parameter,
        })
    }

    pub fn current(&self) -> ModeId {
        self.current
    }

    /// Handler of the current mode
    pub fn active(&mut self) -> &mut dyn ModeHandler {
        let current = self.current;
        self.mode_mut(current)
    }

    fn mode_mut(&mut self, id: ModeId) -> &mut dyn ModeHandler {
        // every id is present, see with_modes
        let idx = self.modes.iter().position(|m| m.id() == id).unwrap_or(0);
        self.modes[idx].handler()
    }

    /// Make `to` current and activate it
    pub fn transition(&mut self, to: ModeId, ctx: &mut ModeContext) {
        if self.current != to {
            log::debug!("[Engine] mode {:?} -> {:?}", self.current, to);
        }
        self.current = to;
        self.mode_mut(to).activate(ctx);
    }

    /// Apply a handler's requested transition
    pub fn apply(&mut self, transition: Transition, ctx: &mut ModeContext) {
        if let Transition::Switch(to) = transition {
            self.transition(to, ctx);
        }
    }
}
