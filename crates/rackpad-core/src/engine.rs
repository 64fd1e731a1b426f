//! Control loop
//!
//! The [`Engine`] owns everything that runs on the control thread: the
//! consumer side of the transfer queue, the mode machine, the session
//! cursor, the panel and the data model. Only the listener thread runs
//! concurrently, and the transfer queue is the only thing it shares.
//!
//! Each [`tick`](Engine::tick):
//!
//! 1. drains every pending frame through the dispatcher
//! 2. increments the tick counter
//! 3. every `poll_divisor` ticks, polls the current mode and the device
//! 4. sleeps for `poll_sleep_us` if non-zero
//!
//! Model notifications produced by any step are pumped to the current mode
//! before the step returns.

use crate::config::PanelConfig;
use crate::device::{Device, DeviceInput};
use crate::display::Panel;
use crate::error::EngineError;
use crate::frame::Frame;
use crate::listener::OscListener;
use crate::model::{ModelEvent, RackModel};
use crate::modes::{ModeContext, ModeHandler, ModeId, ModeMachine, Transition};
use crate::protocol::{decode_packet, parse_message, RemoteCommand};
use crate::session::{ModuleOrder, Session, SessionCursor};
use std::sync::atomic::{AtomicBool, Ordering};

/// Rack resource holding the module display order
pub const MODULE_ORDER_RESOURCE: &str = "moduleorder";

/// Rounds of notifications pumped per step before giving up on a feedback loop
const MAX_EVENT_ROUNDS: usize = 16;

pub struct Engine {
    listener: OscListener,
    modes: ModeMachine,
    session: Session,
    panel: Panel,
    model: Box<dyn RackModel>,
    config: PanelConfig,
    tick_count: u64,
}

impl Engine {
    /// Build the engine around a device and a data model
    ///
    /// The config is validated against the device's encoder count; problems
    /// are logged and replaced with safe values. Fails only if the mode
    /// registry cannot be built.
    pub fn new(
        config: PanelConfig,
        device: Box<dyn Device>,
        model: Box<dyn RackModel>,
    ) -> Result<Self, EngineError> {
        let config = config.validated(device.num_encoders());
        Ok(Self {
            listener: OscListener::new(),
            modes: ModeMachine::new()?,
            session: Session::new(),
            panel: Panel::new(device),
            model,
            config,
            tick_count: 0,
        })
    }

    /// Enter the parameter view and start listening on the configured port
    ///
    /// Returns whether listening started; the engine is usable either way.
    pub fn init(&mut self) -> bool {
        if self.listener.is_listening() {
            log::debug!("[Engine] init while active, stopping first");
            self.deinit();
        }
        self.tick_count = 0;
        self.change_mode(ModeId::Parameter);
        self.listen(self.config.listen_port)
    }

    /// Stop listening and discard any undispatched frames
    ///
    /// Idempotent; safe to call on an engine that never started.
    pub fn deinit(&mut self) {
        let discarded = self.listener.stop();
        if discarded > 0 {
            log::info!("[Engine] discarded {} undispatched frame(s)", discarded);
        }
    }

    pub fn stop(&mut self) {
        self.deinit();
    }

    /// (Re)start the listener on `port`
    ///
    /// A bind failure is logged and reported as `false`; the control loop
    /// keeps running without remote input.
    pub fn listen(&mut self, port: u16) -> bool {
        match self.listener.start(port) {
            Ok(bound) => {
                log::info!("[Engine] listening for remote commands on port {}", bound);
                true
            }
            Err(e) => {
                log::warn!("[Engine] remote commands unavailable: {}", e);
                false
            }
        }
    }

    // ─── Control loop ───────────────────────────────────────────────

    /// One iteration of the control loop
    pub fn tick(&mut self) {
        while let Some(frame) = self.listener.try_dequeue() {
            self.dispatch_frame(&frame);
        }

        self.tick_count += 1;
        if self.tick_count % u64::from(self.config.poll_divisor) == 0 {
            self.route(|mode, ctx| mode.poll(ctx));
            for input in self.panel.process() {
                match input {
                    DeviceInput::Button { id, value } => self.on_button(id, value),
                    DeviceInput::Encoder { id, delta } => self.on_encoder(id, delta),
                }
            }
        }

        if self.config.poll_sleep_us > 0 {
            std::thread::sleep(self.config.poll_sleep());
        }
    }

    /// Tick until `running` is cleared
    pub fn run(&mut self, running: &AtomicBool) {
        log::info!("[Engine] control loop started");
        while running.load(Ordering::Relaxed) {
            self.tick();
        }
        log::info!("[Engine] control loop stopped after {} ticks", self.tick_count);
    }

    // ─── Dispatch ───────────────────────────────────────────────────

    /// Decode a frame and execute every command in it
    ///
    /// Protocol faults are logged and the offending message skipped.
    pub fn dispatch_frame(&mut self, frame: &Frame) {
        let messages = match decode_packet(frame.bytes()) {
            Ok(messages) => messages,
            Err(e) => {
                log::warn!("[Engine] frame from {} discarded: {}", frame.origin(), e);
                return;
            }
        };
        for msg in &messages {
            match parse_message(msg) {
                Ok(Some(cmd)) => self.execute(cmd),
                Ok(None) => {}
                Err(e) => log::warn!("[Engine] message from {} discarded: {}", frame.origin(), e),
            }
        }
    }

    /// Apply one remote command to the current mode
    pub fn execute(&mut self, cmd: RemoteCommand) {
        log::trace!("[Engine] {:?}", cmd);
        match cmd {
            RemoteCommand::NextPage => self.next_page(),
            RemoteCommand::PrevPage => self.prev_page(),
            RemoteCommand::NextModule => self.next_module(),
            RemoteCommand::PrevModule => self.prev_module(),
            RemoteCommand::ChangeParam {
                index,
                value,
                steps,
            } => self.change_param(index, value, steps),
            RemoteCommand::AuxActive(active) => {
                self.panel.set_aux_active(active);
                self.redraw();
            }
            RemoteCommand::AuxLed(led) => {
                self.panel.set_aux_led(led);
                self.redraw();
            }
            RemoteCommand::AuxLine(line) => {
                self.panel.set_aux_line(line);
                self.redraw();
            }
            RemoteCommand::YieldDisplay(yielded) => self.panel.set_yield(yielded),
        }
    }

    // ─── Navigation and input ───────────────────────────────────────

    pub fn next_page(&mut self) {
        self.panel.set_yield(false);
        self.route(|mode, ctx| {
            mode.next_page(ctx);
            Transition::Stay
        });
    }

    pub fn prev_page(&mut self) {
        self.panel.set_yield(false);
        self.route(|mode, ctx| {
            mode.prev_page(ctx);
            Transition::Stay
        });
    }

    pub fn next_module(&mut self) {
        self.route(|_, ctx| {
            ctx.next_module();
            Transition::Stay
        });
    }

    pub fn prev_module(&mut self) {
        self.route(|_, ctx| {
            ctx.prev_module();
            Transition::Stay
        });
    }

    /// Select a module directly
    pub fn set_current_module(&mut self, module_id: &str) {
        self.route(|_, ctx| {
            ctx.set_current_module(module_id);
            Transition::Stay
        });
    }

    pub fn change_param(&mut self, index: usize, rel_value: f32, steps: f32) {
        self.route(|mode, ctx| {
            mode.change_param(ctx, index, rel_value, steps);
            Transition::Stay
        });
    }

    /// Device button callback
    pub fn on_button(&mut self, id: usize, value: i32) {
        self.route(|mode, ctx| mode.on_button(ctx, id, value));
    }

    /// Device encoder callback
    pub fn on_encoder(&mut self, id: usize, delta: i32) {
        self.route(|mode, ctx| mode.on_encoder(ctx, id, delta));
    }

    /// Switch to `mode` and activate it
    pub fn change_mode(&mut self, mode: ModeId) {
        self.route(|_, _| Transition::Switch(mode));
    }

    fn redraw(&mut self) {
        self.route(|mode, ctx| {
            mode.display(ctx);
            Transition::Stay
        });
    }

    // ─── Model notifications ────────────────────────────────────────

    /// Deliver one model notification
    ///
    /// Session-level bookkeeping happens here; the notification is then
    /// forwarded to the current mode only.
    pub fn on_model_event(&mut self, event: ModelEvent) {
        let current_rack = self.session.cursor.rack.clone();
        let is_current_rack =
            |rack: &str| current_rack.as_deref().map_or(true, |current| current == rack);

        match &event {
            ModelEvent::Module { rack, module, .. } if self.session.cursor.module.is_none() => {
                log::info!("[Engine] selecting {}/{}", rack, module);
                self.session.cursor.rack = Some(rack.clone());
                let module = module.clone();
                self.set_current_module(&module);
            }
            ModelEvent::Resource {
                rack,
                resource,
                value,
                ..
            } if resource == MODULE_ORDER_RESOURCE && is_current_rack(rack.as_str()) => {
                self.session.module_order = ModuleOrder::parse(value);
                log::debug!("[Engine] module order: {:?}", self.session.module_order.ids());
            }
            ModelEvent::DeleteRack { rack, .. }
                if self.session.cursor.rack.as_deref() == Some(rack.as_str()) =>
            {
                log::info!("[Engine] current rack {} deleted", rack);
                self.session.cursor = SessionCursor::default();
                self.session.module_order = ModuleOrder::default();
            }
            ModelEvent::MidiLearn { active, .. } => self.session.set_midi_learn(*active),
            ModelEvent::ModulationLearn { active, .. } => {
                self.session.set_modulation_learn(*active)
            }
            _ => {}
        }

        self.route_event(&event);
    }

    fn route_event(&mut self, event: &ModelEvent) {
        let mut ctx = ModeContext {
            model: self.model.as_mut(),
            panel: &mut self.panel,
            session: &mut self.session,
            config: &self.config,
        };
        let transition = self.modes.active().on_model_event(&mut ctx, event);
        self.modes.apply(transition, &mut ctx);
    }

    /// Deliver queued model notifications until the model goes quiet
    fn pump_model_events(&mut self) {
        for _ in 0..MAX_EVENT_ROUNDS {
            let events = self.model.drain_events();
            if events.is_empty() {
                return;
            }
            for event in events {
                self.on_model_event(event);
            }
        }
        log::warn!("[Engine] model notifications still pending after {} rounds", MAX_EVENT_ROUNDS);
    }

    /// Run `f` against the current mode, apply its transition, pump notifications
    fn route<F>(&mut self, f: F)
    where
        F: FnOnce(&mut dyn ModeHandler, &mut ModeContext) -> Transition,
    {
        {
            let mut ctx = ModeContext {
                model: self.model.as_mut(),
                panel: &mut self.panel,
                session: &mut self.session,
                config: &self.config,
            };
            let transition = f(self.modes.active(), &mut ctx);
            self.modes.apply(transition, &mut ctx);
        }
        self.pump_model_events();
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn current_mode(&self) -> ModeId {
        self.modes.current()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn model(&self) -> &dyn RackModel {
        self.model.as_ref()
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_listening()
    }

    /// Bound port, 0 when not listening
    pub fn listen_port(&self) -> u16 {
        self.listener.port()
    }

    /// Frames dropped because the transfer queue was full
    pub fn dropped_frames(&self) -> u64 {
        self.listener.dropped_frames()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.deinit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;
    use crate::model::{ChangeSource, MemoryModel, Module, Page, Parameter, Rack};
    use rosc::{OscMessage, OscPacket, OscType};
    use std::net::SocketAddr;

    fn rack() -> Rack {
        let module = |id: &str, name: &str| {
            Module::new(id, name, "osc")
                .with_param(Parameter::float("a", "A", 0.0, 1.0, 0.5))
                .with_param(Parameter::float("b", "B", 0.0, 1.0, 0.5))
                .with_param(Parameter::float("c", "C", 0.0, 1.0, 0.5))
                .with_param(Parameter::float("d", "D", 0.0, 1.0, 0.5))
                .with_page(Page::new("p1", "One", &["a", "b", "c", "d"]))
                .with_page(Page::new("p2", "Two", &["d"]))
        };
        Rack::new("r", "Rack")
            .with_module(module("modA", "Alpha"))
            .with_module(module("modB", "Beta"))
            .with_module(module("modC", "Gamma"))
    }

    fn engine() -> (Engine, RecordingDevice) {
        let dev = RecordingDevice::default();
        let mut model = MemoryModel::with_racks(vec![rack()]).with_module_types(&["osc", "lfo"]);
        model.announce_all(ChangeSource::Remote);
        let config = PanelConfig {
            poll_sleep_us: 0,
            ..PanelConfig::default()
        };
        let mut engine = Engine::new(config, Box::new(dev.clone()), Box::new(model)).unwrap();
        engine.change_mode(ModeId::Parameter);
        (engine, dev)
    }

    fn frame(addr: &str, args: Vec<OscType>) -> Frame {
        let bytes = rosc::encoder::encode(&OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        }))
        .unwrap();
        Frame::new(&bytes, SocketAddr::from(([127, 0, 0, 1], 9000)))
    }

    fn value(engine: &Engine, module: &str, param: &str) -> f32 {
        engine.model().param("r", module, param).unwrap().current
    }

    #[test]
    fn test_bootstrap_selects_first_module() {
        let (engine, _) = engine();
        assert_eq!(engine.session().current_rack(), Some("r"));
        assert_eq!(engine.session().current_module(), Some("modA"));
        assert_eq!(engine.session().current_page(), Some("p1"));
    }

    #[test]
    fn test_param_command_changes_value() {
        let (mut engine, _) = engine();
        engine.dispatch_frame(&frame("/Param3", vec![OscType::Float(-1.0)]));
        let expected = 0.5 + (-1.0f32 / 8000.0);
        assert!((value(&engine, "modA", "c") - expected).abs() < 1e-7);
    }

    #[test]
    fn test_encoder_delta_command() {
        let (mut engine, _) = engine();
        engine.dispatch_frame(&frame(
            "/monome/enc/delta",
            vec![OscType::Int(0), OscType::Int(6)],
        ));
        let expected = 0.5 + 4.0f32 / 2048.0;
        assert!((value(&engine, "modA", "a") - expected).abs() < 1e-7);
    }

    #[test]
    fn test_module_navigation_and_order() {
        let (mut engine, _) = engine();
        engine.dispatch_frame(&frame("/NextModule", vec![OscType::Int(1)]));
        assert_eq!(engine.session().current_module(), Some("modB"));
        engine.dispatch_frame(&frame("/NextModule", vec![OscType::Int(0)]));
        assert_eq!(engine.session().current_module(), Some("modB"));

        engine.on_model_event(ModelEvent::Resource {
            source: ChangeSource::Remote,
            rack: "r".into(),
            resource: MODULE_ORDER_RESOURCE.into(),
            value: "modC modB".into(),
        });
        engine.dispatch_frame(&frame("/PrevModule", vec![OscType::Float(1.0)]));
        assert_eq!(engine.session().current_module(), Some("modC"));
        assert_eq!(engine.session().current_page(), Some("p1"));
    }

    #[test]
    fn test_page_navigation_clears_yield() {
        let (mut engine, dev) = engine();
        engine.dispatch_frame(&frame("/YieldDisplay", vec![OscType::Int(1)]));
        assert!(engine.panel().is_yielded());

        dev.clear_ops();
        engine.dispatch_frame(&frame("/AuxLed", vec![OscType::Int(4)]));
        assert!(dev.ops().is_empty());

        engine.dispatch_frame(&frame("/NextPage", vec![OscType::Float(0.8)]));
        assert!(!engine.panel().is_yielded());
        assert_eq!(engine.session().current_page(), Some("p2"));
        assert!(!dev.ops().is_empty());
    }

    #[test]
    fn test_aux_line_redraws_status() {
        let (mut engine, dev) = engine();
        dev.clear_ops();
        engine.dispatch_frame(&frame(
            "/AuxLine",
            vec![OscType::String("hello".into()), OscType::String("rack".into())],
        ));
        assert!(dev.ops().iter().any(|op| matches!(
            op,
            crate::device::DrawOp::Text { text, .. } if text == "- |0| hello rack"
        )));
    }

    #[test]
    fn test_deleting_current_rack_resets_cursor() {
        let (mut engine, _) = engine();
        engine.on_model_event(ModelEvent::Resource {
            source: ChangeSource::Remote,
            rack: "r".into(),
            resource: MODULE_ORDER_RESOURCE.into(),
            value: "modC modA".into(),
        });

        // Another rack going away leaves the cursor alone
        engine.on_model_event(ModelEvent::DeleteRack {
            source: ChangeSource::Remote,
            rack: "other".into(),
        });
        assert_eq!(engine.session().current_module(), Some("modA"));

        engine.on_model_event(ModelEvent::DeleteRack {
            source: ChangeSource::Remote,
            rack: "r".into(),
        });
        assert_eq!(engine.session().cursor, SessionCursor::default());
        assert!(engine.session().module_order.ids().is_empty());

        // The next module announcement bootstraps the session again
        engine.on_model_event(ModelEvent::Module {
            source: ChangeSource::Remote,
            rack: "r".into(),
            module: "modB".into(),
        });
        assert_eq!(engine.session().current_rack(), Some("r"));
        assert_eq!(engine.session().current_module(), Some("modB"));
        assert_eq!(engine.session().current_page(), Some("p1"));
    }

    #[test]
    fn test_bad_frames_are_skipped() {
        let (mut engine, _) = engine();
        engine.dispatch_frame(&Frame::new(b"garbage", SocketAddr::from(([127, 0, 0, 1], 1))));
        engine.dispatch_frame(&frame("/Param1", vec![OscType::String("x".into())]));
        engine.dispatch_frame(&frame("/Unknown", vec![]));
        engine.dispatch_frame(&frame("/Param1", vec![OscType::Float(80.0)]));
        assert!((value(&engine, "modA", "a") - 0.51).abs() < 1e-6);
    }

    #[test]
    fn test_menu_round_trip_keeps_cursor() {
        let (mut engine, dev) = engine();
        engine.next_page();
        let cursor = engine.session().cursor.clone();

        engine.on_button(0, 1);
        engine.on_button(0, 0);
        assert_eq!(engine.current_mode(), ModeId::MainMenu);

        let clears = dev.clear_count();
        engine.on_button(0, 0);
        assert_eq!(engine.current_mode(), ModeId::Parameter);
        assert_eq!(dev.clear_count(), clears + 1);
        assert_eq!(engine.session().cursor, cursor);
    }

    #[test]
    fn test_device_input_is_polled_at_divisor() {
        let dev = RecordingDevice::default();
        let config = PanelConfig {
            poll_divisor: 3,
            poll_sleep_us: 0,
            ..PanelConfig::default()
        };
        let mut engine =
            Engine::new(config, Box::new(dev.clone()), Box::new(MemoryModel::new())).unwrap();
        dev.push_input(DeviceInput::Button { id: 0, value: 0 });

        engine.tick();
        engine.tick();
        assert_eq!(dev.process_calls(), 0);
        assert_eq!(engine.current_mode(), ModeId::Parameter);

        engine.tick();
        assert_eq!(dev.process_calls(), 1);
        assert_eq!(engine.current_mode(), ModeId::MainMenu);
        assert_eq!(engine.tick_count(), 3);
    }

    #[test]
    fn test_learn_toggle_via_menu() {
        let (mut engine, _) = engine();
        engine.change_mode(ModeId::MainMenu);
        engine.on_encoder(0, 4);
        engine.on_button(1, 0);
        assert_eq!(engine.current_mode(), ModeId::Parameter);
        assert!(engine.session().modulation_learn);

        engine.change_mode(ModeId::MainMenu);
        engine.on_encoder(0, 3);
        engine.on_button(1, 0);
        assert!(engine.session().midi_learn);
        assert!(!engine.session().modulation_learn);
    }

    #[test]
    fn test_deinit_without_start() {
        let (mut engine, _) = engine();
        assert!(!engine.is_listening());
        engine.deinit();
        engine.stop();
        assert_eq!(engine.listen_port(), 0);
    }

    #[test]
    fn test_invalid_encoder_map_falls_back() {
        let config = PanelConfig {
            encoder_map: vec![0, 9],
            poll_divisor: 0,
            ..PanelConfig::default()
        };
        let engine = Engine::new(
            config,
            Box::new(RecordingDevice::new(3)),
            Box::new(MemoryModel::new()),
        )
        .unwrap();
        assert_eq!(engine.config().encoder_map, vec![0, 1, 2]);
        assert_eq!(engine.config().poll_divisor, 1);
    }
}
