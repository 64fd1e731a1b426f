//! Command ingestion and mode dispatch for the rackpad controller front-end
//!
//! This crate provides:
//! - A UDP listener thread receiving OSC remote commands
//! - A lock-free SPSC transfer queue between the listener and the control loop
//! - Decoding of the remote command protocol
//! - The mode state machine (parameter view and menus)
//! - The control loop driving the display/encoder device
//!
//! # Architecture
//!
//! ```text
//! UDP socket → listener thread → rtrb queue → Engine::tick → current mode
//!                                                               ↓      ↓
//!                                                            Device  RackModel
//! ```
//!
//! Everything right of the queue runs on the control thread; the queue is
//! the only state shared with the listener thread.

pub mod config;
pub mod device;
pub mod display;
mod engine;
pub mod error;
mod frame;
mod listener;
pub mod model;
pub mod modes;
pub mod protocol;
mod queue;
pub mod session;

pub use config::{default_config_path, load_config, save_config, PanelConfig};
pub use device::{Device, DeviceInput, RecordingDevice};
pub use display::Panel;
pub use engine::{Engine, MODULE_ORDER_RESOURCE};
pub use error::{ConfigError, EngineError, ListenerError, ProtocolError};
pub use frame::{Frame, MAX_FRAME_BYTES};
pub use listener::OscListener;
pub use model::{ChangeSource, MemoryModel, ModelEvent, RackModel};
pub use modes::ModeId;
pub use protocol::RemoteCommand;
pub use queue::{
    frame_queue, frame_queue_with_capacity, FrameConsumer, FrameProducer, MAX_IN_FLIGHT,
};
pub use session::{ModuleOrder, Session, SessionCursor};
