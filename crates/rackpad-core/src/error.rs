//! Error types for the rackpad core
//!
//! None of these ever stop the control loop. Listener errors surface as a
//! `false` from [`Engine::listen`](crate::Engine::listen), protocol errors are
//! logged and the frame discarded, config errors are logged and replaced with
//! safe values. Only [`EngineError`] aborts initialization.

use std::io;

/// Failure to start listening for remote commands
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Failed to configure socket: {0}")]
    Socket(#[source] io::Error),

    #[error("Failed to spawn listener thread: {0}")]
    Spawn(#[source] io::Error),
}

/// A frame that could not be turned into a command
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Undecodable OSC packet: {0}")]
    Decode(String),

    #[error("{address}: missing argument {index}")]
    MissingArgument { address: String, index: usize },

    #[error("{address}: argument {index} should be {expected}")]
    WrongType {
        address: String,
        index: usize,
        expected: &'static str,
    },
}

/// Problems with the panel configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("poll_divisor must be at least 1")]
    ZeroPollDivisor,

    #[error("encoder_map has {actual} entries but the device has {expected} encoders")]
    EncoderMapLength { expected: usize, actual: usize },

    #[error("encoder_map entry {entry} is out of range (max {max})")]
    EncoderMapOutOfRange { entry: usize, max: usize },

    #[error("encoder_map maps more than one encoder to parameter {0}")]
    EncoderMapDuplicate(usize),
}

/// Failure to bring the engine up
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Mode registry is missing the {0:?} mode")]
    MissingMode(crate::modes::ModeId),
}
