//! Console device
//!
//! Stands in for the panel hardware when running headless. Drawing is
//! logged; input is typed on stdin:
//!
//! ```text
//! b <id> <value>    button (1 = press, 0 = release)
//! e <id> <delta>    encoder
//! q                 quit
//! ```
//!
//! Stdin is read on its own thread and forwarded over a flume channel, so
//! `process()` never blocks the control loop.

use flume::{Receiver, Sender};
use rackpad_core::{Device, DeviceInput};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

pub struct ConsoleDevice {
    input_rx: Receiver<DeviceInput>,
    lines: Vec<String>,
    encoders: usize,
}

impl ConsoleDevice {
    /// Create the device and start the stdin reader
    ///
    /// Typing `q` clears `running`.
    pub fn spawn(running: Arc<AtomicBool>) -> anyhow::Result<Self> {
        let (tx, rx) = flume::unbounded();
        thread::Builder::new()
            .name("console-input".to_string())
            .spawn(move || read_stdin(tx, running))?;
        Ok(Self {
            input_rx: rx,
            lines: Vec::new(),
            encoders: 4,
        })
    }
}

fn read_stdin(tx: Sender<DeviceInput>, running: Arc<AtomicBool>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "q" {
            running.store(false, Ordering::Relaxed);
            break;
        }
        match parse_input(line) {
            Some(input) => {
                if tx.send(input).is_err() {
                    break;
                }
            }
            None => log::warn!("[Console] expected 'b <id> <value>', 'e <id> <delta>' or 'q'"),
        }
    }
    log::debug!("[Console] input closed");
}

/// Parse one console line into device input
pub fn parse_input(line: &str) -> Option<DeviceInput> {
    let mut parts = line.split_whitespace();
    let kind = parts.next()?;
    let id: usize = parts.next()?.parse().ok()?;
    let value: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    match kind {
        "b" => Some(DeviceInput::Button { id, value }),
        "e" => Some(DeviceInput::Encoder { id, delta: value }),
        _ => None,
    }
}

impl Device for ConsoleDevice {
    fn draw_text(&mut self, _clr: u32, x: u32, y: u32, text: &str) {
        log::info!("[Console] ({:3},{:2}) {}", x, y, text);
    }

    fn clear_rect(&mut self, _clr: u32, x: u32, y: u32, w: u32, h: u32) {
        log::trace!("[Console] clear {}x{} at ({},{})", w, h, x, y);
    }

    fn display_text(&mut self, _clr: u32, line: u32, col: u32, text: &str) {
        let idx = line as usize;
        if self.lines.len() <= idx {
            self.lines.resize(idx + 1, String::new());
        }
        self.lines[idx] = format!("{:width$}{}", "", text, width = col as usize);
        log::info!("[Console] {}: {}", line, self.lines[idx]);
    }

    fn clear_text(&mut self, _clr: u32, line: u32) {
        if let Some(l) = self.lines.get_mut(line as usize) {
            l.clear();
        }
    }

    fn invert_text(&mut self, line: u32) {
        let text = self.lines.get(line as usize).map(String::as_str).unwrap_or("");
        log::info!("[Console] {}: > {}", line, text);
    }

    fn display_clear(&mut self) {
        self.lines.clear();
        log::debug!("[Console] ----------------");
    }

    fn process(&mut self) -> Vec<DeviceInput> {
        self.input_rx.try_iter().collect()
    }

    fn num_encoders(&self) -> usize {
        self.encoders
    }
}
