//! Device contract
//!
//! The physical controller (OLED display, encoders, buttons) sits behind the
//! [`Device`] trait. The engine only ever calls it from the control thread.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Foreground colour
pub const WHITE: u32 = 1;
/// Background colour
pub const BLACK: u32 = 0;

/// Raw input produced by a device's periodic service routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceInput {
    /// Button `id` changed; non-zero `value` means pressed
    Button { id: usize, value: i32 },
    /// Encoder `id` moved by `delta` detents
    Encoder { id: usize, delta: i32 },
}

/// Trait for display/encoder hardware
///
/// Text coordinates are in character lines/columns, pixel coordinates are
/// relative to the top-left corner.
pub trait Device: Send {
    fn draw_text(&mut self, clr: u32, x: u32, y: u32, text: &str);

    fn clear_rect(&mut self, clr: u32, x: u32, y: u32, w: u32, h: u32);

    /// Write `text` on text line `line` starting at column `col`
    fn display_text(&mut self, clr: u32, line: u32, col: u32, text: &str);

    fn clear_text(&mut self, clr: u32, line: u32);

    fn invert_text(&mut self, line: u32);

    fn display_clear(&mut self);

    /// Periodic service routine
    ///
    /// Flushes pending drawing and returns any input gathered since the
    /// last call, oldest first.
    fn process(&mut self) -> Vec<DeviceInput>;

    /// Number of physical encoders
    fn num_encoders(&self) -> usize;
}

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text { clr: u32, x: u32, y: u32, text: String },
    ClearRect { clr: u32, x: u32, y: u32, w: u32, h: u32 },
    DisplayText { clr: u32, line: u32, col: u32, text: String },
    ClearText { clr: u32, line: u32 },
    InvertText { line: u32 },
    DisplayClear,
}

#[derive(Debug, Default)]
struct RecordingState {
    ops: Vec<DrawOp>,
    lines: Vec<String>,
    inverted: BTreeSet<u32>,
    inputs: VecDeque<DeviceInput>,
    process_calls: usize,
}

impl RecordingState {
    fn line_mut(&mut self, line: u32) -> &mut String {
        let idx = line as usize;
        if self.lines.len() <= idx {
            self.lines.resize(idx + 1, String::new());
        }
        &mut self.lines[idx]
    }
}

/// Headless device that records every call
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another. Input queued with [`push_input`](Self::push_input) is handed out
/// by the next `process()`.
#[derive(Debug, Clone)]
pub struct RecordingDevice {
    state: Arc<Mutex<RecordingState>>,
    encoders: usize,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new(4)
    }
}

impl RecordingDevice {
    pub fn new(encoders: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(RecordingState::default())),
            encoders,
        }
    }

    pub fn push_input(&self, input: DeviceInput) {
        if let Ok(mut state) = self.state.lock() {
            state.inputs.push_back(input);
        }
    }

    /// Every call recorded so far
    pub fn ops(&self) -> Vec<DrawOp> {
        self.state.lock().map(|s| s.ops.clone()).unwrap_or_default()
    }

    pub fn clear_ops(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.ops.clear();
        }
    }

    /// Current contents of a text line (empty if never written)
    pub fn line(&self, line: u32) -> String {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.lines.get(line as usize).cloned())
            .unwrap_or_default()
    }

    /// Whether a text line is currently shown inverted
    pub fn is_inverted(&self, line: u32) -> bool {
        self.state
            .lock()
            .map(|s| s.inverted.contains(&line))
            .unwrap_or(false)
    }

    /// Number of full clears recorded
    pub fn clear_count(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.ops.iter().filter(|op| **op == DrawOp::DisplayClear).count())
            .unwrap_or(0)
    }

    pub fn process_calls(&self) -> usize {
        self.state.lock().map(|s| s.process_calls).unwrap_or(0)
    }

    fn record(&self, op: DrawOp) {
        if let Ok(mut state) = self.state.lock() {
            match &op {
                DrawOp::DisplayText { line, col, text, .. } => {
                    let buf = state.line_mut(*line);
                    let col = *col as usize;
                    let mut chars: Vec<char> = buf.chars().collect();
                    if chars.len() < col {
                        chars.resize(col, ' ');
                    }
                    for (i, c) in text.chars().enumerate() {
                        if col + i < chars.len() {
                            chars[col + i] = c;
                        } else {
                            chars.push(c);
                        }
                    }
                    *buf = chars.into_iter().collect();
                }
                DrawOp::ClearText { line, .. } => {
                    state.line_mut(*line).clear();
                    state.inverted.remove(line);
                }
                DrawOp::InvertText { line } => {
                    if !state.inverted.remove(line) {
                        state.inverted.insert(*line);
                    }
                }
                DrawOp::DisplayClear => {
                    state.lines.clear();
                    state.inverted.clear();
                }
                DrawOp::Text { .. } | DrawOp::ClearRect { .. } => {}
            }
            state.ops.push(op);
        }
    }
}

impl Device for RecordingDevice {
    fn draw_text(&mut self, clr: u32, x: u32, y: u32, text: &str) {
        self.record(DrawOp::Text {
            clr,
            x,
            y,
            text: text.to_string(),
        });
    }

    fn clear_rect(&mut self, clr: u32, x: u32, y: u32, w: u32, h: u32) {
        self.record(DrawOp::ClearRect { clr, x, y, w, h });
    }

    fn display_text(&mut self, clr: u32, line: u32, col: u32, text: &str) {
        self.record(DrawOp::DisplayText {
            clr,
            line,
            col,
            text: text.to_string(),
        });
    }

    fn clear_text(&mut self, clr: u32, line: u32) {
        self.record(DrawOp::ClearText { clr, line });
    }

    fn invert_text(&mut self, line: u32) {
        self.record(DrawOp::InvertText { line });
    }

    fn display_clear(&mut self) {
        self.record(DrawOp::DisplayClear);
    }

    fn process(&mut self) -> Vec<DeviceInput> {
        match self.state.lock() {
            Ok(mut state) => {
                state.process_calls += 1;
                state.inputs.drain(..).collect()
            }
            Err(_) => Vec::new(),
        }
    }

    fn num_encoders(&self) -> usize {
        self.encoders
    }
}
