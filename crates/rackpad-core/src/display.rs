//! Panel: the drawing layer shared by every mode
//!
//! Wraps the [`Device`] with the fixed screen layout (title row, 2×2
//! parameter grid, status bar) and the two pieces of display state that
//! outlive any single mode: the aux status and the yield flag.
//!
//! While the display is yielded every drawing call is a no-op; another
//! client owns the screen until navigation or `/YieldDisplay 0` clears it.

use crate::device::{Device, DeviceInput, BLACK, WHITE};
use crate::model::Parameter;

/// Text lines available to menus
pub const TEXT_LINES: u32 = 5;
/// Characters per text line
pub const TEXT_CHARS: usize = 30;
/// Pixel height of one text row
pub const LINE_H: u32 = 10;
/// Parameters shown per page
pub const PARAMS_PER_PAGE: usize = 4;

const SCREEN_W: u32 = 128;
const STATUS_Y: u32 = 60;
const TITLE_BG: u32 = 1;
const LABEL_BG: u32 = 5;
const VALUE_FG: u32 = 15;

pub struct Panel {
    device: Box<dyn Device>,
    aux_active: bool,
    aux_led: i32,
    aux_line: String,
    yield_display: bool,
}

impl Panel {
    pub fn new(device: Box<dyn Device>) -> Self {
        Self {
            device,
            aux_active: false,
            aux_led: 0,
            aux_line: String::new(),
            yield_display: false,
        }
    }

    pub fn num_encoders(&self) -> usize {
        self.device.num_encoders()
    }

    /// Run the device's service routine and collect its input
    pub fn process(&mut self) -> Vec<DeviceInput> {
        self.device.process()
    }

    // ─── Display state ──────────────────────────────────────────────

    pub fn set_yield(&mut self, yielded: bool) {
        if self.yield_display != yielded {
            log::debug!("[Panel] yield display: {}", yielded);
        }
        self.yield_display = yielded;
    }

    pub fn is_yielded(&self) -> bool {
        self.yield_display
    }

    pub fn set_aux_active(&mut self, active: bool) {
        self.aux_active = active;
    }

    pub fn set_aux_led(&mut self, led: i32) {
        self.aux_led = led;
    }

    pub fn set_aux_line(&mut self, line: String) {
        self.aux_line = line;
    }

    /// Status bar text, e.g. `"+ |3| sequencer running"`
    pub fn status_text(&self) -> String {
        format!(
            "{} |{}| {}",
            if self.aux_active { "+" } else { "-" },
            self.aux_led,
            self.aux_line
        )
    }

    // ─── Drawing ────────────────────────────────────────────────────

    pub fn clear_display(&mut self) {
        if self.yield_display {
            return;
        }
        self.device.display_clear();
    }

    /// Draw `"<module> > <page>"` on the title row
    ///
    /// Nothing is drawn unless both parts are non-empty.
    pub fn display_title(&mut self, module: &str, page: &str) {
        if self.yield_display || module.is_empty() || page.is_empty() {
            return;
        }
        let title = format!("{} > {}", module, page);
        self.device.clear_rect(TITLE_BG, 0, 0, SCREEN_W, LINE_H);
        self.device.draw_text(VALUE_FG, 0, 8, &title);
    }

    /// Draw a parameter into grid slot `num` (0..4, row-major)
    ///
    /// The label is drawn dark on the label band, the value and unit bright
    /// on black.
    pub fn display_param_num(&mut self, num: usize, param: &Parameter) {
        if self.yield_display {
            return;
        }
        let Some((x, w, y1)) = grid_slot(num) else {
            return;
        };
        let y2 = y1 + LINE_H;

        self.device.clear_rect(LABEL_BG, x, y1 - LINE_H, w, LINE_H);
        self.device.draw_text(BLACK, x + 1, y1 - 1, &param.display_name);
        self.device.clear_rect(BLACK, x, y2 - LINE_H, w, LINE_H);
        self.device
            .draw_text(VALUE_FG, x + 1, y2 - 1, &param.display_value());
        if !param.unit.is_empty() {
            self.device.draw_text(VALUE_FG, x + 41, y2 - 1, &param.unit);
        }
    }

    pub fn clear_param_num(&mut self, num: usize) {
        if self.yield_display {
            return;
        }
        let Some((x, w, y1)) = grid_slot(num) else {
            return;
        };
        self.device.clear_rect(BLACK, x, y1, w, LINE_H);
        self.device.clear_rect(BLACK, x, y1 + LINE_H, w, LINE_H);
    }

    pub fn display_status_bar(&mut self) {
        if self.yield_display {
            return;
        }
        let status = self.status_text();
        self.device.clear_rect(BLACK, 1, STATUS_Y, SCREEN_W, LINE_H);
        self.device.draw_text(VALUE_FG, 1, STATUS_Y, &status);
    }

    /// Replace a text line, truncated to the line width
    pub fn display_line(&mut self, line: u32, text: &str) {
        if self.yield_display {
            return;
        }
        let text: String = text.chars().take(TEXT_CHARS).collect();
        self.device.clear_text(BLACK, line);
        self.device.display_text(WHITE, line, 0, &text);
    }

    pub fn invert_line(&mut self, line: u32) {
        if self.yield_display {
            return;
        }
        self.device.invert_text(line);
    }
}

/// Pixel position of a grid slot: (x, width, baseline of the label row)
fn grid_slot(num: usize) -> Option<(u32, u32, u32)> {
    if num >= PARAMS_PER_PAGE {
        return None;
    }
    let row = (num / 2) as u32;
    let col = (num % 2) as u32;
    Some((col * 64, 62 + col * 2, (row + 1) * 20))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DrawOp, RecordingDevice};

    fn panel() -> (Panel, RecordingDevice) {
        let dev = RecordingDevice::default();
        (Panel::new(Box::new(dev.clone())), dev)
    }

    #[test]
    fn test_status_text_format() {
        let (mut panel, _) = panel();
        assert_eq!(panel.status_text(), "- |0| ");
        panel.set_aux_active(true);
        panel.set_aux_led(3);
        panel.set_aux_line("seq running".into());
        assert_eq!(panel.status_text(), "+ |3| seq running");
    }

    #[test]
    fn test_yield_suppresses_drawing() {
        let (mut panel, dev) = panel();
        panel.set_yield(true);
        panel.clear_display();
        panel.display_line(0, "hidden");
        panel.display_status_bar();
        assert!(dev.ops().is_empty());

        panel.set_yield(false);
        panel.display_line(0, "shown");
        assert_eq!(dev.line(0), "shown");
    }

    #[test]
    fn test_title_requires_both_parts() {
        let (mut panel, dev) = panel();
        panel.display_title("osc", "");
        assert!(dev.ops().is_empty());
        panel.display_title("osc", "main");
        assert!(dev.ops().contains(&DrawOp::Text {
            clr: VALUE_FG,
            x: 0,
            y: 8,
            text: "osc > main".into(),
        }));
    }

    #[test]
    fn test_display_line_truncates() {
        let (mut panel, dev) = panel();
        panel.display_line(1, &"x".repeat(40));
        assert_eq!(dev.line(1).len(), TEXT_CHARS);
    }

    #[test]
    fn test_param_label_drawn_dark() {
        let (mut panel, dev) = panel();
        let param = Parameter::float("cutoff", "Cutoff", 0.0, 1.0, 0.5).with_unit("Hz");
        panel.display_param_num(1, &param);

        let ops = dev.ops();
        assert!(ops.contains(&DrawOp::Text {
            clr: BLACK,
            x: 65,
            y: 19,
            text: "Cutoff".into(),
        }));
        assert!(ops.contains(&DrawOp::Text {
            clr: VALUE_FG,
            x: 105,
            y: 29,
            text: "Hz".into(),
        }));
    }

    #[test]
    fn test_grid_slots() {
        assert_eq!(grid_slot(0), Some((0, 62, 20)));
        assert_eq!(grid_slot(3), Some((64, 64, 40)));
        assert_eq!(grid_slot(4), None);
    }
}
