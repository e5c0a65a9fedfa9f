//! Terminal QR code for the server URL.
//!
//! Two module rows are packed into each text row with Unicode half blocks,
//! so the code stays roughly square in a terminal.

use qrcode::{Color, QrCode};

/// Modules of light border around the code.
const QUIET_ZONE: usize = 4;

/// Render `data` as a QR code made of half-block characters.
pub fn render_terminal_qr(data: &str) -> anyhow::Result<String> {
    let code = QrCode::new(data.as_bytes())?;
    let modules = code.to_colors();
    let width = code.width();
    let height = modules.len() / width;

    let is_dark = |row: usize, col: usize| row < height && modules[row * width + col] == Color::Dark;

    let full_width = width + 2 * QUIET_ZONE;
    let margin = " ".repeat(QUIET_ZONE);
    let mut output = String::new();

    for _ in 0..QUIET_ZONE / 2 {
        output.push_str(&" ".repeat(full_width));
        output.push('\n');
    }

    for row in (0..height).step_by(2) {
        output.push_str(&margin);
        for col in 0..width {
            let ch = match (is_dark(row, col), is_dark(row + 1, col)) {
                (true, true) => '\u{2588}',
                (true, false) => '\u{2580}',
                (false, true) => '\u{2584}',
                (false, false) => ' ',
            };
            output.push(ch);
        }
        output.push_str(&margin);
        output.push('\n');
    }

    for _ in 0..QUIET_ZONE / 2 {
        output.push_str(&" ".repeat(full_width));
        output.push('\n');
    }

    Ok(output)
}
