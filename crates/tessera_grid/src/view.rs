//! Plain-text rendering for terminals and debug logs.

use crate::engine::GridEngine;

/// Largest grid area, in cells, that `render_text` draws
pub const MAX_RENDER_CELLS: u64 = 1 << 16;

/// Render the grid as text, one line per row
///
/// Occupied cells show the first character of the item id. Grids larger
/// than [`MAX_RENDER_CELLS`] render as a single notice line instead.
///
/// ```text
///     0  1  2
/// 00 [a][a][ ]
/// 01 [ ][ ][ ]
/// ```
#[must_use]
pub fn render_text(engine: &GridEngine) -> String {
    let area = u64::from(engine.width()) * u64::from(engine.height());
    if area > MAX_RENDER_CELLS {
        return format!(
            "grid {}x{} too large to render ({} cells, limit {})\n",
            engine.width(),
            engine.height(),
            area,
            MAX_RENDER_CELLS
        );
    }

    let (width, height) = (engine.width() as usize, engine.height() as usize);
    let mut cells = vec![' '; width * height];
    for item in engine.items() {
        let glyph = item.id.as_str().chars().next().unwrap_or('?');
        for (x, y) in item.rect().cells() {
            cells[y as usize * width + x as usize] = glyph;
        }
    }

    let mut out = String::from("  ");
    for x in 0..width {
        out.push_str(&format!("  {}", x % 10));
    }
    out.push('\n');
    for y in 0..height {
        out.push_str(&format!("{:0>2} ", y));
        for x in 0..width {
            out.push('[');
            out.push(cells[y * width + x]);
            out.push(']');
        }
        out.push('\n');
    }
    out
}
