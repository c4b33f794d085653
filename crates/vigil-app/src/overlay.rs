// crates/vigil-app/src/overlay.rs
//
// Drawing into the window's 0RGB framebuffer: box outlines, glyph labels,
// and the FPS readout. Everything clips at the buffer edges — detection
// boxes can legally touch or cross the frame border after coordinate
// mapping.

use vigil_core::DetectionBatch;

use crate::font::{glyph, GLYPH_HEIGHT, GLYPH_WIDTH};

pub const GREEN: u32 = 0x0000_FF00;
pub const BLACK: u32 = 0x0000_0000;

/// Pixel scale for label text.
const TEXT_SCALE: usize = 2;
/// Blank columns between glyphs, pre-scale.
const TRACKING: usize = 1;

/// Packed RGB24 rows → 0RGB u32 pixels for minifb.
pub fn pack_rgb(rgb: &[u8]) -> Vec<u32> {
    rgb.chunks_exact(3)
        .map(|p| (u32::from(p[0]) << 16) | (u32::from(p[1]) << 8) | u32::from(p[2]))
        .collect()
}

fn put_pixel(buffer: &mut [u32], width: usize, height: usize, x: i32, y: i32, color: u32) {
    if x >= 0 && y >= 0 && (x as usize) < width && (y as usize) < height {
        buffer[y as usize * width + x as usize] = color;
    }
}

/// One-pixel rectangle outline, clipped to the buffer.
pub fn draw_rect(
    buffer: &mut [u32],
    width: usize,
    height: usize,
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    color: u32,
) {
    if w <= 0 || h <= 0 {
        return;
    }
    for dx in 0..w {
        put_pixel(buffer, width, height, x + dx, y, color);
        put_pixel(buffer, width, height, x + dx, y + h - 1, color);
    }
    for dy in 0..h {
        put_pixel(buffer, width, height, x, y + dy, color);
        put_pixel(buffer, width, height, x + w - 1, y + dy, color);
    }
}

/// Rasterize `text` at `(x, y)` (top-left), scaled [`TEXT_SCALE`]×.
pub fn draw_text(
    buffer: &mut [u32],
    width: usize,
    height: usize,
    x: i32,
    y: i32,
    text: &str,
    color: u32,
) {
    let advance = ((GLYPH_WIDTH + TRACKING) * TEXT_SCALE) as i32;
    let mut pen_x = x;
    for c in text.chars() {
        if let Some(rows) = glyph(c) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    for sy in 0..TEXT_SCALE {
                        for sx in 0..TEXT_SCALE {
                            put_pixel(
                                buffer,
                                width,
                                height,
                                pen_x + (col * TEXT_SCALE + sx) as i32,
                                y + (row * TEXT_SCALE + sy) as i32,
                                color,
                            );
                        }
                    }
                }
            }
        }
        pen_x += advance;
    }
}

/// Height of a rendered text line, for stacking labels above boxes.
pub fn text_height() -> i32 {
    (GLYPH_HEIGHT * TEXT_SCALE) as i32
}

/// Draw every box of `batch` with a `LABEL 0.87` caption above it.
pub fn draw_batch(buffer: &mut [u32], width: usize, height: usize, batch: &DetectionBatch) {
    for b in &batch.boxes {
        draw_rect(buffer, width, height, b.x, b.y, b.w, b.h, GREEN);
        let caption = format!("{} {:.2}", b.label, b.confidence);
        let label_y = (b.y - text_height() - 2).max(0);
        draw_text(buffer, width, height, b.x, label_y, &caption, GREEN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::BoundingBox;

    #[test]
    fn pack_rgb_orders_channels() {
        let packed = pack_rgb(&[0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03]);
        assert_eq!(packed, vec![0x00AA_BBCC, 0x0001_0203]);
    }

    #[test]
    fn rect_outline_hits_corners_only() {
        let mut buffer = vec![BLACK; 10 * 10];
        draw_rect(&mut buffer, 10, 10, 2, 2, 4, 4, GREEN);
        assert_eq!(buffer[2 * 10 + 2], GREEN); // top-left
        assert_eq!(buffer[5 * 10 + 5], GREEN); // bottom-right
        assert_eq!(buffer[3 * 10 + 3], BLACK); // interior untouched
    }

    #[test]
    fn rect_clips_outside_buffer() {
        let mut buffer = vec![BLACK; 8 * 8];
        draw_rect(&mut buffer, 8, 8, -3, -3, 20, 20, GREEN);
        draw_rect(&mut buffer, 8, 8, 6, 6, 10, 10, GREEN);
        assert_eq!(buffer.len(), 64); // no panic is the real assertion
    }

    #[test]
    fn degenerate_rect_draws_nothing() {
        let mut buffer = vec![BLACK; 4 * 4];
        draw_rect(&mut buffer, 4, 4, 1, 1, 0, 5, GREEN);
        assert!(buffer.iter().all(|&p| p == BLACK));
    }

    #[test]
    fn text_marks_pixels_and_advances() {
        let mut buffer = vec![BLACK; 64 * 16];
        draw_text(&mut buffer, 64, 16, 0, 0, "FPS", GREEN);
        assert!(buffer.iter().any(|&p| p == GREEN));

        // A second glyph cell must land past the first advance.
        let advance = (super::GLYPH_WIDTH + super::TRACKING) * super::TEXT_SCALE;
        let second_cell: Vec<u32> = (0..16)
            .flat_map(|row| buffer[row * 64 + advance..row * 64 + 2 * advance].to_vec())
            .collect();
        assert!(second_cell.iter().any(|&p| p == GREEN));
    }

    #[test]
    fn batch_draws_caption_above_box() {
        let mut buffer = vec![BLACK; 100 * 100];
        let batch = DetectionBatch::new(
            0,
            vec![BoundingBox { x: 10, y: 40, w: 30, h: 30, confidence: 0.87, label: "person" }],
        );
        draw_batch(&mut buffer, 100, 100, &batch);
        // Outline present.
        assert_eq!(buffer[40 * 100 + 10], GREEN);
        // Some caption pixels land in the rows above the box.
        let above: &[u32] = &buffer[(40 - text_height() as usize - 2) * 100..40 * 100];
        assert!(above.iter().any(|&p| p == GREEN));
    }
}
