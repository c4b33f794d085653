// crates/vigil-detect/src/letterbox.rs
//
// Aspect-preserving resize with center padding, and the invertible
// transform that carries boxes between source and letterboxed coordinates.
// The model sees a square input; detections come back in that square and
// must be mapped to the original frame before anyone else touches them.

use image::imageops::FilterType;
use image::RgbImage;

/// The recorded forward transform of one letterbox operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Uniform scale applied to the source: `min(target/w, target/h)`.
    pub scale: f32,
    /// Left padding in the letterboxed image, pixels.
    pub pad_x: u32,
    /// Top padding in the letterboxed image, pixels.
    pub pad_y: u32,
}

impl Letterbox {
    /// Source box → letterboxed box, rounded to integer pixels.
    pub fn to_letterboxed(&self, x: i32, y: i32, w: i32, h: i32) -> (i32, i32, i32, i32) {
        (
            (x as f32 * self.scale + self.pad_x as f32).round() as i32,
            (y as f32 * self.scale + self.pad_y as f32).round() as i32,
            (w as f32 * self.scale).round() as i32,
            (h as f32 * self.scale).round() as i32,
        )
    }

    /// Letterboxed box → source box, rounded to integer pixels. Inverse of
    /// `to_letterboxed` modulo rounding.
    pub fn to_source(&self, x: f32, y: f32, w: f32, h: f32) -> (i32, i32, i32, i32) {
        (
            ((x - self.pad_x as f32) / self.scale).round() as i32,
            ((y - self.pad_y as f32) / self.scale).round() as i32,
            (w / self.scale).round() as i32,
            (h / self.scale).round() as i32,
        )
    }
}

/// Scale `rgb` (packed RGB24, `src_w * src_h * 3` bytes) into a black
/// `target`×`target` canvas, preserving aspect ratio. Returns the canvas and
/// the transform needed to map detections back.
pub fn letterbox(rgb: &[u8], src_w: u32, src_h: u32, target: u32) -> (Vec<u8>, Letterbox) {
    let scale = (target as f32 / src_w as f32).min(target as f32 / src_h as f32);
    let unpad_w = ((src_w as f32 * scale) as u32).max(1);
    let unpad_h = ((src_h as f32 * scale) as u32).max(1);
    let pad_x = (target - unpad_w) / 2;
    let pad_y = (target - unpad_h) / 2;

    let resized = if (unpad_w, unpad_h) == (src_w, src_h) {
        RgbImage::from_raw(src_w, src_h, rgb.to_vec()).expect("buffer matches dimensions")
    } else {
        let src = RgbImage::from_raw(src_w, src_h, rgb.to_vec()).expect("buffer matches dimensions");
        image::imageops::resize(&src, unpad_w, unpad_h, FilterType::Triangle)
    };

    let mut canvas = vec![0u8; (target * target * 3) as usize];
    let canvas_stride = (target * 3) as usize;
    let row_bytes = (unpad_w * 3) as usize;
    let resized_raw = resized.as_raw();
    for row in 0..unpad_h as usize {
        let dst = (row + pad_y as usize) * canvas_stride + (pad_x * 3) as usize;
        canvas[dst..dst + row_bytes]
            .copy_from_slice(&resized_raw[row * row_bytes..(row + 1) * row_bytes]);
    }

    (canvas, Letterbox { scale, pad_x, pad_y })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_hd_to_640_geometry() {
        // 1920x1080 → 640x640: s = 1/3, no side padding, 140 px top/bottom.
        let rgb = vec![255u8; 1920 * 1080 * 3];
        let (canvas, tf) = letterbox(&rgb, 1920, 1080, 640);
        assert!((tf.scale - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(tf.pad_x, 0);
        assert_eq!(tf.pad_y, 140);
        assert_eq!(canvas.len(), 640 * 640 * 3);
        // Padding rows stay black; content rows carry the source.
        assert_eq!(&canvas[..640 * 3], &vec![0u8; 640 * 3][..]);
        let content_row = 140 * 640 * 3;
        assert!(canvas[content_row..content_row + 640 * 3].iter().any(|&b| b > 0));
    }

    #[test]
    fn box_maps_through_and_back() {
        let rgb = vec![0u8; 1920 * 1080 * 3];
        let (_, tf) = letterbox(&rgb, 1920, 1080, 640);
        let (lx, ly, lw, lh) = tf.to_letterboxed(300, 200, 50, 80);
        assert_eq!((lx, ly, lw, lh), (100, 207, 17, 27));
        let (x, y, w, h) = tf.to_source(lx as f32, ly as f32, lw as f32, lh as f32);
        assert_eq!((x, y, w, h), (300, 201, 51, 81));
    }

    #[test]
    fn round_trip_stays_within_one_pixel_per_unit_of_scale() {
        let rgb = vec![0u8; 1280 * 720 * 3];
        let (_, tf) = letterbox(&rgb, 1280, 720, 640);
        for (x, y, w, h) in [(0, 0, 10, 10), (640, 360, 128, 64), (1270, 710, 9, 9)] {
            let (lx, ly, lw, lh) = tf.to_letterboxed(x, y, w, h);
            let (bx, by, bw, bh) = tf.to_source(lx as f32, ly as f32, lw as f32, lh as f32);
            let tol = (1.0 / tf.scale).ceil() as i32;
            assert!((bx - x).abs() <= tol);
            assert!((by - y).abs() <= tol);
            assert!((bw - w).abs() <= tol);
            assert!((bh - h).abs() <= tol);
        }
    }

    #[test]
    fn same_size_input_is_copied_without_resampling() {
        let mut rgb = vec![0u8; 640 * 640 * 3];
        rgb[0] = 17;
        rgb[1] = 34;
        let (canvas, tf) = letterbox(&rgb, 640, 640, 640);
        assert_eq!(tf.scale, 1.0);
        assert_eq!((tf.pad_x, tf.pad_y), (0, 0));
        assert_eq!(&canvas[..2], &[17, 34]);
    }

    #[test]
    fn portrait_source_pads_horizontally() {
        let rgb = vec![0u8; 540 * 960 * 3];
        let (_, tf) = letterbox(&rgb, 540, 960, 640);
        assert!(tf.pad_x > 0);
        assert_eq!(tf.pad_y, 0);
    }
}
