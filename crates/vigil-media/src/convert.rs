// crates/vigil-media/src/convert.rs
//
// Pixel conversion out of decoded frames. The detector wants packed RGB24;
// the converter owns a lazily (re)built swscale context keyed on the source
// format so a mid-stream format change does not feed stale conversion state.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};
use ffmpeg::util::frame::video::Video;

use crate::error::StageError;

/// A packed (stride-free) RGB24 copy of one frame.
pub struct RgbFrame {
    pub width:  u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major.
    pub data:   Vec<u8>,
}

pub struct RgbConverter {
    scaler: Option<Scaler>,
}

struct Scaler {
    src_format: Pixel,
    src_width:  u32,
    src_height: u32,
    ctx:        SwsContext,
}

impl RgbConverter {
    pub fn new() -> Self {
        Self { scaler: None }
    }

    pub fn convert(&mut self, frame: &Video) -> Result<RgbFrame, StageError> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());

        let stale = !matches!(
            &self.scaler,
            Some(s) if s.src_format == format && s.src_width == width && s.src_height == height
        );
        if stale {
            let ctx = SwsContext::get(
                format, width, height,
                Pixel::RGB24, width, height,
                Flags::BILINEAR,
            )
            .map_err(|_| StageError::UnsupportedPixelFormat(format))?;
            self.scaler = Some(Scaler { src_format: format, src_width: width, src_height: height, ctx });
        }

        let scaler = self.scaler.as_mut().expect("scaler just built");
        let mut rgb = Video::empty();
        scaler
            .ctx
            .run(frame, &mut rgb)
            .map_err(|_| StageError::UnsupportedPixelFormat(format))?;

        // Strip row padding: swscale output rows may be wider than w*3.
        let stride = rgb.stride(0);
        let raw = rgb.data(0);
        let row_bytes = width as usize * 3;
        let data: Vec<u8> = (0..height as usize)
            .flat_map(|row| &raw[row * stride..row * stride + row_bytes])
            .copied()
            .collect();

        Ok(RgbFrame { width, height, data })
    }
}

impl Default for RgbConverter {
    fn default() -> Self {
        Self::new()
    }
}
