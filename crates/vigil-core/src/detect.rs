// crates/vigil-core/src/detect.rs
//
// Detection results as plain data — no ffmpeg, no ORT. These cross the
// box queue from the detector stage to the renderer.

/// Upper bound on boxes carried per frame; extra detections are discarded.
pub const MAX_BOXES_PER_FRAME: usize = 20;

/// One detected object, in the coordinate system of the originating frame
/// (not the letterboxed inference input).
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    /// Class confidence in `[0, 1]`.
    pub confidence: f32,
    /// Class name from the fixed label table.
    pub label: &'static str,
}

/// The boxes found in a single frame, tagged with that frame's timestamp.
///
/// Batches supersede each other: the renderer only ever draws the newest
/// one, so a batch that is never delivered is simply stale, not lost data.
#[derive(Debug, Clone, Default)]
pub struct DetectionBatch {
    /// PTS of the originating frame, in the input stream's time base.
    pub pts:   i64,
    pub boxes: Vec<BoundingBox>,
}

impl DetectionBatch {
    /// Build a batch, keeping at most [`MAX_BOXES_PER_FRAME`] boxes.
    pub fn new(pts: i64, mut boxes: Vec<BoundingBox>) -> Self {
        boxes.truncate(MAX_BOXES_PER_FRAME);
        Self { pts, boxes }
    }
}
