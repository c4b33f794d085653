// crates/vigil-media/src/item.rs
//
// The shared frame handle and the tagged item type carried by every queue.

use std::sync::Arc;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::util::frame::video::Video;

use vigil_core::DetectionBatch;

/// Refcounted handle to a decoded frame.
///
/// Cloning increments the count; pixel planes are never copied. The frame is
/// immutable once published — the ingest stage wraps it and from then on
/// every consumer holds a shared reference. Dropping the last handle frees
/// the codec-owned buffers.
pub type SharedFrame = Arc<Video>;

/// What travels through a frame queue. The tag is load-bearing: frame queues
/// carry `Frame`, the box queue carries `Boxes`, and a consumer finding the
/// wrong tag treats it as a wiring bug, not data.
pub enum QueueItem {
    Frame(SharedFrame),
    Boxes(DetectionBatch),
}

impl QueueItem {
    pub fn describe(&self) -> &'static str {
        match self {
            QueueItem::Frame(_) => "frame",
            QueueItem::Boxes(_) => "boxes",
        }
    }
}
