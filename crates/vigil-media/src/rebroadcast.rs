// crates/vigil-media/src/rebroadcast.rs
//
// Re-broadcast stage: encode frames from the broadcast queue and push them
// to the output URL as an flv/RTMP stream. Any failure here is fatal to
// this stage only — the rest of the pipeline keeps running without it.

use ffmpeg_the_third as ffmpeg;

use vigil_core::{config, CancelToken, DequeueError, FrameQueue};

use crate::encode::{EncoderConfig, H264Sink};
use crate::error::StageError;
use crate::item::QueueItem;

pub fn run(
    output_url: &str,
    queue: &FrameQueue<QueueItem>,
    cfg: EncoderConfig,
    token: &CancelToken,
) -> Result<(), StageError> {
    // Format is deduced from the URL scheme: rtmp targets speak flv.
    let octx = ffmpeg::format::output_as(&output_url, "flv").map_err(|e| {
        StageError::OutputOpenFailed { url: output_url.to_string(), source: e }
    })?;
    let mut sink = H264Sink::open(octx, cfg)?;
    log::info!("re-broadcasting to {output_url} ({}x{} @ {} fps)", cfg.width, cfg.height, cfg.fps);

    loop {
        if token.is_cancelled() {
            break;
        }
        match queue.dequeue_timeout(config::DEQUEUE_POLL) {
            Ok(QueueItem::Frame(frame)) => sink.encode(&frame)?,
            Ok(other) => {
                log::error!("broadcast queue delivered a {} item; dropping it", other.describe());
            }
            Err(DequeueError::TimedOut) => continue,
            Err(_) => break, // Closed: producer is gone and the queue drained.
        }
    }

    // Drain the encoder and finalize the stream.
    sink.finish()
}
