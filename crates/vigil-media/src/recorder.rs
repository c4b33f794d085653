// crates/vigil-media/src/recorder.rs
//
// Recorder stage: persist frames from the record queue into rolling MP4
// segments in the working directory. A segment is finalized and replaced
// when 30 minutes of wall clock have passed; the frame that triggered the
// rotation is encoded into the new segment, so rotation drops nothing.
// Exactly one segment file is open at any time.

use std::time::Instant;

use chrono::{DateTime, Local};
use ffmpeg_the_third as ffmpeg;

use vigil_core::{config, CancelToken, DequeueError, FrameQueue};

use crate::encode::{EncoderConfig, H264Sink};
use crate::error::StageError;
use crate::item::QueueItem;

/// `local_<YYYYMMDD>_<HHMMSS>.mp4`, named for the segment's start time.
fn segment_filename(start: DateTime<Local>) -> String {
    format!("local_{}.mp4", start.format("%Y%m%d_%H%M%S"))
}

fn open_segment(cfg: EncoderConfig) -> Result<H264Sink, StageError> {
    let path = segment_filename(Local::now());
    let octx = ffmpeg::format::output(&path)
        .map_err(|e| StageError::OutputOpenFailed { url: path.clone(), source: e })?;
    log::info!("recording to {path}");
    H264Sink::open(octx, cfg)
}

pub fn run(
    queue: &FrameQueue<QueueItem>,
    cfg: EncoderConfig,
    token: &CancelToken,
) -> Result<(), StageError> {
    let mut sink = open_segment(cfg)?;
    let mut segment_start = Instant::now();

    loop {
        if token.is_cancelled() {
            break;
        }
        match queue.dequeue_timeout(config::DEQUEUE_POLL) {
            Ok(QueueItem::Frame(frame)) => {
                if segment_start.elapsed() >= config::SEGMENT_DURATION {
                    // Finalize before opening the successor, holding the
                    // dequeued frame for the new segment's first encode.
                    sink.finish()?;
                    sink = open_segment(cfg)?;
                    segment_start = Instant::now();
                }
                sink.encode(&frame)?;
            }
            Ok(other) => {
                log::error!("record queue delivered a {} item; dropping it", other.describe());
            }
            Err(DequeueError::TimedOut) => continue,
            Err(_) => break, // Closed and drained.
        }
    }

    // Finalize the in-progress segment on the way out.
    sink.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn segment_filename_encodes_local_start_time() {
        let start = Local.with_ymd_and_hms(2026, 8, 1, 13, 5, 9).unwrap();
        assert_eq!(segment_filename(start), "local_20260801_130509.mp4");
    }

    #[test]
    fn segment_filename_zero_pads() {
        let start = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(segment_filename(start), "local_20260102_030405.mp4");
    }
}
