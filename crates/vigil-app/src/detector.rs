// crates/vigil-app/src/detector.rs
//
// Detector stage loop: frames in from the detect queue, batches out to the
// box queue, qualifying detections into the warning debouncer.
//
// The detect queue's drop-oldest policy is the backpressure strategy: when
// inference runs slower than the source, the queue sheds stale frames and
// the detector keeps sampling the freshest ones. No skip logic lives here.

use std::sync::Arc;

use vigil_core::{config, CancelToken, DequeueError, DetectionBatch, FrameQueue, WarningDebouncer};
use vigil_detect::Detector;
use vigil_media::{QueueItem, RgbConverter, SharedFrame};

pub fn run(
    detect_queue: &FrameQueue<QueueItem>,
    box_queue: &FrameQueue<QueueItem>,
    debouncer: &WarningDebouncer<SharedFrame>,
    token: &CancelToken,
) -> Result<(), String> {
    // Model load happens once; a missing model ends only this stage and the
    // pipeline runs on without detections.
    let mut detector = Detector::load(
        config::MODEL_PATH,
        config::CONF_THRESHOLD,
        config::IOU_THRESHOLD,
        config::MODEL_INPUT_SIZE,
    )
    .map_err(|e| e.to_string())?;
    log::info!("detection model loaded from {}", config::MODEL_PATH);

    let mut converter = RgbConverter::new();

    loop {
        if token.is_cancelled() {
            break;
        }
        match detect_queue.dequeue_timeout(config::DEQUEUE_POLL) {
            Ok(QueueItem::Frame(frame)) => {
                let rgb = converter.convert(&frame).map_err(|e| e.to_string())?;
                let boxes = match detector.detect(&rgb.data, rgb.width, rgb.height) {
                    Ok(boxes) => boxes,
                    Err(e) => {
                        log::warn!("inference failed on one frame: {e}");
                        continue;
                    }
                };

                // Truncation happens before the watch check: only boxes that
                // make it into the published batch can raise a warning.
                let batch = DetectionBatch::new(frame.pts().unwrap_or(0), boxes);
                for b in batch.boxes.iter().filter(|b| config::WATCH_LABELS.contains(&b.label)) {
                    debouncer.record(b.label, chrono::Local::now().timestamp(), Arc::clone(&frame));
                }
                box_queue.enqueue(QueueItem::Boxes(batch));
            }
            Ok(other) => {
                log::error!("detect queue delivered a {} item; dropping it", other.describe());
            }
            Err(DequeueError::TimedOut) => continue,
            Err(_) => break, // Closed and drained.
        }
    }

    Ok(())
}
