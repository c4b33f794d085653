// crates/vigil-core/src/config.rs
//
// Compile-time pipeline defaults. Only the log level is runtime-configurable
// (via the LOG_LEVEL environment variable, read in vigil-app).

use std::time::Duration;

/// Capacity of every inter-stage queue (display, broadcast, record, detect,
/// boxes). Overflow evicts the oldest item.
pub const QUEUE_CAPACITY: usize = 60;

/// Display pacing target, frames per second.
pub const TARGET_FPS: u32 = 25;

/// Nominal source frame size; used for the window before the first frame
/// arrives. Stages size themselves from the actual stream parameters.
pub const FRAME_WIDTH: u32 = 1920;
pub const FRAME_HEIGHT: u32 = 1080;

/// Re-broadcast encoder bitrate, bits per second.
pub const REBROADCAST_BITRATE: usize = 4_000_000;

/// Keyframe interval for both encoders.
pub const GOP_SIZE: u32 = 12;

/// Warning debouncer window and per-window threshold.
pub const WARNING_WINDOW_MS: u64 = 10_000;
pub const WARNING_THRESHOLD: u32 = 10;

/// Object classes that feed the warning debouncer.
pub const WATCH_LABELS: &[&str] = &["person"];

/// Recorder segment length.
pub const SEGMENT_DURATION: Duration = Duration::from_secs(30 * 60);

/// Detector thresholds and model geometry.
pub const CONF_THRESHOLD: f32 = 0.25;
pub const IOU_THRESHOLD: f32 = 0.5;
pub const MODEL_INPUT_SIZE: u32 = 640;
pub const MODEL_PATH: &str = "./yolov8n.onnx";

/// Alert endpoint; `None` disables HTTP alert emission (warnings still log).
pub const ALERT_URL: Option<&str> = Some("http://127.0.0.1:3345");

/// Device identity reported in alerts; a v4 UUID is generated per process
/// when unset.
pub const DEVICE_UUID: Option<&str> = None;

/// Upper bound on any blocking dequeue, so stages observe cancellation.
pub const DEQUEUE_POLL: Duration = Duration::from_millis(100);

/// Consecutive decode failures tolerated before ingest declares the stream
/// stalled and cancels the pipeline.
pub const DECODE_STALL_LIMIT: u32 = 32;

/// How long the supervisor waits for stages to join after cancellation.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(2);
