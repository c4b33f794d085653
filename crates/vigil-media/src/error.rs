// crates/vigil-media/src/error.rs
//
// Stage-level failure kinds. Ingest startup failures and DecodeStalled are
// fatal to the whole pipeline; everything else is fatal only to the stage
// that hit it — the supervisor logs it and the pipeline keeps running
// without that consumer.

use ffmpeg_the_third as ffmpeg;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("could not open source '{url}': {source}")]
    SourceOpenFailed { url: String, source: ffmpeg::Error },

    #[error("source has no video stream")]
    NoVideoStream,

    #[error("decoder init failed: {0}")]
    DecoderInitFailed(ffmpeg::Error),

    #[error("decoder stalled after {0} consecutive errors")]
    DecodeStalled(u32),

    #[error("could not open output '{url}': {source}")]
    OutputOpenFailed { url: String, source: ffmpeg::Error },

    #[error("encoder init failed: {0}")]
    EncoderInitFailed(ffmpeg::Error),

    #[error("H.264 encoder not found — is libx264 available?")]
    EncoderMissing,

    #[error("container header write failed: {0}")]
    HeaderWriteFailed(ffmpeg::Error),

    #[error("packet write failed: {0}")]
    PacketWriteFailed(ffmpeg::Error),

    #[error("unsupported pixel format {0:?}")]
    UnsupportedPixelFormat(ffmpeg::format::Pixel),

    #[error("failed to spawn the {stage} thread: {source}")]
    SpawnFailed {
        stage:  &'static str,
        source: std::io::Error,
    },
}

/// Terminal report a stage sends the supervisor when it exits. Errors cross
/// the channel as strings — the stage already logged the typed error, and
/// the supervisor only needs the cause line and the fatality decision.
pub struct StageEvent {
    pub stage:  &'static str,
    pub result: Result<(), String>,
}

impl StageEvent {
    /// Ingest is the sole source, so any ingest failure (startup or
    /// DecodeStalled) takes the pipeline down; every other stage failure
    /// just degrades that one consumer.
    pub fn is_pipeline_fatal(&self) -> bool {
        self.stage == "ingest" && self.result.is_err()
    }
}
