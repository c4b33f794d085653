// crates/vigil-media/src/ingest.rs
//
// Ingest stage: open the source, decode its video stream, and fan every
// decoded frame out to the four consumer queues by refcount clone.
//
// The ingest thread is the sole producer. It spawns the recorder and
// re-broadcast stages itself (they need the decoder's geometry, known only
// here) under a child cancellation token, and never blocks on them. On any
// exit path it closes all downstream queues, cancels the child token, and
// joins the children — consumers observe `Closed` once their queue drains.
//
// Decode error policy: EAGAIN and EOF from the decoder are flow control,
// not failures. A failed send/receive drops that packet's frames and
// continues; DECODE_STALL_LIMIT consecutive failures escalate to
// DecodeStalled, which the supervisor treats as pipeline-fatal.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use ffmpeg_the_third as ffmpeg;
use ffmpeg::error::EAGAIN;
use ffmpeg::media::Type as MediaType;
use ffmpeg::util::frame::video::Video;

use vigil_core::{config, CancelToken, FrameQueue};

use crate::encode::EncoderConfig;
use crate::error::{StageError, StageEvent};
use crate::item::{QueueItem, SharedFrame};
use crate::{rebroadcast, recorder};

/// The four queues fed by ingest, in fan-out order.
pub struct FanOut {
    pub display:   Arc<FrameQueue<QueueItem>>,
    pub broadcast: Arc<FrameQueue<QueueItem>>,
    pub record:    Arc<FrameQueue<QueueItem>>,
    pub detect:    Arc<FrameQueue<QueueItem>>,
}

impl FanOut {
    fn close_all(&self) {
        self.display.close();
        self.broadcast.close();
        self.record.close();
        self.detect.close();
    }

    /// Hand one reference per queue to the consumers, oldest-drop on overflow.
    fn publish(&self, frame: &SharedFrame) {
        for queue in [&self.display, &self.broadcast, &self.record, &self.detect] {
            if queue.enqueue(QueueItem::Frame(Arc::clone(frame))) == vigil_core::Enqueue::DroppedOldest {
                log::trace!("queue overflow, oldest frame dropped");
            }
        }
    }
}

/// Run the ingest stage to completion: EOF, fatal error, or cancellation.
pub fn run(
    source_url: &str,
    rebroadcast_url: &str,
    queues: FanOut,
    token: CancelToken,
    events: Sender<StageEvent>,
) -> Result<(), StageError> {
    let mut ictx = ffmpeg::format::input(&source_url).map_err(|e| StageError::SourceOpenFailed {
        url: source_url.to_string(),
        source: e,
    })?;

    let (video_index, source_fps) = {
        let stream = ictx
            .streams()
            .best(MediaType::Video)
            .ok_or(StageError::NoVideoStream)?;
        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() > 0 {
            (rate.numerator() as f64 / rate.denominator() as f64).round() as u32
        } else {
            0
        };
        (stream.index(), fps)
    };
    // Audio is optional: note its presence, never require or decode it.
    if ictx.streams().best(MediaType::Audio).is_some() {
        log::debug!("source has an audio stream; ignoring it");
    }

    let dec_ctx = ffmpeg::codec::context::Context::from_parameters(
        ictx.stream(video_index)
            .expect("video stream index just found")
            .parameters(),
    )
    .map_err(StageError::DecoderInitFailed)?;
    let mut decoder = dec_ctx
        .decoder()
        .video()
        .map_err(StageError::DecoderInitFailed)?;

    let enc_cfg = EncoderConfig {
        width:  decoder.width(),
        height: decoder.height(),
        fps:    if source_fps > 0 { source_fps } else { config::TARGET_FPS },
    };
    log::info!(
        "source opened: {}x{} @ {} fps",
        enc_cfg.width, enc_cfg.height, enc_cfg.fps
    );

    // Children get their own token so ingest can take them down with it
    // whether the root was cancelled or the source simply ended.
    let child_token = CancelToken::new();
    let children = match spawn_children(rebroadcast_url, &queues, enc_cfg, &child_token, &events) {
        Ok(children) => children,
        Err(e) => {
            // No producer will ever run; release the consumers waiting on us.
            queues.close_all();
            return Err(e);
        }
    };

    let result = pump(&mut ictx, &mut decoder, video_index, &queues, &token);

    log::info!("ingest terminating: closing queues and stopping children");
    queues.close_all();
    child_token.cancel();
    for (name, handle) in children {
        if handle.join().is_err() {
            log::error!("{name} stage panicked");
        }
    }

    result
}

fn spawn_children(
    rebroadcast_url: &str,
    queues: &FanOut,
    enc_cfg: EncoderConfig,
    child_token: &CancelToken,
    events: &Sender<StageEvent>,
) -> Result<Vec<(&'static str, JoinHandle<()>)>, StageError> {
    let mut children: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    let spawned = {
        let url = rebroadcast_url.to_string();
        let queue = Arc::clone(&queues.broadcast);
        let token = child_token.clone();
        let events = events.clone();
        thread::Builder::new()
            .name("rebroadcast".into())
            .spawn(move || {
                let result = rebroadcast::run(&url, &queue, enc_cfg, &token);
                if let Err(e) = &result {
                    log::error!("rebroadcast stage failed: {e}");
                }
                let result = result.map_err(|e| e.to_string());
                let _ = events.send(StageEvent { stage: "rebroadcast", result });
            })
    };
    match spawned {
        Ok(handle) => children.push(("rebroadcast", handle)),
        Err(e) => return Err(stop_children(children, child_token, "rebroadcast", e)),
    }

    let spawned = {
        let queue = Arc::clone(&queues.record);
        let token = child_token.clone();
        let events = events.clone();
        thread::Builder::new()
            .name("recorder".into())
            .spawn(move || {
                let result = recorder::run(&queue, enc_cfg, &token);
                if let Err(e) = &result {
                    log::error!("recorder stage failed: {e}");
                }
                let result = result.map_err(|e| e.to_string());
                let _ = events.send(StageEvent { stage: "recorder", result });
            })
    };
    match spawned {
        Ok(handle) => children.push(("recorder", handle)),
        Err(e) => return Err(stop_children(children, child_token, "recorder", e)),
    }

    Ok(children)
}

/// Unwind the children that did start when a later spawn fails, then
/// surface the failure as this stage's error.
fn stop_children(
    children: Vec<(&'static str, JoinHandle<()>)>,
    child_token: &CancelToken,
    stage: &'static str,
    source: std::io::Error,
) -> StageError {
    child_token.cancel();
    for (_, handle) in children {
        let _ = handle.join();
    }
    StageError::SpawnFailed { stage, source }
}

fn pump(
    ictx: &mut ffmpeg::format::context::Input,
    decoder: &mut ffmpeg::decoder::Video,
    video_index: usize,
    queues: &FanOut,
    token: &CancelToken,
) -> Result<(), StageError> {
    let mut consecutive_errors: u32 = 0;

    for result in ictx.packets() {
        if token.is_cancelled() {
            return Ok(());
        }

        let (stream, packet) = match result {
            Ok(pair) => pair,
            Err(e) => {
                // Unrecoverable demux error; EOF ends the iterator instead.
                log::error!("demux error, ending ingest: {e}");
                return Ok(());
            }
        };
        if stream.index() != video_index {
            continue;
        }

        if let Err(e) = decoder.send_packet(&packet) {
            log::warn!("decoder rejected packet: {e}");
            consecutive_errors += 1;
            if consecutive_errors >= config::DECODE_STALL_LIMIT {
                return Err(StageError::DecodeStalled(consecutive_errors));
            }
            continue;
        }

        loop {
            let mut decoded = Video::empty();
            match decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    consecutive_errors = 0;
                    let shared: SharedFrame = Arc::new(decoded);
                    queues.publish(&shared);
                    // `shared` drops here; the queues now hold the only refs.
                }
                // Need more input / stream flushed — not errors.
                Err(ffmpeg::Error::Other { errno: EAGAIN }) | Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    log::warn!("decode error, dropping frame: {e}");
                    consecutive_errors += 1;
                    if consecutive_errors >= config::DECODE_STALL_LIMIT {
                        return Err(StageError::DecodeStalled(consecutive_errors));
                    }
                    break;
                }
            }
        }
    }

    log::info!("source ended (EOF)");
    Ok(())
}
