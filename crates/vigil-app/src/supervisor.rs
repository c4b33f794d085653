// crates/vigil-app/src/supervisor.rs
//
// Builds the pipeline and babysits it: one cancellation token, five
// bounded queues, the warning debouncer, and a thread per stage. The
// ingest thread spawns the recorder and re-broadcast stages itself; the
// supervisor owns ingest, detector, and renderer directly.
//
// Shutdown: the token latches (signal, window close, source EOF, or a
// fatal ingest error), queues close, and every stage gets a bounded join.
// A stage that ignores the token is abandoned with an error log rather
// than holding the process hostage.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use crossbeam_channel::RecvTimeoutError;

use vigil_core::{config, CancelToken, FrameQueue, WarningDebouncer, WarningEvent};
use vigil_media::{FanOut, QueueItem, SharedFrame, StageEvent};

use crate::alert::Alerter;
use crate::{detector, renderer};

/// Why the pipeline came down cleanly.
pub enum Shutdown {
    /// Operator signal or window close.
    Requested,
    /// The source reached EOF.
    SourceEnded,
}

pub fn run(source_url: &str, rebroadcast_url: &str) -> anyhow::Result<Shutdown> {
    let token = CancelToken::new();

    {
        let token = token.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupt received; shutting the pipeline down");
            token.cancel();
        })
        .context("failed to install the signal handler")?;
    }

    let display = Arc::new(FrameQueue::<QueueItem>::new(config::QUEUE_CAPACITY));
    let broadcast = Arc::new(FrameQueue::<QueueItem>::new(config::QUEUE_CAPACITY));
    let record = Arc::new(FrameQueue::<QueueItem>::new(config::QUEUE_CAPACITY));
    let detect = Arc::new(FrameQueue::<QueueItem>::new(config::QUEUE_CAPACITY));
    let boxes = Arc::new(FrameQueue::<QueueItem>::new(config::QUEUE_CAPACITY));

    let alerter = Alerter::new();
    let debouncer: Arc<WarningDebouncer<SharedFrame>> = Arc::new(WarningDebouncer::start(
        config::WARNING_WINDOW_MS,
        config::WARNING_THRESHOLD,
        move |event: WarningEvent<SharedFrame>| {
            log::warn!(
                "warning: {} seen {} times in the last {} ms",
                event.label, event.count, event.window_ms
            );
            alerter.emit(event.label, event.timestamp);
        },
    ));

    let (event_tx, event_rx) = crossbeam_channel::unbounded::<StageEvent>();
    let mut stages: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    {
        let queues = FanOut {
            display:   Arc::clone(&display),
            broadcast: Arc::clone(&broadcast),
            record:    Arc::clone(&record),
            detect:    Arc::clone(&detect),
        };
        let token = token.clone();
        let events = event_tx.clone();
        let source = source_url.to_string();
        let sink = rebroadcast_url.to_string();
        let handle = thread::Builder::new()
            .name("ingest".into())
            .spawn(move || {
                let result = vigil_media::ingest::run(&source, &sink, queues, token, events.clone());
                if let Err(e) = &result {
                    log::error!("ingest stage failed: {e}");
                }
                let result = result.map_err(|e| e.to_string());
                let _ = events.send(StageEvent { stage: "ingest", result });
            })
            .context("failed to spawn the ingest thread")?;
        stages.push(("ingest", handle));
    }

    {
        let detect = Arc::clone(&detect);
        let boxes = Arc::clone(&boxes);
        let debouncer = Arc::clone(&debouncer);
        let token = token.clone();
        let events = event_tx.clone();
        let handle = thread::Builder::new()
            .name("detector".into())
            .spawn(move || {
                let result = detector::run(&detect, &boxes, &debouncer, &token);
                if let Err(e) = &result {
                    log::error!("detector stage failed: {e}");
                }
                let _ = events.send(StageEvent { stage: "detector", result });
            })
            .context("failed to spawn the detector thread")?;
        stages.push(("detector", handle));
    }

    {
        let display = Arc::clone(&display);
        let boxes = Arc::clone(&boxes);
        let token = token.clone();
        let events = event_tx.clone();
        let handle = thread::Builder::new()
            .name("renderer".into())
            .spawn(move || {
                let result = renderer::run(&display, &boxes, &token);
                if let Err(e) = &result {
                    log::error!("renderer stage failed: {e}");
                }
                let _ = events.send(StageEvent { stage: "renderer", result });
            })
            .context("failed to spawn the renderer thread")?;
        stages.push(("renderer", handle));
    }
    drop(event_tx);

    // Block until cancellation, collecting stage exits as they happen.
    let mut outcome = Outcome::default();
    loop {
        if token.is_cancelled() {
            break;
        }
        match event_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => outcome.note(event, &token),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Queues close idempotently (ingest already closed its four on exit).
    for queue in [&display, &broadcast, &record, &detect, &boxes] {
        queue.close();
    }
    join_with_deadline(stages, config::SHUTDOWN_DEADLINE);
    drop(debouncer); // joins the ticker once the detector's clone is gone

    // Catch exits that raced the cancellation — a fatal ingest error must
    // reach the exit code even when another stage latched the token first.
    while let Ok(event) = event_rx.try_recv() {
        outcome.note(event, &token);
    }

    match outcome.fatal {
        Some(msg) => Err(anyhow!(msg)),
        None if outcome.source_ended => Ok(Shutdown::SourceEnded),
        None => Ok(Shutdown::Requested),
    }
}

#[derive(Default)]
struct Outcome {
    fatal:        Option<String>,
    source_ended: bool,
}

impl Outcome {
    fn note(&mut self, event: StageEvent, token: &CancelToken) {
        match &event.result {
            Ok(()) => log::info!("{} stage finished", event.stage),
            Err(msg) => log::error!("{} stage ended with error: {msg}", event.stage),
        }
        if event.is_pipeline_fatal() {
            self.fatal = event.result.err();
            token.cancel();
        } else if event.stage == "ingest" {
            // A clean ingest exit means the source ended; nothing more will
            // flow, so the rest of the pipeline comes down too.
            self.source_ended = true;
            token.cancel();
        }
    }
}

/// Join every stage, giving the whole group at most `deadline`.
fn join_with_deadline(stages: Vec<(&'static str, JoinHandle<()>)>, deadline: Duration) {
    let cutoff = Instant::now() + deadline;
    for (name, handle) in stages {
        while !handle.is_finished() && Instant::now() < cutoff {
            thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            if handle.join().is_err() {
                log::error!("{name} stage panicked");
            }
        } else {
            log::error!("{name} stage ignored cancellation; abandoning it");
        }
    }
}
