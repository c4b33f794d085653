// crates/vigil-app/src/renderer.rs
//
// Renderer stage: present frames at the target rate with the newest
// detection batch drawn on top.
//
// Frames and batches arrive at unrelated rates, so the stage caches the
// most recent batch and redraws it on every frame — boxes persist between
// detector updates instead of flickering. Pacing is display-side only:
// each iteration sleeps off the remainder of its 1/TARGET_FPS budget and
// missed deadlines are not chased.

use std::thread;
use std::time::{Duration, Instant};

use minifb::{Key, Window, WindowOptions};

use vigil_core::{config, CancelToken, DequeueError, DetectionBatch, FrameQueue};
use vigil_media::{QueueItem, RgbConverter};

use crate::fps::FpsCounter;
use crate::overlay;

pub fn run(
    display_queue: &FrameQueue<QueueItem>,
    box_queue: &FrameQueue<QueueItem>,
    token: &CancelToken,
) -> Result<(), String> {
    let mut window = Window::new(
        "vigil",
        config::FRAME_WIDTH as usize,
        config::FRAME_HEIGHT as usize,
        WindowOptions::default(),
    )
    .map_err(|e| format!("window creation failed: {e}"))?;
    // This loop paces itself; minifb's own limiter stays out of the way.
    window.set_target_fps(0);

    let frame_budget = Duration::from_millis(1000 / u64::from(config::TARGET_FPS));
    let mut fps = FpsCounter::new(Duration::from_secs(1));
    let mut converter = RgbConverter::new();
    let mut cached: Option<DetectionBatch> = None;

    while window.is_open() && !window.is_key_down(Key::Escape) {
        if token.is_cancelled() {
            break;
        }
        let started = Instant::now();

        match display_queue.dequeue_timeout(config::DEQUEUE_POLL) {
            Ok(QueueItem::Frame(frame)) => {
                let rgb = converter.convert(&frame).map_err(|e| e.to_string())?;
                let (w, h) = (rgb.width as usize, rgb.height as usize);
                let mut buffer = overlay::pack_rgb(&rgb.data);

                // Non-blocking poll for detector output; newest batch wins.
                loop {
                    match box_queue.try_dequeue() {
                        Ok(QueueItem::Boxes(batch)) => cached = Some(batch),
                        Ok(other) => {
                            log::error!(
                                "box queue delivered a {} item; dropping it",
                                other.describe()
                            );
                        }
                        Err(_) => break,
                    }
                }
                if let Some(batch) = &cached {
                    overlay::draw_batch(&mut buffer, w, h, batch);
                }

                let rate = fps.tick(Instant::now());
                overlay::draw_text(&mut buffer, w, h, 8, 8, &format!("FPS {rate:.1}"), overlay::GREEN);

                window
                    .update_with_buffer(&buffer, w, h)
                    .map_err(|e| format!("present failed: {e}"))?;
            }
            Ok(other) => {
                log::error!("display queue delivered a {} item; dropping it", other.describe());
            }
            // Keep pumping window events while the queue is quiet so close
            // and Escape stay responsive.
            Err(DequeueError::TimedOut) => window.update(),
            Err(_) => break, // Closed and drained.
        }

        let elapsed = started.elapsed();
        if elapsed < frame_budget {
            thread::sleep(frame_budget - elapsed);
        }
    }

    // However this loop ends — window closed, Escape, queue closed — the
    // pipeline goes down with it, matching a player-driven quit.
    token.cancel();
    Ok(())
}
