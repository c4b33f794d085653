// crates/vigil-core/src/warning.rs
//
// Warning debouncer: stages record qualifying detections from any thread;
// a ticker thread evaluates the count once per window and fires the alert
// callback at most once per window. Generic over the frame handle so this
// crate stays free of ffmpeg types.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// How often the ticker checks whether the window has elapsed.
const TICK: Duration = Duration::from_millis(10);

/// Snapshot handed to the alert callback when a window crosses the threshold.
pub struct WarningEvent<T> {
    /// Qualifying `record` calls inside the window that fired.
    pub count:     u32,
    pub window_ms: u64,
    /// Label of the most recent qualifying detection.
    pub label:     &'static str,
    /// Unix timestamp (seconds) of the most recent qualifying detection.
    pub timestamp: i64,
    /// Frame reference of the most recent qualifying detection.
    pub frame:     T,
}

struct WindowState<T> {
    count:  u32,
    latest: Option<(&'static str, i64, T)>,
}

/// Counts qualifying detections per sliding window and invokes a callback
/// when the count reaches the threshold.
///
/// The callback runs on the ticker thread and must return well within one
/// window, or subsequent windows will fire late.
pub struct WarningDebouncer<T> {
    state:   Arc<Mutex<WindowState<T>>>,
    running: Arc<AtomicBool>,
    ticker:  Option<JoinHandle<()>>,
}

impl<T: Send + 'static> WarningDebouncer<T> {
    pub fn start<F>(window_ms: u64, threshold: u32, callback: F) -> Self
    where
        F: Fn(WarningEvent<T>) + Send + 'static,
    {
        let state = Arc::new(Mutex::new(WindowState { count: 0, latest: None }));
        let running = Arc::new(AtomicBool::new(true));

        let tick_state = Arc::clone(&state);
        let tick_running = Arc::clone(&running);
        let ticker = thread::Builder::new()
            .name("warning-ticker".into())
            .spawn(move || {
                let mut window_start = Instant::now();
                while tick_running.load(Ordering::Relaxed) {
                    thread::sleep(TICK);
                    if window_start.elapsed().as_millis() as u64 >= window_ms {
                        let fired = {
                            let mut state = tick_state.lock();
                            let fired = if state.count >= threshold {
                                state.latest.take().map(|(label, timestamp, frame)| WarningEvent {
                                    count: state.count,
                                    window_ms,
                                    label,
                                    timestamp,
                                    frame,
                                })
                            } else {
                                None
                            };
                            state.count = 0;
                            fired
                        };
                        // Callback runs outside the lock so `record` never stalls.
                        if let Some(event) = fired {
                            callback(event);
                        }
                        window_start = Instant::now();
                    }
                }
            })
            .expect("spawn warning ticker");

        Self { state, running, ticker: Some(ticker) }
    }

    /// Record one qualifying detection. Safe from any stage thread.
    pub fn record(&self, label: &'static str, timestamp: i64, frame: T) {
        let previous;
        {
            let mut state = self.state.lock();
            state.count += 1;
            previous = state.latest.replace((label, timestamp, frame));
        }
        // The superseded frame reference is released outside the lock.
        drop(previous);
    }

    /// Stop the ticker and join it. Idempotent; also runs on drop.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.ticker.take() {
            let _ = handle.join();
        }
    }
}

impl<T> Drop for WarningDebouncer<T> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.ticker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fired {
        count: u32,
        label: &'static str,
        frame: u8,
    }

    fn collector() -> (Arc<Mutex<Vec<Fired>>>, impl Fn(WarningEvent<u8>) + Send + 'static) {
        let events: Arc<Mutex<Vec<Fired>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback = move |event: WarningEvent<u8>| {
            sink.lock().push(Fired {
                count: event.count,
                label: event.label,
                frame: event.frame,
            });
        };
        (events, callback)
    }

    #[test]
    fn fires_once_when_threshold_met_then_resets() {
        let (events, callback) = collector();
        let debouncer = WarningDebouncer::start(100, 10, callback);

        // Twelve records inside the first window.
        for i in 0..12 {
            debouncer.record("person", 1_700_000_000 + i, i as u8);
        }
        thread::sleep(Duration::from_millis(250));
        {
            let events = events.lock();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].count, 12);
            assert_eq!(events[0].label, "person");
            assert_eq!(events[0].frame, 11);
        }

        // Three records in a later window: below threshold, no second fire.
        for i in 0..3 {
            debouncer.record("person", 1_700_000_100 + i, i as u8);
        }
        thread::sleep(Duration::from_millis(250));
        assert_eq!(events.lock().len(), 1);
    }

    #[test]
    fn below_threshold_never_fires() {
        let (events, callback) = collector();
        let _debouncer = WarningDebouncer::start(50, 5, callback);
        thread::sleep(Duration::from_millis(150));
        assert!(events.lock().is_empty());
    }

    #[test]
    fn stop_joins_ticker() {
        let (_, callback) = collector();
        let mut debouncer = WarningDebouncer::start(50, 1, callback);
        debouncer.record("person", 0, 0);
        debouncer.stop();
        debouncer.stop();
    }

    #[test]
    fn record_is_safe_across_threads() {
        let (events, callback) = collector();
        let debouncer = Arc::new(WarningDebouncer::start(100, 8, callback));
        let mut handles = Vec::new();
        for t in 0..4 {
            let debouncer = Arc::clone(&debouncer);
            handles.push(thread::spawn(move || {
                for _ in 0..2 {
                    debouncer.record("car", 0, t);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        thread::sleep(Duration::from_millis(250));
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].count, 8);
    }
}
