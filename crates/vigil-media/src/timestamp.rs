// crates/vigil-media/src/timestamp.rs
//
// Output timestamp discipline shared by the re-broadcast and recorder
// stages. Muxers reject regressive timestamps, and live encoders sometimes
// yield AV_NOPTS_VALUE or duplicate values, so every packet passes through
// a monotonic guard after rescaling to the output stream time base:
// a missing or non-increasing DTS becomes `last_dts + duration`, and PTS is
// bumped the same way and clamped to `>= dts`.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::{Packet, Rational, Rescale};

/// One frame's duration (`1/fps`) expressed in `ost_tb` ticks, never zero.
pub fn packet_duration(fps: u32, ost_tb: Rational) -> i64 {
    1i64.rescale(Rational::new(1, fps.max(1) as i32), ost_tb).max(1)
}

pub struct MonotonicTs {
    duration: i64,
    last_pts: Option<i64>,
    last_dts: Option<i64>,
}

impl MonotonicTs {
    pub fn new(duration: i64) -> Self {
        Self { duration: duration.max(1), last_pts: None, last_dts: None }
    }

    /// Compute guarded `(pts, dts)` for a packet carrying these raw values.
    ///
    /// Guarantees across successive calls: DTS strictly increases, PTS never
    /// decreases, and `pts >= dts`.
    pub fn next(&mut self, pts: Option<i64>, dts: Option<i64>) -> (i64, i64) {
        let dts = match (dts, self.last_dts) {
            (Some(dts), Some(last)) if dts > last => dts,
            (Some(dts), None) => dts,
            (_, Some(last)) => last + self.duration,
            (None, None) => 0,
        };
        let pts = match (pts, self.last_pts) {
            (Some(pts), Some(last)) if pts > last => pts,
            (Some(pts), None) => pts,
            (_, Some(last)) => last + self.duration,
            (None, None) => 0,
        };
        let pts = pts.max(dts);
        self.last_dts = Some(dts);
        self.last_pts = Some(pts);
        (pts, dts)
    }

    /// Rewrite `pkt`'s timestamps in place. Call after `rescale_ts`.
    pub fn apply(&mut self, pkt: &mut Packet) {
        let (pts, dts) = self.next(pkt.pts(), pkt.dts());
        pkt.set_pts(Some(pts));
        pkt.set_dts(Some(dts));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_already_increasing() {
        let mut ts = MonotonicTs::new(10);
        assert_eq!(ts.next(Some(10), Some(10)), (10, 10));
        assert_eq!(ts.next(Some(20), Some(20)), (20, 20));
        assert_eq!(ts.next(Some(30), Some(30)), (30, 30));
    }

    #[test]
    fn duplicate_pts_is_bumped_by_duration() {
        // Decoder output [10, 20, 20, 30] must publish as
        // [10, 20, 20+d, 30+d] with strictly increasing DTS.
        let mut ts = MonotonicTs::new(10);
        let observed: Vec<(i64, i64)> = [10, 20, 20, 30]
            .into_iter()
            .map(|v| ts.next(Some(v), Some(v)))
            .collect();
        assert_eq!(observed, vec![(10, 10), (20, 20), (30, 30), (40, 40)]);
    }

    #[test]
    fn missing_timestamps_continue_from_last() {
        let mut ts = MonotonicTs::new(5);
        assert_eq!(ts.next(Some(100), Some(100)), (100, 100));
        assert_eq!(ts.next(None, None), (105, 105));
        assert_eq!(ts.next(None, None), (110, 110));
    }

    #[test]
    fn first_packet_without_timestamps_starts_at_zero() {
        let mut ts = MonotonicTs::new(5);
        assert_eq!(ts.next(None, None), (0, 0));
    }

    #[test]
    fn regressive_values_never_reach_the_output() {
        let mut ts = MonotonicTs::new(10);
        ts.next(Some(50), Some(50));
        let (pts, dts) = ts.next(Some(30), Some(30));
        assert_eq!((pts, dts), (60, 60));
    }

    #[test]
    fn dts_strictly_increases_and_pts_never_precedes_it() {
        let mut ts = MonotonicTs::new(3);
        let inputs = [Some(7i64), Some(7), None, Some(2), Some(40), Some(40)];
        let mut last_dts = i64::MIN;
        for raw in inputs {
            let (pts, dts) = ts.next(raw, raw);
            assert!(dts > last_dts);
            assert!(pts >= dts);
            last_dts = dts;
        }
    }

    #[test]
    fn duration_is_clamped_positive() {
        let mut ts = MonotonicTs::new(0);
        ts.next(Some(1), Some(1));
        assert_eq!(ts.next(Some(1), Some(1)), (2, 2));
    }
}
