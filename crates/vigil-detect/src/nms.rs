// crates/vigil-detect/src/nms.rs
//
// Greedy non-maximum suppression over raw candidate boxes, highest
// confidence first. Class-agnostic, matching the original postprocess.

/// A candidate in letterboxed coordinates, before NMS and back-mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RawBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub score: f32,
    pub class_id: usize,
}

pub(crate) fn iou(a: &RawBox, b: &RawBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.w).min(b.x + b.w);
    let y2 = (a.y + a.h).min(b.y + b.h);
    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.w * a.h + b.w * b.h - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Keep the highest-confidence box of each overlapping cluster. The result
/// is ordered by descending confidence.
pub(crate) fn non_max_suppression(mut candidates: Vec<RawBox>, iou_threshold: f32) -> Vec<RawBox> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<RawBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(x: f32, y: f32, score: f32) -> RawBox {
        RawBox { x, y, w: 100.0, h: 100.0, score, class_id: 0 }
    }

    #[test]
    fn identical_boxes_have_unit_iou() {
        let a = make_box(10.0, 10.0, 0.9);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_boxes_have_zero_iou() {
        let a = make_box(0.0, 0.0, 0.9);
        let b = make_box(500.0, 500.0, 0.8);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn half_overlap_iou() {
        // Two 100x100 boxes offset by 50 in x: intersection 50*100 = 5000,
        // union 20000 - 5000 = 15000.
        let a = make_box(0.0, 0.0, 0.9);
        let b = make_box(50.0, 0.0, 0.8);
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn suppresses_lower_confidence_duplicate() {
        let kept = non_max_suppression(
            vec![make_box(0.0, 0.0, 0.6), make_box(2.0, 2.0, 0.9)],
            0.5,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].score, 0.9);
    }

    #[test]
    fn keeps_non_overlapping_boxes_sorted_by_confidence() {
        let kept = non_max_suppression(
            vec![
                make_box(0.0, 0.0, 0.5),
                make_box(500.0, 0.0, 0.9),
                make_box(0.0, 500.0, 0.7),
            ],
            0.5,
        );
        let scores: Vec<f32> = kept.iter().map(|k| k.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.5]);
    }

    #[test]
    fn threshold_boundary_is_not_suppressed() {
        // IoU exactly at the threshold survives (`<=` keeps it).
        let a = make_box(0.0, 0.0, 0.9);
        let b = make_box(50.0, 0.0, 0.8); // IoU = 1/3
        let kept = non_max_suppression(vec![a, b], 1.0 / 3.0);
        assert_eq!(kept.len(), 2);
    }
}
