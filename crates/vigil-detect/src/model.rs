// crates/vigil-detect/src/model.rs
//
// ORT session wrapper for a YOLOv8 detection model.
//
// The model takes a 1x3x640x640 RGB tensor normalized to [0,1] and yields a
// 1x84x8400 tensor: per anchor, center-x/center-y/width/height followed by
// 80 class scores. Postprocessing picks the argmax class per anchor,
// filters by confidence, runs NMS, and inverts the letterbox transform so
// boxes land in source-frame coordinates.

use ndarray::{Array4, ArrayView3, Axis};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use thiserror::Error;

use vigil_core::BoundingBox;

use crate::labels::COCO_CLASSES;
use crate::letterbox::{letterbox, Letterbox};
use crate::nms::{non_max_suppression, RawBox};

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("failed to load model '{path}': {source}")]
    ModelLoadFailed { path: String, source: ort::Error },

    #[error("inference failed: {0}")]
    InferenceFailed(#[from] ort::Error),

    #[error("model output has unexpected shape")]
    BadOutputShape,

    #[error("frame buffer does not match its stated dimensions")]
    BadFrame,
}

pub struct Detector {
    session:        Session,
    conf_threshold: f32,
    iou_threshold:  f32,
    input_size:     u32,
}

impl Detector {
    /// Load the ONNX model once, at stage startup. A missing or corrupt
    /// model is `ModelLoadFailed` — the detector stage terminates and the
    /// rest of the pipeline runs without detections.
    pub fn load(
        path: &str,
        conf_threshold: f32,
        iou_threshold: f32,
        input_size: u32,
    ) -> Result<Self, DetectError> {
        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.commit_from_file(path))
            .map_err(|source| DetectError::ModelLoadFailed { path: path.to_string(), source })?;

        Ok(Self { session, conf_threshold, iou_threshold, input_size })
    }

    /// Run detection over one packed RGB24 frame. Returned boxes are in
    /// source coordinates, ordered by descending confidence; the caller caps
    /// the count when building a batch.
    pub fn detect(
        &mut self,
        rgb: &[u8],
        src_w: u32,
        src_h: u32,
    ) -> Result<Vec<BoundingBox>, DetectError> {
        if rgb.len() != (src_w * src_h * 3) as usize || src_w == 0 || src_h == 0 {
            return Err(DetectError::BadFrame);
        }

        let (canvas, transform) = letterbox(rgb, src_w, src_h, self.input_size);
        let input = rgb_to_tensor(&canvas, self.input_size);

        let outputs = self
            .session
            .run(ort::inputs!["images" => TensorRef::from_array_view(&input)?])?;
        let output = outputs["output0"].try_extract_array::<f32>()?;
        let view = output
            .into_dimensionality::<ndarray::Ix3>()
            .map_err(|_| DetectError::BadOutputShape)?;

        let candidates = decode_anchors(&view, self.conf_threshold);
        let kept = non_max_suppression(candidates, self.iou_threshold);

        Ok(to_source_boxes(&kept, &transform, src_w, src_h))
    }
}

/// Pack a letterboxed RGB canvas into a normalized NCHW tensor.
fn rgb_to_tensor(canvas: &[u8], size: u32) -> Array4<f32> {
    let size = size as usize;
    let mut input = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let base = (y * size + x) * 3;
            for c in 0..3 {
                input[[0, c, y, x]] = canvas[base + c] as f32 / 255.0;
            }
        }
    }
    input
}

/// Decode the raw output tensor: argmax class per anchor, confidence
/// filter, center-format → corner-format. Boxes stay in letterboxed
/// coordinates here.
fn decode_anchors(view: &ArrayView3<'_, f32>, conf_threshold: f32) -> Vec<RawBox> {
    let channels = view.len_of(Axis(1));
    let anchors = view.len_of(Axis(2));
    if channels <= 4 {
        return Vec::new();
    }
    let classes = (channels - 4).min(COCO_CLASSES.len());

    let mut candidates = Vec::new();
    for i in 0..anchors {
        let mut class_id = 0usize;
        let mut score = 0.0f32;
        for c in 0..classes {
            let s = view[[0, 4 + c, i]];
            if s > score {
                score = s;
                class_id = c;
            }
        }
        if score < conf_threshold {
            continue;
        }
        let cx = view[[0, 0, i]];
        let cy = view[[0, 1, i]];
        let w = view[[0, 2, i]];
        let h = view[[0, 3, i]];
        candidates.push(RawBox {
            x: cx - w / 2.0,
            y: cy - h / 2.0,
            w,
            h,
            score,
            class_id,
        });
    }
    candidates
}

/// Map surviving candidates back through the letterbox transform and clamp
/// them to the source frame.
fn to_source_boxes(
    kept: &[RawBox],
    transform: &Letterbox,
    src_w: u32,
    src_h: u32,
) -> Vec<BoundingBox> {
    kept.iter()
        .map(|raw| {
            let (x, y, w, h) = transform.to_source(raw.x, raw.y, raw.w, raw.h);
            let x = x.clamp(0, src_w as i32 - 1);
            let y = y.clamp(0, src_h as i32 - 1);
            BoundingBox {
                x,
                y,
                w: w.clamp(0, src_w as i32 - x),
                h: h.clamp(0, src_h as i32 - y),
                confidence: raw.score,
                label: COCO_CLASSES[raw.class_id],
            }
        })
        .collect()
}
