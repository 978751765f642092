#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectorBackend, RawDetection};

/// Tract-based backend running a YOLO-family ONNX detection model.
///
/// Expects the usual export layout: NCHW f32 input scaled to [0, 1], one
/// output of shape `[1, 4 + num_classes, anchors]` holding center-format
/// boxes followed by per-class scores.
pub struct TractBackend {
    model: TypedSimplePlan<TypedModel>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
        })
    }

    /// Override the default confidence threshold used to prune anchors.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Letterbox the frame into the model input: scale preserving aspect
    /// ratio, pad the remainder with neutral gray. Returns the tensor and
    /// the scale ratio needed to map boxes back to frame pixels.
    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<(Tensor, f32)> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let frame = RgbImage::from_raw(width, height, pixels.to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match dimensions"))?;

        let ratio = (self.width as f32 / width as f32).min(self.height as f32 / height as f32);
        let scaled_w = ((width as f32 * ratio).round() as u32).max(1);
        let scaled_h = ((height as f32 * ratio).round() as u32).max(1);
        let resized = image::imageops::resize(
            &frame,
            scaled_w,
            scaled_h,
            image::imageops::FilterType::Triangle,
        );

        let mut input = tract_ndarray::Array4::<f32>::from_elem(
            (1, 3, self.height as usize, self.width as usize),
            144.0 / 255.0,
        );
        for (x, y, pixel) in resized.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            input[[0, 0, y as usize, x as usize]] = r as f32 / 255.0;
            input[[0, 1, y as usize, x as usize]] = g as f32 / 255.0;
            input[[0, 2, y as usize, x as usize]] = b as f32 / 255.0;
        }

        Ok((input.into_tensor(), ratio))
    }

    fn decode_output(
        &self,
        output: &Tensor,
        ratio: f32,
        frame_w: u32,
        frame_h: u32,
    ) -> Result<Vec<RawDetection>> {
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        if shape.len() != 3 || shape[1] < 5 {
            return Err(anyhow!(
                "unexpected detection output shape {:?}, want [1, 4+classes, anchors]",
                shape
            ));
        }
        let num_classes = shape[1] - 4;
        let anchors = shape[2];
        let frame_w = frame_w as f32;
        let frame_h = frame_h as f32;

        let mut boxes = Vec::new();
        for a in 0..anchors {
            let mut class_id = 0usize;
            let mut confidence = f32::NEG_INFINITY;
            for c in 0..num_classes {
                let score = view[[0, 4 + c, a]];
                if score > confidence {
                    confidence = score;
                    class_id = c;
                }
            }
            if !confidence.is_finite() || confidence < self.confidence_threshold {
                continue;
            }

            let cx = view[[0, 0, a]] / ratio;
            let cy = view[[0, 1, a]] / ratio;
            let w = view[[0, 2, a]] / ratio;
            let h = view[[0, 3, a]] / ratio;

            boxes.push(RawDetection {
                class_id,
                confidence,
                x1: (cx - w / 2.0).clamp(0.0, frame_w),
                y1: (cy - h / 2.0).clamp(0.0, frame_h),
                x2: (cx + w / 2.0).clamp(0.0, frame_w),
                y2: (cy + h / 2.0).clamp(0.0, frame_h),
            });
        }

        non_max_suppression(&mut boxes, self.iou_threshold);
        Ok(boxes)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let (input, ratio) = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        self.decode_output(output, ratio, width, height)
    }
}

/// Greedy NMS: keep boxes in confidence order, dropping any that overlap an
/// already-kept box beyond the IoU threshold.
fn non_max_suppression(boxes: &mut Vec<RawDetection>, iou_threshold: f32) {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..boxes.len() {
        let mut drop = false;
        for prev in 0..kept {
            if iou(&boxes[prev], &boxes[index]) > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            boxes.swap(kept, index);
            kept += 1;
        }
    }
    boxes.truncate(kept);
}

fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let intersection = ix * iy;
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}
