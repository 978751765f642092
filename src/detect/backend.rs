use anyhow::Result;

/// One raw model output box, in pixel coordinates of the input frame.
///
/// Backends emit these untouched; confidence filtering, label mapping and
/// coordinate normalization happen in the adapter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    /// Index into the class vocabulary.
    pub class_id: usize,
    /// Model confidence in [0, 1].
    pub confidence: f32,
    /// Corner coordinates in pixels (x1,y1 top-left, x2,y2 bottom-right).
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Detector backend trait.
///
/// Implementations run one inference at a time; the adapter serializes
/// access, so `detect` may freely use `&mut self` scratch state. The pixel
/// slice is tightly-packed RGB8, row-major.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. Returns every box the model produced;
    /// callers apply the confidence threshold.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, called once after construction.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
