mod adapter;
mod backend;
mod backends;
mod geometry;

pub use adapter::{BackendFactory, Detector, DetectorError, DetectorStatus};
pub use backend::{DetectorBackend, RawDetection};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use geometry::{BoundingBox, Detection};

use crate::config::{TrackerdConfig, STUB_MODEL};

/// Build the backend constructor for the configured model.
///
/// `stub` (or any `stub://` name) selects the scripted backend; anything
/// else is treated as an ONNX model path and needs the `backend-tract`
/// feature. Construction itself is deferred to the adapter's first access.
pub fn backend_factory(cfg: &TrackerdConfig) -> BackendFactory {
    if cfg.model_path == STUB_MODEL || cfg.model_path.starts_with("stub://") {
        return Box::new(|| Ok(Box::new(StubBackend::new()) as Box<dyn DetectorBackend>));
    }

    let model_path = cfg.model_path.clone();

    #[cfg(feature = "backend-tract")]
    {
        let (width, height) = (cfg.input_width, cfg.input_height);
        let threshold = cfg.confidence_threshold;
        return Box::new(move || {
            let backend = TractBackend::new(&model_path, width, height)?.with_threshold(threshold);
            Ok(Box::new(backend) as Box<dyn DetectorBackend>)
        });
    }

    #[cfg(not(feature = "backend-tract"))]
    {
        Box::new(move || {
            Err(anyhow::anyhow!(
                "model '{}' needs the backend-tract feature; rebuild with \
                 --features backend-tract or set the model to '{}'",
                model_path,
                STUB_MODEL
            ))
        })
    }
}
