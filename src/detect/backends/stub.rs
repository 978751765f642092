use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::detect::backend::{DetectorBackend, RawDetection};

/// Scripted backend for tests and model-less operation.
///
/// Returns the same canned detections for every frame. The optional delay
/// and in-flight gauges let tests observe that inference is serialized.
pub struct StubBackend {
    canned: Vec<RawDetection>,
    delay: Duration,
    in_flight: Option<Arc<AtomicUsize>>,
    peak: Option<Arc<AtomicUsize>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            canned: Vec::new(),
            delay: Duration::ZERO,
            in_flight: None,
            peak: None,
        }
    }

    pub fn with_detections(mut self, canned: Vec<RawDetection>) -> Self {
        self.canned = canned;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Track concurrent `detect` calls: `in_flight` is the live count,
    /// `peak` the maximum ever observed.
    pub fn with_gauges(mut self, in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Self {
        self.in_flight = Some(in_flight);
        self.peak = Some(peak);
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<RawDetection>> {
        if let Some(in_flight) = &self.in_flight {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(peak) = &self.peak {
                peak.fetch_max(now, Ordering::SeqCst);
            }
        }

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        if let Some(in_flight) = &self.in_flight {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        Ok(self.canned.clone())
    }
}
