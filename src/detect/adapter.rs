//! Shared detector adapter.
//!
//! The whole service shares a single model instance. `Detector` wraps it in a
//! mutex so at most one inference runs at a time; concurrent callers wait for
//! the lock up to a configured deadline and then fail with a retryable
//! `Busy` error instead of queuing without bound.
//!
//! Backend construction is lazy and one-shot: the first access attempts it,
//! and a failure is cached so later requests fail fast with the original
//! cause rather than re-attempting a load per request.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::Result;
use image::RgbImage;

use crate::classes;

use super::backend::DetectorBackend;
use super::geometry::{self, Detection};

const STATE_PENDING: u8 = 0;
const STATE_READY: u8 = 1;
const STATE_FAILED: u8 = 2;

/// Failures the HTTP layer must tell apart: a busy detector is retryable,
/// an unavailable one is not.
#[derive(Clone, Debug)]
pub enum DetectorError {
    /// The inference lock could not be acquired within the deadline.
    Busy,
    /// The backend could not be initialized; the cause is cached.
    Unavailable(String),
    /// A single inference call failed.
    Inference(String),
}

impl std::fmt::Display for DetectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorError::Busy => write!(f, "detector busy, retry later"),
            DetectorError::Unavailable(cause) => write!(f, "detector not available: {}", cause),
            DetectorError::Inference(cause) => write!(f, "detection failed: {}", cause),
        }
    }
}

impl std::error::Error for DetectorError {}

/// Deferred backend constructor, run under the inference lock on first use.
pub type BackendFactory = Box<dyn FnOnce() -> Result<Box<dyn DetectorBackend>> + Send>;

enum BackendSlot {
    Pending(Option<BackendFactory>),
    Ready(Box<dyn DetectorBackend>),
    Failed(String),
}

/// Liveness snapshot for the health endpoint.
#[derive(Clone, Copy, Debug)]
pub struct DetectorStatus {
    /// False once initialization has failed.
    pub available: bool,
    /// True once a backend is constructed and warmed up.
    pub loaded: bool,
}

pub struct Detector {
    slot: Mutex<BackendSlot>,
    state: AtomicU8,
    confidence_threshold: f32,
    lock_timeout: Duration,
}

impl Detector {
    pub fn new(factory: BackendFactory, confidence_threshold: f32, lock_timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(BackendSlot::Pending(Some(factory))),
            state: AtomicU8::new(STATE_PENDING),
            confidence_threshold,
            lock_timeout,
        }
    }

    /// Force backend initialization now. `trackerd` calls this once at
    /// startup so a load failure is reported a single time in the log.
    pub fn ensure_loaded(&self) -> Result<(), DetectorError> {
        let mut guard = self.lock_with_deadline()?;
        self.ready_backend(&mut guard).map(|_| ())
    }

    /// Lock-free status snapshot; never blocks on a running inference.
    pub fn status(&self) -> DetectorStatus {
        match self.state.load(Ordering::SeqCst) {
            STATE_READY => DetectorStatus {
                available: true,
                loaded: true,
            },
            STATE_FAILED => DetectorStatus {
                available: false,
                loaded: false,
            },
            _ => DetectorStatus {
                available: true,
                loaded: false,
            },
        }
    }

    /// Run one inference and return normalized detections at or above the
    /// confidence threshold. Below-threshold boxes never leave the adapter.
    pub fn detect_frame(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let (width, height) = (image.width(), image.height());

        let raw = {
            let mut guard = self.lock_with_deadline()?;
            let backend = self.ready_backend(&mut guard)?;
            backend
                .detect(image.as_raw(), width, height)
                .map_err(|e| DetectorError::Inference(e.to_string()))?
        };

        Ok(raw
            .iter()
            .filter(|r| r.confidence >= self.confidence_threshold)
            .map(|r| geometry::normalize(r, classes::label_for(r.class_id), width, height))
            .collect())
    }

    fn lock_with_deadline(&self) -> Result<MutexGuard<'_, BackendSlot>, DetectorError> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match self.slot.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(std::sync::TryLockError::Poisoned(_)) => {
                    return Err(DetectorError::Unavailable(
                        "inference lock poisoned".to_string(),
                    ))
                }
                Err(std::sync::TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(DetectorError::Busy);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }

    fn ready_backend<'a>(
        &self,
        guard: &'a mut MutexGuard<'_, BackendSlot>,
    ) -> Result<&'a mut Box<dyn DetectorBackend>, DetectorError> {
        if let BackendSlot::Pending(factory) = &mut **guard {
            let factory = factory
                .take()
                .expect("pending slot always holds its factory");
            match factory().and_then(|mut backend| {
                backend.warm_up()?;
                Ok(backend)
            }) {
                Ok(backend) => {
                    log::info!("detector backend '{}' loaded", backend.name());
                    **guard = BackendSlot::Ready(backend);
                    self.state.store(STATE_READY, Ordering::SeqCst);
                }
                Err(e) => {
                    let cause = e.to_string();
                    log::error!("detector backend failed to load: {}", cause);
                    **guard = BackendSlot::Failed(cause);
                    self.state.store(STATE_FAILED, Ordering::SeqCst);
                }
            }
        }

        match &mut **guard {
            BackendSlot::Ready(backend) => Ok(backend),
            BackendSlot::Failed(cause) => Err(DetectorError::Unavailable(cause.clone())),
            BackendSlot::Pending(_) => unreachable!("slot resolved above"),
        }
    }
}
