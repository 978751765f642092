//! tracker-kernel
//!
//! A local, long-lived detection/tracking service. A host application (for
//! example a camera-following desktop UI) posts frames over HTTP; the
//! service runs them through a shared object-detection model and reports
//! where the current target sits in normalized screen space.
//!
//! # Architecture
//!
//! - `detect`: the detector adapter. One shared model instance behind a
//!   mutex (one inference at a time), lazy load with cached failure,
//!   confidence filtering, pixel-to-screen-space normalization.
//! - `track`: the tracking decisions. Alias resolution from loose user
//!   terms to canonical class labels, face/object target selection, and the
//!   face-vs-object mode state machine.
//! - `api`: the HTTP surface tying the two together per endpoint.
//! - `ingest`: base64 / data-URL frame decoding.
//! - `config`: file + environment configuration for the `trackerd` daemon.
//!
//! Detections live for one request; tracking mode lives for the process;
//! nothing is persisted.

pub mod api;
pub mod classes;
pub mod config;
pub mod detect;
pub mod ingest;
pub mod track;

pub use api::{ApiConfig, ApiHandle, ApiServer, AppState};
pub use config::TrackerdConfig;
pub use detect::{
    backend_factory, Detection, Detector, DetectorBackend, DetectorError, RawDetection,
    StubBackend,
};
pub use track::{AliasTable, DistanceBand, FoundTarget, TrackingState, TrackingTarget};
