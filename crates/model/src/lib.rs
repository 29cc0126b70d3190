//! Stillmotion Data Model
//!
//! Defines the values that flow into and out of the rendering pipeline:
//! - [`SourceImage`]: a caller-owned still referenced by path or URI
//! - [`RenderSettings`]: resolution, per-image duration, transition style
//! - [`SessionSnapshot`]: the observable record of one render attempt
//!
//! Pipeline-wide constants (transition length, frame rate, bitrate) also
//! live here so every crate agrees on them.

pub mod image;
pub mod session;
pub mod settings;

pub use image::{SelectionError, SelectionLimits, SourceImage};
pub use session::{progress_percent, RenderStatus, SessionSnapshot, RUNNING_PROGRESS_CAP};
pub use settings::{
    ImageDuration, RenderSettings, Resolution, TransitionStyle, CONVERSION_QUALITY,
    PIXEL_FORMAT, TRANSITION_DURATION_SECS, VIDEO_BITRATE, VIDEO_FPS,
};
