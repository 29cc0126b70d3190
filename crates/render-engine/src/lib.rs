//! Stillmotion Render Engine
//!
//! Turns an ordered set of stills and [`RenderSettings`] into one
//! invocation of an external encoder, and supervises that invocation.
//!
//! # Pipeline Architecture
//!
//! ```text
//! SourceImage[] ──► ImagePreparer ──► workspace/image_000.jpg ...
//!                                              │
//! RenderSettings ──► FilterGraphBuilder ───────┤
//!                                              ▼
//!                                      assemble() ──► EncodeCommand
//!                                                          │
//!                                                          ▼
//!                                     EncodeEngine::launch ──► EngineSession
//!                                                          │  (statistics, exit)
//!                                                          ▼
//!                                  EncodeSessionController ──► slideshow_<ms>.mp4
//! ```
//!
//! [`RenderSettings`]: stillmotion_model::RenderSettings

pub mod command;
pub mod diagnostics;
pub mod engine;
pub mod filter_graph;
pub mod prepare;
pub mod session;
pub mod workspace;

pub use command::{assemble, EncodeCommand, EncoderSelection, InputDirective};
pub use diagnostics::classify;
pub use engine::{
    EncodeEngine, EncodeStatistics, EngineEvent, EngineExit, EngineSession, EngineSink,
    FfmpegEngine,
};
pub use filter_graph::{FilterGraph, FilterGraphBuilder, FilterNode, NodeRole, Port, Stage};
pub use prepare::{
    converter_from_config, describe_source, FfmpegStillConverter, ImageConverter,
    ImagePreparer, Preparation, RasterConverter, StagedImage,
};
pub use session::{ControllerConfig, EncodeSessionController, RenderCallbacks, RenderHandle};
pub use workspace::{finalize_output, Workspace, WorkspaceManager};
