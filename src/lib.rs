// hevc-player - H.265 elementary stream playback
// Main library entry point
//
// Data flow: encoded access units -> DecoderSession (bridge over the FFmpeg
// engine) -> VideoFrame -> FrameRenderer (accelerated or raster) -> screen.

pub mod decoder;
pub mod engine;
pub mod frame;
pub mod renderer;

pub use decoder::{DecoderError, DecoderSession, SessionState};
pub use engine::{DecodeEngine, EngineError};
pub use frame::{FrameError, VideoFrame};
pub use renderer::{FrameRenderer, RendererBackend, RendererConfig, RendererError};
