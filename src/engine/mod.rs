// Decoding engine module
// Foreign-call surface of the external H.265 decoder
//
// The engine is an opaque capability with four entry points: open, submit,
// flush, close. Decoded pictures come back through a per-call sink so the
// bridge logic stays testable against a scripted engine.

pub mod ffmpeg;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to initialize decoding engine: {0}")]
    Init(String),
    #[error("engine is already open")]
    AlreadyOpen,
    #[error("engine is closed")]
    Closed,
    #[error("decode failed: {0}")]
    Decode(String),
}

/// One decoded picture in engine-owned memory.
///
/// The slice borrows the engine's staging storage and is valid only for the
/// duration of the sink invocation; it is overwritten by the next decode or
/// flush call. Callers that need the pixels afterwards must copy them out
/// before returning.
#[derive(Debug)]
pub struct RawPicture<'a> {
    /// Tightly packed I420 bytes (Y, then U, then V, no row padding).
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

/// Frame-ready callback for a single submit or flush call.
pub type FrameSink<'a> = dyn FnMut(RawPicture<'_>) + 'a;

/// External decoding engine capability.
///
/// One engine instance backs at most one session: `open` fails with
/// `EngineError::AlreadyOpen` on a second call, and `submit`/`flush` fail
/// with `EngineError::Closed` once `close` has run.
pub trait DecodeEngine: Send {
    /// Allocate the decoder. Must be called before submit/flush.
    fn open(&mut self) -> Result<(), EngineError>;

    /// Decode one Annex-B access unit (or a concatenation of several).
    ///
    /// The engine may invoke `sink` zero or more times before returning;
    /// decoders commonly buffer several access units before the first output.
    fn submit(&mut self, data: &[u8], sink: &mut FrameSink<'_>) -> Result<(), EngineError>;

    /// Signal end-of-stream and drain all buffered pictures through `sink`.
    fn flush(&mut self, sink: &mut FrameSink<'_>) -> Result<(), EngineError>;

    /// Release all engine-owned memory. The sink is never invoked again.
    fn close(&mut self);

    /// Get engine info
    fn info(&self) -> &str;
}

/// Create the decoding engine for this build.
pub fn create_engine() -> Result<Box<dyn DecodeEngine>, EngineError> {
    let engine = ffmpeg::FfmpegEngine::new()?;
    log::info!("Using FFmpeg HEVC decoding engine");
    Ok(Box::new(engine))
}
