// Decoder bridge module
// Session lifecycle over the external decoding engine
//
// The bridge owns the engine handle exclusively: encoded access units go in
// through `ingest`, decoded pictures come back through the registered frame
// callback. Pixel data is copied out of engine memory before each callback
// returns, so no engine buffer ever escapes its invocation.

use crate::engine::{DecodeEngine, EngineError, RawPicture};
use crate::frame::VideoFrame;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("failed to initialize decoding engine: {0}")]
    EngineInit(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("session is closed")]
    SessionClosed,
    #[error("session is already flushed")]
    SessionFlushed,
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Flushed,
    Closed,
}

/// Invoked once per decoded picture, in output order.
pub type FrameCallback = Box<dyn FnMut(VideoFrame) + Send>;

/// An active decoding session.
///
/// Owns the engine for its whole lifetime, so a second session over the same
/// engine instance cannot be constructed. Dropping the session closes it.
pub struct DecoderSession {
    engine: Box<dyn DecodeEngine>,
    on_frame: FrameCallback,
    state: SessionState,
}

impl std::fmt::Debug for DecoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderSession")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl DecoderSession {
    /// Initialize the engine and register the frame callback.
    pub fn open(
        mut engine: Box<dyn DecodeEngine>,
        on_frame: FrameCallback,
    ) -> Result<Self, DecoderError> {
        engine
            .open()
            .map_err(|e| DecoderError::EngineInit(e.to_string()))?;

        Ok(Self {
            engine,
            on_frame,
            state: SessionState::Created,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Decode one Annex-B access unit.
    ///
    /// The frame callback fires synchronously within this call, zero or more
    /// times. A decode error is reported but leaves the session running; the
    /// stream is expected to resynchronize on a later intra frame.
    pub fn ingest(&mut self, access_unit: &[u8]) -> Result<(), DecoderError> {
        match self.state {
            SessionState::Closed => return Err(DecoderError::SessionClosed),
            SessionState::Flushed => return Err(DecoderError::SessionFlushed),
            SessionState::Created | SessionState::Running => {}
        }
        self.state = SessionState::Running;

        self.engine
            .submit(access_unit, &mut forward(&mut *self.on_frame))
            .map_err(map_engine_error)
    }

    /// Signal end-of-stream and drain every buffered picture through the
    /// callback before returning. Idempotent once flushed.
    pub fn flush(&mut self) -> Result<(), DecoderError> {
        match self.state {
            SessionState::Closed => return Err(DecoderError::SessionClosed),
            SessionState::Flushed => return Ok(()),
            SessionState::Created | SessionState::Running => {}
        }

        self.engine
            .flush(&mut forward(&mut *self.on_frame))
            .map_err(map_engine_error)?;

        self.state = SessionState::Flushed;
        Ok(())
    }

    /// Release the engine and invalidate the session. The frame callback
    /// never fires again; frames already handed out stay valid.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            self.engine.close();
            self.state = SessionState::Closed;
        }
    }
}

impl Drop for DecoderSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Copy a picture out of engine memory and hand it to the frame callback.
fn forward(
    on_frame: &mut (dyn FnMut(VideoFrame) + Send),
) -> impl FnMut(RawPicture<'_>) + '_ {
    move |raw| match VideoFrame::from_i420(raw.data.to_vec(), raw.width, raw.height, None) {
        Ok(frame) => on_frame(frame),
        Err(e) => log::warn!("Dropping malformed picture from engine: {}", e),
    }
}

fn map_engine_error(e: EngineError) -> DecoderError {
    match e {
        EngineError::Closed => DecoderError::SessionClosed,
        other => DecoderError::Decode(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FrameSink, RawPicture};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const PIC_W: u32 = 4;
    const PIC_H: u32 = 2;
    const PIC_LEN: usize = 12; // 4*2*3/2

    /// Scripted engine: each submit emits the next count from `on_submit`;
    /// flush emits `on_flush` more. The first Y byte of each picture carries
    /// an emission sequence number so ordering is observable.
    struct FakeEngine {
        on_submit: VecDeque<usize>,
        on_flush: usize,
        next_seq: u8,
        opened: bool,
        closed: Arc<AtomicBool>,
        staging: Vec<u8>,
    }

    impl FakeEngine {
        fn new(on_submit: Vec<usize>, on_flush: usize) -> Self {
            Self {
                on_submit: on_submit.into(),
                on_flush,
                next_seq: 0,
                opened: false,
                closed: Arc::new(AtomicBool::new(false)),
                staging: Vec::new(),
            }
        }

        fn emit(&mut self, sink: &mut FrameSink<'_>) {
            self.staging = vec![0u8; PIC_LEN];
            self.staging[0] = self.next_seq;
            self.next_seq += 1;
            sink(RawPicture {
                data: &self.staging,
                width: PIC_W,
                height: PIC_H,
            });
        }
    }

    impl DecodeEngine for FakeEngine {
        fn open(&mut self) -> Result<(), EngineError> {
            if self.opened {
                return Err(EngineError::AlreadyOpen);
            }
            self.opened = true;
            Ok(())
        }

        fn submit(&mut self, data: &[u8], sink: &mut FrameSink<'_>) -> Result<(), EngineError> {
            if !self.opened || self.closed.load(Ordering::Relaxed) {
                return Err(EngineError::Closed);
            }
            if data == b"malformed" {
                return Err(EngineError::Decode("corrupt access unit".to_string()));
            }
            let count = self.on_submit.pop_front().unwrap_or(0);
            for _ in 0..count {
                self.emit(sink);
            }
            Ok(())
        }

        fn flush(&mut self, sink: &mut FrameSink<'_>) -> Result<(), EngineError> {
            if !self.opened || self.closed.load(Ordering::Relaxed) {
                return Err(EngineError::Closed);
            }
            for _ in 0..self.on_flush {
                self.emit(sink);
            }
            self.on_flush = 0;
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::Relaxed);
        }

        fn info(&self) -> &str {
            "Fake (scripted)"
        }
    }

    fn collecting_session(engine: FakeEngine) -> (DecoderSession, Arc<Mutex<Vec<VideoFrame>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = frames.clone();
        let session = DecoderSession::open(
            Box::new(engine),
            Box::new(move |frame| sink.lock().push(frame)),
        )
        .unwrap();
        (session, frames)
    }

    #[test]
    fn test_one_callback_per_access_unit_in_order() {
        let (mut session, frames) = collecting_session(FakeEngine::new(vec![1, 1, 1], 0));

        for _ in 0..3 {
            session.ingest(b"au").unwrap();
        }

        let frames = frames.lock();
        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.y()[0], i as u8);
            assert_eq!(frame.width(), PIC_W);
            assert_eq!(frame.height(), PIC_H);
        }
    }

    #[test]
    fn test_buffered_decode_emits_late() {
        // First access unit is buffered, second releases both pictures
        let (mut session, frames) = collecting_session(FakeEngine::new(vec![0, 2], 0));

        session.ingest(b"au1").unwrap();
        assert_eq!(frames.lock().len(), 0);

        session.ingest(b"au2").unwrap();
        assert_eq!(frames.lock().len(), 2);
    }

    #[test]
    fn test_flush_drains_and_is_idempotent() {
        let (mut session, frames) = collecting_session(FakeEngine::new(vec![0], 2));

        session.ingest(b"au").unwrap();
        assert_eq!(frames.lock().len(), 0);

        session.flush().unwrap();
        assert_eq!(frames.lock().len(), 2);
        assert_eq!(session.state(), SessionState::Flushed);

        session.flush().unwrap();
        assert_eq!(frames.lock().len(), 2);
    }

    #[test]
    fn test_ingest_after_flush_rejected() {
        let (mut session, _frames) = collecting_session(FakeEngine::new(vec![], 0));

        session.flush().unwrap();
        let err = session.ingest(b"au").unwrap_err();
        assert!(matches!(err, DecoderError::SessionFlushed));
    }

    #[test]
    fn test_closed_session_rejects_calls() {
        let (mut session, frames) = collecting_session(FakeEngine::new(vec![1], 1));

        session.close();
        assert_eq!(session.state(), SessionState::Closed);

        assert!(matches!(
            session.ingest(b"au").unwrap_err(),
            DecoderError::SessionClosed
        ));
        assert!(matches!(
            session.flush().unwrap_err(),
            DecoderError::SessionClosed
        ));
        assert_eq!(frames.lock().len(), 0);
    }

    #[test]
    fn test_decode_error_keeps_session_running() {
        let (mut session, frames) = collecting_session(FakeEngine::new(vec![1], 0));

        let err = session.ingest(b"malformed").unwrap_err();
        assert!(matches!(err, DecoderError::Decode(_)));
        assert_eq!(session.state(), SessionState::Running);

        session.ingest(b"au").unwrap();
        assert_eq!(frames.lock().len(), 1);
    }

    #[test]
    fn test_open_rejected_when_engine_already_open() {
        let mut engine = FakeEngine::new(vec![], 0);
        engine.open().unwrap();

        let err = DecoderSession::open(Box::new(engine), Box::new(|_| {})).unwrap_err();
        assert!(matches!(err, DecoderError::EngineInit(_)));
    }

    #[test]
    fn test_drop_closes_engine() {
        let engine = FakeEngine::new(vec![], 0);
        let closed = engine.closed.clone();

        let (session, _frames) = collecting_session(engine);
        assert!(!closed.load(Ordering::Relaxed));

        drop(session);
        assert!(closed.load(Ordering::Relaxed));
    }
}
