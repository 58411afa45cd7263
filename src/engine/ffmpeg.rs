// FFmpeg-based H.265 decoding engine
// Annex-B access units in, tightly packed I420 pictures out

use super::{DecodeEngine, EngineError, FrameSink, RawPicture};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::Pixel;
use parking_lot::Mutex;

struct EngineState {
    decoder: ffmpeg::decoder::Video,
    /// Engine-owned staging buffer the sink borrows from. Overwritten on
    /// every emitted picture.
    staging: Vec<u8>,
    flushed: bool,
}

/// HEVC decoder behind FFmpeg's libavcodec.
pub struct FfmpegEngine {
    state: Option<Mutex<EngineState>>,
}

impl FfmpegEngine {
    pub fn new() -> Result<Self, EngineError> {
        // ffmpeg::init is idempotent
        ffmpeg::init().map_err(|e| EngineError::Init(format!("FFmpeg init failed: {}", e)))?;

        if cfg!(debug_assertions) {
            ffmpeg::log::set_level(ffmpeg::log::Level::Warning);
        }

        Ok(Self { state: None })
    }

    /// Pull every picture FFmpeg has ready and hand each to the sink.
    fn drain(state: &mut EngineState, sink: &mut FrameSink<'_>) -> Result<(), EngineError> {
        let mut decoded = ffmpeg::frame::Video::empty();
        while state.decoder.receive_frame(&mut decoded).is_ok() {
            Self::emit(state, &decoded, sink)?;
        }
        Ok(())
    }

    /// Tight-copy one decoded picture into the staging buffer and invoke the
    /// sink. FFmpeg pads rows out to its own alignment; downstream expects
    /// stride == plane width, so the padding is stripped here.
    fn emit(
        state: &mut EngineState,
        picture: &ffmpeg::frame::Video,
        sink: &mut FrameSink<'_>,
    ) -> Result<(), EngineError> {
        if picture.format() != Pixel::YUV420P {
            return Err(EngineError::Decode(format!(
                "unsupported pixel format {:?}, expected YUV420P",
                picture.format()
            )));
        }

        let width = picture.width();
        let height = picture.height();

        state.staging.clear();
        for plane in 0..3 {
            let plane_width = picture.plane_width(plane) as usize;
            let plane_height = picture.plane_height(plane) as usize;
            let stride = picture.stride(plane);
            let data = picture.data(plane);

            for row in 0..plane_height {
                let start = row * stride;
                state.staging.extend_from_slice(&data[start..start + plane_width]);
            }
        }

        sink(RawPicture {
            data: &state.staging,
            width,
            height,
        });

        Ok(())
    }
}

impl DecodeEngine for FfmpegEngine {
    fn open(&mut self) -> Result<(), EngineError> {
        if self.state.is_some() {
            return Err(EngineError::AlreadyOpen);
        }

        let codec = ffmpeg::decoder::find(ffmpeg::codec::Id::HEVC)
            .ok_or_else(|| EngineError::Init("HEVC decoder not present in this FFmpeg build".to_string()))?;

        let decoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .decoder()
            .video()
            .map_err(|e| EngineError::Init(format!("failed to open HEVC decoder: {}", e)))?;

        self.state = Some(Mutex::new(EngineState {
            decoder,
            staging: Vec::new(),
            flushed: false,
        }));

        log::info!("FFmpeg HEVC decoder opened");
        Ok(())
    }

    fn submit(&mut self, data: &[u8], sink: &mut FrameSink<'_>) -> Result<(), EngineError> {
        let state = self.state.as_ref().ok_or(EngineError::Closed)?;
        let mut state = state.lock();

        if state.flushed {
            return Err(EngineError::Decode("stream already flushed".to_string()));
        }

        let packet = ffmpeg::Packet::copy(data);
        state
            .decoder
            .send_packet(&packet)
            .map_err(|e| EngineError::Decode(format!("send_packet failed: {}", e)))?;

        Self::drain(&mut state, sink)
    }

    fn flush(&mut self, sink: &mut FrameSink<'_>) -> Result<(), EngineError> {
        let state = self.state.as_ref().ok_or(EngineError::Closed)?;
        let mut state = state.lock();

        if !state.flushed {
            state
                .decoder
                .send_eof()
                .map_err(|e| EngineError::Decode(format!("flush failed: {}", e)))?;
            state.flushed = true;
        }

        Self::drain(&mut state, sink)
    }

    fn close(&mut self) {
        // Dropping the context releases all libavcodec allocations
        if self.state.take().is_some() {
            log::debug!("FFmpeg HEVC decoder closed");
        }
    }

    fn info(&self) -> &str {
        "FFmpeg HEVC (libavcodec)"
    }
}
