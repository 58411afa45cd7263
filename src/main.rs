// hevc-player binary
// Plays an H.265 Annex-B elementary stream into a native window

use anyhow::{bail, Context};
use ffmpeg_next as ffmpeg;
use hevc_player::decoder::{DecoderError, DecoderSession};
use hevc_player::engine::create_engine;
use hevc_player::renderer::{RenderWindow, RendererConfig, WindowEvent};
use std::path::PathBuf;
use std::time::Duration;

struct Options {
    input: PathBuf,
    config: RendererConfig,
}

fn parse_args() -> anyhow::Result<Options> {
    let mut input = None;
    let mut config = RendererConfig::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--backend" => {
                let value = args.next().context("--backend requires a value")?;
                config.backend = value.parse()?;
            }
            "--config" => {
                let value = args.next().context("--config requires a path")?;
                config = RendererConfig::load(value.as_ref())?;
            }
            "--help" | "-h" => {
                bail!("usage: hevc-player <stream.h265> [--backend raster|accelerated] [--config file.json]");
            }
            _ if input.is_none() => input = Some(PathBuf::from(arg)),
            other => bail!("unexpected argument {:?}", other),
        }
    }

    Ok(Options {
        input: input.context(
            "usage: hevc-player <stream.h265> [--backend raster|accelerated] [--config file.json]",
        )?,
        config,
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let options = parse_args()?;

    // ffmpeg::init is idempotent; the engine calls it again later
    ffmpeg::init().context("failed to initialize FFmpeg")?;

    let mut input = ffmpeg::format::input(&options.input)
        .with_context(|| format!("failed to open {}", options.input.display()))?;

    let (stream_index, frame_interval) = {
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .context("no video stream in input")?;

        let rate = stream.avg_frame_rate();
        let interval = if rate.numerator() > 0 {
            Duration::from_secs_f64(rate.denominator() as f64 / rate.numerator() as f64)
        } else {
            Duration::from_millis(33)
        };
        (stream.index(), interval)
    };

    let window = RenderWindow::create("hevc-player", 1280, 720, options.config.backend)?;

    // Frames flow from the decode callback straight into the window; the
    // bounded frame channel paces the decode loop against the renderer.
    let frame_sink = window.clone();
    let mut session = DecoderSession::open(
        create_engine()?,
        Box::new(move |frame| {
            if let Err(e) = frame_sink.draw(frame) {
                log::debug!("Frame dropped: {}", e);
            }
        }),
    )?;

    log::info!("Playing {}", options.input.display());

    for (stream, packet) in input.packets() {
        if stream.index() != stream_index {
            continue;
        }
        if !window.is_open() {
            log::info!("Window closed, stopping playback");
            break;
        }

        let Some(data) = packet.data() else { continue };
        match session.ingest(data) {
            Ok(()) => {}
            // Recoverable: the stream resynchronizes on a later intra frame
            Err(e @ DecoderError::Decode(_)) => log::warn!("Skipping access unit: {}", e),
            Err(other) => return Err(other.into()),
        }

        std::thread::sleep(frame_interval);
    }

    if window.is_open() {
        session.flush()?;
    }
    session.close();
    log::info!("End of stream");

    // Keep the window up until the user closes it
    while window.is_open() {
        match window.recv_event() {
            Some(WindowEvent::CloseRequested) | None => break,
            Some(_) => {}
        }
    }

    Ok(())
}
