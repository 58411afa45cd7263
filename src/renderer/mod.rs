// Renderer module
// Dual-backend frame presentation: GPU-accelerated with raster fallback

mod raster;
mod wgpu_renderer;
mod window;

pub use raster::RasterRenderer;
pub use wgpu_renderer::AcceleratedRenderer;
pub use window::{RenderWindow, RenderWindowHandle, WindowEvent};

use crate::frame::VideoFrame;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use winit::window::Window;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("drawing surface unavailable: {0}")]
    SurfaceUnavailable(String),
    #[error("accelerated backend unavailable: {0}")]
    AcceleratedUnavailable(String),
    #[error("render failed: {0}")]
    Render(String),
    #[error("window error: {0}")]
    Window(String),
    #[error("invalid renderer configuration: {0}")]
    Config(String),
}

/// Renderer backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RendererBackend {
    /// GPU path; falls back to raster when the platform has no usable GPU.
    #[default]
    Accelerated,
    /// CPU path, always available when a window surface exists.
    Raster,
}

impl std::str::FromStr for RendererBackend {
    type Err = RendererError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accelerated" => Ok(Self::Accelerated),
            "raster" => Ok(Self::Raster),
            other => Err(RendererError::Config(format!(
                "unknown backend {:?}, expected \"raster\" or \"accelerated\"",
                other
            ))),
        }
    }
}

/// Renderer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RendererConfig {
    #[serde(default)]
    pub backend: RendererBackend,
}

impl RendererConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, RendererError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RendererError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            RendererError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }
}

/// Frame presentation capability.
///
/// `draw` consumes the frame: it is uploaded, presented and released within
/// the one call, and the `&mut` receiver keeps draws serialized. Renderers
/// stay on the thread that owns their window surface.
pub trait FrameRenderer {
    fn draw(&mut self, frame: VideoFrame) -> Result<(), RendererError>;

    /// Get renderer info
    fn info(&self) -> &str;
}

/// Create the requested renderer for this window.
///
/// The accelerated backend degrades to raster when the platform reports no
/// GPU capability; the raster backend has no further fallback.
pub fn create_renderer(
    backend: RendererBackend,
    window: Arc<Window>,
) -> Result<Box<dyn FrameRenderer>, RendererError> {
    match backend {
        RendererBackend::Accelerated => {
            let mut renderer = AcceleratedRenderer::new(window.clone());
            match renderer.wait_ready() {
                Ok(()) => {
                    log::info!("Using GPU-accelerated renderer");
                    return Ok(Box::new(renderer));
                }
                Err(e) => log::warn!("Accelerated renderer not available: {}", e),
            }

            let renderer = RasterRenderer::new(window)?;
            log::info!("Falling back to raster renderer");
            Ok(Box::new(renderer))
        }
        RendererBackend::Raster => {
            let renderer = RasterRenderer::new(window)?;
            log::info!("Using raster renderer");
            Ok(Box::new(renderer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_backend_from_str() {
        assert_eq!(
            "raster".parse::<RendererBackend>().unwrap(),
            RendererBackend::Raster
        );
        assert_eq!(
            "accelerated".parse::<RendererBackend>().unwrap(),
            RendererBackend::Accelerated
        );
        assert!(matches!(
            "opengl".parse::<RendererBackend>().unwrap_err(),
            RendererError::Config(_)
        ));
    }

    #[test]
    fn test_config_parses_lowercase_backend() {
        let config: RendererConfig = serde_json::from_str(r#"{ "backend": "raster" }"#).unwrap();
        assert_eq!(config.backend, RendererBackend::Raster);

        let config: RendererConfig =
            serde_json::from_str(r#"{ "backend": "accelerated" }"#).unwrap();
        assert_eq!(config.backend, RendererBackend::Accelerated);
    }

    #[test]
    fn test_config_defaults_to_accelerated() {
        let config: RendererConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.backend, RendererBackend::Accelerated);
    }

    #[test]
    fn test_config_rejects_unknown_backend() {
        assert!(serde_json::from_str::<RendererConfig>(r#"{ "backend": "vulkan" }"#).is_err());
    }

    #[test]
    fn test_config_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "backend": "raster" }}"#).unwrap();

        let config = RendererConfig::load(file.path()).unwrap();
        assert_eq!(config.backend, RendererBackend::Raster);

        let err = RendererConfig::load(Path::new("/nonexistent/renderer.json")).unwrap_err();
        assert!(matches!(err, RendererError::Config(_)));
    }
}
