// Raster renderer
// Synchronous CPU path: I420 to packed RGB, presented via softbuffer

use super::{FrameRenderer, RendererError};
use crate::frame::VideoFrame;
use std::num::NonZeroU32;
use std::sync::Arc;
use winit::window::Window;

/// CPU renderer drawing into a softbuffer surface.
///
/// Construction acquires the surface; when the platform cannot provide one,
/// the renderer fails to construct and drawing is never attempted.
pub struct RasterRenderer {
    surface: softbuffer::Surface<Arc<Window>, Arc<Window>>,
    surface_size: (u32, u32),
}

impl RasterRenderer {
    pub fn new(window: Arc<Window>) -> Result<Self, RendererError> {
        let context = softbuffer::Context::new(window.clone()).map_err(|e| {
            RendererError::SurfaceUnavailable(format!("no display context: {}", e))
        })?;
        let surface = softbuffer::Surface::new(&context, window).map_err(|e| {
            RendererError::SurfaceUnavailable(format!("no window surface: {}", e))
        })?;

        Ok(Self {
            surface,
            surface_size: (0, 0),
        })
    }
}

impl FrameRenderer for RasterRenderer {
    fn draw(&mut self, frame: VideoFrame) -> Result<(), RendererError> {
        let (width, height) = (frame.width(), frame.height());

        if self.surface_size != (width, height) {
            let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
                return Err(RendererError::Render("zero-sized frame".to_string()));
            };
            self.surface
                .resize(w, h)
                .map_err(|e| RendererError::Render(format!("surface resize failed: {}", e)))?;
            self.surface_size = (width, height);
            log::debug!("Raster surface resized to {}x{}", width, height);
        }

        let mut buffer = self
            .surface
            .buffer_mut()
            .map_err(|e| RendererError::Render(format!("surface buffer unavailable: {}", e)))?;

        yuv420_to_xrgb(frame.y(), frame.u(), frame.v(), width, height, &mut buffer);

        buffer
            .present()
            .map_err(|e| RendererError::Render(format!("present failed: {}", e)))?;

        // frame dropped here, releasing its pixel memory
        Ok(())
    }

    fn info(&self) -> &str {
        "Raster (softbuffer)"
    }
}

/// Convert tightly packed I420 planes to 0RGB pixels (BT.601)
fn yuv420_to_xrgb(
    y_plane: &[u8],
    u_plane: &[u8],
    v_plane: &[u8],
    width: u32,
    height: u32,
    out: &mut [u32],
) {
    let w = width as usize;
    let h = height as usize;
    let uv_w = w / 2;

    for y in 0..h {
        let uv_row = (y / 2) * uv_w;
        for x in 0..w {
            let y_val = y_plane[y * w + x] as i32;
            let u_val = u_plane[uv_row + x / 2] as i32 - 128;
            let v_val = v_plane[uv_row + x / 2] as i32 - 128;

            // YUV to RGB conversion (BT.601)
            let r = (y_val + ((v_val * 359) >> 8)).clamp(0, 255) as u32;
            let g = (y_val - ((u_val * 88 + v_val * 183) >> 8)).clamp(0, 255) as u32;
            let b = (y_val + ((u_val * 454) >> 8)).clamp(0, 255) as u32;

            out[y * w + x] = (r << 16) | (g << 8) | b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(y: u8, u: u8, v: u8) -> u32 {
        let y_plane = [y; 4];
        let u_plane = [u; 1];
        let v_plane = [v; 1];
        let mut out = [0u32; 4];
        yuv420_to_xrgb(&y_plane, &u_plane, &v_plane, 2, 2, &mut out);
        out[0]
    }

    #[test]
    fn test_neutral_gray() {
        // Centered chroma leaves luma untouched
        assert_eq!(convert(128, 128, 128), 0x0080_8080);
    }

    #[test]
    fn test_black_and_white() {
        assert_eq!(convert(0, 128, 128), 0x0000_0000);
        assert_eq!(convert(255, 128, 128), 0x00FF_FFFF);
    }

    #[test]
    fn test_channels_clamp() {
        // Extreme chroma must not wrap around
        let px = convert(255, 255, 255);
        assert_eq!(px >> 16 & 0xFF, 255);
        let px = convert(0, 0, 0);
        assert_eq!(px & 0xFF, 0);
    }

    #[test]
    fn test_chroma_shared_across_block() {
        // All four pixels of a 2x2 block read the same chroma sample
        let y_plane = [100, 110, 120, 130];
        let mut out = [0u32; 4];
        yuv420_to_xrgb(&y_plane, &[200], &[60], 2, 2, &mut out);

        let reds: Vec<u32> = out.iter().map(|px| px >> 16 & 0xFF).collect();
        let lumas = [100i32, 110, 120, 130];
        for (red, y) in reds.iter().zip(lumas) {
            let expected = (y + (((60 - 128) * 359) >> 8)).clamp(0, 255) as u32;
            assert_eq!(*red, expected);
        }
    }
}
