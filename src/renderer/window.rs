// Playback window
// Uses winit for window management; rendering goes through the configured
// backend (accelerated with raster fallback)

use super::{create_renderer, FrameRenderer, RendererBackend, RendererError};
use crate::frame::VideoFrame;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent as WinitWindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

/// Events from the playback window
#[derive(Debug, Clone)]
pub enum WindowEvent {
    Resized(u32, u32),
    CloseRequested,
}

/// Command to the playback window
enum WindowCommand {
    SetTitle(String),
    Close,
}

/// Handle to drive the playback window from another thread
#[derive(Clone)]
pub struct RenderWindowHandle {
    /// One frame in flight: sending blocks until the window thread has taken
    /// the previous frame for drawing.
    frame_tx: Sender<VideoFrame>,
    command_tx: Sender<WindowCommand>,
    event_rx: Receiver<WindowEvent>,
    is_open: Arc<AtomicBool>,
}

impl RenderWindowHandle {
    /// Hand a frame to the window for drawing.
    ///
    /// Blocks while the previous frame is still queued, so a producer cannot
    /// outrun the renderer.
    pub fn draw(&self, frame: VideoFrame) -> Result<(), RendererError> {
        if !self.is_open.load(Ordering::Relaxed) {
            return Err(RendererError::Window("window closed".to_string()));
        }
        self.frame_tx
            .send(frame)
            .map_err(|_| RendererError::Window("window closed".to_string()))
    }

    /// Set window title
    pub fn set_title(&self, title: &str) -> Result<(), RendererError> {
        self.command_tx
            .send(WindowCommand::SetTitle(title.to_string()))
            .map_err(|_| RendererError::Window("failed to send command".to_string()))
    }

    /// Close the window
    pub fn close(&self) {
        let _ = self.command_tx.send(WindowCommand::Close);
    }

    /// Check if window is still open
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Relaxed)
    }

    /// Try to receive a window event (non-blocking)
    pub fn try_recv_event(&self) -> Option<WindowEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive a window event (blocking)
    pub fn recv_event(&self) -> Option<WindowEvent> {
        self.event_rx.recv().ok()
    }
}

/// Playback window state
pub struct RenderWindow {
    title: String,
    width: u32,
    height: u32,
    backend: RendererBackend,
    frame_rx: Receiver<VideoFrame>,
    command_rx: Receiver<WindowCommand>,
    event_tx: Sender<WindowEvent>,
    is_open: Arc<AtomicBool>,
    window: Option<Arc<Window>>,
    renderer: Option<Box<dyn FrameRenderer>>,
}

impl RenderWindow {
    /// Create a playback window and return a handle to drive it.
    ///
    /// The window and its renderer live on a dedicated event-loop thread;
    /// backend fallback happens there when the window surface exists.
    pub fn create(
        title: &str,
        width: u32,
        height: u32,
        backend: RendererBackend,
    ) -> Result<RenderWindowHandle, RendererError> {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(1);
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let is_open = Arc::new(AtomicBool::new(true));
        let is_open_clone = is_open.clone();

        let title = title.to_string();
        let title_clone = title.clone();

        // Spawn window thread
        std::thread::spawn(move || {
            let event_loop = match EventLoop::new() {
                Ok(event_loop) => event_loop,
                Err(e) => {
                    log::error!("Failed to create event loop: {}", e);
                    is_open_clone.store(false, Ordering::Relaxed);
                    return;
                }
            };
            event_loop.set_control_flow(ControlFlow::Poll);

            let mut app = RenderWindow {
                title: title_clone,
                width,
                height,
                backend,
                frame_rx,
                command_rx,
                event_tx,
                is_open: is_open_clone.clone(),
                window: None,
                renderer: None,
            };

            event_loop.run_app(&mut app).ok();
            is_open_clone.store(false, Ordering::Relaxed);
        });

        Ok(RenderWindowHandle {
            frame_tx,
            command_tx,
            event_rx,
            is_open,
        })
    }

    fn process_commands(&mut self) {
        while let Ok(cmd) = self.command_rx.try_recv() {
            match cmd {
                WindowCommand::SetTitle(title) => {
                    if let Some(ref window) = self.window {
                        window.set_title(&title);
                    }
                }
                WindowCommand::Close => {
                    self.is_open.store(false, Ordering::Relaxed);
                }
            }
        }

        // One frame per pass keeps the frame channel the backpressure point
        if let Ok(frame) = self.frame_rx.try_recv() {
            if let Some(ref mut renderer) = self.renderer {
                if let Err(e) = renderer.draw(frame) {
                    log::error!("Failed to draw frame: {}", e);
                }
            }
        }
    }
}

impl ApplicationHandler for RenderWindow {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default()
            .with_title(&self.title)
            .with_inner_size(PhysicalSize::new(self.width, self.height));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                self.is_open.store(false, Ordering::Relaxed);
                event_loop.exit();
                return;
            }
        };

        match create_renderer(self.backend, window.clone()) {
            Ok(renderer) => {
                log::info!(
                    "Playback window created: {}x{}, renderer: {}",
                    self.width,
                    self.height,
                    renderer.info()
                );
                self.renderer = Some(renderer);
            }
            Err(e) => {
                log::error!("Failed to create renderer: {}", e);
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WinitWindowEvent,
    ) {
        match event {
            WinitWindowEvent::CloseRequested => {
                self.is_open.store(false, Ordering::Relaxed);
                let _ = self.event_tx.send(WindowEvent::CloseRequested);
                event_loop.exit();
            }
            WinitWindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                let _ = self
                    .event_tx
                    .send(WindowEvent::Resized(size.width, size.height));
            }
            WinitWindowEvent::RedrawRequested => {
                self.process_commands();
            }
            _ => {}
        }

        // Check if we should close
        if !self.is_open.load(Ordering::Relaxed) {
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // Process frames and commands even when no window events arrive
        self.process_commands();

        if !self.is_open.load(Ordering::Relaxed) {
            event_loop.exit();
        }
    }
}
