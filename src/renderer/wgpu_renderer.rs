// GPU-accelerated renderer
// wgpu presentation with one-shot asynchronous device setup
//
// Construction launches the setup sequence (adapter, device, surface
// configuration, pipeline, sampler) on its own thread and returns
// immediately. Every draw first waits on the resulting latch, so draws can
// never race the in-flight initialization, and the setup never runs twice.

use super::{FrameRenderer, RendererError};
use crate::frame::VideoFrame;
use crossbeam_channel::{bounded, Receiver};
use std::sync::Arc;
use winit::window::Window;

/// WGSL for drawing one video frame: a generated full-screen quad sampling
/// three I420 planes with BT.601 conversion.
const FRAME_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    // Two triangles covering the whole surface
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    var uvs = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 0.0),
    );

    var output: VertexOutput;
    output.position = vec4<f32>(positions[index], 0.0, 1.0);
    output.uv = uvs[index];
    return output;
}

@group(0) @binding(0) var y_texture: texture_2d<f32>;
@group(0) @binding(1) var u_texture: texture_2d<f32>;
@group(0) @binding(2) var v_texture: texture_2d<f32>;
@group(0) @binding(3) var plane_sampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let y = textureSample(y_texture, plane_sampler, input.uv).r;
    let u = textureSample(u_texture, plane_sampler, input.uv).r - 0.5;
    let v = textureSample(v_texture, plane_sampler, input.uv).r - 0.5;

    // BT.601 YUV to RGB conversion
    let r = y + 1.402 * v;
    let g = y - 0.344 * u - 0.714 * v;
    let b = y + 1.772 * u;

    return vec4<f32>(r, g, b, 1.0);
}
"#;

/// GPU state populated once by setup and immutable afterwards (the surface
/// configuration tracks the current frame size).
struct GpuState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

/// Single-shot setup latch.
enum Setup {
    /// Setup still running on its thread; the receiver resolves exactly once.
    Initializing(Receiver<Result<GpuState, RendererError>>),
    Ready(Box<GpuState>),
    Failed(String),
}

impl Setup {
    /// Wait for an in-flight setup to resolve and pin the outcome.
    fn settle(&mut self) {
        if let Setup::Initializing(rx) = self {
            let outcome = rx.recv().unwrap_or_else(|_| {
                Err(RendererError::AcceleratedUnavailable(
                    "setup thread exited without a result".to_string(),
                ))
            });
            *self = match outcome {
                Ok(state) => Setup::Ready(Box::new(state)),
                Err(e) => Setup::Failed(e.to_string()),
            };
        }
    }
}

/// GPU renderer with lazily established device, pipeline and sampler.
pub struct AcceleratedRenderer {
    setup: Setup,
}

impl AcceleratedRenderer {
    /// Begin the asynchronous setup sequence and return immediately.
    pub fn new(window: Arc<Window>) -> Self {
        let (tx, rx) = bounded(1);
        std::thread::spawn(move || {
            let _ = tx.send(pollster::block_on(setup(window)));
        });

        Self {
            setup: Setup::Initializing(rx),
        }
    }

    /// Block until the one-time setup has resolved.
    pub fn wait_ready(&mut self) -> Result<(), RendererError> {
        self.state().map(|_| ())
    }

    fn state(&mut self) -> Result<&mut GpuState, RendererError> {
        self.setup.settle();
        match &mut self.setup {
            Setup::Ready(state) => Ok(state),
            Setup::Failed(msg) => Err(RendererError::AcceleratedUnavailable(msg.clone())),
            Setup::Initializing(_) => Err(RendererError::AcceleratedUnavailable(
                "initialization did not settle".to_string(),
            )),
        }
    }
}

impl FrameRenderer for AcceleratedRenderer {
    fn draw(&mut self, frame: VideoFrame) -> Result<(), RendererError> {
        let state = self.state()?;

        // Follow the frame's dimensions
        let (width, height) = (frame.width(), frame.height());
        if state.config.width != width || state.config.height != height {
            state.config.width = width;
            state.config.height = height;
            state.surface.configure(&state.device, &state.config);
            log::debug!("Surface reconfigured to {}x{}", width, height);
        }

        // One-shot import: the plane textures and bind group live for
        // exactly this draw and are rebuilt for the next frame.
        let binding = import_frame(state, &frame);

        let output = state
            .surface
            .get_current_texture()
            .map_err(|e| RendererError::Render(format!("failed to get surface texture: {}", e)))?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = state
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            render_pass.set_pipeline(&state.pipeline);
            render_pass.set_bind_group(0, &binding.bind_group, &[]);
            render_pass.draw(0..6, 0..1);
        }

        state.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        // frame dropped here, releasing its pixel memory
        Ok(())
    }

    fn info(&self) -> &str {
        "Accelerated (wgpu)"
    }
}

async fn setup(window: Arc<Window>) -> Result<GpuState, RendererError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let surface = instance.create_surface(window.clone()).map_err(|e| {
        RendererError::AcceleratedUnavailable(format!("failed to create surface: {}", e))
    })?;

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| RendererError::AcceleratedUnavailable(format!("no GPU adapter: {}", e)))?;

    log::info!("Using GPU adapter: {:?}", adapter.get_info().name);

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default())
        .await
        .map_err(|e| {
            RendererError::AcceleratedUnavailable(format!("failed to create device: {}", e))
        })?;

    // Preferred presentation format, then opaque surface configuration
    let capabilities = surface.get_capabilities(&adapter);
    if capabilities.formats.is_empty() {
        return Err(RendererError::AcceleratedUnavailable(
            "surface is not presentable on this adapter".to_string(),
        ));
    }
    let format = capabilities
        .formats
        .iter()
        .find(|f| f.is_srgb())
        .copied()
        .unwrap_or(capabilities.formats[0]);

    let alpha_mode = if capabilities
        .alpha_modes
        .contains(&wgpu::CompositeAlphaMode::Opaque)
    {
        wgpu::CompositeAlphaMode::Opaque
    } else {
        wgpu::CompositeAlphaMode::Auto
    };

    // Pick the best present mode from what's supported
    let present_mode = if capabilities
        .present_modes
        .contains(&wgpu::PresentMode::Mailbox)
    {
        wgpu::PresentMode::Mailbox
    } else {
        wgpu::PresentMode::Fifo // always supported
    };

    let size = window.inner_size();
    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &config);

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Frame Shader"),
        source: wgpu::ShaderSource::Wgsl(FRAME_SHADER.into()),
    });

    let plane_texture_entry = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Frame Bind Group Layout"),
        entries: &[
            plane_texture_entry(0),
            plane_texture_entry(1),
            plane_texture_entry(2),
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Frame Pipeline Layout"),
        bind_group_layouts: &[&bind_group_layout],
        immediate_size: 0,
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Frame Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    });

    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Frame Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    });

    log::info!("Accelerated renderer ready");

    Ok(GpuState {
        surface,
        device,
        queue,
        config,
        pipeline,
        bind_group_layout,
        sampler,
    })
}

/// Textures and bind group for one frame, dropped after its draw.
struct FrameBinding {
    _planes: [wgpu::Texture; 3],
    bind_group: wgpu::BindGroup,
}

fn import_frame(state: &GpuState, frame: &VideoFrame) -> FrameBinding {
    let (width, height) = (frame.width(), frame.height());
    let (uv_width, uv_height) = (width / 2, height / 2);

    let y = upload_plane(state, "Y Plane", frame.y(), width, height);
    let u = upload_plane(state, "U Plane", frame.u(), uv_width, uv_height);
    let v = upload_plane(state, "V Plane", frame.v(), uv_width, uv_height);

    let y_view = y.create_view(&wgpu::TextureViewDescriptor::default());
    let u_view = u.create_view(&wgpu::TextureViewDescriptor::default());
    let v_view = v.create_view(&wgpu::TextureViewDescriptor::default());

    let bind_group = state.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Frame Bind Group"),
        layout: &state.bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&y_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&u_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&v_view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(&state.sampler),
            },
        ],
    });

    FrameBinding {
        _planes: [y, u, v],
        bind_group,
    }
}

fn upload_plane(
    state: &GpuState,
    label: &str,
    data: &[u8],
    width: u32,
    height: u32,
) -> wgpu::Texture {
    let texture = state.device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    state.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );

    texture
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_failure_reaches_the_latch() {
        let (tx, rx) = bounded(1);
        tx.send(Err(RendererError::AcceleratedUnavailable(
            "no GPU adapter".to_string(),
        )))
        .unwrap();

        let mut setup = Setup::Initializing(rx);
        setup.settle();
        match &setup {
            Setup::Failed(msg) => assert!(msg.contains("no GPU adapter")),
            _ => panic!("expected failed setup"),
        }
    }

    #[test]
    fn test_setup_failure_is_sticky() {
        let (tx, rx) = bounded(1);
        tx.send(Err(RendererError::AcceleratedUnavailable(
            "no GPU adapter".to_string(),
        )))
        .unwrap();
        drop(tx);

        let mut setup = Setup::Initializing(rx);
        setup.settle();
        // A second settle must not consult the channel again
        setup.settle();
        assert!(matches!(setup, Setup::Failed(_)));
    }

    #[test]
    fn test_vanished_setup_thread_fails_the_latch() {
        let (tx, rx) = bounded::<Result<GpuState, RendererError>>(1);
        drop(tx);

        let mut setup = Setup::Initializing(rx);
        setup.settle();
        match &setup {
            Setup::Failed(msg) => assert!(msg.contains("without a result")),
            _ => panic!("expected failed setup"),
        }
    }
}
