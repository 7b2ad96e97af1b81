use anyhow::{Context, Result};
use bytemuck::Zeroable;
use log::{debug, info};
use raytracer_shared::{PostUniforms, RaytracerConfig, SkyMaterial, TracingUniforms};
use wgpu::util::DeviceExt;

use crate::accumulation::{AccumulationState, HistoryTextures};
use crate::buffers::{FlatBuffers, GpuSceneBuffers};
use crate::camera::Camera;
use crate::settings::TracerSettings;

const RAYTRACER_SHADER: &str = include_str!("../shaders/raytracer.wgsl");
const POST_SHADER: &str = include_str!("../shaders/post.wgsl");

/// GPU resources and the two render pipelines
pub struct RenderState {
    pub surface: wgpu::Surface,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,

    raytrace_pipeline: wgpu::RenderPipeline,
    post_pipeline: wgpu::RenderPipeline,
    history_layout: wgpu::BindGroupLayout,
    post_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,

    uniforms: TracingUniforms,
    uniform_buffer: wgpu::Buffer,
    post_uniform_buffer: wgpu::Buffer,

    scene_buffers: GpuSceneBuffers,
    scene_bind_group: wgpu::BindGroup,

    history: HistoryTextures,
    history_bind_group: wgpu::BindGroup,
    post_bind_group: wgpu::BindGroup,
}

/// Performance tracking
pub struct PerformanceState {
    pub start_time: std::time::Instant,
    pub last_frame_time: std::time::Duration,
    pub frame_count: u64,
}

impl RenderState {
    pub async fn new(window: &winit::window::Window, settings: &TracerSettings, flat: &FlatBuffers) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = unsafe { instance.create_surface(window) }.context("failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to create device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Target Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
            entries: &GpuSceneBuffers::layout_entries(),
        });
        let history_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("History Bind Group Layout"),
            entries: &[texture_entry(0)],
        });
        let post_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Post Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let raytrace_pipeline = create_fullscreen_pipeline(
            &device,
            "Raytrace",
            RAYTRACER_SHADER,
            &[&scene_layout, &history_layout],
            HistoryTextures::FORMAT,
        );
        let post_pipeline = create_fullscreen_pipeline(&device, "Post", POST_SHADER, &[&post_layout], config.format);

        let mut uniforms = TracingUniforms::zeroed();
        uniforms.rays_per_pixel = settings.rays_per_pixel;
        uniforms.max_bounces = settings.max_bounces;
        uniforms.blur = settings.blur;

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Tracing Uniforms"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let post_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Post Uniforms"),
            contents: bytemuck::bytes_of(&PostUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let scene_buffers = GpuSceneBuffers::new(&device, flat);
        let scene_bind_group = scene_buffers.bind_group(&device, &scene_layout, &uniform_buffer);

        let history = HistoryTextures::new(&device, config.width, config.height);
        let history_bind_group = create_history_bind_group(&device, &history_layout, &history);
        let post_bind_group = create_post_bind_group(&device, &post_layout, &post_uniform_buffer, &history, &sampler);

        let mut state = Self {
            surface,
            device,
            queue,
            config,
            size,
            raytrace_pipeline,
            post_pipeline,
            history_layout,
            post_layout,
            sampler,
            uniforms,
            uniform_buffer,
            post_uniform_buffer,
            scene_buffers,
            scene_bind_group,
            history,
            history_bind_group,
            post_bind_group,
        };
        state.upload_scene(flat);
        Ok(state)
    }

    /// Reconfigure the surface and recreate the texture pair. History is lost.
    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);

        self.history = HistoryTextures::new(&self.device, new_size.width, new_size.height);
        self.history_bind_group = create_history_bind_group(&self.device, &self.history_layout, &self.history);
        self.post_bind_group = create_post_bind_group(
            &self.device,
            &self.post_layout,
            &self.post_uniform_buffer,
            &self.history,
            &self.sampler,
        );
        info!("Resized to {}x{}", new_size.width, new_size.height);
    }

    /// Full re-upload of the four scene buffers
    pub fn upload_scene(&mut self, flat: &FlatBuffers) {
        self.scene_buffers.upload(&self.queue, flat);
        self.uniforms.sphere_count = flat.sphere_count as u32;
        self.uniforms.mesh_count = flat.mesh_count as u32;
    }

    pub fn set_sky(&mut self, sky: &SkyMaterial) {
        self.uniforms.set_sky(sky);
        debug!("Sky updated: {:?}", sky);
    }

    /// Trace into the target, present it through the post pass, then keep it as history
    pub fn render(&mut self, camera: &Camera, accumulation: &mut AccumulationState) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        camera
            .view(self.config.width, self.config.height)
            .write_to(&mut self.uniforms);
        self.uniforms.rendered_frames = accumulation.advance();
        self.uniforms.denoise = accumulation.denoise() as u32;
        self.uniforms.pause = accumulation.paused() as u32;
        self.queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));

        let post_uniforms = PostUniforms {
            resolution: [self.config.width as f32, self.config.height as f32],
            denoise: accumulation.denoise() as u32,
            _padding: 0,
        };
        self.queue.write_buffer(&self.post_uniform_buffer, 0, bytemuck::bytes_of(&post_uniforms));

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        {
            let mut pass = begin_fullscreen_pass(&mut encoder, "Raytrace Pass", &self.history.target_view);
            pass.set_pipeline(&self.raytrace_pipeline);
            pass.set_bind_group(0, &self.scene_bind_group, &[]);
            pass.set_bind_group(1, &self.history_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        {
            let mut pass = begin_fullscreen_pass(&mut encoder, "Post Pass", &view);
            pass.set_pipeline(&self.post_pipeline);
            pass.set_bind_group(0, &self.post_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.history.copy_target_to_history(&mut encoder);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    }
}

fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    layouts: &[&wgpu::BindGroupLayout],
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: layouts,
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: "vs_main",
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}

fn begin_fullscreen_pass<'a>(
    encoder: &'a mut wgpu::CommandEncoder,
    label: &str,
    view: &'a wgpu::TextureView,
) -> wgpu::RenderPass<'a> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: true,
            },
        })],
        depth_stencil_attachment: None,
    })
}

fn create_history_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    history: &HistoryTextures,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("History Bind Group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::TextureView(&history.history_view),
        }],
    })
}

fn create_post_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniforms: &wgpu::Buffer,
    history: &HistoryTextures,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Post Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&history.target_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

impl PerformanceState {
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            last_frame_time: std::time::Duration::ZERO,
            frame_count: 0,
        }
    }

    pub fn record_frame(&mut self, frame_time: std::time::Duration, accumulated: u32) {
        self.frame_count += 1;
        self.last_frame_time = frame_time;

        if self.frame_count % RaytracerConfig::PERFORMANCE_STATS_INTERVAL == 0 {
            let elapsed = self.start_time.elapsed().as_secs_f32();
            let fps = self.frame_count as f32 / elapsed;
            info!(
                "FPS: {:.1}, last frame: {:.2}ms, accumulated frames: {}",
                fps,
                self.last_frame_time.as_secs_f32() * RaytracerConfig::MILLISECONDS_PER_SECOND,
                accumulated
            );
        }
    }
}

impl Default for PerformanceState {
    fn default() -> Self {
        Self::new()
    }
}
