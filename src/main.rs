mod accumulation;
mod buffers;
mod bvh;
mod camera;
mod geometry;
mod gltf_loader;
mod input;
mod procedural;
mod renderer;
mod scene;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use raytracer_shared::BufferCapacities;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

use accumulation::AccumulationState;
use buffers::FlatBuffers;
use camera::Camera;
use gltf_loader::GltfLoader;
use input::{Action, CameraController, InputState};
use renderer::{PerformanceState, RenderState};
use scene::Scene;
use settings::TracerSettings;

#[derive(Parser, Debug)]
#[command(name = "progressive-raytracer")]
#[command(about = "Progressive GPU path tracer with per-mesh BVHs")]
struct Cli {
    /// glTF or GLB scene to load; the built-in demo scene is used when omitted
    scene: Option<PathBuf>,

    /// RON settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// BVH depth for every loaded glTF mesh
    #[arg(long, default_value_t = 8)]
    bvh_depth: u32,
}

struct App {
    render: RenderState,
    scene: Scene,
    camera: Camera,
    input: InputState,
    accumulation: AccumulationState,
    performance: PerformanceState,
    debug: bool,
}

impl App {
    fn handle_action(&mut self, action: Action, control_flow: &mut ControlFlow) {
        match action {
            Action::ToggleDebug => {
                self.debug = !self.debug;
                info!("Debug view {}", if self.debug { "enabled" } else { "disabled" });
                if self.debug {
                    info!("{}", self.scene.stats());
                    self.scene.log_leaf_bounds();
                }
            }
            Action::ToggleDenoise => self.accumulation.toggle_denoise(),
            Action::TogglePause => self.accumulation.toggle_pause(),
            Action::Move(forward, right, up) => {
                CameraController::move_camera(&mut self.camera, forward as f32, right as f32, up as f32);
                self.accumulation.invalidate();
            }
            Action::Exit => control_flow.set_exit(),
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.render.resize(size);
        self.accumulation.invalidate();
    }

    fn redraw(&mut self, control_flow: &mut ControlFlow) {
        let frame_start = Instant::now();
        match self.render.render(&self.camera, &mut self.accumulation) {
            Ok(()) => {
                self.performance
                    .record_frame(frame_start.elapsed(), self.accumulation.frame_count());
            }
            Err(wgpu::SurfaceError::Lost) => self.resize(self.render.size),
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("Surface out of memory");
                control_flow.set_exit();
            }
            Err(e) => error!("Surface error: {:?}", e),
        }
    }
}

fn load_scene(cli: &Cli, settings: &TracerSettings) -> Result<(Scene, FlatBuffers)> {
    let mut scene = Scene::new();
    match &cli.scene {
        Some(path) => {
            let loader = GltfLoader::load_from_path(path).with_context(|| format!("failed to open {}", path.display()))?;
            loader
                .load_into(&mut scene, cli.bvh_depth)
                .with_context(|| format!("failed to load {}", path.display()))?;
        }
        None => procedural::demo_scene(&mut scene).context("failed to build demo scene")?,
    }
    scene.set_sky(settings.sky);

    let mut flat = FlatBuffers::new(BufferCapacities::DEFAULT);
    scene.finalize(&mut flat).context("failed to finalize scene")?;
    Ok((scene, flat))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = TracerSettings::load_or_default(cli.settings.as_deref())?;
    let (scene, flat) = load_scene(&cli, &settings)?;

    let event_loop = EventLoop::new();
    let window: Window = WindowBuilder::new()
        .with_title("Progressive Raytracer")
        .with_inner_size(PhysicalSize::new(settings.width, settings.height))
        .build(&event_loop)
        .context("failed to create window")?;

    let render = pollster::block_on(RenderState::new(&window, &settings, &flat))?;
    let mut app = App {
        render,
        scene,
        camera: settings.camera.to_camera(),
        input: InputState::new(),
        accumulation: AccumulationState::new(settings.denoise, settings.paused),
        performance: PerformanceState::new(),
        debug: false,
    };
    app.render.set_sky(app.scene.sky());

    info!("Controls: 1 debug, R denoise, P pause, WASDQE move, drag to look, Esc quit");

    event_loop.run(move |event, _, control_flow| match event {
        Event::WindowEvent { ref event, window_id } if window_id == window.id() => match event {
            WindowEvent::CloseRequested => control_flow.set_exit(),
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        state: ElementState::Pressed,
                        virtual_keycode: Some(key),
                        ..
                    },
                ..
            } => {
                if let Some(action) = Action::from_key(*key) {
                    app.handle_action(action, control_flow);
                    window.request_redraw();
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                app.input.handle_mouse_input(*button, *state);
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some((dx, dy)) = app.input.handle_cursor_moved(*position) {
                    CameraController::rotate_camera(&mut app.camera, dx, dy);
                    app.accumulation.invalidate();
                    window.request_redraw();
                }
            }
            WindowEvent::Resized(physical_size) => app.resize(*physical_size),
            WindowEvent::ScaleFactorChanged { new_inner_size, .. } => app.resize(**new_inner_size),
            _ => {}
        },
        Event::RedrawRequested(window_id) if window_id == window.id() => app.redraw(control_flow),
        Event::MainEventsCleared => window.request_redraw(),
        _ => {}
    });
}
