use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use tracing::{error, info, warn};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{DeviceEvent, ElementState, Event, KeyEvent, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{CursorGrabMode, Window, WindowBuilder};

use crate::gpu::{FrameRecorder, GpuContext, GpuProgram};
use crate::input::{KeyState, MouseTracker};
use crate::mesh::{QuadCorners, QuadMesh, QuadVertex, QUAD_VERTEX_COUNT};
use crate::scene::{NormalMappingScene, DIFFUSE_UNIT, NORMAL_UNIT};
use crate::shader::ShaderProgram;
use crate::texture::{load_texture_or_placeholder, TextureUnits};
use crate::types::RendererConfig;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.1,
    g: 0.1,
    b: 0.1,
    a: 1.0,
};

/// Pixels of precise scrolling treated as one wheel notch.
const PIXELS_PER_SCROLL_LINE: f64 = 20.0;

/// GPU resources and scene state for the demo window.
///
/// Fields drop in declaration order: the surface inside `gpu` must go
/// before `window`.
pub(crate) struct WindowState {
    gpu: GpuContext,
    programs: Vec<GpuProgram>,
    program: ShaderProgram,
    quad: QuadMesh<wgpu::Buffer>,
    mesh_failed: bool,
    units: TextureUnits,
    scene: NormalMappingScene,
    keys: KeyState,
    mouse: MouseTracker,
    grab: Option<CursorGrabMode>,
    started: Instant,
    last_frame: Instant,
    window: Arc<Window>,
}

impl WindowState {
    pub(crate) fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self> {
        let gpu = GpuContext::new(window.as_ref(), window.inner_size())?;

        let mut program = ShaderProgram::load_or_log("normal mapping", &config.shaders);
        NormalMappingScene::bind_samplers(&mut program);

        let mut programs = Vec::new();
        if program.is_usable() {
            match GpuProgram::new(
                &gpu.device,
                &gpu.queue,
                &program,
                gpu.surface_format,
                QuadVertex::layout(),
            ) {
                Ok(gpu_program) => programs.push(gpu_program),
                Err(err) => error!(stage = %err.stage(), error = %err, "shader program unusable"),
            }
        }

        let mut units = TextureUnits::new();
        let diffuse = load_texture_or_placeholder(
            &gpu.device,
            &gpu.queue,
            &config.diffuse_map,
            config.gamma_correction,
        );
        let normal = load_texture_or_placeholder(&gpu.device, &gpu.queue, &config.normal_map, false);
        units.bind(DIFFUSE_UNIT, &diffuse);
        units.bind(NORMAL_UNIT, &normal);

        let grab = grab_cursor(window.as_ref());
        let now = Instant::now();

        Ok(Self {
            gpu,
            programs,
            program,
            quad: QuadMesh::new(QuadCorners::unit()),
            mesh_failed: false,
            units,
            scene: NormalMappingScene::new(),
            keys: KeyState::new(),
            mouse: MouseTracker::new(),
            grab,
            started: now,
            last_frame: now,
            window,
        })
    }

    pub(crate) fn window(&self) -> &Window {
        self.window.as_ref()
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.gpu.resize(new_size);
    }

    /// Records the key and reports whether the user asked to quit.
    pub(crate) fn handle_key(&mut self, event: &KeyEvent) -> bool {
        if let PhysicalKey::Code(code) = event.physical_key {
            self.keys.set(code, event.state == ElementState::Pressed);
        }
        self.keys.exit_requested()
    }

    pub(crate) fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) {
        if self.grab == Some(CursorGrabMode::Locked) {
            return;
        }
        if let Some((dx, dy)) = self.mouse.update(position.x, position.y) {
            self.scene.camera.process_mouse_movement(dx, dy, true);
        }
    }

    /// Raw motion drives the camera while the cursor is locked in place.
    pub(crate) fn handle_mouse_motion(&mut self, delta: (f64, f64)) {
        if self.grab == Some(CursorGrabMode::Locked) {
            self.scene
                .camera
                .process_mouse_movement(delta.0 as f32, -delta.1 as f32, true);
        }
    }

    pub(crate) fn handle_scroll(&mut self, delta: MouseScrollDelta) {
        let lines = match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(position) => (position.y / PIXELS_PER_SCROLL_LINE) as f32,
        };
        self.scene.camera.process_mouse_scroll(lines);
    }

    pub(crate) fn handle_focus(&mut self, focused: bool) {
        if !focused {
            self.keys.clear();
            self.mouse.reset();
        }
    }

    pub(crate) fn render_frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        let now = Instant::now();
        let delta = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.scene.apply_input(&self.keys, delta);

        let elapsed = now.duration_since(self.started).as_secs_f32();
        let uniforms = self.scene.frame_uniforms(elapsed, self.gpu.aspect_ratio());
        uniforms.apply_shared(&mut self.program);

        let quad = match self.quad.buffer_or_build(&self.gpu.device) {
            Ok(buffer) => Some(buffer.clone()),
            Err(err) => {
                if !self.mesh_failed {
                    error!(error = %err, "quad mesh could not be built");
                    self.mesh_failed = true;
                }
                None
            }
        };

        let has_program = !self.programs.is_empty();
        let mut frame = FrameRecorder::new(&self.gpu.device, &mut self.programs);
        if has_program {
            frame.use_program(0);
        }
        if let Some(buffer) = quad {
            self.program.set_mat4("model", uniforms.quad_model);
            frame.draw(&self.program, &self.units, &buffer, 0..QUAD_VERTEX_COUNT);
            self.program.set_mat4("model", uniforms.light_model);
            frame.draw(&self.program, &self.units, &buffer, 0..QUAD_VERTEX_COUNT);
        }
        frame.submit(&self.gpu, CLEAR_COLOR)
    }
}

fn grab_cursor(window: &Window) -> Option<CursorGrabMode> {
    let mode = [CursorGrabMode::Locked, CursorGrabMode::Confined]
        .into_iter()
        .find(|mode| window.set_cursor_grab(*mode).is_ok());
    match mode {
        Some(mode) => {
            window.set_cursor_visible(false);
            tracing::debug!(?mode, "cursor grabbed");
        }
        None => warn!("cursor grab unavailable; mouse look follows the visible cursor"),
    }
    mode
}

pub(crate) fn run_window(config: RendererConfig) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(window_size)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let mut state = WindowState::new(window, &config)
        .map_err(|err| anyhow!("failed to initialise window renderer: {err}"))?;
    info!(
        width = window_size.width,
        height = window_size.height,
        "normal mapping demo running; WASD to move, Esc to quit"
    );
    state.window().request_redraw();

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
            match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if state.handle_key(&event) {
                        elwt.exit();
                    }
                }
                WindowEvent::CursorMoved { position, .. } => {
                    state.handle_cursor_moved(position);
                }
                WindowEvent::MouseWheel { delta, .. } => {
                    state.handle_scroll(delta);
                }
                WindowEvent::Focused(focused) => {
                    state.handle_focus(focused);
                }
                WindowEvent::Resized(new_size) => {
                    state.resize(new_size);
                }
                WindowEvent::RedrawRequested => match state.render_frame() {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        state.gpu.reconfigure();
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        error!("surface out of memory; exiting");
                        elwt.exit();
                    }
                    Err(wgpu::SurfaceError::Timeout) => {
                        warn!("surface timeout; retrying next frame");
                    }
                    Err(other) => {
                        warn!(error = ?other, "surface error; retrying next frame");
                    }
                },
                _ => {}
            }
        }
        Event::DeviceEvent {
            event: DeviceEvent::MouseMotion { delta },
            ..
        } => {
            state.handle_mouse_motion(delta);
        }
        Event::AboutToWait => {
            state.window().request_redraw();
            elwt.set_control_flow(ControlFlow::Wait);
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}
