use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::{info, warn};
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event::{DeviceEvent, ElementState, Event, KeyEvent, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowBuilder};

use shadowfall::{
    App, FrameScheduler, KeyCode, ManualClock, NamedKey, ParamValue, Renderer, Scene,
    SceneConfig, SystemClock,
};

/// Wheel distance reported by touchpads for one notch of a mouse wheel.
const PIXELS_PER_LINE: f32 = 20.0;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;

    let scene = match &options.scene {
        Some(path) => Scene::load(path)?,
        None => Scene::builtin(),
    };
    let mut config = SceneConfig::default();
    scene
        .apply_overrides(&mut config)
        .context("invalid <config> override in scene")?;
    if options.snow {
        config.set("snow", ParamValue::Bool(true))?;
    }

    println!("Loaded scene with {} objects", scene.objects.len());
    for object in &scene.objects {
        println!(" - {} ({}, {:?})", object.name, object.mesh, object.material);
    }

    let app = App::new(config, scene, (1280, 720));
    if options.summary_only {
        run_headless(app, options.frames, &options.hold)
    } else {
        run_interactive(app)
    }
}

/// Steps the simulation on a manual clock and prints the final state.
fn run_headless(mut app: App, frames: u32, hold: &[KeyCode]) -> Result<()> {
    let mut scheduler = FrameScheduler::new(ManualClock::new(), app.config().loop_interval);
    for key in hold {
        app.input_mut().set_key_down(*key);
    }

    let mut last_frame = None;
    for _ in 0..frames {
        let timing = scheduler.begin_frame();
        let frame = app.update(timing);
        app.end_frame(&frame);
        scheduler.finish_frame();
        last_frame = Some(frame);
        if app.exit_requested() {
            break;
        }
    }
    scheduler.shutdown();
    app.print_summary(last_frame.as_ref())
        .context("failed to write summary")
}

fn run_interactive(mut app: App) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|err| WindowInitError::from_error("event loop", err))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Shadowfall")
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let cursor_grabbed = grab_cursor(&window);
    let size = window.inner_size();
    app.resize(size.width, size.height);
    let renderer = block_on(Renderer::new(
        Arc::clone(&window),
        app.scene(),
        app.config(),
        app.precipitation().field(),
    ))?;
    let scheduler = FrameScheduler::new(SystemClock::new(), app.config().loop_interval);

    let mut state = AppState {
        app,
        renderer,
        scheduler,
        cursor_grabbed,
        last_error: None,
    };

    event_loop
        .run(|event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);
            if let Err(err) = state.process_event(&event, elwt) {
                state.last_error = Some(err);
                elwt.exit();
            }
        })
        .context("event loop terminated abnormally")?;

    state.scheduler.shutdown();
    state.app.print_summary(None)?;

    if let Some(err) = state.last_error {
        return Err(err);
    }

    Ok(())
}

struct AppState {
    app: App,
    renderer: Renderer,
    scheduler: FrameScheduler<SystemClock>,
    /// Look input comes from raw mouse motion instead of cursor positions.
    cursor_grabbed: bool,
    last_error: Option<anyhow::Error>,
}

/// Hides the pointer and keeps it inside the window. Locked is not available
/// everywhere, so confinement is the fallback.
fn grab_cursor(window: &Window) -> bool {
    let grabbed = window
        .set_cursor_grab(CursorGrabMode::Locked)
        .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));
    match grabbed {
        Ok(()) => {
            window.set_cursor_visible(false);
            true
        }
        Err(err) => {
            warn!("cursor grab unavailable, look stops at the window edge: {err}");
            false
        }
    }
}

/// Window or event loop creation failed; there is no way to continue.
#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

impl AppState {
    fn process_event(&mut self, event: &Event<()>, elwt: &EventLoopWindowTarget<()>) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.renderer.window_id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        elwt.exit();
                    }
                    WindowEvent::Resized(size) => {
                        self.renderer.resize(*size);
                        self.app.resize(size.width, size.height);
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        self.handle_keyboard(event);
                    }
                    WindowEvent::CursorMoved { position, .. } if !self.cursor_grabbed => {
                        let position = Vec2::new(position.x as f32, position.y as f32);
                        self.app.input_mut().set_cursor_position(position);
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        let lines = match delta {
                            MouseScrollDelta::LineDelta(_, y) => *y,
                            MouseScrollDelta::PixelDelta(position) => {
                                position.y as f32 / PIXELS_PER_LINE
                            }
                        };
                        self.app.input_mut().add_scroll(lines);
                    }
                    WindowEvent::RedrawRequested => {
                        self.redraw(elwt)?;
                    }
                    _ => {}
                }
            }
            Event::DeviceEvent {
                event: DeviceEvent::MouseMotion { delta },
                ..
            } if self.cursor_grabbed => {
                let delta = Vec2::new(delta.0 as f32, delta.1 as f32);
                self.app.input_mut().add_cursor_delta(delta);
            }
            Event::AboutToWait => {
                self.renderer.window().request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    fn redraw(&mut self, elwt: &EventLoopWindowTarget<()>) -> Result<()> {
        let timing = self.scheduler.begin_frame();
        let frame = self.app.update(timing);
        if self.app.exit_requested() {
            elwt.exit();
            return Ok(());
        }

        self.renderer
            .sync_particles(self.app.precipitation().field(), frame.field_revision);
        if let Err(err) = self
            .renderer
            .render(self.app.scene(), self.app.config(), &frame)
        {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    let size = self.renderer.window().inner_size();
                    self.renderer.resize(size);
                }
                wgpu::SurfaceError::OutOfMemory => {
                    return Err(anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout => {
                    info!("Surface timeout; retrying next frame");
                }
            }
        }
        self.app.end_frame(&frame);

        self.scheduler
            .set_loop_interval(self.app.config().loop_interval);
        self.scheduler.finish_frame();
        Ok(())
    }

    fn handle_keyboard(&mut self, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let Some(keycode) = map_keycode(code) else {
            return;
        };
        let input = self.app.input_mut();
        match event.state {
            ElementState::Pressed => input.set_key_down(keycode),
            ElementState::Released => input.set_key_up(keycode),
        }
    }
}

fn map_keycode(code: WinitKey) -> Option<KeyCode> {
    Some(match code {
        WinitKey::Space => KeyCode::Named(NamedKey::Space),
        WinitKey::Tab => KeyCode::Named(NamedKey::Tab),
        WinitKey::ArrowLeft => KeyCode::Named(NamedKey::Left),
        WinitKey::ArrowRight => KeyCode::Named(NamedKey::Right),
        WinitKey::ArrowUp => KeyCode::Named(NamedKey::Up),
        WinitKey::ArrowDown => KeyCode::Named(NamedKey::Down),
        WinitKey::Escape => KeyCode::Named(NamedKey::Escape),
        WinitKey::Digit0 => KeyCode::Digit(0),
        WinitKey::Digit1 => KeyCode::Digit(1),
        WinitKey::Digit2 => KeyCode::Digit(2),
        WinitKey::Digit3 => KeyCode::Digit(3),
        WinitKey::Digit4 => KeyCode::Digit(4),
        WinitKey::Digit5 => KeyCode::Digit(5),
        WinitKey::Digit6 => KeyCode::Digit(6),
        WinitKey::Digit7 => KeyCode::Digit(7),
        WinitKey::Digit8 => KeyCode::Digit(8),
        WinitKey::Digit9 => KeyCode::Digit(9),
        WinitKey::KeyA => KeyCode::Character('A'),
        WinitKey::KeyD => KeyCode::Character('D'),
        WinitKey::KeyS => KeyCode::Character('S'),
        WinitKey::KeyW => KeyCode::Character('W'),
        _ => return None,
    })
}

#[derive(Debug)]
struct CliOptions {
    scene: Option<PathBuf>,
    summary_only: bool,
    frames: u32,
    hold: Vec<KeyCode>,
    snow: bool,
}

const USAGE: &str =
    "Usage: shadowfall [--scene <path>] [--summary-only] [--frames <n>] [--hold <key>]... [--snow]";

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self {
            scene: None,
            summary_only: false,
            frames: 1,
            hold: Vec::new(),
            snow: false,
        };
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--scene" => {
                    let path = args.next().ok_or_else(|| anyhow!("--scene needs a path\n{USAGE}"))?;
                    options.scene = Some(PathBuf::from(path));
                }
                "--summary-only" => options.summary_only = true,
                "--frames" => {
                    let count = args
                        .next()
                        .ok_or_else(|| anyhow!("--frames needs a count\n{USAGE}"))?;
                    options.frames = count
                        .parse::<u32>()
                        .ok()
                        .filter(|frames| *frames > 0)
                        .ok_or_else(|| anyhow!("invalid frame count `{count}`"))?;
                }
                "--hold" => {
                    let name = args.next().ok_or_else(|| anyhow!("--hold needs a key\n{USAGE}"))?;
                    let key =
                        KeyCode::from_name(&name).ok_or_else(|| anyhow!("unknown key `{name}`"))?;
                    options.hold.push(key);
                }
                "--snow" => options.snow = true,
                other => {
                    return Err(anyhow!("Unknown argument: {other}\n{USAGE}"));
                }
            }
        }
        Ok(options)
    }
}
