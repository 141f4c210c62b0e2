//! Application event loop.
//!
//! [`run`] opens a window, creates the wgpu [`Context`], builds a [`Viewport`] with the
//! configured pipeline and hands it to a setup callback that populates the scene. After
//! that the loop drives everything:
//!
//! 1. Window events are fed into [`Input`]
//! 2. `Viewport::update` runs the scene's update cascade
//! 3. `Viewport::render` draws the frame through the context
//! 4. Deferred GPU handles are flushed and the input frame is stepped

use std::sync::Arc;

use anyhow::Context as _;
use instant::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

use crate::{
    config::EngineConfig,
    context::Context,
    data_structures::{scene_graph::Scene, viewport::Viewport},
    input::Input,
    pipelines,
    resources::AssetCache,
};

/// Populates the viewport once the window and GPU context exist.
pub type Setup = Box<dyn FnOnce(&mut Viewport, &mut AssetCache) -> anyhow::Result<()>>;

struct AppState {
    ctx: Context,
    viewport: Viewport,
    assets: AssetCache,
    input: Input,
}

impl AppState {
    fn resize(&mut self, width: u32, height: u32) {
        self.ctx.resize(width, height);
        self.viewport.resize(width, height);
    }

    fn frame(&mut self, delta: f32) -> anyhow::Result<()> {
        self.viewport.update(delta, &mut self.input)?;
        self.viewport.render(&mut self.assets, &mut self.ctx)?;
        let released = self.ctx.flush_deletions();
        if released > 0 {
            log::debug!("Destroyed {} GPU handles", released);
        }
        self.input.step_frame();
        Ok(())
    }
}

struct App {
    async_runtime: tokio::runtime::Runtime,
    config: EngineConfig,
    setup: Option<Setup>,
    state: Option<AppState>,
    last_time: Instant,
    /// Exit after this many frames.
    frame_limit: Option<u64>,
    frames: u64,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: EngineConfig, setup: Setup) -> anyhow::Result<Self> {
        Ok(Self {
            async_runtime: tokio::runtime::Runtime::new()?,
            config,
            setup: Some(setup),
            state: None,
            last_time: Instant::now(),
            frame_limit: None,
            frames: 0,
            error: None,
        })
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_attributes = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));
        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let ctx = self.async_runtime.block_on(Context::new(window))?;
        log::info!("Rendering context ready");

        let mut viewport = Viewport::new(Scene::new(), pipelines::from_config(&self.config.render));
        let size = ctx.size();
        viewport.resize(size.x, size.y);
        let mut assets = AssetCache::from_config(&self.config.assets);
        if let Some(setup) = self.setup.take() {
            setup(&mut viewport, &mut assets).context("scene setup failed")?;
        }

        ctx.window().request_redraw();
        self.state = Some(AppState {
            ctx,
            viewport,
            assets,
            input: Input::new(),
        });
        self.last_time = Instant::now();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };
        state.input.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => state.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let delta = (now - self.last_time).as_secs_f32();
                self.last_time = now;

                let result = state.frame(delta);
                state.ctx.window().request_redraw();
                if let Err(e) = result {
                    self.fail(event_loop, e);
                    return;
                }

                self.frames += 1;
                if self.frame_limit.is_some_and(|limit| self.frames >= limit) {
                    log::info!("Stopping after {} frames", self.frames);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }
}

fn event_loop() -> anyhow::Result<EventLoop<()>> {
    #[cfg(all(feature = "integration-tests", target_os = "linux"))]
    let event_loop = {
        use winit::platform::wayland::EventLoopBuilderExtWayland;

        EventLoop::builder().with_any_thread(true).build()?
    };

    #[cfg(all(feature = "integration-tests", target_os = "windows"))]
    let event_loop = {
        use winit::platform::windows::EventLoopBuilderExtWindows;

        EventLoop::builder().with_any_thread(true).build()?
    };

    #[cfg(not(all(
        feature = "integration-tests",
        any(target_os = "linux", target_os = "windows")
    )))]
    let event_loop = EventLoop::new()?;

    Ok(event_loop)
}

fn run_app(mut app: App) -> anyhow::Result<()> {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    };

    let event_loop = event_loop()?;
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Opens a window described by `config` and runs the scene built by `setup` until the
/// window is closed. Errors from setup, update hooks or rendering end the loop and are
/// returned.
pub fn run(
    config: EngineConfig,
    setup: impl FnOnce(&mut Viewport, &mut AssetCache) -> anyhow::Result<()> + 'static,
) -> anyhow::Result<()> {
    run_app(App::new(config, Box::new(setup))?)
}

/// Like [`run`], but exits on its own after `frames` frames.
#[cfg(feature = "integration-tests")]
pub fn run_frames(
    config: EngineConfig,
    frames: u64,
    setup: impl FnOnce(&mut Viewport, &mut AssetCache) -> anyhow::Result<()> + 'static,
) -> anyhow::Result<()> {
    let mut app = App::new(config, Box::new(setup))?;
    app.frame_limit = Some(frames);
    run_app(app)
}
