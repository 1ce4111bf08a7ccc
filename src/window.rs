use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use pollster::block_on;
use thiserror::Error;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::SphereDemo;
use crate::config::DemoConfig;
use crate::render::GpuContext;
use crate::shader::IncludeResolver;

/// The platform could not give us a window or event loop, typically because
/// no display is available.
#[derive(Debug, Error)]
#[error("failed to initialize {stage}: {message}")]
pub struct WindowInitError {
    stage: &'static str,
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &'static str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            stage,
            message: panic_message(panic),
        }
    }

    fn from_error(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self {
            stage,
            message: err.to_string(),
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

/// Whether `drawn` frames already satisfy the `--frames` limit.
fn frame_budget_spent(limit: Option<u32>, drawn: u32) -> bool {
    limit.is_some_and(|limit| drawn >= limit)
}

/// Opens the window and drives setup once, then one frame step per redraw.
pub fn run_windowed(config: &DemoConfig) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut host = WindowHost::new(config);
    event_loop
        .run_app(&mut host)
        .context("event loop terminated with error")?;

    match host.last_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct Running {
    ctx: GpuContext,
    demo: SphereDemo,
}

struct WindowHost<'a> {
    config: &'a DemoConfig,
    shaders: Box<dyn IncludeResolver>,
    running: Option<Running>,
    frames_drawn: u32,
    last_error: Option<anyhow::Error>,
}

impl<'a> WindowHost<'a> {
    fn new(config: &'a DemoConfig) -> Self {
        Self {
            config,
            shaders: config.shader_resolver(),
            running: None,
            frames_drawn: 0,
            last_error: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.as_str())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false);
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );
        info!(
            "created {}x{} window",
            window.inner_size().width,
            window.inner_size().height
        );

        let mut ctx = block_on(GpuContext::new(window)).context("failed to create GPU context")?;
        let demo = SphereDemo::setup(&mut ctx, self.shaders.as_ref())?;
        Ok(Running { ctx, demo })
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if frame_budget_spent(self.config.frames, self.frames_drawn) {
            event_loop.exit();
            return Ok(());
        }
        let Some(running) = self.running.as_mut() else {
            return Ok(());
        };
        running.demo.frame(&mut running.ctx)?;
        match running.ctx.present() {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("surface lost; reconfiguring");
                running.ctx.reconfigure();
            }
            Err(wgpu::SurfaceError::Timeout) => {
                debug!("surface timeout; retrying next frame");
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(anyhow!("GPU is out of memory"));
            }
            Err(err) => return Err(anyhow!("surface error: {err}")),
        }

        self.frames_drawn += 1;
        if frame_budget_spent(self.config.frames, self.frames_drawn) {
            info!("drew {} frame(s); exiting", self.frames_drawn);
            event_loop.exit();
        }
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.last_error = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for WindowHost<'_> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => self.running = Some(running),
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if id != running.ctx.window_id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => running.ctx.resize(size),
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw(event_loop) {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = self.running.as_ref() {
            running.ctx.window().request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let string: Box<dyn Any + Send> = Box::new(String::from("no display"));
        assert_eq!(panic_message(string), "no display");
        let static_str: Box<dyn Any + Send> = Box::new("no DISPLAY set");
        assert_eq!(panic_message(static_str), "no DISPLAY set");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other), "unknown panic");
    }

    #[test]
    fn zero_frame_limit_draws_nothing() {
        assert!(frame_budget_spent(Some(0), 0));
        assert!(!frame_budget_spent(Some(2), 1));
        assert!(frame_budget_spent(Some(2), 2));
        assert!(!frame_budget_spent(None, u32::MAX));
    }

    #[test]
    fn init_error_names_stage() {
        let err = WindowInitError::from_error("window", "backend unavailable");
        assert_eq!(
            err.to_string(),
            "failed to initialize window: backend unavailable"
        );
    }
}
