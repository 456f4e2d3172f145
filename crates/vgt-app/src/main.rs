// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use vgt_core::{init_tracing, pause_on_exit};
use vgt_render::{RenderSettings, RenderSize, Renderer, Step};
use vgt_render_vk::VkRenderer;

use vgt_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::{Window, WindowId},
};
use vgt_platform::WindowDesc;

mod config;

use config::load_cfg;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Tutorial step: clear | triangle | vertex-color | transform | lighting
    #[arg(long, default_value_t = Step::Lighting)]
    step: Step,

    /// TOML config file; missing means defaults
    #[arg(long, default_value = "vgt.toml")]
    config: PathBuf,

    /// Exit cleanly after this many presented frames
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    frames: Option<u64>,

    /// Enable the Khronos validation layer regardless of config
    #[arg(long)]
    validation: bool,
}

struct App {
    step: Step,
    window_desc: WindowDesc,
    settings: RenderSettings,
    frame_limit: Option<u64>,

    // field order matters: the renderer must drop before the window
    renderer: Option<VkRenderer>,
    window: Option<Window>,

    fatal: Option<anyhow::Error>,
    exiting: bool,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = event_loop
            .create_window(self.window_desc.attributes())
            .context("create_window")?;

        let size = window.inner_size();
        let render_size = RenderSize {
            width: size.width.max(1),
            height: size.height.max(1),
        };

        let wh = window.window_handle().context("window_handle")?;
        let dh = window.display_handle().context("display_handle")?;
        let renderer = VkRenderer::new(&wh, &dh, render_size, self.step, &self.settings)?;

        info!(
            "step = {}, {}x{}",
            self.step, render_size.width, render_size.height
        );

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    /// Drops the renderer (device idle, then teardown) and leaves the loop.
    fn shutdown(&mut self, event_loop: &ActiveEventLoop, fatal: Option<anyhow::Error>) {
        if let Some(e) = &fatal {
            error!("{e:#}");
        }
        if self.fatal.is_none() {
            self.fatal = fatal;
        }
        self.exiting = true;
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.exiting {
            if let Err(e) = self.init(event_loop) {
                self.shutdown(event_loop, Some(e.context("renderer setup failed")));
                return;
            }
        }

        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop, None);
            }

            WindowEvent::RedrawRequested => {
                if self.exiting {
                    return;
                }
                let Some(renderer) = &mut self.renderer else {
                    return;
                };

                match renderer.render() {
                    Ok(report) => {
                        self.frames = self.frames.saturating_add(1);
                        if self.frame_limit.is_some_and(|n| report.frame >= n) {
                            info!("rendered {} frames, exiting", report.frame);
                            self.shutdown(event_loop, None);
                        }
                    }
                    Err(e) => self.shutdown(event_loop, Some(e.context("frame failed"))),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn run(args: Args) -> Result<()> {
    let cfg = load_cfg(&args.config);
    let event_loop: EventLoop<()> = EventLoop::new()?;

    let mut app = App {
        step: args.step,
        window_desc: cfg.window_desc(args.step),
        settings: cfg.render_settings(args.validation),
        frame_limit: args.frames,
        renderer: None,
        window: None,
        fatal: None,
        exiting: false,
        frames: 0,
        last_fps_instant: Instant::now(),
    };

    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let result = run(args);
    pause_on_exit();
    result
}
