// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use vgt_math::SceneParams;

pub mod frame;
mod step;

pub use frame::{FrameBackend, FrameError, FramePhase, FrameReport, FrameSynchronizer};
pub use step::{Step, StepFeatures};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentMode {
    #[default]
    Fifo,
    Mailbox,
}

/// Everything a backend needs besides the window. Fixed for the renderer's
/// lifetime; the only runtime knob is the clear color.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    pub present_mode: PresentMode,
    /// Number of frame slots (fence + semaphore pair + command buffer).
    pub frames_in_flight: usize,
    /// Block on the present queue after every present.
    pub wait_for_present: bool,
    pub validation: bool,
    pub scene: SceneParams,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            clear_color: [0.02, 0.02, 0.05, 1.0],
            present_mode: PresentMode::Fifo,
            frames_in_flight: 1,
            wait_for_present: true,
            validation: false,
            scene: SceneParams::default(),
        }
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        step: Step,
        settings: &RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Draws and presents one frame. An error is final: the caller must stop
    /// the loop and drop the renderer.
    fn render(&mut self) -> Result<FrameReport>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
}
