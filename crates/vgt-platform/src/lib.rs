// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use winit::dpi::PhysicalSize;
use winit::window::WindowAttributes;

/// Fixed-size window description; the steps never handle resizing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowDesc {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowDesc {
    fn default() -> Self {
        WindowDesc {
            title: "vgt".to_owned(),
            width: 1280,
            height: 720,
        }
    }
}

impl WindowDesc {
    pub fn attributes(&self) -> WindowAttributes {
        tracing::debug!("window {}x{} \"{}\"", self.width, self.height, self.title);
        WindowAttributes::default()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(self.width.max(1), self.height.max(1)))
            .with_resizable(false)
    }
}
