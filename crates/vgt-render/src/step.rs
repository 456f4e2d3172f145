// SPDX-License-Identifier: CEPL-1.0
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

bitflags! {
    /// Resources a step adds on top of the clear-screen baseline.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct StepFeatures: u32 {
        const PIPELINE       = 1 << 0;
        const VERTEX_BUFFER  = 1 << 1;
        const UNIFORM_BUFFER = 1 << 2;
        const LIGHTING       = 1 << 3;
    }
}

/// The tutorial steps, in teaching order. Each one adds a single concept to
/// the previous.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Step {
    /// Swapchain + render pass, clear only.
    Clear,
    /// Graphics pipeline; vertices hardcoded in the vertex shader.
    Triangle,
    /// Host-visible vertex buffer with per-vertex color.
    VertexColor,
    /// Uniform buffer + descriptor set carrying a spinning MVP.
    Transform,
    /// Normals, normal matrix and a directional light.
    #[default]
    Lighting,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Clear,
        Step::Triangle,
        Step::VertexColor,
        Step::Transform,
        Step::Lighting,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::Clear => "clear",
            Step::Triangle => "triangle",
            Step::VertexColor => "vertex-color",
            Step::Transform => "transform",
            Step::Lighting => "lighting",
        }
    }

    pub fn features(self) -> StepFeatures {
        match self {
            Step::Clear => StepFeatures::empty(),
            Step::Triangle => StepFeatures::PIPELINE,
            Step::VertexColor => StepFeatures::PIPELINE | StepFeatures::VERTEX_BUFFER,
            Step::Transform => {
                StepFeatures::PIPELINE | StepFeatures::VERTEX_BUFFER | StepFeatures::UNIFORM_BUFFER
            }
            Step::Lighting => StepFeatures::all(),
        }
    }

    /// Window title used when the config does not set one.
    pub fn title(self) -> String {
        format!("vgt - {}", self.name())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .into_iter()
            .find(|step| step.name() == s)
            .ok_or_else(|| format!("unknown step `{s}`"))
    }
}
