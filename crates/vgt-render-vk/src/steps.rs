//! Per-step resource plan: which shaders, which vertices, which uniforms.
//!
//! One setup path serves every step; a step only changes the inputs here.

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use vgt_math::{FrameTransforms, LightingUniforms, TransformUniforms};
use vgt_render::{Step, StepFeatures};

use crate::shaders::{self, ShaderPair};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct FlatColorVertex {
    pub pos: [f32; 2],
    pub color: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ColorVertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct LitVertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
}

const FLAT_COLOR_TRIANGLE: [FlatColorVertex; 3] = [
    FlatColorVertex { pos: [0.0, -0.5], color: [1.0, 0.0, 0.0] },
    FlatColorVertex { pos: [0.5, 0.5], color: [0.0, 1.0, 0.0] },
    FlatColorVertex { pos: [-0.5, 0.5], color: [0.0, 0.0, 1.0] },
];

const COLOR_TRIANGLE: [ColorVertex; 3] = [
    ColorVertex { pos: [0.0, -0.5, 0.0], color: [1.0, 0.0, 0.0] },
    ColorVertex { pos: [0.5, 0.5, 0.0], color: [0.0, 1.0, 0.0] },
    ColorVertex { pos: [-0.5, 0.5, 0.0], color: [0.0, 0.0, 1.0] },
];

const LIT_TRIANGLE: [LitVertex; 3] = [
    LitVertex { pos: [0.0, -0.5, 0.0], normal: [0.0, 0.0, 1.0] },
    LitVertex { pos: [0.5, 0.5, 0.0], normal: [0.0, 0.0, 1.0] },
    LitVertex { pos: [-0.5, 0.5, 0.0], normal: [0.0, 0.0, 1.0] },
];

/// Single interleaved binding at slot 0.
#[derive(Clone, Debug)]
pub(crate) struct VertexLayout {
    pub stride: u32,
    /// (location, format, offset)
    pub attributes: Vec<(u32, vk::Format, u32)>,
}

impl VertexLayout {
    pub fn binding(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: self.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.attributes
            .iter()
            .map(|&(location, format, offset)| vk::VertexInputAttributeDescription {
                location,
                binding: 0,
                format,
                offset,
            })
            .collect()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct VertexData {
    pub bytes: Vec<u8>,
    pub count: u32,
    pub layout: VertexLayout,
}

impl VertexData {
    fn from_slice<V: Pod>(vertices: &[V], attributes: Vec<(u32, vk::Format, u32)>) -> Self {
        VertexData {
            bytes: bytemuck::cast_slice(vertices).to_vec(),
            count: vertices.len() as u32,
            layout: VertexLayout {
                stride: size_of::<V>() as u32,
                attributes,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UniformKind {
    None,
    Transform,
    Lighting,
}

/// One frame's uniform block, ready to be copied into a mapped region.
#[derive(Clone, Copy, Debug)]
pub(crate) enum UniformData {
    Transform(TransformUniforms),
    Lighting(LightingUniforms),
}

impl UniformData {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UniformData::Transform(u) => bytemuck::bytes_of(u),
            UniformData::Lighting(u) => bytemuck::bytes_of(u),
        }
    }
}

impl UniformKind {
    pub fn size(self) -> vk::DeviceSize {
        match self {
            UniformKind::None => 0,
            UniformKind::Transform => size_of::<TransformUniforms>() as vk::DeviceSize,
            UniformKind::Lighting => size_of::<LightingUniforms>() as vk::DeviceSize,
        }
    }

    pub fn stages(self) -> vk::ShaderStageFlags {
        match self {
            UniformKind::None => vk::ShaderStageFlags::empty(),
            UniformKind::Transform => vk::ShaderStageFlags::VERTEX,
            UniformKind::Lighting => vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn pack(self, transforms: &FrameTransforms) -> Option<UniformData> {
        match self {
            UniformKind::None => None,
            UniformKind::Transform => Some(UniformData::Transform(transforms.to_transform_uniforms())),
            UniformKind::Lighting => Some(UniformData::Lighting(transforms.to_lighting_uniforms())),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct StepPlan {
    pub step: Step,
    pub shaders: Option<ShaderPair>,
    pub vertices: Option<VertexData>,
    pub draw_count: u32,
    pub uniform: UniformKind,
}

impl StepPlan {
    pub fn for_step(step: Step) -> Self {
        let vec2 = vk::Format::R32G32_SFLOAT;
        let vec3 = vk::Format::R32G32B32_SFLOAT;

        let (shaders, vertices, uniform) = match step {
            Step::Clear => (None, None, UniformKind::None),
            Step::Triangle => (Some(shaders::TRIANGLE), None, UniformKind::None),
            Step::VertexColor => (
                Some(shaders::VERTEX_COLOR),
                Some(VertexData::from_slice(
                    &FLAT_COLOR_TRIANGLE,
                    vec![
                        (0, vec2, offset_of!(FlatColorVertex, pos) as u32),
                        (1, vec3, offset_of!(FlatColorVertex, color) as u32),
                    ],
                )),
                UniformKind::None,
            ),
            Step::Transform => (
                Some(shaders::TRANSFORM),
                Some(VertexData::from_slice(
                    &COLOR_TRIANGLE,
                    vec![
                        (0, vec3, offset_of!(ColorVertex, pos) as u32),
                        (1, vec3, offset_of!(ColorVertex, color) as u32),
                    ],
                )),
                UniformKind::Transform,
            ),
            Step::Lighting => (
                Some(shaders::LIGHTING),
                Some(VertexData::from_slice(
                    &LIT_TRIANGLE,
                    vec![
                        (0, vec3, offset_of!(LitVertex, pos) as u32),
                        (1, vec3, offset_of!(LitVertex, normal) as u32),
                    ],
                )),
                UniformKind::Lighting,
            ),
        };

        let draw_count = match (&shaders, &vertices) {
            (None, _) => 0,
            (Some(_), Some(v)) => v.count,
            // vertices generated from gl_VertexIndex
            (Some(_), None) => 3,
        };

        StepPlan {
            step,
            shaders,
            vertices,
            draw_count,
            uniform,
        }
    }

    pub fn features(&self) -> StepFeatures {
        let mut f = StepFeatures::empty();
        f.set(StepFeatures::PIPELINE, self.shaders.is_some());
        f.set(StepFeatures::VERTEX_BUFFER, self.vertices.is_some());
        f.set(StepFeatures::UNIFORM_BUFFER, self.uniform != UniformKind::None);
        f.set(StepFeatures::LIGHTING, self.uniform == UniformKind::Lighting);
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgt_math::SceneParams;

    #[test]
    fn plans_provide_exactly_the_advertised_features() {
        for step in Step::ALL {
            assert_eq!(StepPlan::for_step(step).features(), step.features(), "{step}");
        }
    }

    #[test]
    fn vertex_layouts_cover_the_whole_vertex() {
        for step in Step::ALL {
            let plan = StepPlan::for_step(step);
            let Some(v) = plan.vertices else { continue };
            assert_eq!(v.bytes.len(), (v.layout.stride * v.count) as usize);
            let binding = v.layout.binding();
            assert_eq!(binding.stride, v.layout.stride);

            let attrs = v.layout.attribute_descriptions();
            let locations: Vec<u32> = attrs.iter().map(|a| a.location).collect();
            assert_eq!(locations, vec![0, 1]);
            assert_eq!(attrs[0].offset, 0);
            assert!(attrs[1].offset < v.layout.stride);
        }
    }

    #[test]
    fn flat_color_vertex_is_packed() {
        assert_eq!(size_of::<FlatColorVertex>(), 20);
        assert_eq!(offset_of!(FlatColorVertex, color), 8);
        assert_eq!(size_of::<LitVertex>(), 24);
    }

    #[test]
    fn clear_draws_nothing_and_triangle_draws_three() {
        assert_eq!(StepPlan::for_step(Step::Clear).draw_count, 0);
        assert_eq!(StepPlan::for_step(Step::Triangle).draw_count, 3);
        assert_eq!(StepPlan::for_step(Step::Lighting).draw_count, 3);
    }

    #[test]
    fn packed_uniforms_match_the_declared_size() {
        let t = FrameTransforms::compute(&SceneParams::default(), 0.5, 1.0);
        for kind in [UniformKind::Transform, UniformKind::Lighting] {
            let data = kind.pack(&t).unwrap();
            assert_eq!(data.as_bytes().len() as vk::DeviceSize, kind.size());
        }
        assert!(UniformKind::None.pack(&t).is_none());
        assert!(UniformKind::Lighting.stages().contains(vk::ShaderStageFlags::FRAGMENT));
    }
}
