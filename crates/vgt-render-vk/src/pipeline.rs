use anyhow::{anyhow, Context, Result};
use ash::vk;

use crate::shaders::{self, ShaderPair};
use crate::steps::VertexLayout;

pub(crate) struct GraphicsPipeline {
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

unsafe fn create_shader_module(
    device: &ash::Device,
    bytes: &[u8],
    what: &str,
) -> Result<vk::ShaderModule> {
    let code = shaders::words(bytes, what)?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    device
        .create_shader_module(&ci, None)
        .with_context(|| format!("create_shader_module({what})"))
}

impl GraphicsPipeline {
    /// Pipeline for one step. Viewport and scissor are dynamic; culling is
    /// off so the spinning triangle shows both faces.
    pub unsafe fn new(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        shaders: &ShaderPair,
        vertex_layout: Option<&VertexLayout>,
        set_layout: Option<vk::DescriptorSetLayout>,
    ) -> Result<Self> {
        // --- Pipeline layout ---
        let set_layouts: Vec<vk::DescriptorSetLayout> = set_layout.into_iter().collect();
        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            set_layout_count: set_layouts.len() as u32,
            p_set_layouts: set_layouts.as_ptr(),
            ..Default::default()
        };
        let layout = device
            .create_pipeline_layout(&layout_info, None)
            .context("create_pipeline_layout")?;

        // --- Shader modules (destroyed before return) ---
        let vs = create_shader_module(device, shaders.vert, &format!("{}.vert", shaders.name))?;
        let fs = match create_shader_module(device, shaders.frag, &format!("{}.frag", shaders.name)) {
            Ok(fs) => fs,
            Err(e) => {
                device.destroy_shader_module(vs, None);
                device.destroy_pipeline_layout(layout, None);
                return Err(e);
            }
        };
        let entry = c"main";

        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: vs,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: fs,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
        ];

        // --- Vertex input (empty when the shader generates positions) ---
        let bindings: Vec<vk::VertexInputBindingDescription> =
            vertex_layout.iter().map(|l| l.binding()).collect();
        let attributes: Vec<vk::VertexInputAttributeDescription> = vertex_layout
            .map(|l| l.attribute_descriptions())
            .unwrap_or_default();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            vertex_binding_description_count: bindings.len() as u32,
            p_vertex_binding_descriptions: bindings.as_ptr(),
            vertex_attribute_description_count: attributes.len() as u32,
            p_vertex_attribute_descriptions: attributes.as_ptr(),
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            ..Default::default()
        };

        // --- Fixed-function state ---
        let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
            dynamic_state_count: dyn_states.len() as u32,
            p_dynamic_states: dyn_states.as_ptr(),
            ..Default::default()
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };
        let raster = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            line_width: 1.0,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };
        let color_blend_att = vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::RGBA,
            blend_enable: vk::FALSE,
            ..Default::default()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &color_blend_att,
            ..Default::default()
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &color_blend,
            p_dynamic_state: &dynamic_state,
            layout,
            render_pass,
            subpass: 0,
            ..Default::default()
        };

        let created = device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&pipeline_info),
            None,
        );
        device.destroy_shader_module(vs, None);
        device.destroy_shader_module(fs, None);

        let pipeline = match created {
            Ok(p) => p[0],
            Err((_, err)) => {
                device.destroy_pipeline_layout(layout, None);
                return Err(anyhow!("create_graphics_pipelines({}) failed: {err:?}", shaders.name));
            }
        };

        Ok(GraphicsPipeline { layout, pipeline })
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}
