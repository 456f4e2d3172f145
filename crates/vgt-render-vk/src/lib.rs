use std::time::Instant;

use anyhow::{anyhow, ensure, Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};
use vgt_math::{FrameTransforms, SceneParams};
use vgt_render::{FrameReport, FrameSynchronizer, RenderSettings, RenderSize, Renderer, Step};

mod context;
mod descriptors;
mod frame;
mod memory;
mod pipeline;
mod shaders;
mod steps;
mod swapchain;

use context::VkContext;
use descriptors::UniformDescriptors;
use frame::{DrawState, FrameDriver, FrameSlot};
use memory::HostBuffer;
use pipeline::GraphicsPipeline;
use steps::StepPlan;
use swapchain::SwapchainBundle;

/// Objects built on top of the context, in creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Swapchain,
    VertexBuffer,
    Descriptors,
    Pipeline,
    CommandPool,
    /// Sync objects, command buffers and per-slot uniform buffers.
    FrameSlots,
}

impl Stage {
    const CREATION_ORDER: [Stage; 6] = [
        Stage::Swapchain,
        Stage::VertexBuffer,
        Stage::Descriptors,
        Stage::Pipeline,
        Stage::CommandPool,
        Stage::FrameSlots,
    ];

    fn teardown_order() -> impl Iterator<Item = Stage> {
        Self::CREATION_ORDER.into_iter().rev()
    }
}

pub struct VkRenderer {
    plan: StepPlan,
    scene: SceneParams,
    started: Instant,
    clear: vk::ClearValue,

    sync: FrameSynchronizer,
    swapchain: Option<SwapchainBundle>,
    vertex_buffer: Option<HostBuffer>,
    descriptors: Option<UniformDescriptors>,
    pipeline: Option<GraphicsPipeline>,
    cmd_pool: vk::CommandPool,
    slots: Vec<FrameSlot>,

    // dropped last, after `Drop::drop` released everything above
    ctx: VkContext,
}

// Teardown: device idle first, then reverse creation order. Runs for a
// renderer that failed halfway through setup too; missing pieces are
// skipped. The context (device, surface, instance) goes last, in its own
// Drop.
impl Drop for VkRenderer {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();
            for stage in Stage::teardown_order() {
                self.release(stage);
            }
        }
    }
}

fn clear_value(rgba: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: rgba },
    }
}

impl VkRenderer {
    unsafe fn release(&mut self, stage: Stage) {
        let d = &self.ctx.device;
        match stage {
            Stage::FrameSlots => {
                for slot in &mut self.slots {
                    slot.destroy(d);
                }
                let cmds: Vec<vk::CommandBuffer> = self.slots.iter().map(|s| s.cmd).collect();
                if !cmds.is_empty() {
                    d.free_command_buffers(self.cmd_pool, &cmds);
                }
                self.slots.clear();
            }
            Stage::CommandPool => {
                if self.cmd_pool != vk::CommandPool::null() {
                    d.destroy_command_pool(self.cmd_pool, None);
                    self.cmd_pool = vk::CommandPool::null();
                }
            }
            Stage::Pipeline => {
                if let Some(p) = self.pipeline.take() {
                    p.destroy(d);
                }
            }
            Stage::Descriptors => {
                if let Some(mut desc) = self.descriptors.take() {
                    desc.destroy(d);
                }
            }
            Stage::VertexBuffer => {
                if let Some(mut vb) = self.vertex_buffer.take() {
                    vb.destroy(d);
                }
            }
            Stage::Swapchain => {
                if let Some(mut sc) = self.swapchain.take() {
                    sc.destroy(d);
                }
            }
        }
    }

    /// Fills every stage in creation order. An early return leaves the
    /// renderer partially built; its Drop releases what exists.
    unsafe fn create_resources(&mut self, size: RenderSize, settings: &RenderSettings) -> Result<()> {
        for stage in Stage::CREATION_ORDER {
            debug!("setup: {stage:?}");
            self.create(stage, size, settings)
                .with_context(|| format!("setup stage {stage:?}"))?;
        }
        Ok(())
    }

    unsafe fn create(&mut self, stage: Stage, size: RenderSize, settings: &RenderSettings) -> Result<()> {
        let ctx = &self.ctx;
        match stage {
            Stage::Swapchain => {
                self.swapchain = Some(SwapchainBundle::new(ctx, size, settings.present_mode)?);
            }
            Stage::VertexBuffer => {
                // written once, never touched by the frame loop
                if let Some(v) = &self.plan.vertices {
                    let vb = HostBuffer::new(
                        &ctx.instance,
                        &ctx.device,
                        ctx.phys,
                        v.bytes.len() as vk::DeviceSize,
                        vk::BufferUsageFlags::VERTEX_BUFFER,
                    )
                    .context("vertex buffer")?;
                    self.vertex_buffer.insert(vb).upload(&ctx.device, &v.bytes)?;
                }
            }
            Stage::Descriptors => {
                if self.plan.uniform.size() > 0 {
                    self.descriptors = Some(UniformDescriptors::new(
                        &ctx.device,
                        self.plan.uniform.stages(),
                        self.sync.frames_in_flight() as u32,
                    )?);
                }
            }
            Stage::Pipeline => {
                if let Some(shaders) = &self.plan.shaders {
                    let render_pass = self
                        .swapchain
                        .as_ref()
                        .map(|sc| sc.render_pass)
                        .ok_or_else(|| anyhow!("pipeline needs the swapchain render pass"))?;
                    self.pipeline = Some(GraphicsPipeline::new(
                        &ctx.device,
                        render_pass,
                        shaders,
                        self.plan.vertices.as_ref().map(|v| &v.layout),
                        self.descriptors.as_ref().map(|d| d.layout),
                    )?);
                }
            }
            Stage::CommandPool => {
                let pool_info = vk::CommandPoolCreateInfo {
                    s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
                    queue_family_index: ctx.families.graphics,
                    flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
                    ..Default::default()
                };
                self.cmd_pool = ctx
                    .device
                    .create_command_pool(&pool_info, None)
                    .context("create_command_pool")?;
            }
            Stage::FrameSlots => self.create_slots()?,
        }
        Ok(())
    }

    /// One command buffer, fence and semaphore pair per slot, plus a
    /// persistently mapped uniform buffer when the step has uniforms.
    unsafe fn create_slots(&mut self) -> Result<()> {
        let ctx = &self.ctx;
        let count = self.sync.frames_in_flight();
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.cmd_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        // buffers not yet owned by a slot are freed with the pool
        let cmd_bufs = ctx
            .device
            .allocate_command_buffers(&alloc_info)
            .context("allocate_command_buffers")?;
        for cmd in cmd_bufs {
            self.slots.push(FrameSlot::new(&ctx.device, cmd)?);
        }

        let Some(desc) = &self.descriptors else {
            return Ok(());
        };
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let ubo = HostBuffer::new(
                &ctx.instance,
                &ctx.device,
                ctx.phys,
                self.plan.uniform.size(),
                vk::BufferUsageFlags::UNIFORM_BUFFER,
            )
            .context("uniform buffer")?;
            let ubo = slot.uniform.insert(ubo);
            ubo.map_persistent(&ctx.device)?;
            desc.bind_buffer(&ctx.device, i, ubo.buffer, ubo.size());
        }
        Ok(())
    }
}

unsafe fn build_renderer(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    size: RenderSize,
    step: Step,
    settings: &RenderSettings,
) -> Result<VkRenderer> {
    let plan = StepPlan::for_step(step);
    ensure!(
        plan.features() == step.features(),
        "step `{step}` plan provides {:?}, expected {:?}",
        plan.features(),
        step.features()
    );

    let ctx = VkContext::new(window, display, settings.validation)?;
    let mut renderer = VkRenderer {
        plan,
        scene: settings.scene,
        started: Instant::now(),
        clear: clear_value(settings.clear_color),
        sync: FrameSynchronizer::new(settings.frames_in_flight, settings.wait_for_present),
        swapchain: None,
        vertex_buffer: None,
        descriptors: None,
        pipeline: None,
        cmd_pool: vk::CommandPool::null(),
        slots: Vec::new(),
        ctx,
    };
    renderer.create_resources(size, settings)?;
    Ok(renderer)
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        step: Step,
        settings: &RenderSettings,
    ) -> Result<Self> {
        unsafe {
            let r = build_renderer(window, display, size, step, settings)?;
            info!(
                "step `{}` ready ({} frame slot(s), wait_for_present={})",
                r.plan.step,
                r.sync.frames_in_flight(),
                settings.wait_for_present
            );
            Ok(r)
        }
    }

    fn render(&mut self) -> Result<FrameReport> {
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or_else(|| anyhow!("renderer has no swapchain"))?;

        // matrices are pure CPU work; they reach the GPU in `record`, after
        // the slot fence has been waited on
        let elapsed = self.started.elapsed().as_secs_f32();
        let transforms = FrameTransforms::compute(&self.scene, elapsed, swapchain.size().aspect());

        let mut driver = FrameDriver {
            device: &self.ctx.device,
            graphics_queue: self.ctx.graphics_queue,
            present_queue: self.ctx.present_queue,
            swapchain,
            slots: &self.slots,
            draw: DrawState {
                pipeline: self.pipeline.as_ref(),
                vertex_buffer: self.vertex_buffer.as_ref().map(|vb| vb.buffer),
                descriptors: self.descriptors.as_ref(),
                draw_count: self.plan.draw_count,
                clear: self.clear,
            },
            uniforms: self.plan.uniform.pack(&transforms),
        };

        Ok(self.sync.run_frame(&mut driver)?)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = clear_value(rgba);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[Stage], stage: Stage) -> usize {
        order.iter().position(|&s| s == stage).unwrap()
    }

    #[test]
    fn teardown_reverses_creation() {
        let teardown: Vec<Stage> = Stage::teardown_order().collect();
        let mut created = Stage::CREATION_ORDER.to_vec();
        created.reverse();
        assert_eq!(teardown, created);
        assert_eq!(teardown.first(), Some(&Stage::FrameSlots));
        assert_eq!(teardown.last(), Some(&Stage::Swapchain));
    }

    #[test]
    fn every_stage_is_released_once() {
        let teardown: Vec<Stage> = Stage::teardown_order().collect();
        for stage in Stage::CREATION_ORDER {
            assert_eq!(teardown.iter().filter(|&&s| s == stage).count(), 1, "{stage:?}");
        }
    }

    #[test]
    fn dependents_are_released_before_what_they_use() {
        let teardown: Vec<Stage> = Stage::teardown_order().collect();
        // (user, used): the user must go first
        let edges = [
            (Stage::FrameSlots, Stage::CommandPool),
            (Stage::FrameSlots, Stage::Descriptors),
            (Stage::Pipeline, Stage::Descriptors),
            (Stage::Pipeline, Stage::Swapchain),
            (Stage::FrameSlots, Stage::VertexBuffer),
        ];
        for (user, used) in edges {
            assert!(
                position(&teardown, user) < position(&teardown, used),
                "{user:?} must be released before {used:?}"
            );
        }
    }
}
