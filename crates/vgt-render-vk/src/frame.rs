//! Frame slots and the Vulkan side of the frame protocol.

use anyhow::{anyhow, Context, Result};
use ash::vk;
use vgt_render::FrameBackend;

use crate::descriptors::UniformDescriptors;
use crate::memory::HostBuffer;
use crate::pipeline::GraphicsPipeline;
use crate::steps::UniformData;
use crate::swapchain::SwapchainBundle;

/// Objects owned by one frame in flight. None of them is touched again
/// until `in_flight` has been waited on.
pub(crate) struct FrameSlot {
    pub cmd: vk::CommandBuffer,
    pub in_flight: vk::Fence,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub uniform: Option<HostBuffer>,
}

impl FrameSlot {
    /// The fence starts signaled so the first wait returns immediately.
    /// On failure nothing created here outlives the call.
    pub unsafe fn new(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<Self> {
        let mut slot = FrameSlot {
            cmd,
            in_flight: vk::Fence::null(),
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            uniform: None,
        };
        if let Err(e) = slot.create_sync(device) {
            slot.destroy(device);
            return Err(e);
        }
        Ok(slot)
    }

    unsafe fn create_sync(&mut self, device: &ash::Device) -> Result<()> {
        let sem_ci = vk::SemaphoreCreateInfo::default();
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        self.in_flight = device.create_fence(&fence_ci, None).context("create_fence")?;
        self.image_available = device
            .create_semaphore(&sem_ci, None)
            .context("create_semaphore(image_available)")?;
        self.render_finished = device
            .create_semaphore(&sem_ci, None)
            .context("create_semaphore(render_finished)")?;
        Ok(())
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if let Some(mut ubo) = self.uniform.take() {
            ubo.destroy(device);
        }
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_semaphore(self.image_available, None);
        device.destroy_fence(self.in_flight, None);
    }
}

/// Draw resources recorded into every frame.
pub(crate) struct DrawState<'a> {
    pub pipeline: Option<&'a GraphicsPipeline>,
    pub vertex_buffer: Option<vk::Buffer>,
    pub descriptors: Option<&'a UniformDescriptors>,
    pub draw_count: u32,
    pub clear: vk::ClearValue,
}

/// Borrowed view of the renderer for the duration of one frame.
pub(crate) struct FrameDriver<'a> {
    pub device: &'a ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub swapchain: &'a SwapchainBundle,
    pub slots: &'a [FrameSlot],
    pub draw: DrawState<'a>,
    pub uniforms: Option<UniformData>,
}

impl FrameDriver<'_> {
    unsafe fn record_commands(&self, slot: usize, image: u32) -> Result<()> {
        let d = self.device;
        let cmd = self.slots[slot].cmd;
        let framebuffer = *self
            .swapchain
            .framebuffers
            .get(image as usize)
            .ok_or_else(|| anyhow!("image index {image} out of range"))?;

        d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        d.begin_command_buffer(cmd, &begin)?;

        let clears = [self.draw.clear];
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: self.swapchain.render_pass,
            framebuffer,
            render_area: self.swapchain.full_rect(),
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);

        if let Some(pipeline) = self.draw.pipeline {
            d.cmd_set_viewport(cmd, 0, &[self.swapchain.viewport()]);
            d.cmd_set_scissor(cmd, 0, &[self.swapchain.full_rect()]);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);

            if let Some(desc) = self.draw.descriptors {
                d.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline.layout,
                    0,
                    &[desc.sets[slot]],
                    &[],
                );
            }
            if let Some(vb) = self.draw.vertex_buffer {
                d.cmd_bind_vertex_buffers(cmd, 0, &[vb], &[0]);
            }
            d.cmd_draw(cmd, self.draw.draw_count, 1, 0, 0);
        }

        d.cmd_end_render_pass(cmd);
        d.end_command_buffer(cmd)?;
        Ok(())
    }
}

impl FrameBackend for FrameDriver<'_> {
    fn wait_fence(&mut self, slot: usize) -> Result<()> {
        let fence = self.slots[slot].in_flight;
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }
            .context("wait_for_fences")
    }

    fn reset_fence(&mut self, slot: usize) -> Result<()> {
        let fence = self.slots[slot].in_flight;
        unsafe { self.device.reset_fences(&[fence]) }.context("reset_fences")
    }

    fn acquire(&mut self, slot: usize) -> Result<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain.loader.acquire_next_image(
                self.swapchain.swapchain,
                u64::MAX,
                self.slots[slot].image_available,
                vk::Fence::null(),
            )
        }
        .context("acquire_next_image")?;
        // the window never resizes, so anything but SUCCESS is fatal
        if suboptimal {
            return Err(anyhow!("acquire_next_image: SUBOPTIMAL_KHR"));
        }
        Ok(index)
    }

    fn record(&mut self, slot: usize, image: u32) -> Result<()> {
        if let Some(data) = &self.uniforms {
            let ubo = self.slots[slot]
                .uniform
                .as_ref()
                .ok_or_else(|| anyhow!("slot {slot} has no uniform buffer"))?;
            unsafe { ubo.write(data.as_bytes()) }?;
        }
        unsafe { self.record_commands(slot, image) }
    }

    fn submit(&mut self, slot: usize, _image: u32) -> Result<()> {
        let s = &self.slots[slot];
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.image_available,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &s.cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &s.render_finished,
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, std::slice::from_ref(&submit), s.in_flight)
        }
        .context("queue_submit")
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<()> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &self.slots[slot].render_finished,
            swapchain_count: 1,
            p_swapchains: &self.swapchain.swapchain,
            p_image_indices: &image,
            ..Default::default()
        };
        let suboptimal = unsafe {
            self.swapchain
                .loader
                .queue_present(self.present_queue, &present)
        }
        .context("queue_present")?;
        if suboptimal {
            return Err(anyhow!("queue_present: SUBOPTIMAL_KHR"));
        }
        Ok(())
    }

    fn wait_present_idle(&mut self) -> Result<()> {
        unsafe { self.device.queue_wait_idle(self.present_queue) }.context("queue_wait_idle")
    }
}
