use anyhow::{anyhow, Context, Result};
use ash::khr::swapchain;
use ash::vk;
use tracing::info;
use vgt_render::{PresentMode, RenderSize};

use crate::context::VkContext;

/// Swapchain plus the views and framebuffers built over its images.
pub(crate) struct SwapchainBundle {
    pub loader: swapchain::Device,
    pub swapchain: vk::SwapchainKHR,
    pub extent: vk::Extent2D,
    pub image_views: Vec<vk::ImageView>,
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
}

pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
        .ok_or_else(|| anyhow!("surface reports no formats"))
}

/// FIFO is always available; MAILBOX only when asked for and supported.
pub(crate) fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: PresentMode,
) -> vk::PresentModeKHR {
    match preferred {
        PresentMode::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

pub(crate) fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped when the surface has a maximum.
pub(crate) fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if caps.max_image_count == 0 {
        caps.min_image_count + 1
    } else {
        (caps.min_image_count + 1).min(caps.max_image_count)
    }
}

unsafe fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    // single color attachment: clear → present
    let color_att = vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    };
    let att_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };

    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &att_ref,
        ..Default::default()
    };

    // the layout transition must wait for the acquire semaphore, which is
    // waited at COLOR_ATTACHMENT_OUTPUT
    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    };

    let rp_info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_att,
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    Ok(device.create_render_pass(&rp_info, None)?)
}

impl SwapchainBundle {
    pub unsafe fn new(ctx: &VkContext, hint: RenderSize, preferred: PresentMode) -> Result<Self> {
        let loader = swapchain::Device::new(&ctx.instance, &ctx.device);
        let sl = &ctx.surface_loader;

        let caps = sl.get_physical_device_surface_capabilities(ctx.phys, ctx.surface)?;
        let formats = sl.get_physical_device_surface_formats(ctx.phys, ctx.surface)?;
        let modes = sl.get_physical_device_surface_present_modes(ctx.phys, ctx.surface)?;

        let surf_format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&modes, preferred);
        let extent = extent_from_caps(&caps, hint);

        let families = [ctx.families.graphics, ctx.families.present];
        let (sharing_mode, family_count, p_families) = if ctx.families.is_shared() {
            (vk::SharingMode::EXCLUSIVE, 0, std::ptr::null())
        } else {
            (vk::SharingMode::CONCURRENT, 2, families.as_ptr())
        };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: ctx.surface,
            min_image_count: image_count(&caps),
            image_format: surf_format.format,
            image_color_space: surf_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing_mode,
            queue_family_index_count: family_count,
            p_queue_family_indices: p_families,
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            ..Default::default()
        };

        let swapchain = loader
            .create_swapchain(&swap_info, None)
            .context("create_swapchain")?;

        // From here on `destroy` releases whatever has been created so far.
        let mut bundle = SwapchainBundle {
            loader,
            swapchain,
            extent,
            image_views: Vec::new(),
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
        };
        let image_total = match bundle.create_targets(&ctx.device, surf_format.format) {
            Ok(n) => n,
            Err(e) => {
                bundle.destroy(&ctx.device);
                return Err(e);
            }
        };

        info!(
            "swapchain ready ({}x{}, {} images, fmt {:?}, {:?})",
            extent.width, extent.height, image_total, surf_format.format, present_mode
        );
        Ok(bundle)
    }

    /// Image views, render pass and framebuffers. Returns the image count.
    unsafe fn create_targets(&mut self, device: &ash::Device, format: vk::Format) -> Result<usize> {
        let images = self
            .loader
            .get_swapchain_images(self.swapchain)
            .context("get_swapchain_images")?;

        for &img in &images {
            let sub = vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            };
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image: img,
                view_type: vk::ImageViewType::TYPE_2D,
                format,
                subresource_range: sub,
                ..Default::default()
            };
            self.image_views.push(
                device
                    .create_image_view(&iv_info, None)
                    .context("create_image_view")?,
            );
        }

        self.render_pass = create_render_pass(device, format)?;

        for view in &self.image_views {
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass: self.render_pass,
                attachment_count: 1,
                p_attachments: view,
                width: self.extent.width,
                height: self.extent.height,
                layers: 1,
                ..Default::default()
            };
            self.framebuffers.push(
                device
                    .create_framebuffer(&fb_info, None)
                    .context("create_framebuffer")?,
            );
        }
        Ok(images.len())
    }

    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn full_rect(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }

    pub fn size(&self) -> RenderSize {
        RenderSize {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    /// Reverse creation order. Null handles left by a failed `new` are
    /// ignored by the driver.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for &fb in &self.framebuffers {
            device.destroy_framebuffer(fb, None);
        }
        device.destroy_render_pass(self.render_pass, None);
        for &iv in &self.image_views {
            device.destroy_image_view(iv, None);
        }
        self.loader.destroy_swapchain(self.swapchain, None);
        self.framebuffers.clear();
        self.image_views.clear();
        self.render_pass = vk::RenderPass::null();
        self.swapchain = vk::SwapchainKHR::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn prefers_bgra_unorm_srgb_nonlinear() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            choose_surface_format(&formats).unwrap().format,
            vk::Format::B8G8R8A8_UNORM
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [fmt(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT)];
        assert_eq!(choose_surface_format(&formats).unwrap(), formats[0]);
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn mailbox_only_when_requested_and_supported() {
        let both = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&both, PresentMode::Mailbox), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&both, PresentMode::Fifo), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&fifo_only, PresentMode::Mailbox), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn fixed_extent_wins_over_window_size() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 800, height: 600 },
            ..Default::default()
        };
        let got = extent_from_caps(&caps, RenderSize { width: 1280, height: 720 });
        assert_eq!((got.width, got.height), (800, 600));
    }

    #[test]
    fn undefined_extent_is_clamped_window_size() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 1024, height: 1024 },
            ..Default::default()
        };
        let got = extent_from_caps(&caps, RenderSize { width: 1280, height: 720 });
        assert_eq!((got.width, got.height), (1024, 720));
    }

    #[test]
    fn image_count_respects_maximum() {
        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(image_count(&unbounded), 3);
        assert_eq!(image_count(&capped), 2);
    }
}
