//! Instance, validation messenger, surface and logical device.
//!
//! Everything else is created from a `VkContext` and must be destroyed
//! before it drops.

use std::ffi::{c_void, CStr, CString};

use anyhow::{anyhow, Context, Result};
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, error, info, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Graphics and present may live in different queue families.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

pub(crate) struct VkContext {
    _entry: Entry,
    pub instance: Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,

    pub phys: vk::PhysicalDevice,
    pub device: ash::Device,
    pub families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

impl Drop for VkContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[validation] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[validation] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        info!("[validation] {msg}");
    } else {
        debug!("[validation] {msg}");
    }
    vk::FALSE
}

unsafe fn validation_available(entry: &Entry) -> bool {
    match entry.enumerate_instance_layer_properties() {
        Ok(layers) => layers
            .iter()
            .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER)),
        Err(e) => {
            warn!("enumerate_instance_layer_properties: {e}");
            false
        }
    }
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    validation: bool,
) -> Result<Instance> {
    let app_name = CString::new("vulkan-glsl-tutorial")?;
    let engine_name = CString::new("vgt")?;

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: vk::make_api_version(0, 0, 1, 0),
        p_engine_name: engine_name.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut ext_vec = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();
    let layers = if validation {
        ext_vec.push(debug_utils::NAME.as_ptr());
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: ext_vec.len() as u32,
        pp_enabled_extension_names: ext_vec.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: if layers.is_empty() {
            std::ptr::null()
        } else {
            layers.as_ptr()
        },
        ..Default::default()
    };

    Ok(entry.create_instance(&create_info, None)?)
}

unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Result<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = loader
        .create_debug_utils_messenger(&ci, None)
        .context("create_debug_utils_messenger")?;
    Ok((loader, messenger))
}

/// First device that can both draw and present; graphics and present
/// families are chosen independently.
unsafe fn pick_device_and_queues(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
    for phys in instance.enumerate_physical_devices()? {
        let qprops = instance.get_physical_device_queue_family_properties(phys);
        let mut graphics = None;
        let mut present = None;
        for (i, q) in qprops.iter().enumerate() {
            let i = i as u32;
            if graphics.is_none() && q.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                graphics = Some(i);
            }
            if present.is_none()
                && surface_loader
                    .get_physical_device_surface_support(phys, i, surface)
                    .unwrap_or(false)
            {
                present = Some(i);
            }
        }
        if let (Some(graphics), Some(present)) = (graphics, present) {
            let props = instance.get_physical_device_properties(phys);
            let name = props
                .device_name_as_c_str()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!("GPU: {name} (graphics q{graphics}, present q{present})");
            return Ok((phys, QueueFamilies { graphics, present }));
        }
    }
    Err(anyhow!("no suitable physical device/queue family"))
}

impl VkContext {
    pub unsafe fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        validation: bool,
    ) -> Result<Self> {
        let entry = Entry::linked();

        let dh = display.display_handle()?.as_raw();
        let wh = window.window_handle()?.as_raw();

        let validation = if validation && !validation_available(&entry) {
            warn!("validation requested but VK_LAYER_KHRONOS_validation is not installed");
            false
        } else {
            validation
        };

        let instance = create_instance(&entry, dh, validation).context("create_instance")?;
        let debug = if validation {
            match create_debug_messenger(&entry, &instance) {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!("{e:#}; continuing without validation messages");
                    None
                }
            }
        } else {
            None
        };

        let surface = ash_window::create_surface(&entry, &instance, dh, wh, None)
            .context("create_surface")?;
        let surface_loader = surface::Instance::new(&entry, &instance);

        let (phys, families) = pick_device_and_queues(&instance, &surface_loader, surface)?;

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let device_exts = [swapchain::NAME.as_ptr()];
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            ..Default::default()
        };

        let device = instance
            .create_device(phys, &dinfo, None)
            .context("create_device")?;
        let graphics_queue = device.get_device_queue(families.graphics, 0);
        let present_queue = device.get_device_queue(families.present, 0);

        Ok(VkContext {
            _entry: entry,
            instance,
            debug,
            surface_loader,
            surface,
            phys,
            device,
            families,
            graphics_queue,
            present_queue,
        })
    }
}
