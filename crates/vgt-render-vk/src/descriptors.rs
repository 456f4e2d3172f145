use anyhow::{Context, Result};
use ash::vk;

/// Binding 0 uniform buffer, one descriptor set per frame slot.
pub(crate) struct UniformDescriptors {
    pub layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    pub sets: Vec<vk::DescriptorSet>,
}

impl UniformDescriptors {
    pub unsafe fn new(
        device: &ash::Device,
        stages: vk::ShaderStageFlags,
        set_count: u32,
    ) -> Result<Self> {
        let binding = vk::DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: stages,
            ..Default::default()
        };
        let layout_info = vk::DescriptorSetLayoutCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
            binding_count: 1,
            p_bindings: &binding,
            ..Default::default()
        };
        let layout = device
            .create_descriptor_set_layout(&layout_info, None)
            .context("create_descriptor_set_layout")?;

        let mut desc = UniformDescriptors {
            layout,
            pool: vk::DescriptorPool::null(),
            sets: Vec::new(),
        };
        if let Err(e) = desc.allocate_sets(device, set_count) {
            desc.destroy(device);
            return Err(e);
        }
        Ok(desc)
    }

    unsafe fn allocate_sets(&mut self, device: &ash::Device, set_count: u32) -> Result<()> {
        let pool_size = vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: set_count,
        };
        let pool_info = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: set_count,
            pool_size_count: 1,
            p_pool_sizes: &pool_size,
            ..Default::default()
        };
        self.pool = device
            .create_descriptor_pool(&pool_info, None)
            .context("create_descriptor_pool")?;

        let layouts = vec![self.layout; set_count as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: self.pool,
            descriptor_set_count: set_count,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        self.sets = device
            .allocate_descriptor_sets(&alloc_info)
            .context("allocate_descriptor_sets")?;
        Ok(())
    }

    /// Points set `index` at `buffer[0..range]`.
    pub unsafe fn bind_buffer(
        &self,
        device: &ash::Device,
        index: usize,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) {
        let info = vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range,
        };
        let write = vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: self.sets[index],
            dst_binding: 0,
            dst_array_element: 0,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            p_buffer_info: &info,
            ..Default::default()
        };
        device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
    }

    /// Sets are freed with the pool.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
        device.destroy_descriptor_set_layout(self.layout, None);
        self.sets.clear();
    }
}
