use anyhow::{anyhow, Context, Result};
use ash::vk;

/// Index of the first memory type allowed by `type_bits` that has all of
/// `required` set.
pub(crate) fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    props.memory_types[..props.memory_type_count as usize]
        .iter()
        .enumerate()
        .find(|(i, t)| type_bits & (1u32 << i) != 0 && t.property_flags.contains(required))
        .map(|(i, _)| i as u32)
        .ok_or_else(|| anyhow!("no memory type with {required:?} in mask 0b{type_bits:b}"))
}

/// Buffer in HOST_VISIBLE | HOST_COHERENT memory. Writes need no flush.
pub(crate) struct HostBuffer {
    pub buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    mapped: *mut u8,
}

impl HostBuffer {
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        phys: vk::PhysicalDevice,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        let buf_info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = device.create_buffer(&buf_info, None).context("create_buffer")?;

        let req = device.get_buffer_memory_requirements(buffer);
        let mem_props = instance.get_physical_device_memory_properties(phys);
        let type_index = match find_memory_type(
            &mem_props,
            req.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) {
            Ok(i) => i,
            Err(e) => {
                device.destroy_buffer(buffer, None);
                return Err(e);
            }
        };

        let alloc = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: type_index,
            ..Default::default()
        };
        let memory = match device.allocate_memory(&alloc, None) {
            Ok(m) => m,
            Err(e) => {
                device.destroy_buffer(buffer, None);
                return Err(anyhow!("allocate_memory: {e}"));
            }
        };
        if let Err(e) = device.bind_buffer_memory(buffer, memory, 0) {
            device.destroy_buffer(buffer, None);
            device.free_memory(memory, None);
            return Err(anyhow!("bind_buffer_memory: {e}"));
        }

        Ok(HostBuffer {
            buffer,
            memory,
            size,
            mapped: std::ptr::null_mut(),
        })
    }

    /// Map, copy, unmap. Used for data written once at setup.
    pub unsafe fn upload(&self, device: &ash::Device, bytes: &[u8]) -> Result<()> {
        self.check_len(bytes)?;
        let ptr = device
            .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
            .context("map_memory")?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
        device.unmap_memory(self.memory);
        Ok(())
    }

    /// Keeps the whole buffer mapped until `destroy`.
    pub unsafe fn map_persistent(&mut self, device: &ash::Device) -> Result<()> {
        let ptr = device
            .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
            .context("map_memory(persistent)")?;
        self.mapped = ptr.cast();
        Ok(())
    }

    /// Copies into the persistent mapping. The caller guarantees the GPU is
    /// not reading this buffer (its frame fence has been waited on).
    pub unsafe fn write(&self, bytes: &[u8]) -> Result<()> {
        if self.mapped.is_null() {
            return Err(anyhow!("uniform buffer is not mapped"));
        }
        self.check_len(bytes)?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapped, bytes.len());
        Ok(())
    }

    fn check_len(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(anyhow!(
                "write of {} bytes into a {}-byte buffer",
                bytes.len(),
                self.size
            ));
        }
        Ok(())
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if !self.mapped.is_null() {
            device.unmap_memory(self.memory);
            self.mapped = std::ptr::null_mut();
        }
        device.destroy_buffer(self.buffer, None);
        device.free_memory(self.memory, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, &property_flags) in p.memory_types.iter_mut().zip(flags) {
            slot.property_flags = property_flags;
        }
        p
    }

    #[test]
    fn picks_first_type_with_all_flags_in_mask() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let p = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            host,
            host | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(find_memory_type(&p, 0b1111, host).unwrap(), 2);
        // type 2 excluded by the mask
        assert_eq!(find_memory_type(&p, 0b1011, host).unwrap(), 3);
    }

    #[test]
    fn missing_type_is_an_error() {
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&p, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap_err();
        assert!(err.to_string().contains("no memory type"));
    }

    #[test]
    fn types_past_the_count_are_ignored() {
        let mut p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        p.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert!(find_memory_type(&p, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
    }
}
