use crate::error::{Stage, StageExt, VkError, VkResult};
use crate::probe::REQUIRED_DEVICE_EXTENSIONS;
use crate::select::{QueueFamilyIndices, SelectedDevice};
use ash::{vk, Instance};
use std::ffi::{c_char, CString};
use tracing::{debug, info};

/// Logical device and the two queues the frame loop uses. The queues may be
/// the same handle when one family serves both roles.
pub struct LogicalDevice {
    device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub families: QueueFamilyIndices,
}

impl LogicalDevice {
    pub fn create(
        instance: &Instance,
        selected: &SelectedDevice,
        layers: &[CString],
    ) -> VkResult<Self> {
        let families = selected.families;
        let (Some(graphics_family), Some(present_family)) =
            (families.graphics_family, families.present_family)
        else {
            return Err(VkError::NoSuitableDevice);
        };

        let priorities = [1.0f32];
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

        let ext_ptrs: Vec<*const c_char> =
            REQUIRED_DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let dev_info = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: ext_ptrs.len() as u32,
            pp_enabled_extension_names: ext_ptrs.as_ptr(),
            enabled_layer_count: layer_ptrs.len() as u32,
            pp_enabled_layer_names: if layer_ptrs.is_empty() {
                std::ptr::null()
            } else {
                layer_ptrs.as_ptr()
            },
            p_enabled_features: &features,
            ..Default::default()
        };

        let device = unsafe { instance.create_device(selected.candidate.handle, &dev_info, None) }
            .stage(Stage::LogicalDevice)?;
        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        info!(
            "logical device on '{}': {} queue(s), graphics family {}, present family {}",
            selected.candidate.name(),
            queue_infos.len(),
            graphics_family,
            present_family
        );

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            families,
        })
    }

    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    pub fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }.stage(Stage::QueueSubmit)
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        debug!("destroying logical device");
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
        }
    }
}
