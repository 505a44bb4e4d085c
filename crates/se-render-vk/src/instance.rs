use crate::error::{Stage, StageExt, VkError, VkResult};
use crate::probe::{self, VALIDATION_LAYER};
use ash::khr::surface;
use ash::{vk, Entry, Instance};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, CStr, CString};
use tracing::{debug, info, warn};

/// Whether to enable `VK_LAYER_KHRONOS_validation`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Validation {
    #[default]
    Off,
    /// Enable if installed, warn otherwise.
    Preferred,
    /// Fail with [`VkError::MissingLayer`] if not installed.
    Required,
}

/// Layers to enable given what the loader reports.
pub fn resolve_layers(available: &[CString], validation: Validation) -> VkResult<Vec<CString>> {
    if validation == Validation::Off {
        return Ok(Vec::new());
    }
    if probe::missing(available, &[VALIDATION_LAYER]).is_empty() {
        return Ok(vec![VALIDATION_LAYER.to_owned()]);
    }
    let name = VALIDATION_LAYER.to_string_lossy().into_owned();
    match validation {
        Validation::Required => Err(VkError::MissingLayer(name)),
        _ => {
            warn!("{name} requested but not installed; continuing without it");
            Ok(Vec::new())
        }
    }
}

/// Loader entry plus instance. Destroys the instance on drop.
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    layers: Vec<CString>,
}

impl VulkanInstance {
    pub fn new(display: RawDisplayHandle, validation: Validation) -> VkResult<Self> {
        let entry = unsafe { Entry::load()? };

        let required = ash_window::enumerate_required_extensions(display).stage(Stage::Instance)?;
        // SAFETY: ash-window hands out static NUL-terminated names.
        let required_names: Vec<&CStr> =
            required.iter().map(|&p| unsafe { CStr::from_ptr(p) }).collect();
        let absent = probe::missing(&probe::instance_extensions(&entry)?, &required_names);
        if !absent.is_empty() {
            warn!("instance extensions missing: {absent:?}");
            return Err(VkError::Api {
                stage: Stage::Instance,
                result: vk::Result::ERROR_EXTENSION_NOT_PRESENT,
            });
        }

        let layers = resolve_layers(&probe::instance_layers(&entry)?, validation)?;
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        let app_name = c"SeEngine";
        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: app_name.as_ptr(),
            application_version: 0,
            p_engine_name: app_name.as_ptr(),
            engine_version: 0,
            api_version: vk::API_VERSION_1_0,
            ..Default::default()
        };

        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_application_info: &app_info,
            enabled_extension_count: required.len() as u32,
            pp_enabled_extension_names: required.as_ptr(),
            enabled_layer_count: layer_ptrs.len() as u32,
            pp_enabled_layer_names: if layer_ptrs.is_empty() {
                std::ptr::null()
            } else {
                layer_ptrs.as_ptr()
            },
            ..Default::default()
        };

        let instance =
            unsafe { entry.create_instance(&create_info, None) }.stage(Stage::Instance)?;
        info!(
            "Vulkan instance created ({} extensions, layers {:?})",
            required.len(),
            layers
        );

        Ok(Self {
            entry,
            instance,
            layers,
        })
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn raw(&self) -> &Instance {
        &self.instance
    }

    /// Layers enabled on the instance, repeated on the device for older loaders.
    pub fn layers(&self) -> &[CString] {
        &self.layers
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        debug!("destroying Vulkan instance");
        unsafe { self.instance.destroy_instance(None) };
    }
}

/// Presentation surface for one window.
pub struct Surface {
    loader: surface::Instance,
    handle: vk::SurfaceKHR,
}

impl Surface {
    pub fn new(
        instance: &VulkanInstance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> VkResult<Self> {
        let loader = surface::Instance::new(instance.entry(), instance.raw());
        let handle = unsafe {
            ash_window::create_surface(instance.entry(), instance.raw(), display, window, None)
        }
        .stage(Stage::Surface)?;
        Ok(Self { loader, handle })
    }

    pub fn loader(&self) -> &surface::Instance {
        &self.loader
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed() -> Vec<CString> {
        vec![
            CString::new("VK_LAYER_MESA_device_select").unwrap(),
            VALIDATION_LAYER.to_owned(),
        ]
    }

    #[test]
    fn off_enables_nothing() {
        assert!(resolve_layers(&installed(), Validation::Off)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn installed_layer_is_enabled_when_asked_for() {
        for v in [Validation::Preferred, Validation::Required] {
            assert_eq!(
                resolve_layers(&installed(), v).unwrap(),
                vec![VALIDATION_LAYER.to_owned()]
            );
        }
    }

    #[test]
    fn missing_layer_is_fatal_only_when_required() {
        assert!(resolve_layers(&[], Validation::Preferred)
            .unwrap()
            .is_empty());
        let err = resolve_layers(&[], Validation::Required).unwrap_err();
        assert!(matches!(err, VkError::MissingLayer(ref n) if n == "VK_LAYER_KHRONOS_validation"));
        assert_eq!(err.exit_code(), 2);
    }
}
