//! Capability queries against the loader, the instance and each adapter.
//!
//! Everything here is read-only. The snapshots it produces are consumed by
//! [`crate::select`], which never talks to the driver itself.

use crate::error::{Stage, StageExt, VkResult};
use crate::swapchain::SwapchainSupport;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use std::ffi::{CStr, CString};
use tracing::{debug, warn};

/// Device extensions every candidate must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [swapchain::NAME];

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// One queue family as seen from the target surface.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueFamilyInfo {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    pub present: bool,
}

impl QueueFamilyInfo {
    pub fn supports_graphics(&self) -> bool {
        self.queue_count > 0 && self.flags.contains(vk::QueueFlags::GRAPHICS)
    }

    pub fn supports_present(&self) -> bool {
        self.queue_count > 0 && self.present
    }
}

/// Read-only snapshot of one adapter, re-queried on every selection pass.
#[derive(Clone, Debug)]
pub struct PhysicalDeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub queue_families: Vec<QueueFamilyInfo>,
    pub supports_required_extensions: bool,
    pub swapchain_support: SwapchainSupport,
}

impl PhysicalDeviceCandidate {
    pub fn name(&self) -> String {
        // SAFETY: the driver fills device_name with a NUL-terminated string and
        // zeroed (default) properties are an empty string.
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }
}

fn names_of(props: &[vk::ExtensionProperties]) -> Vec<CString> {
    props
        .iter()
        // SAFETY: extension_name is a NUL-terminated fixed array.
        .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }.to_owned())
        .collect()
}

/// Entries of `required` that are absent from `available`, in `required` order.
pub fn missing<'a>(available: &[CString], required: &[&'a CStr]) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|r| !available.iter().any(|a| a.as_c_str() == *r))
        .collect()
}

pub fn instance_extensions(entry: &Entry) -> VkResult<Vec<CString>> {
    let props = unsafe { entry.enumerate_instance_extension_properties(None) }
        .stage(Stage::Instance)?;
    Ok(names_of(&props))
}

pub fn instance_layers(entry: &Entry) -> VkResult<Vec<CString>> {
    let props = unsafe { entry.enumerate_instance_layer_properties() }
        .stage(Stage::ValidationLayers)?;
    Ok(props
        .iter()
        // SAFETY: layer_name is a NUL-terminated fixed array.
        .map(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) }.to_owned())
        .collect())
}

pub fn device_extensions(instance: &Instance, phys: vk::PhysicalDevice) -> VkResult<Vec<CString>> {
    let props = unsafe { instance.enumerate_device_extension_properties(phys) }
        .stage(Stage::DeviceEnumeration)?;
    Ok(names_of(&props))
}

/// Raw surface queries; each caller tags failures with its own stage.
pub fn swapchain_support(
    surface_loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<SwapchainSupport, vk::Result> {
    unsafe {
        Ok(SwapchainSupport {
            capabilities: surface_loader.get_physical_device_surface_capabilities(phys, surface)?,
            formats: surface_loader.get_physical_device_surface_formats(phys, surface)?,
            present_modes: surface_loader
                .get_physical_device_surface_present_modes(phys, surface)?,
        })
    }
}

/// Whether an adapter's extension query lists every required extension.
/// A failed query disqualifies the adapter instead of the whole pass.
pub fn extension_support(query: VkResult<Vec<CString>>) -> (bool, Vec<&'static CStr>) {
    match query {
        Ok(exts) => {
            let absent = missing(&exts, &REQUIRED_DEVICE_EXTENSIONS);
            (absent.is_empty(), absent)
        }
        Err(e) => {
            warn!("device extension query failed for adapter: {e}");
            (false, REQUIRED_DEVICE_EXTENSIONS.to_vec())
        }
    }
}

fn queue_families(
    instance: &Instance,
    surface_loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Vec<QueueFamilyInfo> {
    let props = unsafe { instance.get_physical_device_queue_family_properties(phys) };
    props
        .iter()
        .enumerate()
        .map(|(i, q)| QueueFamilyInfo {
            flags: q.queue_flags,
            queue_count: q.queue_count,
            present: unsafe {
                surface_loader.get_physical_device_surface_support(phys, i as u32, surface)
            }
            .unwrap_or(false),
        })
        .collect()
}

/// Snapshots every adapter the instance exposes.
pub fn candidates(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> VkResult<Vec<PhysicalDeviceCandidate>> {
    let devices =
        unsafe { instance.enumerate_physical_devices() }.stage(Stage::DeviceEnumeration)?;

    let mut out = Vec::with_capacity(devices.len());
    for phys in devices {
        let properties = unsafe { instance.get_physical_device_properties(phys) };
        let features = unsafe { instance.get_physical_device_features(phys) };

        let (supports_required_extensions, absent) =
            extension_support(device_extensions(instance, phys));

        // A failing surface query disqualifies this adapter only.
        let swapchain_support = match swapchain_support(surface_loader, phys, surface) {
            Ok(s) => s,
            Err(e) => {
                warn!("surface query failed for adapter: {e}");
                SwapchainSupport::default()
            }
        };

        let candidate = PhysicalDeviceCandidate {
            handle: phys,
            properties,
            features,
            queue_families: queue_families(instance, surface_loader, phys, surface),
            supports_required_extensions,
            swapchain_support,
        };

        debug!(
            "adapter '{}' ({}): {} queue families, missing extensions {:?}",
            candidate.name(),
            candidate.device_type_name(),
            candidate.queue_families.len(),
            absent
        );
        out.push(candidate);
    }
    Ok(out)
}
