//! Adapter scoring and queue-family derivation.
//!
//! Works on [`PhysicalDeviceCandidate`] snapshots only, so every rule here is
//! testable without a GPU.

use crate::error::{VkError, VkResult};
use crate::probe::{PhysicalDeviceCandidate, QueueFamilyInfo};
use ash::vk;
use tracing::{debug, info, warn};

const DISCRETE_BONUS: u32 = 1000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Graphics submission and presentation both have a family.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(g) = self.graphics_family {
            families.push(g);
        }
        if let Some(p) = self.present_family {
            if !families.contains(&p) {
                families.push(p);
            }
        }
        families
    }
}

/// Derives graphics and present families from a family list.
///
/// Both conditions are evaluated for every index; the first match of each
/// wins. If some family satisfies both, it replaces the pair so a single
/// queue can be used.
pub fn find_queue_families(families: &[QueueFamilyInfo]) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if indices.graphics_family.is_none() && family.supports_graphics() {
            indices.graphics_family = Some(i);
        }
        if indices.present_family.is_none() && family.supports_present() {
            indices.present_family = Some(i);
        }
    }

    if indices.is_complete() && indices.graphics_family != indices.present_family {
        if let Some(i) = families
            .iter()
            .position(|f| f.supports_graphics() && f.supports_present())
        {
            indices.graphics_family = Some(i as u32);
            indices.present_family = Some(i as u32);
        }
    }

    indices
}

/// Scores one candidate. Zero means unusable.
pub fn score(candidate: &PhysicalDeviceCandidate) -> u32 {
    if candidate.features.geometry_shader != vk::TRUE {
        return 0;
    }

    let mut score = 0u32;
    if candidate.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += DISCRETE_BONUS;
    }
    score = score.saturating_add(candidate.properties.limits.max_image_dimension2_d);

    if !find_queue_families(&candidate.queue_families).is_complete() {
        return 0;
    }
    if !candidate.supports_required_extensions {
        return 0;
    }
    if !candidate.swapchain_support.is_adequate() {
        return 0;
    }

    score
}

#[derive(Clone, Debug)]
pub struct SelectedDevice {
    pub candidate: PhysicalDeviceCandidate,
    pub families: QueueFamilyIndices,
    pub score: u32,
}

/// Picks the highest-scoring candidate. Ties keep the first one seen, so the
/// result depends on enumeration order and nothing else.
pub fn select(candidates: Vec<PhysicalDeviceCandidate>) -> VkResult<SelectedDevice> {
    if candidates.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(VkError::NoSuitableDevice);
    }

    let mut best: Option<(PhysicalDeviceCandidate, u32)> = None;
    for candidate in candidates {
        let s = score(&candidate);
        debug!(
            "GPU '{}' ({}) - Score: {}",
            candidate.name(),
            candidate.device_type_name(),
            s
        );
        if best.as_ref().map_or(true, |(_, top)| s > *top) {
            best = Some((candidate, s));
        }
    }

    match best {
        Some((candidate, score)) if score > 0 => {
            let families = find_queue_families(&candidate.queue_families);
            info!(
                "Selected GPU: '{}' ({}) - Score: {}, graphics family {:?}, present family {:?}",
                candidate.name(),
                candidate.device_type_name(),
                score,
                families.graphics_family,
                families.present_family
            );
            Ok(SelectedDevice {
                candidate,
                families,
                score,
            })
        }
        _ => {
            warn!("No suitable GPU found with required capabilities");
            Err(VkError::NoSuitableDevice)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swapchain::SwapchainSupport;

    fn family(flags: vk::QueueFlags, present: bool) -> QueueFamilyInfo {
        QueueFamilyInfo {
            flags,
            queue_count: 1,
            present,
        }
    }

    fn adequate_support() -> SwapchainSupport {
        SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    fn candidate(ty: vk::PhysicalDeviceType, max_dim: u32) -> PhysicalDeviceCandidate {
        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.device_type = ty;
        properties.limits.max_image_dimension2_d = max_dim;
        let features = vk::PhysicalDeviceFeatures {
            geometry_shader: vk::TRUE,
            ..Default::default()
        };
        PhysicalDeviceCandidate {
            handle: vk::PhysicalDevice::null(),
            properties,
            features,
            queue_families: vec![family(vk::QueueFlags::GRAPHICS, true)],
            supports_required_extensions: true,
            swapchain_support: adequate_support(),
        }
    }

    #[test]
    fn missing_geometry_shader_scores_zero() {
        let mut c = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        c.features.geometry_shader = vk::FALSE;
        assert_eq!(score(&c), 0);
    }

    #[test]
    fn passing_candidates_score_type_bonus_plus_dimension() {
        let discrete = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        let integrated = candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, 8192);
        assert_eq!(score(&discrete), 1000 + 16384);
        assert_eq!(score(&integrated), 8192);
    }

    #[test]
    fn each_hard_requirement_forces_zero() {
        let mut no_graphics = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 4096);
        no_graphics.queue_families = vec![family(vk::QueueFlags::COMPUTE, true)];
        assert_eq!(score(&no_graphics), 0);

        let mut no_ext = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 4096);
        no_ext.supports_required_extensions = false;
        assert_eq!(score(&no_ext), 0);

        let mut no_formats = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 4096);
        no_formats.swapchain_support.formats.clear();
        assert_eq!(score(&no_formats), 0);

        let mut no_modes = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 4096);
        no_modes.swapchain_support.present_modes.clear();
        assert_eq!(score(&no_modes), 0);
    }

    #[test]
    fn selection_picks_maximum_and_keeps_first_on_ties() {
        let mut first = candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, 8192);
        first.handle = vk::Handle::from_raw(1);
        let mut second = candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, 8192);
        second.handle = vk::Handle::from_raw(2);
        let mut weaker = candidate(vk::PhysicalDeviceType::CPU, 4096);
        weaker.handle = vk::Handle::from_raw(3);

        let picked = select(vec![weaker, first, second]).unwrap();
        assert_eq!(vk::Handle::as_raw(picked.candidate.handle), 1);
        assert_eq!(picked.score, 8192);
    }

    #[test]
    fn discrete_beats_larger_integrated_only_by_bonus() {
        let mut integrated = candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384);
        integrated.handle = vk::Handle::from_raw(1);
        let mut discrete = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        discrete.handle = vk::Handle::from_raw(2);

        let picked = select(vec![integrated, discrete]).unwrap();
        assert_eq!(vk::Handle::as_raw(picked.candidate.handle), 2);
    }

    #[test]
    fn selection_fails_without_candidates_or_with_zero_scores() {
        assert!(matches!(select(Vec::new()), Err(VkError::NoSuitableDevice)));

        let mut c = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        c.features.geometry_shader = vk::FALSE;
        assert!(matches!(select(vec![c]), Err(VkError::NoSuitableDevice)));
    }

    #[test]
    fn queue_scans_are_independent_per_index() {
        // Graphics at 0, present only at 1: the graphics match must not stop
        // the present scan.
        let families = [
            family(vk::QueueFlags::GRAPHICS, false),
            family(vk::QueueFlags::TRANSFER, true),
        ];
        let idx = find_queue_families(&families);
        assert_eq!(idx.graphics_family, Some(0));
        assert_eq!(idx.present_family, Some(1));
        assert_eq!(idx.unique(), vec![0, 1]);

        // Present found before graphics.
        let families = [
            family(vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::GRAPHICS, false),
        ];
        let idx = find_queue_families(&families);
        assert_eq!(idx.graphics_family, Some(1));
        assert_eq!(idx.present_family, Some(0));
    }

    #[test]
    fn a_family_offering_both_is_preferred() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, false),
            family(vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true),
        ];
        let idx = find_queue_families(&families);
        assert_eq!(idx.graphics_family, Some(2));
        assert_eq!(idx.present_family, Some(2));
        assert_eq!(idx.unique(), vec![2]);
    }

    #[test]
    fn empty_families_are_skipped() {
        let families = [
            QueueFamilyInfo {
                flags: vk::QueueFlags::GRAPHICS,
                queue_count: 0,
                present: true,
            },
            family(vk::QueueFlags::GRAPHICS, true),
        ];
        let idx = find_queue_families(&families);
        assert_eq!(idx.graphics_family, Some(1));
        assert_eq!(idx.present_family, Some(1));
    }

    #[test]
    fn incomplete_indices() {
        let idx = find_queue_families(&[family(vk::QueueFlags::GRAPHICS, false)]);
        assert!(!idx.is_complete());
        assert!(QueueFamilyIndices::default().unique().is_empty());
    }
}
