//! Fixed render pass and triangle pipeline.

use crate::error::{Stage, StageExt, VkError, VkResult};
use ash::util::read_spv;
use ash::vk;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const VERT_FILE: &str = "vert.spv";
pub const FRAG_FILE: &str = "frag.spv";

/// Raw SPIR-V bytes for the two stages. Not validated beyond being readable.
#[derive(Clone, Debug)]
pub struct ShaderBlobs {
    pub vert: Vec<u8>,
    pub frag: Vec<u8>,
}

impl ShaderBlobs {
    pub fn load(dir: &Path) -> VkResult<Self> {
        let read = |name: &str| -> VkResult<Vec<u8>> {
            let path = dir.join(name);
            fs::read(&path).map_err(|source| VkError::ShaderIo { path, source })
        };
        let blobs = Self {
            vert: read(VERT_FILE)?,
            frag: read(FRAG_FILE)?,
        };
        debug!(
            "shaders from {}: vert {} bytes, frag {} bytes",
            dir.display(),
            blobs.vert.len(),
            blobs.frag.len()
        );
        Ok(blobs)
    }
}

fn shader_module(device: &ash::Device, name: &str, bytes: &[u8]) -> VkResult<vk::ShaderModule> {
    // read_spv only realigns the bytes into words; code_size stays the byte length.
    let code = read_spv(&mut Cursor::new(bytes)).map_err(|source| VkError::ShaderIo {
        path: PathBuf::from(name),
        source,
    })?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        code_size: bytes.len(),
        p_code: code.as_ptr(),
        ..Default::default()
    };
    unsafe { device.create_shader_module(&ci, None) }.stage(Stage::ShaderModule)
}

fn create_render_pass(device: &ash::Device, format: vk::Format) -> VkResult<vk::RenderPass> {
    // Render pass: single color attachment → present
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
    // The layout transition must not start before the acquire semaphore,
    // which the submit waits on at COLOR_ATTACHMENT_OUTPUT.
    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
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
    unsafe { device.create_render_pass(&rp_info, None) }.stage(Stage::RenderPass)
}

/// Render pass, layout and pipeline, destroyed together.
pub struct GraphicsPipeline {
    device: ash::Device,
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    /// STRICT: `color_format` must match the current swapchain image format;
    /// rebuild whenever the swapchain is rebuilt.
    pub fn build(
        device: &ash::Device,
        color_format: vk::Format,
        shaders: &ShaderBlobs,
    ) -> VkResult<Self> {
        let mut out = Self {
            device: device.clone(),
            render_pass: vk::RenderPass::null(),
            layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
        };
        out.render_pass = create_render_pass(device, color_format)?;

        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            ..Default::default()
        };
        out.layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .stage(Stage::PipelineLayout)?;

        let vs = shader_module(device, VERT_FILE, &shaders.vert)?;
        let fs = match shader_module(device, FRAG_FILE, &shaders.frag) {
            Ok(fs) => fs,
            Err(e) => {
                unsafe { device.destroy_shader_module(vs, None) };
                return Err(e);
            }
        };
        let result = out.create_pipeline(vs, fs);
        unsafe {
            device.destroy_shader_module(vs, None);
            device.destroy_shader_module(fs, None);
        }
        out.pipeline = result?;

        Ok(out)
    }

    fn create_pipeline(&self, vs: vk::ShaderModule, fs: vk::ShaderModule) -> VkResult<vk::Pipeline> {
        let entry = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: vs,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: fs,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
        ];

        // Vertices come from gl_VertexIndex; no buffers bound.
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart_enable: vk::FALSE,
            ..Default::default()
        };
        let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
            dynamic_state_count: dyn_states.len() as u32,
            p_dynamic_states: dyn_states.as_ptr(),
            ..Default::default()
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };
        let raster = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };
        let color_blend_att = vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
            blend_enable: vk::FALSE,
            ..Default::default()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &color_blend_att,
            ..Default::default()
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &color_blend,
            p_dynamic_state: &dynamic_state,
            layout: self.layout,
            render_pass: self.render_pass,
            subpass: 0,
            ..Default::default()
        };

        let pipelines = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&pipeline_info),
                None,
            )
        }
        .map_err(|(_, err)| err)
        .stage(Stage::GraphicsPipeline)?;

        Ok(pipelines[0])
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                self.device.destroy_pipeline(self.pipeline, None);
            }
            if self.layout != vk::PipelineLayout::null() {
                self.device.destroy_pipeline_layout(self.layout, None);
            }
            if self.render_pass != vk::RenderPass::null() {
                self.device.destroy_render_pass(self.render_pass, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io, process};

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("se-shaders-{tag}-{}", process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn loads_both_blobs_verbatim() {
        let dir = scratch_dir("ok");
        fs::write(dir.join(VERT_FILE), [0x03, 0x02, 0x23, 0x07, 1, 2, 3, 4]).unwrap();
        fs::write(dir.join(FRAG_FILE), [0x03, 0x02, 0x23, 0x07]).unwrap();

        let blobs = ShaderBlobs::load(&dir).unwrap();
        assert_eq!(blobs.vert.len(), 8);
        assert_eq!(blobs.frag, vec![0x03, 0x02, 0x23, 0x07]);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_blob_is_an_io_error_naming_the_file() {
        let dir = scratch_dir("missing");
        fs::write(dir.join(VERT_FILE), [0u8; 4]).unwrap();
        let _ = fs::remove_file(dir.join(FRAG_FILE));

        match ShaderBlobs::load(&dir) {
            Err(VkError::ShaderIo { path, source }) => {
                assert!(path.ends_with(FRAG_FILE));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected ShaderIo, got {other:?}"),
        }

        fs::remove_dir_all(dir).unwrap();
    }
}
