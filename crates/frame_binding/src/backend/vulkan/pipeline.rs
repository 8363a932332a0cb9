//! Graphics pipelines for validated layouts
//!
//! The pipeline layout is derived from the merged set layouts. Everything
//! else about the pipeline (shader modules, vertex input, render pass) comes
//! from a [`PipelineBuilder`] supplied by the application.

use std::collections::HashMap;
use std::ffi::CStr;

use ash::{vk, Device};

use crate::error::{BindingError, BindingResult};
use crate::layout::{FragmentStage, VertexStage};
use crate::pipeline::ShaderPair;

/// Pipeline handle together with the layout its sets bind against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AshPipeline {
    /// Graphics pipeline
    pub pipeline: vk::Pipeline,
    /// Layout built from the merged set layouts
    pub layout: vk::PipelineLayout,
}

/// Builds the graphics pipeline of a shader pair over a prepared layout
pub trait PipelineBuilder {
    /// Create the pipeline; the layout stays owned by the caller
    fn build(&mut self, device: &Device, layout: vk::PipelineLayout, shaders: ShaderPair) -> BindingResult<vk::Pipeline>;
}

/// Vertex buffer layout of one vertex stage
#[derive(Debug, Clone, Default)]
pub struct VertexInput {
    /// Bytes per vertex
    pub stride: u32,
    /// Attributes read from binding 0
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

/// Builder from loaded SPIR-V modules
///
/// Viewport and scissor are dynamic. Alpha blending is enabled for the atlas
/// fragment stages, depth testing for every stage but the UI.
pub struct SpirvPipelineBuilder {
    render_pass: vk::RenderPass,
    vertex_modules: HashMap<VertexStage, vk::ShaderModule>,
    fragment_modules: HashMap<FragmentStage, vk::ShaderModule>,
    vertex_inputs: HashMap<VertexStage, VertexInput>,
}

impl SpirvPipelineBuilder {
    /// Builder targeting subpass 0 of `render_pass`
    pub fn new(render_pass: vk::RenderPass) -> Self {
        Self {
            render_pass,
            vertex_modules: HashMap::new(),
            fragment_modules: HashMap::new(),
            vertex_inputs: HashMap::new(),
        }
    }

    /// Register the module and vertex input of a vertex stage
    pub fn with_vertex(mut self, stage: VertexStage, module: vk::ShaderModule, input: VertexInput) -> Self {
        self.vertex_modules.insert(stage, module);
        self.vertex_inputs.insert(stage, input);
        self
    }

    /// Register the module of a fragment stage
    pub fn with_fragment(mut self, stage: FragmentStage, module: vk::ShaderModule) -> Self {
        self.fragment_modules.insert(stage, module);
        self
    }
}

impl PipelineBuilder for SpirvPipelineBuilder {
    fn build(&mut self, device: &Device, layout: vk::PipelineLayout, shaders: ShaderPair) -> BindingResult<vk::Pipeline> {
        let vertex_module = *self
            .vertex_modules
            .get(&shaders.vertex)
            .ok_or_else(|| BindingError::Backend(format!("no module for vertex stage {:?}", shaders.vertex)))?;
        let fragment_module = *self
            .fragment_modules
            .get(&shaders.fragment)
            .ok_or_else(|| BindingError::Backend(format!("no module for fragment stage {:?}", shaders.fragment)))?;

        let entry = entry_point();
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module)
                .name(entry)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module)
                .name(entry)
                .build(),
        ];

        let input = vertex_input_for(shaders.vertex, self.vertex_inputs.get(&shaders.vertex))?;
        let vertex_bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: input.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let vertex_input = if input.attributes.is_empty() {
            vk::PipelineVertexInputStateCreateInfo::builder()
        } else {
            vk::PipelineVertexInputStateCreateInfo::builder()
                .vertex_binding_descriptions(&vertex_bindings)
                .vertex_attribute_descriptions(&input.attributes)
        };

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_enabled = shaders.vertex != VertexStage::UiElement;
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(depth_enabled)
            .depth_write_enable(depth_enabled)
            .depth_compare_op(vk::CompareOp::LESS);

        let blended = matches!(shaders.fragment, FragmentStage::AtlasSplit | FragmentStage::AtlasCombined);
        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(blended)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder().attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(self.render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
                .map_err(|(_, err)| BindingError::Vulkan(err))?
        };

        pipelines
            .first()
            .copied()
            .ok_or_else(|| BindingError::Backend(format!("no pipeline returned for {}", shaders)))
    }
}

/// Vertex input of a stage; generated-vertex stages take none
fn vertex_input_for(stage: VertexStage, registered: Option<&VertexInput>) -> BindingResult<VertexInput> {
    if stage.generates_vertices() {
        return Ok(VertexInput::default());
    }
    match registered {
        Some(input) if !input.attributes.is_empty() => Ok(input.clone()),
        _ => Err(BindingError::Backend(format!(
            "vertex stage {:?} reads a vertex buffer but has no vertex input",
            stage
        ))),
    }
}

fn entry_point() -> &'static CStr {
    // SAFETY: literal is nul-terminated with no interior nul
    unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point() {
        assert_eq!(entry_point().to_str().unwrap(), "main");
    }

    #[test]
    fn test_vertex_input_follows_stage() {
        let glyph = VertexInput {
            stride: 16,
            attributes: vec![vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 0,
            }],
        };

        let sprite = vertex_input_for(VertexStage::Sprite, Some(&glyph)).unwrap();
        assert!(sprite.attributes.is_empty());

        let text = vertex_input_for(VertexStage::Text, Some(&glyph)).unwrap();
        assert_eq!(text.stride, 16);
        assert!(vertex_input_for(VertexStage::Text, None).is_err());
    }

    #[test]
    fn test_builder_registers_modules() {
        let builder = SpirvPipelineBuilder::new(vk::RenderPass::null())
            .with_fragment(FragmentStage::Color, vk::ShaderModule::null());
        assert!(builder.vertex_modules.is_empty());
        assert_eq!(builder.fragment_modules.len(), 1);
    }
}
