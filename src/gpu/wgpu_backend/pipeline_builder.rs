use crate::gpu::{
    BlendMode, ProgramId, RasterState, StencilFunction, StencilOperation, Topology,
};

/// Everything a render pipeline is specialised on. Two draws with equal
/// keys share one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub(crate) program: ProgramId,
    pub(crate) topology: Topology,
    pub(crate) color_formats: Vec<wgpu::TextureFormat>,
    pub(crate) depth_format: Option<wgpu::TextureFormat>,
    pub(crate) sample_count: u32,
    pub(crate) state: RasterState,
}

/// Fluent wrapper around `RenderPipelineDescriptor`, starting from the
/// `vs_main`/`fs_main` convention every built-in program follows.
pub(crate) struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    label: Option<&'a str>,
    layout: &'a wgpu::PipelineLayout,
    shader: &'a wgpu::ShaderModule,
    vertex_buffers: Vec<wgpu::VertexBufferLayout<'a>>,
    color_targets: Vec<Option<wgpu::ColorTargetState>>,
    depth_stencil: Option<wgpu::DepthStencilState>,
    primitive: wgpu::PrimitiveState,
    sample_count: u32,
}

impl<'a> PipelineBuilder<'a> {
    pub(crate) fn new(
        device: &'a wgpu::Device,
        layout: &'a wgpu::PipelineLayout,
        shader: &'a wgpu::ShaderModule,
    ) -> Self {
        Self {
            device,
            label: None,
            layout,
            shader,
            vertex_buffers: Vec::new(),
            color_targets: Vec::new(),
            depth_stencil: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                front_face: wgpu::FrontFace::Ccw,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            sample_count: 1,
        }
    }

    pub(crate) fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    pub(crate) fn with_vertex_buffer(mut self, layout: wgpu::VertexBufferLayout<'a>) -> Self {
        self.vertex_buffers.push(layout);
        self
    }

    /// Adds one color target per format, all with the same blend.
    pub(crate) fn with_color_targets(
        mut self,
        formats: &[wgpu::TextureFormat],
        blend: Option<wgpu::BlendState>,
    ) -> Self {
        self.color_targets
            .extend(formats.iter().map(|&format| {
                Some(wgpu::ColorTargetState {
                    format,
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            }));
        self
    }

    pub(crate) fn with_depth_stencil(mut self, state: Option<wgpu::DepthStencilState>) -> Self {
        self.depth_stencil = state;
        self
    }

    pub(crate) fn with_multisample(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    pub(crate) fn with_culling(mut self, enabled: bool) -> Self {
        self.primitive.cull_mode = enabled.then_some(wgpu::Face::Back);
        self
    }

    pub(crate) fn with_topology(mut self, topology: wgpu::PrimitiveTopology) -> Self {
        self.primitive.topology = topology;
        self
    }

    /// Pipelines without color targets run no fragment stage.
    pub(crate) fn build(self) -> wgpu::RenderPipeline {
        let fragment = (!self.color_targets.is_empty()).then(|| wgpu::FragmentState {
            module: self.shader,
            entry_point: Some("fs_main"),
            targets: &self.color_targets,
            compilation_options: Default::default(),
        });
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: self.label,
                layout: Some(self.layout),
                vertex: wgpu::VertexState {
                    module: self.shader,
                    entry_point: Some("vs_main"),
                    buffers: &self.vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment,
                primitive: self.primitive,
                depth_stencil: self.depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: self.sample_count,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            })
    }
}

pub(crate) fn topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
    }
}

pub(crate) fn blend_state(blend: BlendMode) -> Option<wgpu::BlendState> {
    match blend {
        BlendMode::Replace => None,
        BlendMode::Additive => {
            let add = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            Some(wgpu::BlendState {
                color: add,
                alpha: add,
            })
        }
    }
}

fn compare(function: StencilFunction) -> wgpu::CompareFunction {
    match function {
        StencilFunction::Never => wgpu::CompareFunction::Never,
        StencilFunction::Less => wgpu::CompareFunction::Less,
        StencilFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        StencilFunction::Greater => wgpu::CompareFunction::Greater,
        StencilFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        StencilFunction::Equal => wgpu::CompareFunction::Equal,
        StencilFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        StencilFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn stencil_operation(operation: StencilOperation) -> wgpu::StencilOperation {
    match operation {
        StencilOperation::Keep => wgpu::StencilOperation::Keep,
        StencilOperation::Replace => wgpu::StencilOperation::Replace,
        StencilOperation::Zero => wgpu::StencilOperation::Zero,
    }
}

/// Depth/stencil state for `state` on an attachment of `format`. The
/// stencil test is dropped on formats without a stencil aspect.
pub(crate) fn depth_stencil_state(
    state: &RasterState,
    format: Option<wgpu::TextureFormat>,
) -> Option<wgpu::DepthStencilState> {
    let format = format?;
    let stencil = match state.stencil {
        Some(stencil) if format.has_stencil_aspect() => {
            let face = wgpu::StencilFaceState {
                compare: compare(stencil.function),
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op: stencil_operation(stencil.operation),
            };
            wgpu::StencilState {
                front: face,
                back: face,
                read_mask: 0xff,
                write_mask: if stencil.operation == StencilOperation::Keep {
                    0
                } else {
                    0xff
                },
            }
        }
        _ => wgpu::StencilState::default(),
    };

    Some(wgpu::DepthStencilState {
        format,
        depth_write_enabled: state.depth_test && state.depth_write,
        depth_compare: if state.depth_test {
            wgpu::CompareFunction::Less
        } else {
            wgpu::CompareFunction::Always
        },
        stencil,
        bias: wgpu::DepthBiasState::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::StencilState;

    fn raster(stencil: Option<StencilState>) -> RasterState {
        RasterState {
            depth_test: false,
            depth_write: true,
            stencil,
            face_culling: false,
            multisample: false,
            blend: BlendMode::Additive,
        }
    }

    #[test]
    fn stencil_is_dropped_without_a_stencil_aspect() {
        let state = raster(Some(StencilState {
            function: StencilFunction::Equal,
            operation: StencilOperation::Keep,
        }));
        let depth_only = depth_stencil_state(&state, Some(wgpu::TextureFormat::Depth32Float))
            .expect("state");
        assert_eq!(depth_only.stencil, wgpu::StencilState::default());

        let combined =
            depth_stencil_state(&state, Some(wgpu::TextureFormat::Depth24PlusStencil8))
                .expect("state");
        assert_eq!(combined.stencil.front.compare, wgpu::CompareFunction::Equal);
        assert_eq!(combined.stencil.write_mask, 0);
    }

    #[test]
    fn disabled_depth_test_never_writes() {
        let state = depth_stencil_state(&raster(None), Some(wgpu::TextureFormat::Depth32Float))
            .expect("state");
        assert!(!state.depth_write_enabled);
        assert_eq!(state.depth_compare, wgpu::CompareFunction::Always);
        assert!(depth_stencil_state(&raster(None), None).is_none());
    }

    #[test]
    fn additive_blend_adds_both_components() {
        let blend = blend_state(BlendMode::Additive).expect("blend");
        assert_eq!(blend.color.dst_factor, wgpu::BlendFactor::One);
        assert!(blend_state(BlendMode::Replace).is_none());
    }
}
