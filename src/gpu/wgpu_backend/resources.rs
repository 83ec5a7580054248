use wgpu::util::DeviceExt;

use crate::asset::{TextureData, MAX_BONES};
use crate::gpu::{FramebufferDescriptor, GeometryData};

pub(crate) const PLAIN_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub(crate) const ALPHA_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub(crate) const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat =
    wgpu::TextureFormat::Depth24PlusStencil8;
pub(crate) const DEPTH_ARRAY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub(crate) const SCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// One color attachment. Multisampled attachments render into `view` and
/// resolve into the single-sample `resolved` twin that later stages sample.
pub(crate) struct ColorTarget {
    pub(crate) format: wgpu::TextureFormat,
    pub(crate) view: wgpu::TextureView,
    pub(crate) resolved: Option<wgpu::TextureView>,
}

impl ColorTarget {
    pub(crate) fn sampled_view(&self) -> &wgpu::TextureView {
        self.resolved.as_ref().unwrap_or(&self.view)
    }
}

pub(crate) struct DepthArray {
    pub(crate) array_view: wgpu::TextureView,
    pub(crate) layer_views: Vec<wgpu::TextureView>,
}

/// Textures behind one framebuffer id.
pub(crate) struct FramebufferTextures {
    pub(crate) desc: FramebufferDescriptor,
    pub(crate) colors: Vec<ColorTarget>,
    pub(crate) depth_stencil: Option<wgpu::TextureView>,
    pub(crate) depth_array: Option<DepthArray>,
}

impl FramebufferTextures {
    pub(crate) fn new(device: &wgpu::Device, desc: &FramebufferDescriptor, label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let color_formats = std::iter::repeat(PLAIN_COLOR_FORMAT)
            .take(desc.plain_color_count as usize)
            .chain(std::iter::repeat(ALPHA_COLOR_FORMAT).take(desc.alpha_color_count as usize));

        let colors = color_formats
            .enumerate()
            .map(|(i, format)| {
                let view = attachment(
                    device,
                    &format!("{label}Color{i}"),
                    size,
                    format,
                    desc.sample_count,
                );
                let resolved = desc.is_multisampled().then(|| {
                    attachment(device, &format!("{label}Resolved{i}"), size, format, 1)
                });
                ColorTarget {
                    format,
                    view,
                    resolved,
                }
            })
            .collect();

        let depth_stencil = desc.depth_stencil.then(|| {
            attachment(
                device,
                &format!("{label}DepthStencil"),
                size,
                DEPTH_STENCIL_FORMAT,
                desc.sample_count,
            )
        });

        let depth_array = (desc.depth_array_layers > 0)
            .then(|| depth_array(device, label, desc.width, desc.height, desc.depth_array_layers));

        Self {
            desc: *desc,
            colors,
            depth_stencil,
            depth_array,
        }
    }

    pub(crate) fn color_formats(&self) -> Vec<wgpu::TextureFormat> {
        self.colors.iter().map(|color| color.format).collect()
    }
}

fn attachment(
    device: &wgpu::Device,
    label: &str,
    size: wgpu::Extent3d,
    format: wgpu::TextureFormat,
    sample_count: u32,
) -> wgpu::TextureView {
    // multisampled textures cannot be sampled; their resolved twins are
    let usage = if sample_count > 1 {
        wgpu::TextureUsages::RENDER_ATTACHMENT
    } else {
        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
    };
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

pub(crate) fn depth_array(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    layers: u32,
) -> DepthArray {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&format!("{label}DepthArray")),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: layers.max(1),
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_ARRAY_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });

    let array_view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(&format!("{label}DepthArrayView")),
        format: Some(DEPTH_ARRAY_FORMAT),
        dimension: Some(wgpu::TextureViewDimension::D2Array),
        aspect: wgpu::TextureAspect::DepthOnly,
        base_array_layer: 0,
        array_layer_count: Some(layers.max(1)),
        ..Default::default()
    });
    let layer_views = (0..layers.max(1))
        .map(|layer| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(&format!("{label}DepthLayer{layer}")),
                format: Some(DEPTH_ARRAY_FORMAT),
                dimension: Some(wgpu::TextureViewDimension::D2),
                aspect: wgpu::TextureAspect::DepthOnly,
                base_array_layer: layer,
                array_layer_count: Some(1),
                ..Default::default()
            })
        })
        .collect();

    DepthArray {
        array_view,
        layer_views,
    }
}

/// Color and depth/stencil target standing in for the window surface.
pub(crate) struct ScreenTarget {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) depth_stencil: wgpu::TextureView,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl ScreenTarget {
    pub(crate) fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Screen"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_stencil = attachment(device, "ScreenDepthStencil", size, DEPTH_STENCIL_FORMAT, 1);
        Self {
            texture,
            view,
            depth_stencil,
            width: size.width,
            height: size.height,
        }
    }
}

/// Vertex, index and bone buffers of one geometry id.
pub(crate) struct GeometryGpu {
    pub(crate) vertices: wgpu::Buffer,
    pub(crate) indices: wgpu::Buffer,
    pub(crate) index_count: u32,
    pub(crate) bones: wgpu::Buffer,
    pub(crate) bones_bind_group: wgpu::BindGroup,
}

impl GeometryGpu {
    pub(crate) fn new(
        device: &wgpu::Device,
        bones_layout: &wgpu::BindGroupLayout,
        data: &GeometryData<'_>,
    ) -> Self {
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("GeometryVertices"),
            contents: bytemuck::cast_slice(data.vertices),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("GeometryIndices"),
            contents: bytemuck::cast_slice(data.indices),
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        });
        let bones = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("GeometryBones"),
            contents: bytemuck::cast_slice(&bone_block(data)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bones_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("GeometryBonesBindGroup"),
            layout: bones_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: bones.as_entire_binding(),
            }],
        });
        Self {
            vertices,
            indices,
            index_count: data.indices.len() as u32,
            bones,
            bones_bind_group,
        }
    }

    /// Refills the buffers, reallocating vertex and index storage only when
    /// the new data does not fit.
    pub(crate) fn reload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bones_layout: &wgpu::BindGroupLayout,
        data: &GeometryData<'_>,
    ) {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(data.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(data.indices);
        if vertex_bytes.len() as u64 > self.vertices.size()
            || index_bytes.len() as u64 > self.indices.size()
        {
            *self = Self::new(device, bones_layout, data);
            return;
        }
        queue.write_buffer(&self.vertices, 0, vertex_bytes);
        queue.write_buffer(&self.indices, 0, index_bytes);
        queue.write_buffer(&self.bones, 0, bytemuck::cast_slice(&bone_block(data)));
        self.index_count = data.indices.len() as u32;
    }
}

/// Bone matrices padded with identities to the fixed block size.
fn bone_block(data: &GeometryData<'_>) -> Vec<[[f32; 4]; 4]> {
    let mut block = vec![glam::Mat4::IDENTITY.to_cols_array_2d(); MAX_BONES];
    for (slot, bone) in block.iter_mut().zip(data.bones) {
        *slot = bone.to_cols_array_2d();
    }
    block
}

pub(crate) fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    data: &TextureData,
) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width: data.width,
        height: data.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("MaterialTexture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &data.to_rgba8(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * data.width),
            rows_per_image: Some(data.height),
        },
        size,
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
