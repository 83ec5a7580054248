use std::mem;

use crate::asset::MAX_BONES;
use crate::gpu::MAX_TEXTURE_UNITS;
use crate::renderer::lights::LightKind;
use crate::renderer::uniforms::{CameraUniform, ObjectData};

const INITIAL_OBJECTS_CAPACITY: u32 = 1024;

/// Binding of the depth array in the texture group, after the color slots.
pub(crate) const DEPTH_ARRAY_BINDING: u32 = MAX_TEXTURE_UNITS as u32 + 1;

/// The four bind group layouts every program is compiled against:
/// frame (camera, light tables), objects, textures, bones.
pub(crate) struct Layouts {
    pub(crate) frame: wgpu::BindGroupLayout,
    pub(crate) objects: wgpu::BindGroupLayout,
    pub(crate) textures: wgpu::BindGroupLayout,
    pub(crate) bones: wgpu::BindGroupLayout,
    pub(crate) pipeline: wgpu::PipelineLayout,
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl Layouts {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("FrameBindLayout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1),
                storage_entry(2),
                storage_entry(3),
            ],
        });
        let objects = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ObjectsBindLayout"),
            entries: &[storage_entry(0)],
        });

        let mut texture_entries: Vec<wgpu::BindGroupLayoutEntry> = (0..MAX_TEXTURE_UNITS as u32)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        texture_entries.extend([
            wgpu::BindGroupLayoutEntry {
                binding: MAX_TEXTURE_UNITS as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: DEPTH_ARRAY_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Depth,
                    view_dimension: wgpu::TextureViewDimension::D2Array,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: DEPTH_ARRAY_BINDING + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                count: None,
            },
        ]);
        let textures = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("TexturesBindLayout"),
            entries: &texture_entries,
        });
        let bones = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BonesBindLayout"),
            entries: &[uniform_entry(0)],
        });

        let pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("StagePipelineLayout"),
            bind_group_layouts: &[&frame, &objects, &textures, &bones],
            push_constant_ranges: &[],
        });

        Self {
            frame,
            objects,
            textures,
            bones,
            pipeline,
        }
    }
}

/// Camera block plus the three light tables, bound as group 0.
pub(crate) struct FrameBuffers {
    pub(crate) camera: wgpu::Buffer,
    pub(crate) point_lights: wgpu::Buffer,
    pub(crate) directional_lights: wgpu::Buffer,
    pub(crate) spot_lights: wgpu::Buffer,
    pub(crate) bind_group: wgpu::BindGroup,
}

impl FrameBuffers {
    pub(crate) fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> Self {
        let buffer = |label: &str, size: u64, usage: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: usage | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let camera = buffer(
            "CameraBuffer",
            mem::size_of::<CameraUniform>() as u64,
            wgpu::BufferUsages::UNIFORM,
        );
        let point_lights = buffer(
            "PointLightsBuffer",
            LightKind::Point.table_size(),
            wgpu::BufferUsages::STORAGE,
        );
        let directional_lights = buffer(
            "DirectionalLightsBuffer",
            LightKind::Directional.table_size(),
            wgpu::BufferUsages::STORAGE,
        );
        let spot_lights = buffer(
            "SpotLightsBuffer",
            LightKind::Spot.table_size(),
            wgpu::BufferUsages::STORAGE,
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("FrameBindGroup"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: point_lights.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: directional_lights.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: spot_lights.as_entire_binding(),
                },
            ],
        });

        Self {
            camera,
            point_lights,
            directional_lights,
            spot_lights,
            bind_group,
        }
    }

    pub(crate) fn lights(&self, kind: LightKind) -> &wgpu::Buffer {
        match kind {
            LightKind::Point => &self.point_lights,
            LightKind::Directional => &self.directional_lights,
            LightKind::Spot => &self.spot_lights,
        }
    }
}

/// Per-draw object records for one frame, indexed by instance id.
pub(crate) struct DynamicObjectsBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) capacity: u32,
    pub(crate) bind_group: wgpu::BindGroup,
}

impl DynamicObjectsBuffer {
    pub(crate) fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> Self {
        let (buffer, bind_group) = Self::allocate(device, layout, INITIAL_OBJECTS_CAPACITY);
        Self {
            buffer,
            capacity: INITIAL_OBJECTS_CAPACITY,
            bind_group,
        }
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        capacity: u32,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ObjectsBuffer"),
            size: capacity as u64 * mem::size_of::<ObjectData>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ObjectsBindGroup"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        (buffer, bind_group)
    }

    pub(crate) fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        objects: &[ObjectData],
    ) {
        let required = objects.len() as u32;
        if required > self.capacity {
            let new_capacity = required.max(self.capacity * 2).max(1);
            log::info!(
                "Growing objects buffer: {} -> {}",
                self.capacity,
                new_capacity
            );
            let (buffer, bind_group) = Self::allocate(device, layout, new_capacity);
            self.buffer = buffer;
            self.bind_group = bind_group;
            self.capacity = new_capacity;
        }
        if !objects.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(objects));
        }
    }
}

/// Bones block size in bytes.
pub(crate) const BONES_BLOCK_SIZE: u64 = (MAX_BONES * mem::size_of::<[[f32; 4]; 4]>()) as u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bones_block_fits_a_uniform_binding() {
        assert_eq!(BONES_BLOCK_SIZE, 4096);
        assert!(BONES_BLOCK_SIZE <= wgpu::Limits::default().max_uniform_buffer_binding_size as u64);
    }

    #[test]
    fn depth_array_follows_sampler() {
        assert_eq!(DEPTH_ARRAY_BINDING, MAX_TEXTURE_UNITS as u32 + 1);
    }
}
