use glam::{Mat3, Mat4, Vec3, Vec4};
use log::debug;

use crate::passes::ProgramKind;
use crate::uniforms::{UniformBlock, UniformSink};

use super::resources::DEPTH_FORMAT;
use super::shaders;

const INITIAL_SLOTS: u64 = 32;

/// Fixed-function state of a program's pipelines.
pub struct PipelineSettings<'a> {
    /// One pipeline is built per topology.
    pub topologies: &'a [wgpu::PrimitiveTopology],
    pub vertex_buffer: wgpu::VertexBufferLayout<'a>,
    /// `None` builds a depth-only pipeline.
    pub color_format: Option<wgpu::TextureFormat>,
    pub blend: Option<wgpu::BlendState>,
    pub depth_write: bool,
    pub depth_compare: wgpu::CompareFunction,
    /// Bind groups after the uniform ring, starting at group 1.
    pub extra_layouts: &'a [&'a wgpu::BindGroupLayout],
}

/// A compiled program plus its uniforms.
///
/// Setters write a staging block as with GL uniforms; [`ShaderProgram::commit`]
/// snapshots the block into the next slot of a per-frame ring that draws bind
/// with a dynamic offset.
pub struct ShaderProgram {
    kind: ProgramKind,
    block: UniformBlock,
    ring: UniformRing,
    pipelines: Vec<(wgpu::PrimitiveTopology, wgpu::RenderPipeline)>,
    uses_environment: bool,
}

impl ShaderProgram {
    pub fn new(device: &wgpu::Device, kind: ProgramKind, settings: &PipelineSettings<'_>) -> Self {
        let block = UniformBlock::new(kind.layout());
        let ring = UniformRing::new(device, kind.label(), block.bytes().len() as u64);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kind.label()),
            source: wgpu::ShaderSource::Wgsl(shaders::source(kind, block.layout()).into()),
        });

        let mut bind_group_layouts = vec![&ring.layout];
        bind_group_layouts.extend_from_slice(settings.extra_layouts);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(kind.label()),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
        });

        let color_targets = [settings.color_format.map(|format| wgpu::ColorTargetState {
            format,
            blend: settings.blend,
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let pipelines = settings
            .topologies
            .iter()
            .map(|&topology| {
                let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(kind.label()),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: "vs_main",
                        buffers: &[settings.vertex_buffer.clone()],
                    },
                    primitive: wgpu::PrimitiveState {
                        topology,
                        front_face: wgpu::FrontFace::Ccw,
                        cull_mode: None,
                        polygon_mode: wgpu::PolygonMode::Fill,
                        ..Default::default()
                    },
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: DEPTH_FORMAT,
                        depth_write_enabled: settings.depth_write,
                        depth_compare: settings.depth_compare,
                        stencil: Default::default(),
                        bias: Default::default(),
                    }),
                    multisample: wgpu::MultisampleState::default(),
                    fragment: settings.color_format.map(|_| wgpu::FragmentState {
                        module: &shader,
                        entry_point: "fs_main",
                        targets: &color_targets,
                    }),
                    multiview: None,
                });
                (topology, pipeline)
            })
            .collect();

        Self {
            kind,
            block,
            ring,
            pipelines,
            uses_environment: !settings.extra_layouts.is_empty(),
        }
    }

    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    pub fn pipeline(&self, topology: wgpu::PrimitiveTopology) -> Option<&wgpu::RenderPipeline> {
        self.pipelines
            .iter()
            .find(|(candidate, _)| *candidate == topology)
            .map(|(_, pipeline)| pipeline)
    }

    pub fn uses_environment(&self) -> bool {
        self.uses_environment
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.ring.bind_group
    }

    pub fn begin_frame(&mut self) {
        self.ring.staging.clear();
    }

    /// Snapshots the current uniforms and returns their dynamic offset.
    pub fn commit(&mut self) -> u32 {
        self.ring.push(self.block.bytes())
    }

    /// Uploads every slot committed this frame, growing the ring if needed.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        self.ring.upload(device, queue, self.kind.label());
    }
}

impl UniformSink for ShaderProgram {
    fn set_mat4(&mut self, name: &str, value: Mat4) {
        self.block.set_mat4(name, value);
    }

    fn set_mat3(&mut self, name: &str, value: Mat3) {
        self.block.set_mat3(name, value);
    }

    fn set_vec4(&mut self, name: &str, value: Vec4) {
        self.block.set_vec4(name, value);
    }

    fn set_vec3(&mut self, name: &str, value: Vec3) {
        self.block.set_vec3(name, value);
    }

    fn set_float(&mut self, name: &str, value: f32) {
        self.block.set_float(name, value);
    }

    fn set_int(&mut self, name: &str, value: i32) {
        self.block.set_int(name, value);
    }

    fn set_bool(&mut self, name: &str, value: bool) {
        self.block.set_bool(name, value);
    }
}

struct UniformRing {
    layout: wgpu::BindGroupLayout,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    block_size: u64,
    stride: u64,
    capacity: u64,
    staging: Vec<u8>,
}

impl UniformRing {
    fn new(device: &wgpu::Device, label: &str, block_size: u64) -> Self {
        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let stride = block_size.div_ceil(alignment) * alignment;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{label}-uniform-layout")),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(block_size),
                },
                count: None,
            }],
        });
        let (buffer, bind_group) =
            Self::allocate(device, &layout, label, block_size, stride * INITIAL_SLOTS);
        Self {
            layout,
            buffer,
            bind_group,
            block_size,
            stride,
            capacity: INITIAL_SLOTS,
            staging: Vec::new(),
        }
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        label: &str,
        block_size: u64,
        size: u64,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label}-uniforms")),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}-uniform-bind-group")),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(block_size),
                }),
            }],
        });
        (buffer, bind_group)
    }

    fn push(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.staging.len();
        self.staging.extend_from_slice(bytes);
        self.staging.resize(offset + self.stride as usize, 0);
        offset as u32
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, label: &str) {
        let slots = self.staging.len() as u64 / self.stride;
        if slots > self.capacity {
            self.capacity = slots.next_power_of_two();
            debug!("growing {label} uniform ring to {} slots", self.capacity);
            let (buffer, bind_group) = Self::allocate(
                device,
                &self.layout,
                label,
                self.block_size,
                self.stride * self.capacity,
            );
            self.buffer.destroy();
            self.buffer = buffer;
            self.bind_group = bind_group;
        }
        if !self.staging.is_empty() {
            queue.write_buffer(&self.buffer, 0, &self.staging);
        }
    }
}

impl Drop for UniformRing {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}
