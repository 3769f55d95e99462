//! Owning wrappers around GPU objects.
//!
//! Each wrapper destroys its buffers or textures exactly once when dropped.

use std::path::Path;

use anyhow::{bail, Context, Result};
use glam::Vec3;
use log::{error, info};
use wgpu::util::DeviceExt;

use crate::mesh::{MeshData, VERTEX_STRIDE};
use crate::particles::ParticleField;
use crate::scene::SkyboxFaces;

/// Depth format shared by the screen depth buffer and the shadow map.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Interleaved position + normal layout of [`MeshData`].
pub fn mesh_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
    wgpu::VertexBufferLayout {
        array_stride: (VERTEX_STRIDE * std::mem::size_of::<f32>()) as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

pub fn particle_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
    wgpu::VertexBufferLayout {
        array_stride: (3 * std::mem::size_of::<f32>()) as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

pub struct GpuMesh {
    vertex: wgpu::Buffer,
    index: Option<wgpu::Buffer>,
    element_count: u32,
}

impl GpuMesh {
    pub fn from_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = mesh.indices.as_ref().map(|indices| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-indices")),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        });
        Self {
            vertex,
            index,
            element_count: mesh.element_count(),
        }
    }

    pub fn draw<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        pass.set_vertex_buffer(0, self.vertex.slice(..));
        match &self.index {
            Some(index) => {
                pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..self.element_count, 0, 0..1);
            }
            None => pass.draw(0..self.element_count, 0..1),
        }
    }
}

impl Drop for GpuMesh {
    fn drop(&mut self) {
        self.vertex.destroy();
        if let Some(index) = &self.index {
            index.destroy();
        }
    }
}

/// Static copy of the particle base field.
pub struct ParticleBuffer {
    vertex: wgpu::Buffer,
    vertex_count: u32,
    revision: u64,
}

impl ParticleBuffer {
    pub fn from_field(device: &wgpu::Device, field: &ParticleField, revision: u64) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("particle-vertices"),
            contents: bytemuck::cast_slice(field.vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            vertex,
            vertex_count: field.vertex_count(),
            revision,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn draw<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        pass.set_vertex_buffer(0, self.vertex.slice(..));
        pass.draw(0..self.vertex_count, 0..1);
    }
}

impl Drop for ParticleBuffer {
    fn drop(&mut self) {
        self.vertex.destroy();
    }
}

pub struct DepthBuffer {
    texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl DepthBuffer {
    pub fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

/// Depth-only target of the shadow pass, sampled with a comparison sampler.
pub struct ShadowMap {
    texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl ShadowMap {
    pub fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-map"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
        }
    }
}

impl Drop for ShadowMap {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

/// Six-layer texture sampled as a cube for the skybox and reflections.
pub struct Cubemap {
    texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl Cubemap {
    const GRADIENT_SIZE: u32 = 32;

    /// Loads `skybox` when given, falling back to a gradient on any failure.
    pub fn load_or_gradient(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        skybox: Option<&SkyboxFaces>,
        base_dir: &Path,
    ) -> Self {
        if let Some(skybox) = skybox {
            match Self::load(device, queue, skybox, base_dir) {
                Ok(cubemap) => return cubemap,
                Err(err) => error!("failed to load skybox: {err:?}"),
            }
        }
        Self::gradient(device, queue)
    }

    pub fn load(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        skybox: &SkyboxFaces,
        base_dir: &Path,
    ) -> Result<Self> {
        let mut faces = Vec::with_capacity(6);
        for face in &skybox.faces {
            let path = base_dir.join(face);
            let image = image::open(&path)
                .with_context(|| format!("unable to read cubemap face {}", path.display()))?
                .to_rgba8();
            faces.push(image);
        }
        let (width, height) = faces[0].dimensions();
        if width != height {
            bail!("cubemap faces must be square, got {width}x{height}");
        }
        if faces.iter().any(|face| face.dimensions() != (width, height)) {
            bail!("cubemap faces differ in size");
        }
        let cubemap = Self::create(device, width);
        for (layer, face) in faces.iter().enumerate() {
            cubemap.write_face(queue, layer as u32, width, face.as_raw());
        }
        info!("loaded {width}x{width} skybox");
        Ok(cubemap)
    }

    /// Sky-to-ground gradient generated on the CPU.
    pub fn gradient(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let size = Self::GRADIENT_SIZE;
        let cubemap = Self::create(device, size);
        for layer in 0..6 {
            let pixels = gradient_face(layer, size);
            cubemap.write_face(queue, layer, size, &pixels);
        }
        cubemap
    }

    fn create(device: &wgpu::Device, size: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("skybox-cubemap"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("skybox-view"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("skybox-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
        }
    }

    fn write_face(&self, queue: &wgpu::Queue, layer: u32, size: u32, rgba: &[u8]) {
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * size),
                rows_per_image: Some(size),
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
    }
}

impl Drop for Cubemap {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

/// Direction through texel `(s, t)` of cube face `layer`, in +X, -X, +Y, -Y,
/// +Z, -Z order.
fn face_direction(layer: u32, s: f32, t: f32) -> Vec3 {
    let u = s * 2.0 - 1.0;
    let v = t * 2.0 - 1.0;
    match layer {
        0 => Vec3::new(1.0, -v, -u),
        1 => Vec3::new(-1.0, -v, u),
        2 => Vec3::new(u, 1.0, v),
        3 => Vec3::new(u, -1.0, -v),
        4 => Vec3::new(u, -v, 1.0),
        _ => Vec3::new(-u, -v, -1.0),
    }
    .normalize()
}

fn gradient_face(layer: u32, size: u32) -> Vec<u8> {
    let zenith = Vec3::new(0.25, 0.4, 0.7);
    let horizon = Vec3::new(0.75, 0.8, 0.85);
    let ground = Vec3::new(0.3, 0.28, 0.25);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let s = (x as f32 + 0.5) / size as f32;
            let t = (y as f32 + 0.5) / size as f32;
            let height = face_direction(layer, s, t).y;
            let color = if height >= 0.0 {
                horizon.lerp(zenith, height)
            } else {
                horizon.lerp(ground, (-height * 4.0).min(1.0))
            };
            pixels.extend(color.to_array().map(|c| (c * 255.0).round() as u8));
            pixels.push(255);
        }
    }
    pixels
}

/// Group 1 of the lit programs: shadow map at bindings 0/1, skybox at 2/3.
pub struct EnvironmentBindings {
    pub layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
}

impl EnvironmentBindings {
    pub fn create(device: &wgpu::Device, shadow_map: &ShadowMap, cubemap: &Cubemap) -> Self {
        let stages = wgpu::ShaderStages::VERTEX_FRAGMENT;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("environment-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: stages,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: stages,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: stages,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: stages,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("environment-bind-group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&shadow_map.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&shadow_map.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&cubemap.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&cubemap.sampler),
                },
            ],
        });
        Self { layout, bind_group }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_faces_are_fully_opaque_rgba() {
        for layer in 0..6 {
            let pixels = gradient_face(layer, 4);
            assert_eq!(pixels.len(), 4 * 4 * 4);
            assert!(pixels.chunks_exact(4).all(|p| p[3] == 255));
        }
    }

    #[test]
    fn top_face_is_brighter_blue_than_bottom() {
        let top = gradient_face(2, 2);
        let bottom = gradient_face(3, 2);
        assert!(top[2] > bottom[2]);
    }

    #[test]
    fn face_directions_point_outwards() {
        let axes = [Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z];
        for (layer, axis) in axes.into_iter().enumerate() {
            let center = face_direction(layer as u32, 0.5, 0.5);
            assert!((center - axis).length() < 1e-6);
        }
    }

    #[test]
    fn vertex_layouts_match_mesh_data() {
        assert_eq!(mesh_vertex_layout().array_stride, 24);
        assert_eq!(particle_vertex_layout().array_stride, 12);
    }
}
