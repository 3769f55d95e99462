use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{error, info, trace};
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::app::FrameState;
use crate::config::SceneConfig;
use crate::mesh::{load_mesh, skybox_cube, MeshSource};
use crate::particles::ParticleField;
use crate::passes::{
    apply_depth_pass, apply_object, apply_particles, apply_skybox, plan_draws, DrawCommand,
    DrawPhase, DrawTarget, PassContext, ProgramKind,
};
use crate::scene::Scene;
use crate::shadow::RenderTargets;

use super::program::{PipelineSettings, ShaderProgram};
use super::resources::{
    mesh_vertex_layout, particle_vertex_layout, Cubemap, DepthBuffer, EnvironmentBindings,
    GpuMesh, ParticleBuffer, ShadowMap,
};

/// A draw whose uniforms have already been committed.
#[derive(Debug, Clone, Copy)]
struct RecordedDraw {
    phase: DrawPhase,
    target: DrawTarget,
    program: ProgramKind,
    offset: u32,
}

/// wgpu renderer for the shadowed scene, skybox and precipitation.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth: DepthBuffer,
    targets: RenderTargets,
    shadow_map: ShadowMap,
    _cubemap: Cubemap,
    environment: EnvironmentBindings,
    programs: HashMap<ProgramKind, ShaderProgram>,
    mesh_cache: HashMap<MeshSource, GpuMesh>,
    skybox_mesh: GpuMesh,
    particles: ParticleBuffer,
    plan: Vec<DrawCommand>,
}

impl Renderer {
    /// Creates the device, every program and every static resource of `scene`.
    pub async fn new(
        window: Arc<Window>,
        scene: &Scene,
        settings: &SceneConfig,
        field: &ParticleField,
    ) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("renderer-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to create GPU device")?;
        device.on_uncaptured_error(Box::new(|err| {
            error!("GPU validation error: {err}");
        }));

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no supported formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            // vsync off; the frame scheduler paces the loop
            present_mode: surface_caps
                .present_modes
                .iter()
                .copied()
                .find(|mode| {
                    matches!(
                        mode,
                        wgpu::PresentMode::Mailbox | wgpu::PresentMode::Immediate
                    )
                })
                .unwrap_or(wgpu::PresentMode::Fifo),
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);
        let [shadow_width, shadow_height] = settings.shadow.resolution;
        let shadow_map = ShadowMap::create(&device, shadow_width, shadow_height);
        let targets = RenderTargets::new((size.width, size.height), (shadow_width, shadow_height));
        let cubemap =
            Cubemap::load_or_gradient(&device, &queue, scene.skybox.as_ref(), &scene.base_dir);
        let environment = EnvironmentBindings::create(&device, &shadow_map, &cubemap);

        let programs = create_programs(&device, surface_format, &environment.layout);

        let mut mesh_cache = HashMap::new();
        let mut missing_meshes = HashSet::new();
        for object in &scene.objects {
            if mesh_cache.contains_key(&object.mesh) || missing_meshes.contains(&object.mesh) {
                continue;
            }
            match load_mesh(&object.mesh, &scene.base_dir) {
                Ok(mesh) => {
                    let buffers = GpuMesh::from_mesh(&device, &mesh, &object.mesh.to_string());
                    mesh_cache.insert(object.mesh.clone(), buffers);
                }
                Err(err) => {
                    error!("failed to load mesh {}: {err}", object.mesh);
                    missing_meshes.insert(object.mesh.clone());
                }
            }
        }
        info!(
            "uploaded {} meshes for {} objects",
            mesh_cache.len(),
            scene.objects.len()
        );

        let skybox_mesh = GpuMesh::from_mesh(&device, &skybox_cube(), "skybox");
        let particles = ParticleBuffer::from_field(&device, field, 0);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth,
            targets,
            shadow_map,
            _cubemap: cubemap,
            environment,
            programs,
            mesh_cache,
            skybox_mesh,
            particles,
            plan: plan_draws(scene),
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
        self.targets.resize_screen(new_size.width, new_size.height);
    }

    /// Re-uploads the particle base buffer after it was regenerated.
    pub fn sync_particles(&mut self, field: &ParticleField, revision: u64) {
        if self.particles.revision() != revision {
            self.particles = ParticleBuffer::from_field(&self.device, field, revision);
        }
    }

    /// Draws one frame: shadow depth, skybox, opaque objects, then blended
    /// particles and objects.
    pub fn render(
        &mut self,
        scene: &Scene,
        settings: &SceneConfig,
        frame: &FrameState,
    ) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let draws = self.record_uniforms(scene, settings, frame);
        for program in self.programs.values_mut() {
            program.upload(&self.device, &self.queue);
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer-encoder"),
            });
        let topology = if frame.particles.render_lines {
            wgpu::PrimitiveTopology::LineList
        } else {
            wgpu::PrimitiveTopology::PointList
        };

        {
            let shadow_pass = self.targets.begin_shadow_pass();
            let (width, height) = shadow_pass.viewport();
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow-pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.shadow_map.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
            for draw in draws.iter().filter(|d| d.phase == DrawPhase::ShadowDepth) {
                self.draw(&mut pass, draw, scene, topology);
            }
        }

        {
            let (width, height) = self.targets.current().viewport();
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.3,
                            g: 0.3,
                            b: 0.3,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
            for draw in draws.iter().filter(|d| d.phase != DrawPhase::ShadowDepth) {
                self.draw(&mut pass, draw, scene, topology);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    /// Sets and commits the uniforms of every draw in plan order.
    fn record_uniforms(
        &mut self,
        scene: &Scene,
        settings: &SceneConfig,
        frame: &FrameState,
    ) -> Vec<RecordedDraw> {
        for program in self.programs.values_mut() {
            program.begin_frame();
        }
        let context = PassContext {
            config: settings,
            camera: &frame.camera,
            light_space: &frame.light_space,
            current_time: frame.timing.current_time,
        };

        let mut draws = Vec::with_capacity(self.plan.len() + frame.particles.streams.len());
        for command in &self.plan {
            let Some(kind) = command.program(scene) else {
                continue;
            };
            let Some(program) = self.programs.get_mut(&kind) else {
                continue;
            };
            let record = |program: &mut ShaderProgram| RecordedDraw {
                phase: command.phase,
                target: command.target,
                program: kind,
                offset: program.commit(),
            };
            match command.target {
                DrawTarget::Object(index) => {
                    let Some(object) = scene.objects.get(index) else {
                        continue;
                    };
                    if !self.mesh_cache.contains_key(&object.mesh) {
                        continue;
                    }
                    if command.phase == DrawPhase::ShadowDepth {
                        let model = object.model_matrix(context.current_time);
                        apply_depth_pass(program, &frame.light_space, model);
                    } else {
                        apply_object(program, &context, object);
                    }
                    draws.push(record(program));
                }
                DrawTarget::Skybox => {
                    apply_skybox(program, &frame.camera);
                    draws.push(record(program));
                }
                DrawTarget::Particles => {
                    for stream in &frame.particles.streams {
                        apply_particles(program, &frame.particles, stream);
                        draws.push(record(program));
                    }
                }
            }
        }
        trace!("recorded {} draws", draws.len());
        draws
    }

    fn draw<'a>(
        &'a self,
        pass: &mut wgpu::RenderPass<'a>,
        draw: &RecordedDraw,
        scene: &Scene,
        particle_topology: wgpu::PrimitiveTopology,
    ) {
        let Some(program) = self.programs.get(&draw.program) else {
            return;
        };
        let topology = match draw.target {
            DrawTarget::Particles => particle_topology,
            _ => wgpu::PrimitiveTopology::TriangleList,
        };
        let Some(pipeline) = program.pipeline(topology) else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, program.bind_group(), &[draw.offset]);
        if program.uses_environment() {
            pass.set_bind_group(1, &self.environment.bind_group, &[]);
        }
        match draw.target {
            DrawTarget::Object(index) => {
                let mesh = scene
                    .objects
                    .get(index)
                    .and_then(|object| self.mesh_cache.get(&object.mesh));
                if let Some(mesh) = mesh {
                    mesh.draw(pass);
                }
            }
            DrawTarget::Skybox => self.skybox_mesh.draw(pass),
            DrawTarget::Particles => self.particles.draw(pass),
        }
    }
}

fn create_programs(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    environment: &wgpu::BindGroupLayout,
) -> HashMap<ProgramKind, ShaderProgram> {
    let with_environment = [environment];
    let mut programs = HashMap::new();
    for kind in ProgramKind::ALL {
        let settings = match kind {
            ProgramKind::Depth => PipelineSettings {
                color_format: None,
                ..opaque_settings(color_format, &[])
            },
            ProgramKind::Shadowed => opaque_settings(color_format, &with_environment),
            ProgramKind::PointLit => opaque_settings(color_format, &[]),
            ProgramKind::Water => PipelineSettings {
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                depth_write: false,
                ..opaque_settings(color_format, &with_environment)
            },
            ProgramKind::Skybox => PipelineSettings {
                depth_write: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                ..opaque_settings(color_format, &with_environment)
            },
            ProgramKind::Particles => PipelineSettings {
                topologies: &[
                    wgpu::PrimitiveTopology::PointList,
                    wgpu::PrimitiveTopology::LineList,
                ],
                vertex_buffer: particle_vertex_layout(),
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                depth_write: false,
                ..opaque_settings(color_format, &[])
            },
        };
        programs.insert(kind, ShaderProgram::new(device, kind, &settings));
    }
    programs
}

fn opaque_settings<'a>(
    color_format: wgpu::TextureFormat,
    extra_layouts: &'a [&'a wgpu::BindGroupLayout],
) -> PipelineSettings<'a> {
    PipelineSettings {
        topologies: &[wgpu::PrimitiveTopology::TriangleList],
        vertex_buffer: mesh_vertex_layout(),
        color_format: Some(color_format),
        blend: None,
        depth_write: true,
        depth_compare: wgpu::CompareFunction::Less,
        extra_layouts,
    }
}
