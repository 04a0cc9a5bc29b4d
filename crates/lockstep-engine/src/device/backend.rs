//! [`GpuBackend`] on top of wgpu.
//!
//! Every frame is one command buffer: scene pass into the frame target, blit
//! pass into the window surface, and for captured frames a copy of the target
//! into that image's staging buffer. Completion is fenced by `map_async` on
//! the staging buffer (captured frames) or `on_submitted_work_done` (preview
//! frames), and callbacks run from [`GpuBackend::poll`] in submission order.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use wgpu::util::DeviceExt;

use crate::capture::PixelBuffer;
use crate::config::Resolution;
use crate::error::{GpuError, ProgramError};
use crate::gpu::{
    CompletedFrame, Completion, DepthCompare, DepthState, Draw, FrameCommands, GpuBackend,
    ImageRole, MeshId, ProgramDesc, ProgramId, ProgramKind,
};
use crate::mesh::{Mesh, Vertex};

use super::Gpu;
use super::readback::{BYTES_PER_PIXEL, padded_bytes_per_row, unpad_rows};

/// Color format of every frame target.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Room for the largest uniform record.
const UNIFORM_BUFFER_SIZE: u64 = 256;

/// A frame target: color texture, the blit bind group sampling it, and for
/// capture images the staging buffer it is read back through.
#[derive(Clone)]
pub struct GpuImage {
    id: u32,
    resolution: Resolution,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    blit_group: wgpu::BindGroup,
    staging: Option<Staging>,
}

impl GpuImage {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

#[derive(Clone)]
struct Staging {
    buffer: wgpu::Buffer,
    padded_bpr: u32,
}

struct LoadedProgram {
    name: String,
    kind: ProgramKind,
    pipeline: wgpu::RenderPipeline,
}

struct MeshBuffers {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

struct DepthTarget {
    size: (u32, u32),
    view: wgpu::TextureView,
}

/// Completion state of one submission; set from wgpu callbacks.
type Fence = Arc<OnceLock<Result<(), GpuError>>>;

struct Pending {
    fence: Fence,
    readback: Option<(PixelBuffer, Staging)>,
    on_complete: Completion,
}

/// Backend state owned by [`Gpu`].
pub(crate) struct Resources {
    uniform_layout: wgpu::BindGroupLayout,
    blit_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,

    programs: Vec<LoadedProgram>,
    meshes: Vec<MeshBuffers>,
    next_image: u32,
    scratch: Option<GpuImage>,
    scene_depth: Option<DepthTarget>,
    surface_depth: Option<DepthTarget>,

    pending: VecDeque<Pending>,
}

impl Resources {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lockstep uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lockstep blit layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lockstep frame uniforms"),
            size: UNIFORM_BUFFER_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lockstep uniform bind group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("lockstep blit sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            uniform_layout,
            blit_layout,
            uniform_buffer,
            uniform_group,
            sampler,
            programs: Vec::new(),
            meshes: Vec::new(),
            next_image: 0,
            scratch: None,
            scene_depth: None,
            surface_depth: None,
            pending: VecDeque::new(),
        }
    }
}

fn depth_stencil(depth: DepthState) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: depth.write,
        depth_compare: match depth.compare {
            DepthCompare::Less => wgpu::CompareFunction::Less,
            DepthCompare::Always => wgpu::CompareFunction::Always,
        },
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

fn ensure_depth<'a>(
    device: &wgpu::Device,
    slot: &'a mut Option<DepthTarget>,
    size: (u32, u32),
    label: &str,
) -> &'a wgpu::TextureView {
    if slot.as_ref().is_some_and(|d| d.size != size) {
        *slot = None;
    }
    let target = slot.get_or_insert_with(|| {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.0.max(1),
                height: size.1.max(1),
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
        DepthTarget { size, view }
    });
    &target.view
}

impl Gpu<'_> {
    fn build_pipeline(&self, desc: &ProgramDesc) -> wgpu::RenderPipeline {
        let res = &self.resources;
        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.name.as_str()),
            source: wgpu::ShaderSource::Wgsl(desc.source.as_ref().into()),
        });

        let layout_group = match desc.kind {
            ProgramKind::Blit => &res.blit_layout,
            ProgramKind::Mesh | ProgramKind::Procedural => &res.uniform_layout,
        };
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.name.as_str()),
                bind_group_layouts: &[layout_group],
                immediate_size: 0,
            });

        const MESH_ATTRS: [wgpu::VertexAttribute; 3] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
        let mesh_layout = [wgpu::VertexBufferLayout {
            array_stride: Vertex::STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &MESH_ATTRS,
        }];

        let (buffers, topology, format): (&[wgpu::VertexBufferLayout], _, _) = match desc.kind {
            ProgramKind::Mesh => (
                &mesh_layout,
                wgpu::PrimitiveTopology::TriangleList,
                TARGET_FORMAT,
            ),
            ProgramKind::Procedural => (&[], wgpu::PrimitiveTopology::TriangleStrip, TARGET_FORMAT),
            ProgramKind::Blit => (&[], wgpu::PrimitiveTopology::TriangleStrip, self.config.format),
        };

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.name.as_str()),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(depth_stencil(desc.depth)),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
    }

    fn new_image(&mut self, resolution: Resolution, role: ImageRole) -> GpuImage {
        let id = self.resources.next_image;
        self.resources.next_image += 1;

        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        if role == ImageRole::Capture {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("lockstep frame target"),
            size: wgpu::Extent3d {
                width: resolution.width,
                height: resolution.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let blit_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lockstep blit bind group"),
            layout: &self.resources.blit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.resources.sampler),
                },
            ],
        });

        let staging = (role == ImageRole::Capture).then(|| {
            let padded_bpr = padded_bytes_per_row(resolution.width);
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("lockstep readback"),
                size: padded_bpr as u64 * resolution.height as u64,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            Staging { buffer, padded_bpr }
        });

        GpuImage {
            id,
            resolution,
            texture,
            view,
            blit_group,
            staging,
        }
    }

    /// Queues a completion that is already decided.
    fn push_ready(&mut self, readback: Option<PixelBuffer>, status: Result<(), GpuError>, on_complete: Completion) {
        let fence: Fence = Arc::new(OnceLock::new());
        let _ = fence.set(status);
        // The buffer is handed back untouched; it was never copied into.
        let pending = Pending {
            fence,
            readback: None,
            on_complete: Box::new(move |mut done: CompletedFrame| {
                done.backing = readback;
                on_complete(done)
            }),
        };
        self.resources.pending.push_back(pending);
    }

    fn record_scene(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        commands: &FrameCommands<'_, GpuImage>,
    ) -> Result<(), GpuError> {
        let scene = &commands.scene;
        if self.resources.programs.get(scene.program.0 as usize).is_none() {
            return Err(GpuError::UnknownProgram(scene.program.0));
        }

        self.queue
            .write_buffer(&self.resources.uniform_buffer, 0, scene.uniforms.as_bytes());

        let target = scene.target;
        let res = target.resolution;
        let depth = ensure_depth(
            &self.device,
            &mut self.resources.scene_depth,
            (res.width, res.height),
            "lockstep scene depth",
        );

        let [r, g, b, a] = scene.clear;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lockstep scene pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let program = &self.resources.programs[scene.program.0 as usize];
        pass.set_pipeline(&program.pipeline);
        pass.set_bind_group(0, &self.resources.uniform_group, &[]);

        match scene.draw {
            Draw::Indexed { mesh } => {
                let Some(mesh) = self.resources.meshes.get(mesh.0 as usize) else {
                    log::warn!("unknown mesh {:?}; scene left cleared", mesh);
                    return Ok(());
                };
                pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
            Draw::FullscreenQuad => pass.draw(0..4, 0..1),
        }
        Ok(())
    }

    /// Blits `image` into the surface. Returns the surface texture to present.
    fn record_blit(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        program: ProgramId,
        image: &GpuImage,
    ) -> Option<wgpu::SurfaceTexture> {
        let Some(blit) = self.resources.programs.get(program.0 as usize) else {
            log::warn!("unknown blit program {}", program.0);
            return None;
        };
        debug_assert_eq!(blit.kind, ProgramKind::Blit);
        let surface_texture = self.acquire_surface()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let depth = ensure_depth(
            &self.device,
            &mut self.resources.surface_depth,
            (self.config.width, self.config.height),
            "lockstep surface depth",
        );

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lockstep blit pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let blit = &self.resources.programs[program.0 as usize];
        pass.set_pipeline(&blit.pipeline);
        pass.set_bind_group(0, &image.blit_group, &[]);
        pass.draw(0..4, 0..1);
        drop(pass);

        Some(surface_texture)
    }
}

impl GpuBackend for Gpu<'_> {
    type Image = GpuImage;

    fn load_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, ProgramError> {
        if let Some(i) = self
            .resources
            .programs
            .iter()
            .position(|p| p.name == desc.name && p.kind == desc.kind)
        {
            return Ok(ProgramId(i as u32));
        }

        let pipeline = self.build_pipeline(desc);
        let id = ProgramId(self.resources.programs.len() as u32);
        log::debug!("loaded program '{}' as {:?} ({:?})", desc.name, id, desc.kind);
        self.resources.programs.push(LoadedProgram {
            name: desc.name.clone(),
            kind: desc.kind,
            pipeline,
        });
        Ok(id)
    }

    fn upload_mesh(&mut self, mesh: &Mesh) -> MeshId {
        let vertices = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("lockstep mesh vbo"),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let indices = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("lockstep mesh ibo"),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        let id = MeshId(self.resources.meshes.len() as u32);
        self.resources.meshes.push(MeshBuffers {
            vertices,
            indices,
            index_count: mesh.index_count(),
        });
        id
    }

    fn create_image(&mut self, resolution: Resolution, role: ImageRole) -> Result<GpuImage, GpuError> {
        let limit = self.device.limits().max_texture_dimension_2d;
        if resolution.width == 0
            || resolution.height == 0
            || resolution.width > limit
            || resolution.height > limit
        {
            return Err(GpuError::Allocation(format!(
                "{resolution} is outside 1..={limit} per side"
            )));
        }

        match role {
            // One scratch target is reused; queue order keeps frames apart.
            ImageRole::Scratch => {
                if let Some(scratch) = &self.resources.scratch
                    && scratch.resolution == resolution
                {
                    return Ok(scratch.clone());
                }
                let image = self.new_image(resolution, role);
                self.resources.scratch = Some(image.clone());
                Ok(image)
            }
            ImageRole::Capture => Ok(self.new_image(resolution, role)),
        }
    }

    fn submit(&mut self, commands: FrameCommands<'_, GpuImage>, on_complete: Completion) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lockstep frame encoder"),
            });

        if let Err(e) = self.record_scene(&mut encoder, &commands) {
            self.push_ready(commands.readback, Err(e), on_complete);
            return;
        }

        let FrameCommands {
            scene,
            blit,
            readback,
        } = commands;
        let image = scene.target;

        let surface_texture = self.record_blit(&mut encoder, blit.program, image);

        // Copy out after both passes; the blit only reads the target.
        let readback = match (readback, image.staging.clone()) {
            (Some(buffer), Some(staging)) => {
                let res = image.resolution;
                encoder.copy_texture_to_buffer(
                    wgpu::TexelCopyTextureInfo {
                        texture: &image.texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::TexelCopyBufferInfo {
                        buffer: &staging.buffer,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: 0,
                            bytes_per_row: Some(staging.padded_bpr),
                            rows_per_image: Some(res.height),
                        },
                    },
                    wgpu::Extent3d {
                        width: res.width,
                        height: res.height,
                        depth_or_array_layers: 1,
                    },
                );
                Some((buffer, staging))
            }
            (Some(buffer), None) => {
                log::error!("frame target {} has no staging buffer", image.id);
                self.queue.submit(std::iter::once(encoder.finish()));
                if let Some(st) = surface_texture {
                    st.present();
                }
                self.push_ready(
                    Some(buffer),
                    Err(GpuError::Readback("target is not a capture image".into())),
                    on_complete,
                );
                return;
            }
            (None, _) => None,
        };

        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(st) = surface_texture {
            st.present();
        }

        let fence: Fence = Arc::new(OnceLock::new());
        let signal = Arc::clone(&fence);
        match &readback {
            Some((_, staging)) => {
                staging
                    .buffer
                    .slice(..)
                    .map_async(wgpu::MapMode::Read, move |result| {
                        let _ = signal.set(result.map_err(|e| GpuError::Readback(e.to_string())));
                    });
            }
            None => {
                self.queue.on_submitted_work_done(move || {
                    let _ = signal.set(Ok(()));
                });
            }
        }

        self.resources.pending.push_back(Pending {
            fence,
            readback,
            on_complete,
        });
    }

    fn poll(&mut self) {
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {e}");
        }

        while self
            .resources
            .pending
            .front()
            .is_some_and(|p| p.fence.get().is_some())
        {
            let Some(pending) = self.resources.pending.pop_front() else {
                break;
            };
            let status = pending.fence.get().cloned().unwrap_or(Ok(()));

            let (backing, status) = match pending.readback {
                Some((mut buffer, staging)) => {
                    let status = status.and_then(|()| copy_out(&staging, &mut buffer));
                    if let Err(e) = &status {
                        log::warn!("readback of ticket {} failed: {e}", buffer.ticket());
                    }
                    (Some(buffer), status)
                }
                None => (None, status),
            };

            (pending.on_complete)(CompletedFrame { backing, status });
        }
    }
}

/// Copies a mapped staging buffer into `buffer` and unmaps it.
fn copy_out(staging: &Staging, buffer: &mut PixelBuffer) -> Result<(), GpuError> {
    let res = buffer.resolution();
    let row_bytes = (res.width * BYTES_PER_PIXEL) as usize;
    let ok = {
        let mapped = staging.buffer.slice(..).get_mapped_range();
        unpad_rows(
            &mapped,
            staging.padded_bpr as usize,
            buffer.data_mut(),
            row_bytes,
            res.height as usize,
        )
    };
    staging.buffer.unmap();

    if ok {
        Ok(())
    } else {
        Err(GpuError::Readback(format!(
            "staging buffer does not fit {res}"
        )))
    }
}
