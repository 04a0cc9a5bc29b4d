use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::backend::Resources;
use super::surface;
use super::{GpuInit, SurfaceErrorAction};

/// wgpu device, queue and window surface, plus the resources the
/// [`GpuBackend`](crate::gpu::GpuBackend) implementation renders with.
pub struct Gpu<'w> {
    /// Surface bound to the window; the window must outlive the `Gpu`.
    pub(super) surface: wgpu::Surface<'w>,

    pub(super) device: wgpu::Device,

    pub(super) queue: wgpu::Queue,

    /// Active surface configuration.
    pub(super) config: wgpu::SurfaceConfiguration,

    /// Current drawable size in physical pixels.
    pub(super) size: PhysicalSize<u32>,

    pub(super) resources: Resources,

    /// Set when the surface reported an unrecoverable error.
    pub(super) surface_fatal: bool,
}

impl<'w> Gpu<'w> {
    /// Creates a GPU context bound to a window.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: &'w Window, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let GpuInit {
            prefer_srgb,
            present_mode,
            alpha_mode,
            required_features,
            required_limits,
            desired_maximum_frame_latency,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let info = adapter.get_info();
        log::info!("gpu: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lockstep device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&surface_caps, prefer_srgb)
            .context("no supported surface formats")?;
        let alpha_mode = surface::choose_alpha_mode(&surface_caps, alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            // COPY_DST is not needed: the surface is only ever drawn by the blit pass.
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency,
        };

        surface.configure(&device, &config);
        log::debug!("surface: {format:?} {}x{} {present_mode:?}", size.width, size.height);

        let resources = Resources::new(&device);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            resources,
            surface_fatal: false,
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Current drawable size (physical pixels).
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// `true` once the surface failed in a way rendering cannot recover from.
    pub fn is_surface_lost(&self) -> bool {
        self.surface_fatal
    }

    /// Reconfigures the surface after a resize.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        surface::apply_resize(
            &self.surface,
            &self.device,
            &mut self.config,
            &mut self.size,
            new_size,
        );
    }

    /// Acquires the next surface texture, or `None` when this frame cannot be
    /// presented.
    pub(super) fn acquire_surface(&mut self) -> Option<wgpu::SurfaceTexture> {
        if self.size.width == 0 || self.size.height == 0 {
            return None;
        }
        match self.surface.get_current_texture() {
            Ok(texture) => Some(texture),
            Err(err) => {
                let action = surface::map_surface_error(
                    &self.surface,
                    &self.device,
                    &self.config,
                    self.size,
                    &err,
                );
                log::debug!("surface unavailable ({err}); skipping present: {action:?}");
                if action == SurfaceErrorAction::Fatal {
                    log::error!("surface lost: {err}");
                    self.surface_fatal = true;
                }
                None
            }
        }
    }
}
