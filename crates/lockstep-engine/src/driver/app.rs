use std::sync::Arc;

use anyhow::Context;

use crate::capture::EncoderFactory;
use crate::config::RenderConfig;
use crate::core::{App, AppControl, FrameCtx};
use crate::device::{Gpu, GpuImage};
use crate::input::InputEvent;
use crate::mesh::Mesh;
use crate::render::ProgramTable;

use super::{FrameDriver, SHUTDOWN_TIMEOUT, TickOutcome};

/// Runs a [`FrameDriver`] inside the window runtime.
///
/// The driver is built in `on_start`, once the GPU exists. Closing the window
/// (or Escape) blocks until capture has finalized.
pub struct DriverApp {
    config: Arc<RenderConfig>,
    programs: ProgramTable,
    mesh: Mesh,
    factory: Option<Box<dyn EncoderFactory>>,
    driver: Option<FrameDriver<GpuImage>>,
}

impl DriverApp {
    pub fn new(
        config: Arc<RenderConfig>,
        programs: ProgramTable,
        mesh: Mesh,
        factory: Box<dyn EncoderFactory>,
    ) -> Self {
        Self {
            config,
            programs,
            mesh,
            factory: Some(factory),
            driver: None,
        }
    }

    fn finish(&mut self, gpu: &mut Gpu<'_>) {
        let Some(driver) = self.driver.as_mut() else {
            return;
        };
        if !driver.is_finished() {
            driver.shutdown(gpu, SHUTDOWN_TIMEOUT);
        }
        log::info!("{} frames rendered", driver.frames_rendered());
        if let Some(report) = driver.report() {
            log::info!(
                "capture: {} committed, {} dropped -> {}",
                report.frames_committed,
                report.frames_dropped,
                report.output.display()
            );
        }
    }
}

impl App for DriverApp {
    fn on_start(&mut self, gpu: &mut Gpu<'_>) -> anyhow::Result<()> {
        let factory = self
            .factory
            .take()
            .context("frame driver already started")?;
        let driver = FrameDriver::setup(
            Arc::clone(&self.config),
            &self.programs,
            &self.mesh,
            factory,
            gpu,
        )
        .context("failed to set up the render stage")?;
        self.driver = Some(driver);
        Ok(())
    }

    fn on_input(&mut self, event: InputEvent) -> AppControl {
        if let Some(driver) = self.driver.as_mut() {
            driver.handle_input(event);
        }
        AppControl::Continue
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        let Some(driver) = self.driver.as_mut() else {
            return AppControl::Exit;
        };

        if ctx.gpu.is_surface_lost() {
            log::error!("window surface lost; stopping");
            return AppControl::Exit;
        }

        ctx.window.pre_present_notify();
        match driver.tick(ctx.gpu) {
            TickOutcome::Finished => AppControl::Exit,
            TickOutcome::Rendered | TickOutcome::Skipped(_) | TickOutcome::Draining => {
                AppControl::Continue
            }
        }
    }

    fn on_close_requested(&mut self, gpu: &mut Gpu<'_>) {
        self.finish(gpu);
    }
}
