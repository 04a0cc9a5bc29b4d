use std::collections::HashMap;

use crate::config::Resolution;
use crate::error::GpuError;
use crate::gpu::{GpuBackend, ImageRole};

use super::pool::SlotId;

/// Render target paired with each pool slot.
///
/// The GPU writes into the slot's image; the backend reads it back into the
/// slot's pixel buffer. Images live as long as the recording does.
pub struct TextureCache<I> {
    resolution: Resolution,
    entries: HashMap<SlotId, I>,
}

impl<I: Clone> TextureCache<I> {
    /// Creates one capture image per slot.
    pub fn allocate<G>(
        gpu: &mut G,
        slots: impl IntoIterator<Item = SlotId>,
        resolution: Resolution,
    ) -> Result<Self, GpuError>
    where
        G: GpuBackend<Image = I>,
    {
        let mut entries = HashMap::new();
        for slot in slots {
            let image = gpu.create_image(resolution, ImageRole::Capture)?;
            entries.insert(slot, image);
        }
        log::debug!("texture cache: {} images at {resolution}", entries.len());
        Ok(Self { resolution, entries })
    }

    /// Returns a handle to the image paired with `slot`.
    pub fn view(&self, slot: SlotId) -> Option<I> {
        self.entries.get(&slot).cloned()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
