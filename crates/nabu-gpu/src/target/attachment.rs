use crate::device::{GpuDevice, TextureId, ViewId};

/// One color slot of a [`RenderSurface`](super::RenderSurface).
///
/// The multisampled texture and its view are owned by the attachment and
/// released with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    format: Option<wgpu::TextureFormat>,
    multisampled: Option<TextureId>,
    multisampled_view: Option<ViewId>,
}

impl Attachment {
    pub fn format(&self) -> Option<wgpu::TextureFormat> {
        self.format
    }

    pub fn multisampled_texture(&self) -> Option<TextureId> {
        self.multisampled
    }

    pub fn multisampled_view(&self) -> Option<ViewId> {
        self.multisampled_view
    }

    /// Returns whether the format changed.
    pub(crate) fn set_format(&mut self, format: wgpu::TextureFormat) -> bool {
        let changed = self.format != Some(format);
        self.format = Some(format);
        changed
    }

    pub(crate) fn set_multisampled(&mut self, texture: TextureId) {
        self.multisampled = Some(texture);
    }

    pub(crate) fn set_multisampled_view(&mut self, view: ViewId) {
        self.multisampled_view = Some(view);
    }

    pub(crate) fn release<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        if let Some(view) = self.multisampled_view.take() {
            device.destroy_view(view);
        }
        if let Some(texture) = self.multisampled.take() {
            device.destroy_texture(texture);
        }
    }

    /// Drops the GPU handles without releasing them; the device is gone.
    pub(crate) fn forget(&mut self) {
        self.multisampled_view = None;
        self.multisampled = None;
    }
}
