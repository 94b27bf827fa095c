/// Structural identity of a render target, as seen by pipeline creation.
///
/// Two targets with equal keys accept the same render pipelines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderTargetKey {
    pub sample_count: u32,
    pub depth_format: Option<wgpu::TextureFormat>,
    /// One entry per color slot; `None` for a slot whose format is not known yet.
    pub color_formats: Vec<Option<wgpu::TextureFormat>>,
}

impl RenderTargetKey {
    /// Color formats of the slots that will actually be rendered into.
    pub fn color_targets(&self) -> impl Iterator<Item = wgpu::TextureFormat> + '_ {
        self.color_formats.iter().flatten().copied()
    }
}
