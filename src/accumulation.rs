use log::info;

/// Progressive refinement counter driven by the denoise and pause toggles.
///
/// While denoising and not paused the counter grows by one each frame; pausing
/// freezes it; disabling denoise forces it to zero every frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AccumulationState {
    frame_count: u32,
    denoise: bool,
    paused: bool,
}

impl AccumulationState {
    pub fn new(denoise: bool, paused: bool) -> Self {
        Self {
            frame_count: 0,
            denoise,
            paused,
        }
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn denoise(&self) -> bool {
        self.denoise
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    /// Apply the per-frame rule and return the value the shader sees this frame
    pub fn advance(&mut self) -> u32 {
        if !self.denoise {
            self.frame_count = 0;
        } else if !self.paused {
            self.frame_count = self.frame_count.saturating_add(1);
        }
        self.frame_count
    }

    pub fn set_denoise(&mut self, denoise: bool) {
        self.denoise = denoise;
    }

    pub fn toggle_denoise(&mut self) {
        self.set_denoise(!self.denoise);
        info!("Denoise {}", if self.denoise { "enabled" } else { "disabled" });
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn toggle_pause(&mut self) {
        self.set_paused(!self.paused);
        info!(
            "Accumulation {} at frame {}",
            if self.paused { "paused" } else { "resumed" },
            self.frame_count
        );
    }

    /// Drop accumulated history, e.g. after a resize or a camera move
    pub fn invalidate(&mut self) {
        self.frame_count = 0;
    }
}

/// The texture pair of the accumulation loop.
///
/// `target` receives the raytracing pass; `history` holds the previous frame's
/// output and is sampled by the next raytracing pass.
pub struct HistoryTextures {
    pub target: wgpu::Texture,
    pub target_view: wgpu::TextureView,
    pub history: wgpu::Texture,
    pub history_view: wgpu::TextureView,
    pub size: wgpu::Extent3d,
}

impl HistoryTextures {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let create_texture = |label: &str, usage: wgpu::TextureUsages| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::FORMAT,
                usage,
                view_formats: &[],
            })
        };

        let target = create_texture(
            "Raytrace Target",
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let history = create_texture(
            "Raytrace History",
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let history_view = history.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            target,
            target_view,
            history,
            history_view,
            size,
        }
    }

    /// Record the copy that turns this frame's output into next frame's history
    pub fn copy_target_to_history(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_texture(
            self.target.as_image_copy(),
            self.history.as_image_copy(),
            self.size,
        );
    }
}
