//! Mel spectrogram visualization rendered to PNG.

use crate::audio::Waveform;
use crate::error::{RenderError, Result};
use crate::mel::{MelConfig, power_to_db};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ndarray::Array2;
use ndarray_stats::QuantileExt;

/// Default rendered image size (width, height).
pub const SPEC_IMG_SIZE: (u32, u32) = (512, 256);

/// Viridis colormap anchors, evenly spaced from 0 to 1.
const VIRIDIS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [71, 44, 122],
    [59, 81, 139],
    [44, 113, 142],
    [33, 144, 141],
    [39, 173, 129],
    [92, 200, 99],
    [170, 220, 50],
    [253, 231, 37],
];

/// Rendered spectrogram as PNG bytes.
#[derive(Clone, Debug)]
pub struct SpectrogramImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl SpectrogramImage {
    /// PNG bytes as a `data:image/png;base64,...` URI.
    pub fn to_data_uri(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }
}

/// Axis-free mel spectrogram renderer.
#[derive(Clone, Copy, Debug)]
pub struct SpectrogramRenderer {
    pub mel: MelConfig,
    pub width: u32,
    pub height: u32,
}

impl Default for SpectrogramRenderer {
    fn default() -> Self {
        Self::new(SPEC_IMG_SIZE.0, SPEC_IMG_SIZE.1)
    }
}

impl SpectrogramRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            mel: MelConfig::DISPLAY,
            width,
            height,
        }
    }

    /// Mel power spectrogram in dB relative to its own peak `(n_mels, frames)`.
    pub fn decibels(&self, waveform: &Waveform) -> Array2<f32> {
        let power = self.mel.apply(waveform.samples());
        let peak = power.fold(0.0_f32, |acc, &x| acc.max(x));
        power_to_db(&power, peak)
    }

    /// Render the waveform's spectrogram to PNG.
    pub fn render(&self, waveform: &Waveform) -> Result<SpectrogramImage> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidSize {
                width: self.width,
                height: self.height,
            }
            .into());
        }

        let db = self.decibels(waveform);
        let pixels = self.rasterize(&db)?;
        let png = encode_png(&pixels, self.width, self.height)?;

        tracing::debug!(
            width = self.width,
            height = self.height,
            bytes = png.len(),
            "spectrogram rendered"
        );

        Ok(SpectrogramImage {
            png,
            width: self.width,
            height: self.height,
        })
    }

    /// Nearest-neighbour sample the dB matrix into RGB rows, low bands at the bottom.
    fn rasterize(&self, db: &Array2<f32>) -> Result<Vec<u8>> {
        let (bands, frames) = db.dim();
        let max = *db.max().map_err(RenderError::from)?;
        let min = *db.min().map_err(RenderError::from)?;
        let range = max - min;

        let (width, height) = (self.width as usize, self.height as usize);
        let mut pixels = Vec::with_capacity(width * height * 3);

        for y in 0..height {
            let band = (height - 1 - y) * bands / height;
            for x in 0..width {
                let frame = x * frames / width;
                let value = db[[band, frame]];
                let t = if range > 0.0 { (value - min) / range } else { 0.0 };
                pixels.extend_from_slice(&colormap(t));
            }
        }

        Ok(pixels)
    }
}

/// Render a waveform's spectrogram at the default size.
pub fn render_spectrogram(waveform: &Waveform) -> Result<Vec<u8>> {
    Ok(SpectrogramRenderer::default().render(waveform)?.png)
}

/// Linear interpolation through the viridis anchors.
fn colormap(t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0) * (VIRIDIS.len() - 1) as f32;
    let lo = t.floor() as usize;
    let hi = (lo + 1).min(VIRIDIS.len() - 1);
    let frac = t - lo as f32;

    let mut rgb = [0u8; 3];
    for (c, out) in rgb.iter_mut().enumerate() {
        let a = VIRIDIS[lo][c] as f32;
        let b = VIRIDIS[hi][c] as f32;
        *out = (a + (b - a) * frac).round() as u8;
    }
    rgb
}

fn encode_png(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut buf = Vec::new();

    let mut encoder = png::Encoder::new(&mut buf, width, height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);

    let mut writer = encoder.write_header()?;
    writer.write_image_data(pixels)?;
    writer.finish()?;

    Ok(buf)
}
