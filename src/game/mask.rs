//! Visibility mask raster and compositors

use tracing::info;

/// Fully hidden texel
pub const HIDDEN: u8 = 255;
/// Blur sample offset in texels
pub const BLUR_TEXELS: i32 = 20;

const KERNEL_CENTER: f32 = 0.36;
const KERNEL_EDGE: f32 = 0.10;
const KERNEL_CORNER: f32 = 0.06;

/// Per-frame alpha raster in view space, one texel per view unit.
/// 255 hides the world underneath, 0 shows it.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionMask {
    width: usize,
    height: usize,
    alpha: Vec<u8>,
}

impl VisionMask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            alpha: vec![HIDDEN; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    /// Alpha at a texel; outside the raster counts as hidden
    pub fn get(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return HIDDEN;
        }
        self.alpha[y as usize * self.width + x as usize]
    }

    /// Share of texels that are fully clear
    pub fn visible_fraction(&self) -> f32 {
        if self.alpha.is_empty() {
            return 0.0;
        }
        let clear = self.alpha.iter().filter(|&&a| a == 0).count();
        clear as f32 / self.alpha.len() as f32
    }

    pub fn fill_hidden(&mut self) {
        self.alpha.fill(HIDDEN);
    }

    /// Clear every texel whose centre lies within `radius` of `(cx, cy)`
    pub fn reveal_circle(&mut self, cx: f32, cy: f32, radius: f32) {
        if radius <= 0.0 || self.alpha.is_empty() {
            return;
        }
        let r2 = radius * radius;
        let (y0, y1) = self.span(cy - radius, cy + radius, self.height);
        let (x0, x1) = self.span(cx - radius, cx + radius, self.width);
        for y in y0..y1 {
            let dy = y as f32 + 0.5 - cy;
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - cx;
                if dx * dx + dy * dy <= r2 {
                    self.alpha[y * self.width + x] = 0;
                }
            }
        }
    }

    /// Clear the interior of a closed polygon (even-odd scanline fill,
    /// sampled at texel centres)
    pub fn reveal_polygon(&mut self, points: &[(f32, f32)]) {
        if points.len() < 3 || self.alpha.is_empty() {
            return;
        }
        let mut crossings: Vec<f32> = Vec::with_capacity(points.len());
        for y in 0..self.height {
            let sy = y as f32 + 0.5;
            crossings.clear();
            for (i, &(x1, y1)) in points.iter().enumerate() {
                let (x2, y2) = points[(i + 1) % points.len()];
                if (y1 <= sy && y2 > sy) || (y2 <= sy && y1 > sy) {
                    let t = (sy - y1) / (y2 - y1);
                    crossings.push(x1 + t * (x2 - x1));
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));
            for pair in crossings.chunks_exact(2) {
                let start = (pair[0] - 0.5).ceil().max(0.0) as usize;
                let end = ((pair[1] - 0.5).floor() + 1.0).clamp(0.0, self.width as f32) as usize;
                if start < end {
                    let row = y * self.width;
                    self.alpha[row + start..row + end].fill(0);
                }
            }
        }
    }

    /// Texel index range covering `[lo, hi]`, clipped to `0..len`
    fn span(&self, lo: f32, hi: f32, len: usize) -> (usize, usize) {
        let a = lo.floor().max(0.0) as usize;
        let b = (hi.ceil().max(0.0) as usize).min(len);
        (a.min(len), b)
    }
}

/// What the rendering surface can do, probed once per session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderCaps {
    pub accelerated: bool,
}

impl Default for RenderCaps {
    fn default() -> Self {
        Self { accelerated: true }
    }
}

/// Turns the raw mask into the one drawn over the world
pub trait MaskCompositor: Send + Sync {
    fn name(&self) -> &'static str;
    fn composite(&self, mask: &VisionMask) -> VisionMask;
}

/// 3x3 weighted blur with taps `blur` texels apart, edges clamped
pub struct BlurCompositor {
    pub blur: i32,
}

impl Default for BlurCompositor {
    fn default() -> Self {
        Self { blur: BLUR_TEXELS }
    }
}

impl MaskCompositor for BlurCompositor {
    fn name(&self) -> &'static str {
        "blur"
    }

    fn composite(&self, mask: &VisionMask) -> VisionMask {
        let (w, h) = (mask.width as i32, mask.height as i32);
        let mut out = VisionMask::new(mask.width, mask.height);
        if w == 0 || h == 0 {
            return out;
        }
        let t = self.blur;
        let sample = |x: i32, y: i32| mask.get(x.clamp(0, w - 1), y.clamp(0, h - 1)) as f32;

        for y in 0..h {
            for x in 0..w {
                let corners = sample(x - t, y - t)
                    + sample(x + t, y - t)
                    + sample(x - t, y + t)
                    + sample(x + t, y + t);
                let edges = sample(x, y - t) + sample(x - t, y) + sample(x + t, y) + sample(x, y + t);
                let a = sample(x, y) * KERNEL_CENTER + edges * KERNEL_EDGE + corners * KERNEL_CORNER;
                out.alpha[(y * w + x) as usize] = a.round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }
}

/// Pass-through used when acceleration is unavailable
pub struct PlainCompositor;

impl MaskCompositor for PlainCompositor {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn composite(&self, mask: &VisionMask) -> VisionMask {
        mask.clone()
    }
}

pub fn select_compositor(caps: RenderCaps) -> Box<dyn MaskCompositor> {
    let compositor: Box<dyn MaskCompositor> = if caps.accelerated {
        Box::new(BlurCompositor::default())
    } else {
        Box::new(PlainCompositor)
    };
    info!(compositor = compositor.name(), "Vision compositor selected");
    compositor
}
