//! Left/right gain → pan mapping and the render-side pan law.

/// Independent channel gains set through `setStereoVolume`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainState {
    pub left: f32,
    pub right: f32,
}

impl Default for GainState {
    fn default() -> Self {
        Self {
            left: 1.0,
            right: 1.0,
        }
    }
}

impl GainState {
    /// Replace whichever gains are given, keeping the previous value for the others.
    pub fn update(&mut self, left: Option<f32>, right: Option<f32>) {
        if let Some(l) = left {
            self.left = l;
        }
        if let Some(r) = right {
            self.right = r;
        }
    }

    /// Pan coefficient in `[-1, 1]` derived from the two gains.
    ///
    /// A right gain below unity pans left by its deficit; otherwise the left gain's deficit
    /// pans right. Lowering the left gain while the right gain is also below unity has no
    /// effect. Gains above unity can push the raw value past the range, so it is clamped.
    pub fn pan(&self) -> f32 {
        let raw = if self.right < 1.0 {
            self.right - 1.0
        } else {
            1.0 - self.left
        };
        raw.clamp(-1.0, 1.0)
    }
}

/// Constant-power gains `(left, right)` for a mono source at `pan`.
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let p = if pan.is_finite() { pan.clamp(-1.0, 1.0) } else { 0.0 };
    let theta = (p + 1.0) * std::f32::consts::FRAC_PI_4;
    (theta.cos(), theta.sin())
}
