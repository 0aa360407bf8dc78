/// A camera response curve: for each RGB channel, the log exposure
/// `g(z)` that produces pixel value `z`.
///
/// Only differences between entries are meaningful; the curve may be
/// shifted by any constant without changing merged radiance ratios.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCurve {
    log_exposure: [[f32; 256]; 3],
}

impl ResponseCurve {
    pub fn new(log_exposure: [[f32; 256]; 3]) -> ResponseCurve {
        ResponseCurve {
            log_exposure: log_exposure,
        }
    }

    /// Builds a curve by evaluating `f(channel, z)` for every entry.
    pub fn from_fn<F: Fn(usize, u8) -> f32>(f: F) -> ResponseCurve {
        let mut log_exposure = [[0.0f32; 256]; 3];
        for (chan, curve) in log_exposure.iter_mut().enumerate() {
            for (z, entry) in curve.iter_mut().enumerate() {
                *entry = f(chan, z as u8);
            }
        }
        ResponseCurve::new(log_exposure)
    }

    #[inline(always)]
    pub fn log_exposure(&self, chan: usize, z: u8) -> f32 {
        self.log_exposure[chan][z as usize]
    }

    /// The response in the linear domain, `exp(g(z))`.
    #[inline(always)]
    pub fn linear(&self, chan: usize, z: u8) -> f32 {
        self.log_exposure[chan][z as usize].exp()
    }

    pub fn channel(&self, chan: usize) -> &[f32; 256] {
        &self.log_exposure[chan]
    }

    /// Whether every channel is non-decreasing, allowing dips of up to
    /// `tolerance` between neighbouring entries.
    pub fn is_monotonic(&self, tolerance: f32) -> bool {
        self.log_exposure
            .iter()
            .all(|curve| curve.windows(2).all(|w| w[1] >= w[0] - tolerance))
    }

    pub fn is_finite(&self) -> bool {
        self.log_exposure
            .iter()
            .all(|curve| curve.iter().all(|v| v.is_finite()))
    }
}
