/// Device pixel ratio sources

use std::sync::Mutex;

/// Anything that can report the scale between logical and physical pixels.
pub trait PixelRatio: Send + Sync {
    fn device_pixel_ratio(&self) -> f32;
}

/// A ratio that never changes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPixelRatio(pub f32);

impl Default for FixedPixelRatio {
    fn default() -> Self {
        FixedPixelRatio(1.0)
    }
}

impl PixelRatio for FixedPixelRatio {
    fn device_pixel_ratio(&self) -> f32 {
        super::sanitize_ratio(self.0)
    }
}

/// Display metrics that a host may change at runtime (e.g. the window was
/// dragged to a HiDPI monitor). The next rasterization pass picks it up.
#[derive(Debug)]
pub struct DisplayMetrics {
    ratio: Mutex<f32>,
}

impl DisplayMetrics {
    pub fn new(ratio: f32) -> Self {
        DisplayMetrics {
            ratio: Mutex::new(ratio),
        }
    }

    pub fn set_device_pixel_ratio(&self, ratio: f32) {
        let mut g = self.ratio.lock().unwrap_or_else(|e| e.into_inner());
        *g = ratio;
    }
}

impl Default for DisplayMetrics {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl PixelRatio for DisplayMetrics {
    fn device_pixel_ratio(&self) -> f32 {
        let ratio = *self.ratio.lock().unwrap_or_else(|e| e.into_inner());
        super::sanitize_ratio(ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_metrics_can_be_updated() {
        let d = DisplayMetrics::default();
        assert_eq!(d.device_pixel_ratio(), 1.0);
        d.set_device_pixel_ratio(2.0);
        assert_eq!(d.device_pixel_ratio(), 2.0);
        d.set_device_pixel_ratio(f32::INFINITY);
        assert_eq!(d.device_pixel_ratio(), 1.0);
    }

    #[test]
    fn fixed_ratio_is_sanitized() {
        assert_eq!(FixedPixelRatio(3.0).device_pixel_ratio(), 3.0);
        assert_eq!(FixedPixelRatio(0.0).device_pixel_ratio(), 1.0);
    }
}
