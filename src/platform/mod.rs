//! Platform surface the engine reads from its host.
//!
//! For now this is only the display's device pixel ratio, which the
//! rasterizer queries on every pass so tiles stay sharp when a host moves
//! between low- and high-density screens.

pub mod device;

pub use device::{DisplayMetrics, FixedPixelRatio, PixelRatio};

/// Clamp a reported ratio to something usable for rasterization.
pub fn sanitize_ratio(ratio: f32) -> f32 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonsense_ratios_become_one() {
        assert_eq!(sanitize_ratio(2.0), 2.0);
        assert_eq!(sanitize_ratio(0.0), 1.0);
        assert_eq!(sanitize_ratio(-3.0), 1.0);
        assert_eq!(sanitize_ratio(f32::NAN), 1.0);
    }
}
