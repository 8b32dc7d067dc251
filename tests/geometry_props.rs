//! Property tests for tile geometry and option resolution

use proptest::prelude::*;
use rfwatermark::options::{resolve, WatermarkConfig};
use rfwatermark::rendering::layout::{rotated_bounds, surface_pixels, Size};

proptest! {
    #[test]
    fn rotated_bounds_follow_the_rectangle_formula(
        w in 0.0f64..2000.0,
        h in 0.0f64..2000.0,
        deg in -720.0f64..720.0,
    ) {
        let s = rotated_bounds(w, h, deg);
        let a = deg.to_radians();
        let (sin, cos) = (a.sin().abs(), a.cos().abs());
        prop_assert!((s.width - (sin * h + cos * w)).abs() <= 1.0);
        prop_assert!((s.height - (sin * w + cos * h)).abs() <= 1.0);
        prop_assert_eq!(s.width.fract(), 0.0);
        prop_assert_eq!(s.height.fract(), 0.0);
    }

    #[test]
    fn surface_is_never_empty(
        w in 0.0f64..800.0,
        h in 0.0f64..800.0,
        gx in 0.0f64..400.0,
        gy in 0.0f64..400.0,
        ratio in 0.25f32..4.0,
    ) {
        let (pw, ph) = surface_pixels(Size::new(w, h), [gx, gy], ratio);
        prop_assert!(pw >= 1 && ph >= 1);
        prop_assert!(f64::from(pw) <= ((gx + w) * f64::from(ratio)).max(1.0));
        prop_assert!(f64::from(ph) <= ((gy + h) * f64::from(ratio)).max(1.0));
    }

    #[test]
    fn single_gap_is_mirrored(g in 0.0f64..10_000.0) {
        let r = resolve(&WatermarkConfig { gap: Some(vec![g.into()]), ..Default::default() });
        prop_assert_eq!(r.gap, [g, g]);
    }

    #[test]
    fn resolution_never_produces_negative_gaps_or_bad_sizes(
        gx in any::<f64>(),
        width in any::<f64>(),
        text in "\\PC{0,12}",
    ) {
        let r = resolve(&WatermarkConfig {
            gap: Some(vec![gx.into(), text.clone().into()]),
            width: Some(width.into()),
            height: Some(text.into()),
            ..Default::default()
        });
        prop_assert!(r.gap[0] >= 0.0 && r.gap[1] >= 0.0);
        prop_assert!(r.gap.iter().all(|g| g.is_finite()));
        prop_assert!(r.width.map_or(true, |w| w > 0.0 && w.is_finite()));
        prop_assert!(r.height.map_or(true, |h| h > 0.0 && h.is_finite()));
    }
}
