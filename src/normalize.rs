use image::Rgba;

/// Reduces an RGBA pixel to a single ink intensity in [0, 1].
///
/// The pixel is treated as a foreground color with coverage `a` over an opaque
/// white background. Each channel is composited as `a * c + (1 - a)`, and the
/// result is `1 - mean(composited)`, so dark ink becomes bright and the white
/// background becomes 0.
///
/// Compositing over white is an approximation; the captchas are near-binary
/// ink on a light background, so the true background color does not matter.
/// A pixel with any non-finite channel is treated as background.
pub fn normalize(r: f32, g: f32, b: f32, a: f32) -> f32 {
    if ![r, g, b, a].iter().all(|v| v.is_finite()) {
        return 0.0;
    }
    // 1 - (a*c + 1 - a) == a * (1 - c), which keeps the identities exact:
    // a == 0 or c == 1 gives exactly 0, a == 1 and c == 0 gives exactly 1.
    let coverage = a.clamp(0.0, 1.0);
    let ink = (1.0 - r.clamp(0.0, 1.0)) + (1.0 - g.clamp(0.0, 1.0)) + (1.0 - b.clamp(0.0, 1.0));
    (coverage * ink / 3.0).clamp(0.0, 1.0)
}

/// Same as [`normalize`] for an 8-bit pixel.
pub fn normalize_rgba8(pixel: &Rgba<u8>) -> f32 {
    let [r, g, b, a] = pixel.0;
    normalize(
        r as f32 / 255.0,
        g as f32 / 255.0,
        b as f32 / 255.0,
        a as f32 / 255.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_pixel_is_background() {
        for &(r, g, b) in &[(0.0, 0.0, 0.0), (0.3, 0.7, 0.1), (1.0, 1.0, 1.0)] {
            assert_eq!(normalize(r, g, b, 0.0), 0.0);
        }
    }

    #[test]
    fn test_opaque_black_is_full_ink() {
        assert_eq!(normalize(0.0, 0.0, 0.0, 1.0), 1.0);
    }

    #[test]
    fn test_white_is_background_at_any_alpha() {
        for alpha in [0.0, 0.1, 0.3, 0.5, 0.77, 1.0] {
            assert_eq!(normalize(1.0, 1.0, 1.0, alpha), 0.0, "alpha {}", alpha);
        }
    }

    #[test]
    fn test_half_covered_black() {
        let v = normalize(0.0, 0.0, 0.0, 0.5);
        assert!((v - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_gray_uses_channel_mean() {
        // Mean of (0.2, 0.5, 0.8) is 0.5
        let v = normalize(0.2, 0.5, 0.8, 1.0);
        assert!((v - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_non_finite_channels_are_background() {
        assert_eq!(normalize(f32::NAN, 0.0, 0.0, 1.0), 0.0);
        assert_eq!(normalize(0.0, 0.0, 0.0, f32::NAN), 0.0);
        assert_eq!(normalize(0.0, f32::INFINITY, 0.0, 1.0), 0.0);
        assert_eq!(normalize(0.0, 0.0, 0.0, f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_rgba8_extremes() {
        assert_eq!(normalize_rgba8(&Rgba([0, 0, 0, 255])), 1.0);
        assert_eq!(normalize_rgba8(&Rgba([255, 255, 255, 255])), 0.0);
        assert_eq!(normalize_rgba8(&Rgba([12, 200, 40, 0])), 0.0);
    }

    #[test]
    fn test_output_stays_in_unit_range() {
        for r in (0..=255).step_by(51) {
            for a in (0..=255).step_by(85) {
                let v = normalize_rgba8(&Rgba([r as u8, 128, 255 - r as u8, a as u8]));
                assert!((0.0..=1.0).contains(&v));
            }
        }
    }
}
