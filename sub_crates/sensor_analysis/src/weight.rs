/// Confidence weight of an 8-bit pixel value.
///
/// A triangular "hat" that peaks at 1.0 for 127 and 128 and falls
/// linearly to exactly 0.0 at 0 and 255, so clipped values carry no
/// weight.  Both calibration and merging must use this same function.
#[inline]
pub fn hat_weight(z: u8) -> f32 {
    let z = z as f32;
    if z <= 127.0 {
        z / 127.0
    } else {
        (255.0 - z) / 127.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_at_the_extremes() {
        assert_eq!(hat_weight(0), 0.0);
        assert_eq!(hat_weight(255), 0.0);
        assert!(hat_weight(1) > 0.0);
        assert!(hat_weight(254) > 0.0);
    }

    #[test]
    fn peak_in_the_middle() {
        assert_eq!(hat_weight(127), 1.0);
        assert_eq!(hat_weight(128), 1.0);
        for z in 0..=255u8 {
            assert!(hat_weight(z) <= 1.0);
        }
    }

    #[test]
    fn symmetric() {
        for z in 0..=127u8 {
            assert_eq!(hat_weight(z), hat_weight(255 - z));
        }
    }
}
