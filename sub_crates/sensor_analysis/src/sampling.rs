use nanorand::{Pcg64, Rng};

const SAMPLE_SEED: u128 = 0x9c4e_2bd1_7a35_08f6_e1d3_5c42_b8a0_6f19;

/// Picks `count` pixel indices in `[0, pixel_count)`.
///
/// The generator is seeded with a fixed value, so the same image size
/// always yields the same locations.  When the image has no more pixels
/// than requested, every pixel is returned in order.
pub fn sample_locations(pixel_count: usize, count: usize) -> Vec<usize> {
    if pixel_count <= count {
        return (0..pixel_count).collect();
    }

    let mut rng = Pcg64::new_seed(SAMPLE_SEED);
    (0..count)
        .map(|_| rng.generate_range(0..pixel_count))
        .collect()
}
