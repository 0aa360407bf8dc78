//! RGBE shared-exponent pixel encoding.
//!
//! Each pixel is stored as three 8-bit mantissas plus one 8-bit exponent
//! shared by all three channels, laid out as `[r, g, b, e]`.  The exponent
//! is biased by 128.  This is the pixel encoding of the Radiance .hdr
//! format.

const EXP_BIAS: i32 = 128;

/// Values at or below this are stored as black.
const MIN_ENCODABLE: f32 = 1.0e-32;

/// Calculates 2.0^exp using IEEE bit fiddling.
///
/// Only works for integer exponents in the range [-126, 127]
/// due to IEEE 32-bit float limits.
#[inline(always)]
fn fiddle_exp2(exp: i32) -> f32 {
    f32::from_bits(((exp + 127) as u32) << 23)
}

/// Calculates a floor(log2(n)) using IEEE bit fiddling.
///
/// Infinity and NaN return 128, and subnormal numbers always return
/// -127, which the exponent clamping in `encode()` relies on.
#[inline(always)]
fn fiddle_log2(n: f32) -> i32 {
    ((f32::to_bits(n) >> 23) & 0b1111_1111) as i32 - 127
}

/// Encodes an RGB triple into an RGBE quad.
///
/// Radiance values are expected to be finite and non-negative.  Debug
/// builds assert this; release builds store negative and NaN channels
/// as zero.
#[inline]
pub fn encode(rgb: [f32; 3]) -> [u8; 4] {
    debug_assert!(
        rgb.iter().all(|&c| c >= 0.0),
        "RGBE encoding only supports non-negative, non-NaN values, but got: \
         ({}, {}, {})",
        rgb[0],
        rgb[1],
        rgb[2]
    );

    let [r, g, b] = rgb.map(|c| if c > 0.0 { c } else { 0.0 });
    let largest = r.max(g.max(b));

    if largest <= MIN_ENCODABLE {
        return [0, 0, 0, 0];
    }

    let e = fiddle_log2(largest).max(-EXP_BIAS).min(255 - EXP_BIAS);
    let inv_multiplier = fiddle_exp2(-e + 7);
    [
        (r * inv_multiplier).min(255.0) as u8,
        (g * inv_multiplier).min(255.0) as u8,
        (b * inv_multiplier).min(255.0) as u8,
        (e + EXP_BIAS) as u8,
    ]
}

/// Decodes an RGBE quad.  This is lossless and cannot fail.
#[inline]
pub fn decode(rgbe: [u8; 4]) -> [f32; 3] {
    if rgbe[3] == 0 {
        return [0.0; 3];
    }
    let multiplier = fiddle_exp2(rgbe[3] as i32 - EXP_BIAS - 7);

    [
        rgbe[0] as f32 * multiplier,
        rgbe[1] as f32 * multiplier,
        rgbe[2] as f32 * multiplier,
    ]
}
