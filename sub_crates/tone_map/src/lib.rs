//! Tone mapping of relative radiance images down to displayable 8-bit
//! RGB.

mod color;
mod drago;
mod mantiuk;
mod pyramid;
mod reinhard;

use std::{fmt, str::FromStr};

use rayon::prelude::*;

pub use color::{encode_gamma, log_average, luminance};

#[derive(Debug, thiserror::Error)]
pub enum TonemapError {
    #[error("unsupported tonemap operator '{0}'")]
    UnsupportedOperator(String),

    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: f32 },

    #[error("expected {expected} pixels, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operator {
    Reinhard,
    Drago,
    Mantiuk,
}

impl FromStr for Operator {
    type Err = TonemapError;

    fn from_str(s: &str) -> Result<Operator, TonemapError> {
        match s.to_ascii_lowercase().as_str() {
            "reinhard" => Ok(Operator::Reinhard),
            "drago" => Ok(Operator::Drago),
            "mantiuk" => Ok(Operator::Mantiuk),
            _ => Err(TonemapError::UnsupportedOperator(s.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Operator::Reinhard => "reinhard",
            Operator::Drago => "drago",
            Operator::Mantiuk => "mantiuk",
        })
    }
}

/// Operator choice and its tuning.
///
/// - `gamma`: display gamma applied after tone mapping.  Must be > 0.
/// - `key`: Reinhard's target middle gray.
/// - `bias`: Drago's bias, usually in (0, 1).  Lower values compress
///   highlights harder.
/// - `contrast`: Mantiuk's detail scale.
/// - `saturation`: Mantiuk's color saturation exponent.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TonemapParams {
    pub operator: Operator,
    pub gamma: f32,
    pub key: f32,
    pub bias: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl TonemapParams {
    pub fn new(operator: Operator) -> TonemapParams {
        TonemapParams {
            operator: operator,
            gamma: 2.2,
            key: 0.18,
            bias: 0.85,
            contrast: 0.75,
            saturation: 1.0,
        }
    }

    pub fn validate(&self) -> Result<(), TonemapError> {
        fn positive(name: &'static str, value: f32) -> Result<(), TonemapError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(TonemapError::InvalidParameter {
                    name: name,
                    value: value,
                })
            }
        }

        positive("gamma", self.gamma)?;
        match self.operator {
            Operator::Reinhard => positive("key", self.key),
            Operator::Drago => positive("bias", self.bias),
            Operator::Mantiuk => {
                positive("contrast", self.contrast)?;
                if !self.saturation.is_finite() || self.saturation < 0.0 {
                    return Err(TonemapError::InvalidParameter {
                        name: "saturation",
                        value: self.saturation,
                    });
                }
                Ok(())
            }
        }
    }
}

impl Default for TonemapParams {
    fn default() -> TonemapParams {
        TonemapParams::new(Operator::Reinhard)
    }
}

/// Tone maps a `width` x `height` radiance image to 8-bit RGB.
pub fn tonemap(
    pixels: &[[f32; 3]],
    width: usize,
    height: usize,
    params: &TonemapParams,
) -> Result<Vec<[u8; 3]>, TonemapError> {
    params.validate()?;
    if pixels.len() != width * height {
        return Err(TonemapError::DimensionMismatch {
            expected: width * height,
            found: pixels.len(),
        });
    }
    if pixels.is_empty() {
        return Ok(Vec::new());
    }

    log::info!("Tone mapping with {} (gamma {})", params.operator, params.gamma);

    let display = match params.operator {
        Operator::Reinhard => reinhard::apply(pixels, width, params.key),
        Operator::Drago => drago::apply(pixels, width, params.bias),
        Operator::Mantiuk => {
            mantiuk::apply(pixels, width, height, params.contrast, params.saturation)
        }
    };

    let inv_gamma = 1.0 / params.gamma;
    let mut out = vec![[0u8; 3]; pixels.len()];
    out.par_chunks_mut(width)
        .zip(display.par_chunks(width))
        .for_each(|(out_row, row)| {
            for (o, p) in out_row.iter_mut().zip(row.iter()) {
                *o = [
                    encode_gamma(p[0], inv_gamma),
                    encode_gamma(p[1], inv_gamma),
                    encode_gamma(p[2], inv_gamma),
                ];
            }
        });

    Ok(out)
}
