//! Float weights to on-chain fixed point and back.
//!
//! Encoding scales the vector so its largest entry maps to `u16::MAX` and
//! rounds every entry to the nearest integer ("max-upscale"). Relative
//! order is preserved, and the largest weight always survives quantization.
//! Entries that round to zero carry no information and are dropped together
//! with their UID.
//!
//! Decoding cannot recover the original scale, so it returns the values
//! normalized to sum to one. Callers comparing against their input should
//! normalize it the same way.

use std::collections::HashSet;

use crate::types::EncodedWeights;

use super::error::EncodingError;

const U16_MAX_F64: f64 = u16::MAX as f64;

/// Stateless weight vector codec.
pub struct WeightCodec;

impl WeightCodec {
    /// Validates and quantizes `(uids, weights)`.
    ///
    /// An empty or all-zero vector encodes to empty sequences.
    pub fn encode(uids: &[u64], weights: &[f32]) -> Result<EncodedWeights, EncodingError> {
        if uids.len() != weights.len() {
            return Err(EncodingError::LengthMismatch {
                uids: uids.len(),
                weights: weights.len(),
            });
        }

        let mut seen = HashSet::with_capacity(uids.len());
        let mut checked = Vec::with_capacity(uids.len());
        for (index, (&uid, &weight)) in uids.iter().zip(weights).enumerate() {
            if !weight.is_finite() {
                return Err(EncodingError::NonFinite { index });
            }
            if weight < 0.0 {
                return Err(EncodingError::Negative {
                    index,
                    value: weight,
                });
            }
            let uid = u16::try_from(uid).map_err(|_| EncodingError::UidOutOfRange(uid))?;
            if !seen.insert(uid) {
                return Err(EncodingError::DuplicateUid(uid));
            }
            checked.push((uid, f64::from(weight)));
        }

        let max = checked.iter().map(|&(_, w)| w).fold(0.0f64, f64::max);
        if max <= 0.0 {
            return Ok(EncodedWeights::default());
        }

        let (uids, values): (Vec<u16>, Vec<u16>) = checked
            .into_iter()
            .map(|(uid, w)| (uid, (w / max * U16_MAX_F64).round() as u16))
            .filter(|&(_, v)| v > 0)
            .unzip();

        Ok(EncodedWeights::from_parts(uids, values).unwrap_or_default())
    }

    /// Returns the UIDs and their weights normalized to sum to one.
    pub fn decode(encoded: &EncodedWeights) -> (Vec<u16>, Vec<f32>) {
        let total: f64 = encoded.values().iter().map(|&v| f64::from(v)).sum();
        let weights = encoded
            .values()
            .iter()
            .map(|&v| {
                if total > 0.0 {
                    (f64::from(v) / total) as f32
                } else {
                    0.0
                }
            })
            .collect();
        (encoded.uids().to_vec(), weights)
    }
}
