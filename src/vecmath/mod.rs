//! Scalar vector arithmetic for similarity scoring.
//!
//! Every routine here is a plain loop over `&[f32]`. This module must stay
//! free of numeric-array dependencies so the scan path can be embedded in
//! environments that have none; a vectorized implementation may replace it
//! behind the same signatures.


use thiserror::Error;

/// Two sequences passed to a vector operation disagreed on length.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("dimension mismatch: expected {expected}, got {actual}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// Norm order accepted by [`norm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormOrder {
    L1,
    #[default]
    L2,
    LInf,
}

fn check_dims(a: &[f32], b: &[f32]) -> Result<(), DimensionMismatch> {
    if a.len() == b.len() {
        Ok(())
    } else {
        Err(DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        })
    }
}

/// Dot product of two equal-length vectors.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    check_dims(a, b)?;
    let mut sum = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        sum += x * y;
    }
    Ok(sum)
}

/// Norm of a vector under the given order.
#[inline]
pub fn norm(v: &[f32], order: NormOrder) -> f32 {
    match order {
        NormOrder::L1 => v.iter().map(|x| x.abs()).sum(),
        NormOrder::L2 => {
            let mut sum = 0.0f32;
            for &x in v {
                sum += x * x;
            }
            sum.sqrt()
        }
        NormOrder::LInf => v.iter().fold(0.0f32, |acc, &x| acc.max(x.abs())),
    }
}

/// Cosine similarity in [-1, 1].
///
/// Returns 0.0 when either vector has zero norm, so degenerate inputs score
/// as "no similarity" instead of dividing by zero.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    check_dims(a, b)?;
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Euclidean (L2) distance between two equal-length vectors.
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    check_dims(a, b)?;
    let mut sum = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        let d = x - y;
        sum += d * d;
    }
    Ok(sum.sqrt())
}

/// Returns a unit-length copy of `v`, or the zero vector unchanged.
#[inline]
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let n = norm(v, NormOrder::L2);
    if n == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / n).collect()
}
