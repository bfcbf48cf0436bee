//! Classification probability-vector operations.
//!
//! A classification is a probability vector over a fixed set of classes.
//! The vector may sum to less than one; the remainder is treated as
//! "unknown" probability mass. The class-name vocabulary itself lives with
//! the caller, the tracker only manipulates the vectors.

use crate::{Error, Result};
use nalgebra::DVector;

/// Combine two classification vectors into a single posterior.
///
/// Element-wise Bayes product, with the unknown mass of both operands
/// contributing to the normalization term so that poorly defined inputs do
/// not produce overconfident outputs.
pub fn combine(a: &DVector<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    if a.len() != b.len() {
        return Err(Error::InvalidArgument(format!(
            "classification sizes differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let unknown_a = (1.0 - a.sum()).clamp(0.0, 1.0);
    let unknown_b = (1.0 - b.sum()).clamp(0.0, 1.0);

    let product = a.component_mul(b);
    let norm = product.sum() + unknown_a * unknown_b + 1e-6;

    Ok(product / norm)
}

/// Distance between two classification vectors, in [0, 1] for probability
/// vectors: `sqrt(0.5 * ||a - b||^2)`.
pub fn distance(a: &DVector<f64>, b: &DVector<f64>) -> Result<f64> {
    if a.len() != b.len() {
        return Err(Error::InvalidArgument(format!(
            "classification sizes differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let residual = a - b;
    Ok((0.5 * residual.norm_squared()).sqrt())
}

/// Similarity between two classification vectors: `1 - distance`.
pub fn similarity(a: &DVector<f64>, b: &DVector<f64>) -> Result<f64> {
    Ok(1.0 - distance(a, b)?)
}

/// Clamp a classification onto the probability simplex.
///
/// Negative entries are zeroed and, when the total mass exceeds one, the
/// vector is L1-rescaled. A vector summing to less than one is left alone:
/// the deficit is the unknown mass.
pub fn normalize(classification: &DVector<f64>) -> DVector<f64> {
    let mut result = classification.map(|p| p.max(0.0));
    let total = result.sum();
    if total > 1.0 {
        result /= total;
    }
    result
}
