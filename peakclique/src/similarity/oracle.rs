use std::sync::Arc;

use crate::data::peak::PeakRecord;
use crate::error::OracleError;

/// Pairwise peak similarity, higher is more similar.
///
/// Implementations are shared across the scoring workers and must be pure.
pub trait SimilarityOracle: Send + Sync {
    fn similarity(&self, a: &PeakRecord, b: &PeakRecord) -> Result<f64, OracleError>;
}

impl<T: SimilarityOracle + ?Sized> SimilarityOracle for Box<T> {
    fn similarity(&self, a: &PeakRecord, b: &PeakRecord) -> Result<f64, OracleError> {
        (**self).similarity(a, b)
    }
}

impl<T: SimilarityOracle + ?Sized> SimilarityOracle for Arc<T> {
    fn similarity(&self, a: &PeakRecord, b: &PeakRecord) -> Result<f64, OracleError> {
        (**self).similarity(a, b)
    }
}

/// Adapts a plain scoring closure.
#[derive(Clone, Debug)]
pub struct FnOracle<F>(pub F);

impl<F> SimilarityOracle for FnOracle<F>
where
    F: Fn(&PeakRecord, &PeakRecord) -> f64 + Send + Sync,
{
    fn similarity(&self, a: &PeakRecord, b: &PeakRecord) -> Result<f64, OracleError> {
        Ok((self.0)(a, b))
    }
}

#[inline]
fn check_dims(a: &[f64], b: &[f64]) -> Result<(), OracleError> {
    if a.len() != b.len() {
        return Err(OracleError::DimensionMismatch { left: a.len(), right: b.len() });
    }
    Ok(())
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine of the two intensity vectors; 0 if either vector has zero norm.
#[derive(Clone, Copy, Debug, Default)]
pub struct CosineSimilarity;

impl SimilarityOracle for CosineSimilarity {
    fn similarity(&self, a: &PeakRecord, b: &PeakRecord) -> Result<f64, OracleError> {
        check_dims(&a.intensities, &b.intensities)?;
        let na = dot(&a.intensities, &a.intensities).sqrt();
        let nb = dot(&b.intensities, &b.intensities).sqrt();
        if na <= 0.0 || nb <= 0.0 {
            return Ok(0.0);
        }
        Ok(dot(&a.intensities, &b.intensities) / (na * nb))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DotSimilarity;

impl SimilarityOracle for DotSimilarity {
    fn similarity(&self, a: &PeakRecord, b: &PeakRecord) -> Result<f64, OracleError> {
        check_dims(&a.intensities, &b.intensities)?;
        Ok(dot(&a.intensities, &b.intensities))
    }
}

/// Scales an inner similarity by a gaussian penalty on the retention time difference.
#[derive(Clone, Debug)]
pub struct TimePenalizedSimilarity<S> {
    inner: S,
    rt_tolerance: f64,
    rt_threshold: f64,
}

impl<S: SimilarityOracle> TimePenalizedSimilarity<S> {
    pub fn new(inner: S, rt_tolerance: f64, rt_threshold: f64) -> Self {
        Self { inner, rt_tolerance, rt_threshold }
    }

    #[inline]
    pub fn penalty(&self, delta_rt: f64) -> f64 {
        let z = delta_rt / self.rt_tolerance;
        (-0.5 * z * z).exp()
    }
}

impl<S: SimilarityOracle> SimilarityOracle for TimePenalizedSimilarity<S> {
    fn similarity(&self, a: &PeakRecord, b: &PeakRecord) -> Result<f64, OracleError> {
        if !(self.rt_tolerance.is_finite() && self.rt_tolerance > 0.0) {
            return Err(OracleError::InvalidInput(format!(
                "rt_tolerance must be positive, got {}",
                self.rt_tolerance
            )));
        }
        let penalty = self.penalty(a.rt - b.rt);
        if penalty < self.rt_threshold {
            return Ok(0.0);
        }
        Ok(penalty * self.inner.similarity(a, b)?)
    }
}
