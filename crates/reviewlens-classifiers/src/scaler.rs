//! Per-dimension standardization of dense feature vectors

use ndarray::{Array1, Array2, ArrayView1, Axis};
use reviewlens_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Zero-mean, unit-variance scaling fitted on the training split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Fit on the rows of `samples`
    ///
    /// Uses the population standard deviation; dimensions with zero variance
    /// get a scale of 1 so they pass through centered.
    pub fn fit(samples: &Array2<f64>) -> Result<Self> {
        if samples.nrows() == 0 {
            return Err(Error::feature_extraction("cannot fit a scaler on zero samples"));
        }

        let mean = samples
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::feature_extraction("cannot fit a scaler on zero samples"))?;
        let scale = samples
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });

        Ok(Self { mean, scale })
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    pub fn transform(&self, vector: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        if vector.len() != self.dimension() {
            return Err(Error::feature_extraction(format!(
                "scaler expects {} dimensions, got {}",
                self.dimension(),
                vector.len()
            )));
        }
        Ok((&vector - &self.mean) / &self.scale)
    }

    /// Transform every row of a matrix
    pub fn transform_rows(&self, samples: &Array2<f64>) -> Result<Array2<f64>> {
        if samples.ncols() != self.dimension() {
            return Err(Error::feature_extraction(format!(
                "scaler expects {} dimensions, got {}",
                self.dimension(),
                samples.ncols()
            )));
        }
        Ok((samples - &self.mean) / &self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform_standardizes() {
        let samples = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let scaler = StandardScaler::fit(&samples).unwrap();

        assert_eq!(scaler.mean(), &array![3.0, 10.0]);
        // constant column keeps scale 1
        assert_eq!(scaler.scale()[1], 1.0);

        let scaled = scaler.transform_rows(&samples).unwrap();
        let column = scaled.column(0);
        assert!(column.sum().abs() < 1e-12);
        let variance = column.mapv(|v| v * v).mean().unwrap();
        assert!((variance - 1.0).abs() < 1e-12);
        assert!(scaled.column(1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_transform_matches_rowwise() {
        let samples = array![[0.5, -2.0, 4.0], [1.5, 0.0, 2.0], [2.5, 2.0, 0.0]];
        let scaler = StandardScaler::fit(&samples).unwrap();
        let all = scaler.transform_rows(&samples).unwrap();
        for (i, row) in samples.rows().into_iter().enumerate() {
            assert_eq!(scaler.transform(row).unwrap(), all.row(i));
        }
    }

    #[test]
    fn test_wrong_dimension_is_rejected() {
        let scaler = StandardScaler::fit(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let err = scaler.transform(array![1.0, 2.0, 3.0].view()).unwrap_err();
        assert!(matches!(err, Error::FeatureExtraction(_)));
    }

    #[test]
    fn test_empty_fit_is_rejected() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(StandardScaler::fit(&empty).is_err());
    }
}
