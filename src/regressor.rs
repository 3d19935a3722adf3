//! Regressors
//!
//! The fit/predict capability consumed by the calibrator, with two concrete
//! deterministic implementations. Any regression algorithm can be plugged
//! in, the calibrator only relies on this two-method contract.
use crate::data::Matrix;
use crate::errors::ConfluenceError;
use crate::utils::{mean, validate_aligned};
use serde::{Deserialize, Serialize};
use std::fs;

/// A regression capability: fits a response against covariates and predicts
/// for new covariates.
///
/// Implementations that are themselves randomized must be deterministic
/// given a fixed seed, carried as explicit state of the implementation,
/// never as ambient process-wide RNG state.
pub trait Regressor {
    /// Fit the model.
    ///
    /// * `data` - Covariate matrix, one row per record.
    /// * `y` - Response, aligned with the rows of `data`.
    fn fit(&mut self, data: &Matrix, y: &[f64]) -> Result<(), ConfluenceError>;

    /// Predict the response for every row of `data`. Returns NaN for every
    /// row if the model has not been fitted.
    fn predict(&self, data: &Matrix) -> Vec<f64>;
}

/// Ordinary least squares with an intercept.
///
/// Solves the normal equations with Gaussian elimination and partial
/// pivoting. A small ridge penalty on the non-intercept diagonal keeps the
/// solve stable when columns are nearly collinear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegressor {
    /// L2 penalty added to the non-intercept diagonal of the normal
    /// equations.
    pub ridge: f64,
    // Intercept first, then one coefficient per covariate column.
    coefficients: Vec<f64>,
}

impl Default for LinearRegressor {
    fn default() -> Self {
        LinearRegressor {
            ridge: 1e-8,
            coefficients: Vec::new(),
        }
    }
}

impl LinearRegressor {
    /// Create a new LinearRegressor.
    ///
    /// * `ridge` - L2 penalty added to the non-intercept diagonal.
    pub fn new(ridge: f64) -> Self {
        LinearRegressor {
            ridge,
            coefficients: Vec::new(),
        }
    }

    /// Set the ridge penalty on the regressor.
    /// * `ridge` - L2 penalty added to the non-intercept diagonal.
    pub fn set_ridge(mut self, ridge: f64) -> Self {
        self.ridge = ridge;
        self
    }

    /// Fitted coefficients, intercept first. Empty before `fit`.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Save the model as a json object to a file.
    ///
    /// * `path` - Path to save the model.
    pub fn save(&self, path: &str) -> Result<(), ConfluenceError> {
        let model = self.json_dump()?;
        match fs::write(path, model) {
            Err(e) => Err(ConfluenceError::UnableToWrite(e.to_string())),
            Ok(_) => Ok(()),
        }
    }

    /// Dump the model as a json object.
    pub fn json_dump(&self) -> Result<String, ConfluenceError> {
        match serde_json::to_string(self) {
            Ok(s) => Ok(s),
            Err(e) => Err(ConfluenceError::UnableToWrite(e.to_string())),
        }
    }

    /// Load a model from a json string.
    ///
    /// * `json_str` - String object, which can be serialized to json.
    pub fn from_json(json_str: &str) -> Result<Self, ConfluenceError> {
        match serde_json::from_str::<LinearRegressor>(json_str) {
            Ok(m) => Ok(m),
            Err(e) => Err(ConfluenceError::UnableToRead(e.to_string())),
        }
    }

    /// Load a model from a path to a json model object.
    ///
    /// * `path` - Path to load the model from.
    pub fn load(path: &str) -> Result<Self, ConfluenceError> {
        let json_str = match fs::read_to_string(path) {
            Ok(s) => Ok(s),
            Err(e) => Err(ConfluenceError::UnableToRead(e.to_string())),
        }?;
        Self::from_json(&json_str)
    }
}

impl Regressor for LinearRegressor {
    fn fit(&mut self, data: &Matrix, y: &[f64]) -> Result<(), ConfluenceError> {
        validate_aligned("covariates and response", data.rows, y.len())?;
        if data.rows == 0 {
            return Err(ConfluenceError::InvalidParameter(
                "covariates".to_string(),
                "at least one record".to_string(),
                "0 rows".to_string(),
            ));
        }
        let p = data.cols + 1;

        // Normal equations with an implicit leading intercept column of
        // ones, row major p x p.
        let mut gram = vec![0.0; p * p];
        let mut moment = vec![0.0; p];
        gram[0] = data.rows as f64;
        moment[0] = y.iter().sum();
        for j in 1..p {
            let col_j = data.get_col(j - 1);
            gram[j] = col_j.iter().sum();
            gram[j * p] = gram[j];
            moment[j] = col_j.iter().zip(y.iter()).map(|(x, y_)| x * y_).sum();
            for k in j..p {
                let col_k = data.get_col(k - 1);
                let dot: f64 = col_j.iter().zip(col_k.iter()).map(|(a, b)| a * b).sum();
                gram[j * p + k] = dot;
                gram[k * p + j] = dot;
            }
            gram[j * p + j] += self.ridge;
        }

        self.coefficients = solve_dense(&mut gram, &mut moment, p)?;
        Ok(())
    }

    fn predict(&self, data: &Matrix) -> Vec<f64> {
        if self.coefficients.is_empty() {
            return vec![f64::NAN; data.rows];
        }
        let mut preds = vec![self.coefficients[0]; data.rows];
        for j in 0..data.cols {
            let beta = self.coefficients[j + 1];
            for (pred, x) in preds.iter_mut().zip(data.get_col(j)) {
                *pred += beta * x;
            }
        }
        preds
    }
}

// Gaussian elimination with partial pivoting on the augmented system
// [a | b], a row major p x p.
fn solve_dense(a: &mut [f64], b: &mut [f64], p: usize) -> Result<Vec<f64>, ConfluenceError> {
    for col in 0..p {
        let mut pivot_row = col;
        for row in (col + 1)..p {
            if a[row * p + col].abs() > a[pivot_row * p + col].abs() {
                pivot_row = row;
            }
        }
        if a[pivot_row * p + col].abs() < 1e-12 {
            return Err(ConfluenceError::NoVariance(col.saturating_sub(1)));
        }
        if pivot_row != col {
            for c in 0..p {
                a.swap(pivot_row * p + c, col * p + c);
            }
            b.swap(pivot_row, col);
        }
        for row in (col + 1)..p {
            let factor = a[row * p + col] / a[col * p + col];
            for c in col..p {
                a[row * p + c] -= factor * a[col * p + c];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; p];
    for col in (0..p).rev() {
        let mut acc = b[col];
        for c in (col + 1)..p {
            acc -= a[col * p + c] * x[c];
        }
        x[col] = acc / a[col * p + col];
    }
    Ok(x)
}

/// Predicts the training mean everywhere.
///
/// Useful as a homoscedastic dispersion model: fitted on absolute
/// residuals it estimates a single global scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanRegressor {
    mean: f64,
}

impl Default for MeanRegressor {
    fn default() -> Self {
        MeanRegressor { mean: f64::NAN }
    }
}

impl MeanRegressor {
    /// Create a new MeanRegressor.
    pub fn new() -> Self {
        MeanRegressor::default()
    }
}

impl Regressor for MeanRegressor {
    fn fit(&mut self, data: &Matrix, y: &[f64]) -> Result<(), ConfluenceError> {
        validate_aligned("covariates and response", data.rows, y.len())?;
        if y.is_empty() {
            return Err(ConfluenceError::InvalidParameter(
                "response".to_string(),
                "at least one record".to_string(),
                "0 rows".to_string(),
            ));
        }
        self.mean = mean(y);
        Ok(())
    }

    fn predict(&self, data: &Matrix) -> Vec<f64> {
        vec![self.mean; data.rows]
    }
}
