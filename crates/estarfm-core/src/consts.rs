/// Default side length of the square moving window (pixels, odd).
pub const DEFAULT_WINDOW_SIZE: usize = 51;

/// Default number of land-cover classes used to scale the tolerance.
pub const DEFAULT_NUMBER_CLASSES: f64 = 4.0;

/// Default uncertainty factor applied to the data range maximum.
pub const DEFAULT_UNCERTAINTY_FACTOR: f64 = 0.002;

/// Minimum number of similar candidates required for the regression path.
pub const MIN_CANDIDATES: usize = 6;

/// Added to the combined spectral/distance weight denominator.
pub const WEIGHT_EPSILON: f64 = 1e-7;

/// Added to the low-resolution change magnitude of the temporal weights.
pub const TEMPORAL_EPSILON: f64 = 1e-10;

/// Determinant threshold below which the normal equations are singular.
pub const REGRESSION_DET_EPSILON: f64 = 1e-14;

/// Regression slopes outside `0..=MAX_REGRESSION_SLOPE` are rejected.
pub const MAX_REGRESSION_SLOPE: f64 = 5.0;

/// F-test confidence a fit must reach when quality weighting is off.
pub const FISHER_ACCEPTANCE: f64 = 0.95;
