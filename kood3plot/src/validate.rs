//! Error statistics for comparing decoded data against its reconstruction.

use itertools::izip;

/// Magnitudes below this are treated as zero when forming relative errors.
const ZERO_EPSILON: f64 = 1e-15;

/// Highest significant-digit count reported.
const MAX_DIGITS: i32 = 15;

/// Aggregate error statistics over a pair of sequences.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ErrorStats {
    /// Largest absolute difference.
    pub max_abs: f64,
    /// Mean absolute difference.
    pub mean_abs: f64,
    /// Root-mean-square difference.
    pub rms: f64,
    /// Largest relative difference over pairs whose original magnitude
    /// exceeds the zero threshold.
    pub max_relative: f64,
}

impl ErrorStats {
    /// Computes the statistics over paired values.
    ///
    /// # Panics
    ///
    /// Panics if the sequences differ in length.
    #[must_use]
    pub fn compute(original: &[f64], reconstructed: &[f64]) -> Self {
        assert_eq!(
            original.len(),
            reconstructed.len(),
            "error statistics need paired sequences"
        );
        if original.is_empty() {
            return Self::default();
        }

        let mut stats = Self::default();
        let mut sum_abs = 0.0;
        let mut sum_squared = 0.0;
        for (&value, &other) in izip!(original, reconstructed) {
            let difference = (value - other).abs();
            stats.max_abs = stats.max_abs.max(difference);
            sum_abs += difference;
            sum_squared += difference * difference;
            if value.abs() > ZERO_EPSILON {
                stats.max_relative = stats.max_relative.max(difference / value.abs());
            }
        }
        stats.mean_abs = sum_abs / original.len() as f64;
        stats.rms = (sum_squared / original.len() as f64).sqrt();
        stats
    }
}

/// Returns the number of agreeing significant digits between `original` and
/// `reconstructed`, clamped to `[0, 15]`. A zero original yields 15 iff the
/// reconstruction is also zero, and 0 otherwise.
#[must_use]
pub fn significant_digits(original: f64, reconstructed: f64) -> i32 {
    if original.abs() < ZERO_EPSILON {
        return if reconstructed.abs() < ZERO_EPSILON {
            MAX_DIGITS
        } else {
            0
        };
    }
    let relative = (original - reconstructed).abs() / original.abs();
    if relative < 10.0_f64.powi(-MAX_DIGITS) {
        return MAX_DIGITS;
    }
    (-relative.log10()).floor().clamp(0.0, f64::from(MAX_DIGITS)) as i32
}

/// Distribution of significant-digit counts over a pair of sequences.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SignificantDigitsReport {
    /// Fewest digits observed.
    pub min_digits: i32,
    /// Most digits observed.
    pub max_digits: i32,
    /// Mean digit count.
    pub mean_digits: f64,
    /// Fraction of pairs agreeing to at least six digits.
    pub fraction_six_digits: f64,
    /// Fraction of pairs agreeing to at least four digits.
    pub fraction_four_digits: f64,
}

impl SignificantDigitsReport {
    /// Computes the distribution over paired values.
    ///
    /// # Panics
    ///
    /// Panics if the sequences differ in length.
    #[must_use]
    pub fn compute(original: &[f64], reconstructed: &[f64]) -> Self {
        assert_eq!(
            original.len(),
            reconstructed.len(),
            "significant-digit analysis needs paired sequences"
        );
        if original.is_empty() {
            return Self::default();
        }

        let mut report = Self {
            min_digits: MAX_DIGITS,
            ..Self::default()
        };
        let mut sum = 0_i64;
        let mut six = 0_usize;
        let mut four = 0_usize;
        for (&value, &other) in izip!(original, reconstructed) {
            let digits = significant_digits(value, other);
            report.min_digits = report.min_digits.min(digits);
            report.max_digits = report.max_digits.max(digits);
            sum += i64::from(digits);
            six += usize::from(digits >= 6);
            four += usize::from(digits >= 4);
        }
        report.mean_digits = sum as f64 / original.len() as f64;
        report.fraction_six_digits = six as f64 / original.len() as f64;
        report.fraction_four_digits = four as f64 / original.len() as f64;
        report
    }
}
