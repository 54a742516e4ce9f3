//! Per-quantity quantizers.
//!
//! Every quantizer follows the same three-operation contract: `calibrate`
//! once on a representative sample, then `quantize`/`dequantize` any number
//! of values. Using a quantizer before calibration is an error. Calibration
//! is write-once; the archive writer captures it from the first frame and
//! reuses it for every later frame.

use super::error::{Error, Result};
use enum_dispatch::enum_dispatch;
use ndarray::ArrayView2;

/// Fraction of the observed range added as safety margin on each side.
const RANGE_MARGIN: f64 = 0.1;

/// Ranges below this are treated as constant data.
const CONSTANT_RANGE: f64 = 1e-10;

/// Selects the smallest standard bit depth whose quantum is at least as fine
/// as `precision` over `range`. Degenerate ranges use the narrowest depth.
#[must_use]
pub fn required_bits(range: f64, precision: f64) -> u32 {
    if !(range / precision).is_finite() || range <= CONSTANT_RANGE {
        return 8;
    }
    let bits = (range / precision).log2().ceil() as i64;
    match bits {
        i64::MIN..=8 => 8,
        9..=16 => 16,
        _ => 32,
    }
}

const fn max_quantum(bits: u32) -> u64 {
    (1_u64 << bits) - 1
}

fn quantize_unit(normalized: f64, bits: u32) -> u32 {
    let max_quantum = max_quantum(bits) as f64;
    (normalized.clamp(0.0, 1.0) * max_quantum).round() as u32
}

/// Three-axis linear quantizer for vector quantities such as displacement
/// and velocity. Each axis is calibrated and scaled independently.
#[derive(Clone, Debug)]
pub struct LinearVec3Quantizer {
    bits: u32,
    bounds: Option<([f64; 3], [f64; 3])>,
}

impl LinearVec3Quantizer {
    /// Creates an uncalibrated quantizer with the given bit depth.
    #[must_use]
    pub const fn new(bits: u32) -> Self {
        Self { bits, bounds: None }
    }

    /// Returns the configured bit depth.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Returns `true` once `calibrate` has run.
    #[must_use]
    pub const fn is_calibrated(&self) -> bool {
        self.bounds.is_some()
    }

    /// Returns the calibrated per-axis minima and maxima.
    ///
    /// # Errors
    ///
    /// [`Error::NotCalibrated`] before calibration.
    pub fn bounds(&self) -> Result<([f64; 3], [f64; 3])> {
        self.bounds.ok_or(Error::NotCalibrated("linear vector"))
    }

    /// Learns per-axis bounds from `sample` (shape `[n, 3]`) and expands them
    /// by the safety margin. A constant axis receives a unit range so its
    /// values survive the round trip.
    pub fn calibrate(&mut self, sample: ArrayView2<'_, f64>) {
        let mut min = [f64::MAX; 3];
        let mut max = [f64::MIN; 3];
        for row in sample.rows() {
            for axis in 0..3 {
                min[axis] = min[axis].min(row[axis]);
                max[axis] = max[axis].max(row[axis]);
            }
        }
        for axis in 0..3 {
            let mut range = max[axis] - min[axis];
            if range < CONSTANT_RANGE {
                range = 1.0;
            }
            min[axis] -= range * RANGE_MARGIN;
            max[axis] += range * RANGE_MARGIN;
        }
        self.bounds = Some((min, max));
    }

    /// Restores bounds captured earlier, e.g. from archive metadata.
    pub fn restore(&mut self, min: [f64; 3], max: [f64; 3]) {
        self.bounds = Some((min, max));
    }

    /// Quantizes one vector.
    ///
    /// # Errors
    ///
    /// [`Error::NotCalibrated`] before calibration.
    pub fn quantize(&self, value: [f64; 3]) -> Result<[u32; 3]> {
        let (min, max) = self.bounds()?;
        Ok(std::array::from_fn(|axis| {
            let normalized = (value[axis] - min[axis]) / (max[axis] - min[axis]);
            quantize_unit(normalized, self.bits)
        }))
    }

    /// Inverts `quantize` up to one quantum.
    ///
    /// # Errors
    ///
    /// [`Error::NotCalibrated`] before calibration.
    pub fn dequantize(&self, quanta: [u32; 3]) -> Result<[f64; 3]> {
        let (min, max) = self.bounds()?;
        let max_quantum = max_quantum(self.bits) as f64;
        Ok(std::array::from_fn(|axis| {
            min[axis] + (f64::from(quanta[axis]) / max_quantum) * (max[axis] - min[axis])
        }))
    }
}

/// Capability set shared by the scalar quantizers. The archive writer only
/// needs this much: a bit depth, an encoder and its calibration.
#[enum_dispatch]
pub trait ScalarQuantize {
    /// Learns the value range from `sample`.
    fn calibrate(&mut self, sample: &[f64]);

    /// Maps a value onto its quantum.
    ///
    /// # Errors
    ///
    /// [`Error::NotCalibrated`] before calibration.
    fn quantize(&self, value: f64) -> Result<u32>;

    /// Maps a quantum back onto a value.
    ///
    /// # Errors
    ///
    /// [`Error::NotCalibrated`] before calibration.
    fn dequantize(&self, quantum: u32) -> Result<f64>;

    /// Returns the configured bit depth.
    fn bits(&self) -> u32;

    /// Returns `true` once `calibrate` has run.
    fn is_calibrated(&self) -> bool;
}

/// Logarithmic scalar quantizer for wide-dynamic-range quantities such as
/// equivalent stress. Values below `threshold` are don't-care and clamp to
/// the minimum quantum.
#[derive(Clone, Debug)]
pub struct LogScalarQuantizer {
    bits: u32,
    threshold: f64,
    calibration: Option<LogCalibration>,
}

#[derive(Clone, Copy, Debug)]
struct LogCalibration {
    ln_min: f64,
    ln_range: f64,
}

impl LogScalarQuantizer {
    /// Creates an uncalibrated quantizer. `threshold` must be positive; it
    /// is both the accuracy floor and the minimum of the log range.
    #[must_use]
    pub const fn new(bits: u32, threshold: f64) -> Self {
        Self {
            bits,
            threshold,
            calibration: None,
        }
    }

    /// Returns the accuracy floor.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl ScalarQuantize for LogScalarQuantizer {
    fn calibrate(&mut self, sample: &[f64]) {
        let mut max = self.threshold;
        for &value in sample {
            if value > self.threshold {
                max = max.max(value);
            }
        }
        max *= 1.0 + RANGE_MARGIN;

        let ln_min = self.threshold.ln();
        let mut ln_range = max.ln() - ln_min;
        if ln_range < CONSTANT_RANGE {
            ln_range = 1.0;
        }
        self.calibration = Some(LogCalibration { ln_min, ln_range });
    }

    fn quantize(&self, value: f64) -> Result<u32> {
        let calibration = self
            .calibration
            .ok_or(Error::NotCalibrated("logarithmic scalar"))?;
        let ln_value = value.max(self.threshold).ln();
        let normalized = (ln_value - calibration.ln_min) / calibration.ln_range;
        Ok(quantize_unit(normalized, self.bits))
    }

    fn dequantize(&self, quantum: u32) -> Result<f64> {
        let calibration = self
            .calibration
            .ok_or(Error::NotCalibrated("logarithmic scalar"))?;
        let max_quantum = max_quantum(self.bits) as f64;
        let ln_value =
            calibration.ln_min + (f64::from(quantum) / max_quantum) * calibration.ln_range;
        Ok(ln_value.exp())
    }

    fn bits(&self) -> u32 {
        self.bits
    }

    fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }
}

/// Single-channel linear quantizer for bounded quantities such as strain.
#[derive(Clone, Debug)]
pub struct LinearScalarQuantizer {
    bits: u32,
    bounds: Option<(f64, f64)>,
}

impl LinearScalarQuantizer {
    /// Creates an uncalibrated quantizer with the given bit depth.
    #[must_use]
    pub const fn new(bits: u32) -> Self {
        Self { bits, bounds: None }
    }
}

impl ScalarQuantize for LinearScalarQuantizer {
    fn calibrate(&mut self, sample: &[f64]) {
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for &value in sample {
            min = min.min(value);
            max = max.max(value);
        }
        let mut range = max - min;
        if range < CONSTANT_RANGE {
            range = 1.0;
        }
        self.bounds = Some((min - range * RANGE_MARGIN, max + range * RANGE_MARGIN));
    }

    fn quantize(&self, value: f64) -> Result<u32> {
        let (min, max) = self.bounds.ok_or(Error::NotCalibrated("linear scalar"))?;
        Ok(quantize_unit((value - min) / (max - min), self.bits))
    }

    fn dequantize(&self, quantum: u32) -> Result<f64> {
        let (min, max) = self.bounds.ok_or(Error::NotCalibrated("linear scalar"))?;
        let max_quantum = max_quantum(self.bits) as f64;
        Ok(min + (f64::from(quantum) / max_quantum) * (max - min))
    }

    fn bits(&self) -> u32 {
        self.bits
    }

    fn is_calibrated(&self) -> bool {
        self.bounds.is_some()
    }
}

/// Scalar quantizer variants, dispatched by quantity name.
#[enum_dispatch(ScalarQuantize)]
#[derive(Clone, Debug)]
pub enum ScalarQuantizer {
    /// Log-domain encoding.
    LogScalarQuantizer,
    /// Linear encoding.
    LinearScalarQuantizer,
}

impl ScalarQuantizer {
    /// Returns the quantizer configured for a named archived quantity, or
    /// `None` for quantities that are stored unquantized.
    #[must_use]
    pub fn for_quantity(name: &str) -> Option<Self> {
        match name {
            "effective_stress" => Some(LogScalarQuantizer::new(16, 0.1).into()),
            "strain" => Some(LinearScalarQuantizer::new(16).into()),
            _ => None,
        }
    }
}
