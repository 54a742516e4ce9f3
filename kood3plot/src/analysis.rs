//! Stress analysis over decoded states.
//!
//! Solid element state variables lead with the six stress components
//! `sxx, syy, szz, sxy, syz, szx`, followed by the effective plastic strain
//! and any extra history variables. This module extracts those tensors and
//! reduces them to the equivalent-stress figures engineers scan for.

use super::control::ControlHeader;
use super::state::State;

/// Symmetric Cauchy stress tensor of one element.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StressTensor {
    /// Normal stress along x.
    pub xx: f64,
    /// Normal stress along y.
    pub yy: f64,
    /// Normal stress along z.
    pub zz: f64,
    /// Shear stress in the xy plane.
    pub xy: f64,
    /// Shear stress in the yz plane.
    pub yz: f64,
    /// Shear stress in the zx plane.
    pub zx: f64,
}

impl StressTensor {
    /// Returns the von Mises equivalent stress.
    #[must_use]
    pub fn von_mises(&self) -> f64 {
        let normal = (self.xx - self.yy).powi(2)
            + (self.yy - self.zz).powi(2)
            + (self.zz - self.xx).powi(2);
        let shear = self.xy.powi(2) + self.yz.powi(2) + self.zx.powi(2);
        (0.5 * normal + 3.0 * shear).sqrt()
    }

    /// Returns the mean (hydrostatic) stress.
    #[must_use]
    pub fn pressure(&self) -> f64 {
        -(self.xx + self.yy + self.zz) / 3.0
    }
}

/// Extracts the stress tensor of solid `element` from a state's solid data,
/// or `None` when the element has fewer than six state variables.
#[must_use]
pub fn solid_stress_tensor(
    header: &ControlHeader,
    state: &State,
    element: usize,
) -> Option<StressTensor> {
    let vars = usize::try_from(header.nv3d).ok()?;
    if vars < 6 {
        return None;
    }
    let base = element.checked_mul(vars)?;
    let components = state.solid_data.get(base..base + 6)?;
    Some(StressTensor {
        xx: components[0],
        yy: components[1],
        zz: components[2],
        xy: components[3],
        yz: components[4],
        zx: components[5],
    })
}

/// Von Mises summary of one state's solid elements.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StressStats {
    /// Simulation time of the summarized state.
    pub time: f64,
    /// Number of elements summarized.
    pub count: usize,
    /// Smallest equivalent stress.
    pub min: f64,
    /// Largest equivalent stress.
    pub max: f64,
    /// Mean equivalent stress.
    pub mean: f64,
    /// Zero-based index of the element carrying the maximum.
    pub max_element: usize,
}

/// Summarizes the von Mises stress of every solid element in `state`, or
/// `None` when the state carries no solid stress data.
#[must_use]
pub fn solid_stress_stats(header: &ControlHeader, state: &State) -> Option<StressStats> {
    let vars = usize::try_from(header.nv3d).ok()?;
    if vars < 6 || state.solid_data.is_empty() {
        return None;
    }
    let count = state.solid_data.len() / vars;

    let mut stats = StressStats {
        time: state.time,
        count,
        min: f64::MAX,
        ..StressStats::default()
    };
    let mut sum = 0.0;
    for element in 0..count {
        let von_mises = solid_stress_tensor(header, state, element)?.von_mises();
        if von_mises > stats.max {
            stats.max = von_mises;
            stats.max_element = element;
        }
        stats.min = stats.min.min(von_mises);
        sum += von_mises;
    }
    stats.mean = sum / count as f64;
    Some(stats)
}

/// Run-level stress history: one [`StressStats`] per state plus the global
/// peak and when it occurred.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StressHistory {
    /// Per-state summaries in stream order.
    pub per_state: Vec<StressStats>,
    /// Largest equivalent stress over the whole run.
    pub peak: f64,
    /// Time of the peak.
    pub peak_time: f64,
}

impl StressHistory {
    /// Builds the history over a decoded state sequence. States without
    /// solid stress data are skipped.
    #[must_use]
    pub fn build<'a>(
        header: &ControlHeader,
        states: impl IntoIterator<Item = &'a State>,
    ) -> Self {
        let mut history = Self::default();
        for state in states {
            let Some(stats) = solid_stress_stats(header, state) else {
                continue;
            };
            if stats.max > history.peak {
                history.peak = stats.max;
                history.peak_time = stats.time;
            }
            history.per_state.push(stats);
        }
        history
    }
}
