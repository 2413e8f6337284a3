use serde::{Deserialize, Serialize};

/// Strain densities at or below this value are ignored by [`pielou_evenness`].
pub const EVENNESS_EPS: f64 = 1e-12;

/// Running mean and variance (Welford).
#[derive(Default)]
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub n_vals: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value; NaN values (undefined averages) are skipped.
    pub fn add(&mut self, val: f64) {
        if val.is_nan() {
            return;
        }
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            n_vals: self.n_vals,
            mean: if self.n_vals > 0 { self.mean } else { f64::NAN },
            std_dev: if self.n_vals > 1 {
                (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
            } else {
                f64::NAN
            },
        }
    }
}

/// Density-weighted average `sum(y_i w_i) / sum(y_i)`, NaN when no strain is present.
pub fn weighted_average(densities: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = densities.iter().sum();
    if total <= 0.0 {
        return f64::NAN;
    }
    let weighted: f64 = densities
        .iter()
        .zip(weights)
        .map(|(&density, &weight)| density * weight)
        .sum();
    weighted / total
}

/// Pielou's evenness `H / ln(S)` over the strains with density above [`EVENNESS_EPS`].
///
/// Zero when fewer than two strains are present.
pub fn pielou_evenness(densities: &[f64]) -> f64 {
    let present: Vec<f64> = densities
        .iter()
        .copied()
        .filter(|&density| density > EVENNESS_EPS)
        .collect();
    if present.len() < 2 {
        return 0.0;
    }
    let total: f64 = present.iter().sum();
    let entropy: f64 = present
        .iter()
        .map(|&density| {
            let share = density / total;
            -share * share.ln()
        })
        .sum();
    entropy / (present.len() as f64).ln()
}
