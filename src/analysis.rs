use crate::model::PopulationMatrix;
use crate::params::ParameterSet;
use crate::stats::{Accumulator, AccumulatorReport, pielou_evenness, weighted_average};
use serde::{Deserialize, Serialize};

/// Reproductive ratio components of each strain invading the disease-free host population.
///
/// At the disease-free equilibrium `x* = K (1 - ux / bx)` the regulation term
/// is `r* = 1 - x* / K`; then `V0 = birth r* / death`, `H0 = c transmission x* / death`
/// and `R0 = V0 + H0`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ReproductiveRatios {
    pub h0: Vec<f64>,
    pub v0: Vec<f64>,
    pub r0: Vec<f64>,
}

impl ReproductiveRatios {
    pub fn new(params: &ParameterSet) -> Self {
        let host = params.host();
        let x_eq = if host.birth_rate > host.death_rate {
            host.carrying_capacity * (1.0 - host.death_rate / host.birth_rate)
        } else {
            0.0
        };
        let regul_eq = 1.0 - x_eq / host.carrying_capacity;

        let n_slots = params.n_slots();
        let mut h0 = Vec::with_capacity(n_slots);
        let mut v0 = Vec::with_capacity(n_slots);
        for i_slot in 0..n_slots {
            let death = params.death()[i_slot];
            h0.push(host.contact_rate * params.transmission()[i_slot] * x_eq / death);
            v0.push(params.birth()[i_slot] * regul_eq / death);
        }
        let r0 = h0.iter().zip(&v0).map(|(h, v)| h + v).collect();

        Self { h0, v0, r0 }
    }
}

/// Time series derived from one population matrix column at a time.
pub trait Obs {
    fn name(&self) -> &str;
    fn update(&mut self, column: &[f64]);
    fn series(&self) -> &[f64];
}

/// Uninfected host density.
pub struct HostDensity {
    series: Vec<f64>,
}

impl Obs for HostDensity {
    fn name(&self) -> &str {
        "host_density"
    }

    fn update(&mut self, column: &[f64]) {
        self.series.push(column[0]);
    }

    fn series(&self) -> &[f64] {
        &self.series
    }
}

/// Total density of infected hosts.
pub struct StrainDensity {
    series: Vec<f64>,
}

impl Obs for StrainDensity {
    fn name(&self) -> &str {
        "strain_density"
    }

    fn update(&mut self, column: &[f64]) {
        self.series.push(column[1..].iter().sum());
    }

    fn series(&self) -> &[f64] {
        &self.series
    }
}

/// Fraction of hosts carrying any strain.
pub struct Prevalence {
    series: Vec<f64>,
}

impl Obs for Prevalence {
    fn name(&self) -> &str {
        "prevalence"
    }

    fn update(&mut self, column: &[f64]) {
        let infected: f64 = column[1..].iter().sum();
        let total = column[0] + infected;
        self.series
            .push(if total > 0.0 { infected / total } else { f64::NAN });
    }

    fn series(&self) -> &[f64] {
        &self.series
    }
}

/// Density-weighted average of a per-strain trait.
pub struct WeightedTrait {
    name: String,
    weights: Vec<f64>,
    series: Vec<f64>,
}

impl WeightedTrait {
    pub fn new(name: &str, weights: Vec<f64>) -> Self {
        Self {
            name: format!("avg_{name}"),
            weights,
            series: Vec::new(),
        }
    }
}

impl Obs for WeightedTrait {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, column: &[f64]) {
        self.series
            .push(weighted_average(&column[1..], &self.weights));
    }

    fn series(&self) -> &[f64] {
        &self.series
    }
}

/// Pielou evenness of the strain block.
pub struct Evenness {
    series: Vec<f64>,
}

impl Obs for Evenness {
    fn name(&self) -> &str {
        "evenness"
    }

    fn update(&mut self, column: &[f64]) {
        self.series.push(pielou_evenness(&column[1..]));
    }

    fn series(&self) -> &[f64] {
        &self.series
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ObsReport {
    pub name: String,
    pub series: Vec<f64>,
    /// Statistics over the final window.
    pub tail: AccumulatorReport,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Results {
    pub time: Vec<f64>,
    pub ratios: ReproductiveRatios,
    pub reports: Vec<ObsReport>,
}

impl Results {
    pub fn get(&self, name: &str) -> Option<&ObsReport> {
        self.reports.iter().find(|report| report.name == name)
    }
}

pub struct Analyzer {
    ratios: ReproductiveRatios,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(params: &ParameterSet) -> Self {
        let ratios = ReproductiveRatios::new(params);

        let mut obs_ptr_vec: Vec<Box<dyn Obs>> = Vec::new();
        obs_ptr_vec.push(Box::new(HostDensity { series: Vec::new() }));
        obs_ptr_vec.push(Box::new(StrainDensity { series: Vec::new() }));
        obs_ptr_vec.push(Box::new(Prevalence { series: Vec::new() }));
        obs_ptr_vec.push(Box::new(WeightedTrait::new("death", params.death().to_vec())));
        obs_ptr_vec.push(Box::new(WeightedTrait::new("virulence", params.virulence())));
        obs_ptr_vec.push(Box::new(WeightedTrait::new(
            "transmission",
            params.transmission().to_vec(),
        )));
        obs_ptr_vec.push(Box::new(WeightedTrait::new("h0", ratios.h0.clone())));
        obs_ptr_vec.push(Box::new(WeightedTrait::new("v0", ratios.v0.clone())));
        obs_ptr_vec.push(Box::new(WeightedTrait::new("r0", ratios.r0.clone())));
        obs_ptr_vec.push(Box::new(Evenness { series: Vec::new() }));

        Self {
            ratios,
            obs_ptr_vec,
        }
    }

    /// Compute every observable over `matrix`, summarising the last `tail_cols` columns.
    pub fn analyze(mut self, matrix: &PopulationMatrix, tail_cols: usize) -> Results {
        for column in matrix.columns() {
            for obs in &mut self.obs_ptr_vec {
                obs.update(column);
            }
        }

        let n_cols = matrix.n_cols();
        let tail_start = n_cols.saturating_sub(tail_cols);
        let reports = self
            .obs_ptr_vec
            .iter()
            .map(|obs| {
                let mut acc = Accumulator::new();
                obs.series()[tail_start..]
                    .iter()
                    .for_each(|&val| acc.add(val));
                ObsReport {
                    name: obs.name().to_string(),
                    series: obs.series().to_vec(),
                    tail: acc.report(),
                }
            })
            .collect();

        Results {
            time: (0..n_cols).map(|col| matrix.time(col)).collect(),
            ratios: self.ratios,
            reports,
        }
    }
}
