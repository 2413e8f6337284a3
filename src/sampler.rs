use crate::params::{HostParams, ParameterSet};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Uniform;
use serde::{Deserialize, Serialize};

/// Distributions of the per-strain traits.
///
/// Virulence sets both the extra mortality of a strain and, through a
/// power-law trade-off, its horizontal transmission. The vertically
/// transmitted fraction splits the births of infected hosts between
/// infected and uninfected offspring.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplerConfig {
    /// Seed of the random number generator; drawn from the OS when absent.
    pub seed: Option<u64>,

    /// Virulence range.
    pub vir_min: f64,
    pub vir_max: f64,

    /// Transmission trade-off `transmission = beta_scale * virulence^beta_exponent`.
    pub beta_scale: f64,
    pub beta_exponent: f64,

    /// Range of the vertically transmitted birth fraction.
    pub vert_min: f64,
    pub vert_max: f64,
}

/// Draw a [`ParameterSet`] for `n_slots` strains.
///
/// Returns the seed actually used alongside the parameters so that the draw
/// can be reproduced.
pub fn sample_params(
    host: HostParams,
    n_slots: usize,
    cfg: &SamplerConfig,
) -> Result<(u64, ParameterSet)> {
    let seed = match cfg.seed {
        Some(seed) => seed,
        None => rand::rng().random(),
    };
    let mut rng = ChaCha12Rng::seed_from_u64(seed);

    let vir_dist = Uniform::new_inclusive(cfg.vir_min, cfg.vir_max)?;
    let vert_dist = Uniform::new_inclusive(cfg.vert_min, cfg.vert_max)?;

    let mut birth = Vec::with_capacity(n_slots);
    let mut death = Vec::with_capacity(n_slots);
    let mut transmission = Vec::with_capacity(n_slots);
    let mut external = Vec::with_capacity(n_slots);
    for _ in 0..n_slots {
        let virulence: f64 = vir_dist.sample(&mut rng);
        let vert: f64 = vert_dist.sample(&mut rng);

        death.push(host.death_rate + virulence);
        transmission.push(cfg.beta_scale * virulence.powf(cfg.beta_exponent));
        birth.push(host.birth_rate * vert);
        external.push(host.birth_rate * (1.0 - vert));
    }

    let params = ParameterSet::new(host, n_slots, birth, death, transmission, external)
        .context("failed to assemble sampled parameters")?;

    Ok((seed, params))
}
