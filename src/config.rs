use crate::engine::Schedule;
use crate::integrator::SolverOptions;
use crate::params::HostParams;
use crate::sampler::SamplerConfig;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub host: HostParams,
    pub strains: StrainsConfig,
    #[serde(default)]
    pub init: InitConfig,
    #[serde(default)]
    pub solver: SolverOptions,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Strain slots and their traits, given either explicitly or through a sampler.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrainsConfig {
    /// Number of strain slots.
    pub n_slots: usize,

    pub traits: Option<StrainTraits>,
    pub sampler: Option<SamplerConfig>,
}

/// Explicit per-strain vectors, one entry per slot.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrainTraits {
    pub birth: Vec<f64>,
    pub death: Vec<f64>,
    pub transmission: Vec<f64>,
    pub external: Vec<f64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InitConfig {
    /// Initial density of uninfected hosts.
    pub host_density: f64,
    /// Density of the first strain and of every introduced strain.
    pub seed_density: f64,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            host_density: 10.0,
            seed_density: 1.0,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Number of integration windows, one per strain slot when absent.
    pub n_windows: Option<usize>,
    /// Length of each window.
    pub window_length: f64,
    /// Time between matrix columns.
    pub stride: f64,
    /// Strain densities at or below this value count as extinct at window ends.
    pub extinction_threshold: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            n_windows: None,
            window_length: 1000.0,
            stride: 1.0,
            extinction_threshold: 0.0,
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let host = &self.host;
        check_num(host.birth_rate, 0.0..1e3).context("invalid host birth rate")?;
        check_num(host.death_rate, 0.0..1e3).context("invalid host death rate")?;
        check_num(host.carrying_capacity, 1e-6..1e12).context("invalid carrying capacity")?;
        check_num(host.contact_rate, 0.0..1e3).context("invalid contact rate")?;

        let n_slots = self.strains.n_slots;
        check_num(n_slots, 1..10_000).context("invalid number of strain slots")?;

        match (&self.strains.traits, &self.strains.sampler) {
            (Some(traits), None) => {
                check_vec(&traits.birth, n_slots).context("invalid strain birth rates")?;
                check_vec(&traits.death, n_slots).context("invalid strain death rates")?;
                check_vec(&traits.transmission, n_slots)
                    .context("invalid strain transmission rates")?;
                check_vec(&traits.external, n_slots)
                    .context("invalid strain external births")?;
            }
            (None, Some(sampler)) => {
                check_num(sampler.vir_min, 0.0..1e3).context("invalid minimum virulence")?;
                check_num(sampler.vir_max, sampler.vir_min..1e3)
                    .context("invalid maximum virulence")?;
                check_num(sampler.beta_scale, 0.0..1e3).context("invalid transmission scale")?;
                check_num(sampler.beta_exponent, 0.0..10.0)
                    .context("invalid transmission exponent")?;
                check_num(sampler.vert_min, 0.0..=1.0)
                    .context("invalid minimum vertical fraction")?;
                check_num(sampler.vert_max, sampler.vert_min..=1.0)
                    .context("invalid maximum vertical fraction")?;
            }
            _ => bail!("strains must define exactly one of traits and sampler"),
        }

        check_num(self.init.host_density, 0.0..1e12).context("invalid initial host density")?;
        check_num(self.init.seed_density, 1e-12..1e12).context("invalid seed density")?;

        check_num(self.solver.rtol, 1e-14..1.0).context("invalid relative tolerance")?;
        check_num(self.solver.atol, 1e-300..1.0).context("invalid absolute tolerance")?;
        check_num(self.solver.max_steps, 1..usize::MAX).context("invalid maximum steps")?;

        check_num(self.n_windows(), 1..100_000).context("invalid number of windows")?;
        check_num(self.output.stride, 1e-9..1e9).context("invalid stride")?;
        check_num(self.output.window_length, self.output.stride..1e12)
            .context("invalid window length")?;
        check_num(self.output.extinction_threshold, 0.0..1.0)
            .context("invalid extinction threshold")?;

        Ok(())
    }

    pub fn n_windows(&self) -> usize {
        self.output.n_windows.unwrap_or(self.strains.n_slots)
    }

    pub fn schedule(&self) -> Schedule {
        Schedule {
            t0: 0.0,
            n_windows: self.n_windows(),
            window_length: self.output.window_length,
            stride: self.output.stride,
            seed_density: self.init.seed_density,
            extinction_threshold: self.output.extinction_threshold,
        }
    }

    /// Initial state: uninfected hosts, one strain in the first slot, every other slot empty.
    pub fn initial_state(&self) -> Vec<f64> {
        let mut state = vec![0.0; self.strains.n_slots + 1];
        state[0] = self.init.host_density;
        state[1] = self.init.seed_density;
        state
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_vec(vec: &[f64], exp_len: usize) -> Result<()> {
    // Ensure vector has expected length.
    let len = vec.len();
    if len != exp_len {
        bail!("vector length must be {exp_len}, but is {len}");
    }
    if vec.iter().any(|&ele| !(ele.is_finite() && ele >= 0.0)) {
        bail!("vector must have only finite non-negative elements");
    }
    Ok(())
}
