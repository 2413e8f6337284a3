use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};

/// Host-level rates shared by every strain.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct HostParams {
    /// Birth rate of uninfected hosts.
    pub birth_rate: f64,
    /// Death rate of uninfected hosts.
    pub death_rate: f64,
    /// Carrying capacity of the whole host population.
    pub carrying_capacity: f64,
    /// Contact rate scaling horizontal transmission.
    pub contact_rate: f64,
}

/// Per-strain parameters, aligned by index with the strain block of the state vector.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ParameterSet {
    host: HostParams,

    birth: Vec<f64>,
    death: Vec<f64>,
    transmission: Vec<f64>,
    external: Vec<f64>,
}

impl ParameterSet {
    /// Build a parameter set for `n_slots` strain slots.
    ///
    /// # Errors
    /// Returns [`SimError::ShapeMismatch`] if any per-strain vector does not
    /// have exactly `n_slots` entries.
    pub fn new(
        host: HostParams,
        n_slots: usize,
        birth: Vec<f64>,
        death: Vec<f64>,
        transmission: Vec<f64>,
        external: Vec<f64>,
    ) -> SimResult<Self> {
        let params = Self {
            host,
            birth,
            death,
            transmission,
            external,
        };
        params.check_shape(n_slots)?;
        Ok(params)
    }

    /// Check shapes and host scalars.
    ///
    /// Deserialized parameter sets skip [`ParameterSet::new`], so the engine
    /// calls this again before a run.
    pub fn validate(&self) -> SimResult<()> {
        self.check_shape(self.birth.len())?;
        if self.birth.is_empty() {
            return Err(SimError::InvalidInput(
                "at least one strain slot is required".into(),
            ));
        }
        let host = &self.host;
        if !(host.carrying_capacity.is_finite() && host.carrying_capacity > 0.0) {
            return Err(SimError::InvalidInput(format!(
                "carrying capacity must be positive, but is {}",
                host.carrying_capacity
            )));
        }
        Ok(())
    }

    fn check_shape(&self, n_slots: usize) -> SimResult<()> {
        for (name, vec) in [
            ("birth", &self.birth),
            ("death", &self.death),
            ("transmission", &self.transmission),
            ("external", &self.external),
        ] {
            if vec.len() != n_slots {
                return Err(SimError::ShapeMismatch {
                    name,
                    expected: n_slots,
                    found: vec.len(),
                });
            }
        }
        Ok(())
    }

    pub fn host(&self) -> &HostParams {
        &self.host
    }

    pub fn n_slots(&self) -> usize {
        self.birth.len()
    }

    /// Length of the state vector: one host class plus every strain slot.
    pub fn n_vars(&self) -> usize {
        self.n_slots() + 1
    }

    pub fn birth(&self) -> &[f64] {
        &self.birth
    }

    pub fn death(&self) -> &[f64] {
        &self.death
    }

    pub fn transmission(&self) -> &[f64] {
        &self.transmission
    }

    pub fn external(&self) -> &[f64] {
        &self.external
    }

    /// Excess mortality of each strain over the uninfected host.
    pub fn virulence(&self) -> Vec<f64> {
        self.death
            .iter()
            .map(|&death| death - self.host.death_rate)
            .collect()
    }
}
