use crate::error::{SimError, SimResult};
use ode_solvers::dopri5::Dopri5;
use ode_solvers::{DVector, System};
use serde::{Deserialize, Serialize};

/// Right-hand side of an ODE system `dy/dt = f(t, y)`.
pub trait OdeSystem {
    /// Number of state variables.
    fn n_dim(&self) -> usize;

    /// Evaluate `f(t, y)` into `dydt`. Both slices have length [`OdeSystem::n_dim`].
    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]);
}

/// State of the system at one requested sample time.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub time: f64,
    pub state: Vec<f64>,
}

/// Numerical integrator producing the solution at a set of sample times.
pub trait Integrator {
    /// Integrate `sys` from `state0` at `t0` and return the state at every
    /// time in `sample_times`, which must be non-decreasing and not earlier than `t0`.
    fn integrate<S: OdeSystem>(
        &self,
        sys: &S,
        state0: &[f64],
        t0: f64,
        sample_times: &[f64],
    ) -> SimResult<Vec<Sample>>;
}

/// Tolerances and step budget of the adaptive solver.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverOptions {
    /// Relative tolerance.
    pub rtol: f64,
    /// Absolute tolerance.
    pub atol: f64,
    /// Maximum number of attempted steps per call.
    pub max_steps: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-9,
            max_steps: 100_000,
        }
    }
}

impl SolverOptions {
    fn validate(&self) -> SimResult<()> {
        if !(self.rtol.is_finite() && self.rtol > 0.0) {
            return Err(SimError::InvalidInput("rtol must be positive".into()));
        }
        if !(self.atol.is_finite() && self.atol > 0.0) {
            return Err(SimError::InvalidInput("atol must be positive".into()));
        }
        if self.max_steps == 0 {
            return Err(SimError::InvalidInput("max_steps must be positive".into()));
        }
        Ok(())
    }
}

/// Exposes an [`OdeSystem`] to `ode_solvers` over a dynamic state vector.
struct SystemAdapter<'a, S> {
    sys: &'a S,
}

impl<S: OdeSystem> System<f64, DVector<f64>> for SystemAdapter<'_, S> {
    fn system(&self, t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
        self.sys.derivative(t, y.as_slice(), dy.as_mut_slice());
    }
}

/// Dormand-Prince 4(5) solver with adaptive step size, backed by [`Dopri5`].
///
/// Every interval between consecutive sample times is a separate solve whose
/// last step ends on the sample time, so no interpolation is involved and
/// repeated runs are bit-for-bit identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct DormandPrince {
    opts: SolverOptions,
}

impl DormandPrince {
    pub fn new(opts: SolverOptions) -> SimResult<Self> {
        opts.validate()?;
        Ok(Self { opts })
    }

    /// Advance `y` from `t_start` to `t_end`, returning the number of attempted steps.
    fn advance<S: OdeSystem>(
        &self,
        sys: &S,
        y: DVector<f64>,
        t_start: f64,
        t_end: f64,
    ) -> SimResult<(DVector<f64>, usize)> {
        let adapter = SystemAdapter { sys };
        let mut stepper = Dopri5::new(
            adapter,
            t_start,
            t_end,
            0.0,
            y,
            self.opts.rtol,
            self.opts.atol,
        );

        let stats = match stepper.integrate() {
            Ok(stats) => stats,
            Err(error) => {
                let time = stepper.x_out().last().copied().unwrap_or(t_start);
                return Err(SimError::IntegrationFailure {
                    time,
                    reason: error.to_string(),
                });
            }
        };
        let n_steps = (stats.accepted_steps + stats.rejected_steps) as usize;

        let y_end = stepper
            .y_out()
            .last()
            .cloned()
            .ok_or_else(|| SimError::IntegrationFailure {
                time: t_start,
                reason: "solver produced no output".into(),
            })?;
        Ok((y_end, n_steps))
    }
}

impl Integrator for DormandPrince {
    fn integrate<S: OdeSystem>(
        &self,
        sys: &S,
        state0: &[f64],
        t0: f64,
        sample_times: &[f64],
    ) -> SimResult<Vec<Sample>> {
        let n = sys.n_dim();
        if state0.len() != n {
            return Err(SimError::ShapeMismatch {
                name: "initial state",
                expected: n,
                found: state0.len(),
            });
        }
        let mut prev = t0;
        for &t_sample in sample_times {
            if !t_sample.is_finite() || t_sample < prev {
                return Err(SimError::InvalidInput(format!(
                    "sample times must be finite, non-decreasing and start at or after {t0}"
                )));
            }
            prev = t_sample;
        }

        let mut t = t0;
        let mut y = DVector::from_column_slice(state0);
        let mut n_steps = 0;

        let mut samples = Vec::with_capacity(sample_times.len());
        for &t_sample in sample_times {
            if t_sample > t {
                let (y_next, steps) = self.advance(sys, y, t, t_sample)?;
                n_steps += steps;
                if n_steps > self.opts.max_steps {
                    return Err(SimError::IntegrationFailure {
                        time: t_sample,
                        reason: format!("exceeded {} steps", self.opts.max_steps),
                    });
                }
                y = y_next;
                t = t_sample;
            }

            samples.push(Sample {
                time: t_sample,
                state: y.as_slice().to_vec(),
            });
        }

        Ok(samples)
    }
}
