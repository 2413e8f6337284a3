use crate::error::{SimError, SimResult};
use crate::field::DensityField;
use crate::integrator::{DormandPrince, Integrator};
use crate::model::{Introduction, PopulationMatrix, SlotTable};
use crate::params::ParameterSet;
use serde::{Deserialize, Serialize};

/// Time layout of a run: `n_windows` contiguous windows of `window_length`,
/// sampled every `stride`.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct Schedule {
    pub t0: f64,
    pub n_windows: usize,
    pub window_length: f64,
    pub stride: f64,
    /// Density of a newly introduced strain.
    pub seed_density: f64,
    /// Strain densities at or below this value are set to zero at the end of a window.
    pub extinction_threshold: f64,
}

impl Schedule {
    pub fn validate(&self) -> SimResult<()> {
        if !self.t0.is_finite() {
            return Err(SimError::InvalidInput("t0 must be finite".into()));
        }
        if self.n_windows == 0 {
            return Err(SimError::InvalidInput(
                "at least one window is required".into(),
            ));
        }
        if !(self.stride.is_finite() && self.stride > 0.0) {
            return Err(SimError::InvalidInput("stride must be positive".into()));
        }
        if !(self.window_length.is_finite() && self.window_length >= self.stride) {
            return Err(SimError::InvalidInput(
                "window length must be at least one stride".into(),
            ));
        }
        let ratio = self.window_length / self.stride;
        if (ratio - ratio.round()).abs() > 1e-9 * ratio {
            return Err(SimError::InvalidInput(format!(
                "window length {} is not a multiple of stride {}",
                self.window_length, self.stride
            )));
        }
        if !(self.seed_density.is_finite() && self.seed_density > 0.0) {
            return Err(SimError::InvalidInput("seed density must be positive".into()));
        }
        if !(self.extinction_threshold.is_finite() && self.extinction_threshold >= 0.0) {
            return Err(SimError::InvalidInput(
                "extinction threshold must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// Number of sample intervals in one window.
    pub fn samples_per_window(&self) -> usize {
        (self.window_length / self.stride).round() as usize
    }

    /// Total number of matrix columns; windows share their boundary column.
    pub fn n_cols(&self) -> usize {
        self.n_windows * self.samples_per_window() + 1
    }
}

/// Strain introduction performed at the end of a window.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct IntroductionEvent {
    /// Window after which the strain was introduced.
    pub window: usize,
    pub time: f64,
    /// Matrix column holding the post-introduction state.
    pub col: usize,
    pub introduction: Introduction,
}

/// Summary of one completed window, handed to a [`WindowObserver`].
#[derive(Debug, Clone)]
pub struct WindowReport {
    pub window: usize,
    pub n_windows: usize,
    pub start: f64,
    pub end: f64,
    /// Clamped state at the end of the window, before any introduction.
    pub final_state: Vec<f64>,
    /// Strains that went extinct during the window.
    pub extinct: Vec<usize>,
    pub introduction: Option<Introduction>,
}

/// Hook invoked once per completed window.
pub trait WindowObserver {
    fn on_window(&mut self, report: &WindowReport);
}

impl<F: FnMut(&WindowReport)> WindowObserver for F {
    fn on_window(&mut self, report: &WindowReport) {
        self(report)
    }
}

/// Observer that ignores every report.
pub struct Silent;

impl WindowObserver for Silent {
    fn on_window(&mut self, _report: &WindowReport) {}
}

/// Output of a complete run.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Run {
    pub matrix: PopulationMatrix,
    pub slots: SlotTable,
    pub introductions: Vec<IntroductionEvent>,
}

/// Set every negative entry to exactly zero.
pub fn clamp_negative(state: &mut [f64]) {
    for val in state.iter_mut() {
        if *val < 0.0 {
            *val = 0.0;
        }
    }
}

/// Loop state threaded through the windows of one run.
struct LoopState {
    window: usize,
    start: f64,
    current: Vec<f64>,
    matrix: PopulationMatrix,
    slots: SlotTable,
    introductions: Vec<IntroductionEvent>,
}

impl LoopState {
    fn into_run(self) -> Run {
        Run {
            matrix: self.matrix,
            slots: self.slots,
            introductions: self.introductions,
        }
    }
}

/// Strain-introduction engine.
///
/// Integrates the density field window by window, clamps every sample,
/// writes it into the population matrix and seeds a new strain into the
/// lowest empty slot between consecutive windows.
pub struct Engine<I = DormandPrince> {
    params: ParameterSet,
    schedule: Schedule,
    integrator: I,
}

impl<I: Integrator> Engine<I> {
    /// Create an engine after checking parameter shapes and the schedule.
    pub fn new(params: ParameterSet, schedule: Schedule, integrator: I) -> SimResult<Self> {
        params.validate()?;
        schedule.validate()?;
        Ok(Self {
            params,
            schedule,
            integrator,
        })
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Run every window from `initial_state`.
    ///
    /// # Errors
    /// Returns [`SimError::ShapeMismatch`] for a badly sized initial state,
    /// [`SimError::IntegrationFailure`] if a window cannot be integrated and
    /// [`SimError::NoExtinctionSlot`] if no slot is free for an introduction.
    pub fn run<O: WindowObserver>(&self, initial_state: &[f64], observer: &mut O) -> SimResult<Run> {
        let n_vars = self.params.n_vars();
        if initial_state.len() != n_vars {
            return Err(SimError::ShapeMismatch {
                name: "initial state",
                expected: n_vars,
                found: initial_state.len(),
            });
        }
        if initial_state.iter().any(|&val| !(val.is_finite() && val >= 0.0)) {
            return Err(SimError::InvalidInput(
                "initial densities must be finite and non-negative".into(),
            ));
        }

        let schedule = &self.schedule;
        let mut state = LoopState {
            window: 0,
            start: schedule.t0,
            current: initial_state.to_vec(),
            matrix: PopulationMatrix::zeros(n_vars, schedule.n_cols(), schedule.t0, schedule.stride),
            slots: SlotTable::from_state(&initial_state[1..]),
            introductions: Vec::new(),
        };

        while state.window < schedule.n_windows {
            self.perform_window(&mut state, observer)?;
        }

        Ok(state.into_run())
    }

    fn perform_window<O: WindowObserver>(
        &self,
        state: &mut LoopState,
        observer: &mut O,
    ) -> SimResult<()> {
        let schedule = &self.schedule;
        let n_samples = schedule.samples_per_window();
        let first_col = state.window * n_samples;

        let sample_times: Vec<f64> = (first_col..=first_col + n_samples)
            .map(|col| state.matrix.time(col))
            .collect();

        let field = DensityField::new(&self.params);
        let mut samples = self
            .integrator
            .integrate(&field, &state.current, state.start, &sample_times)?;

        if let Some(last) = samples.last_mut() {
            clamp_negative(&mut last.state);
            for density in last.state[1..].iter_mut() {
                if *density <= schedule.extinction_threshold {
                    *density = 0.0;
                }
            }
        }
        for (i_sample, sample) in samples.iter_mut().enumerate() {
            clamp_negative(&mut sample.state);
            state.matrix.set_column(first_col + i_sample, &sample.state);
        }

        let end_col = first_col + n_samples;
        let end = state.matrix.time(end_col);
        if let Some(last) = samples.pop() {
            state.current = last.state;
        }

        let extinct = state.slots.record_extinctions(&state.current[1..]);
        for &strain in &extinct {
            log::debug!("strain {strain} went extinct in window {}", state.window);
        }

        let is_last = state.window + 1 == schedule.n_windows;
        let final_state = state.current.clone();
        let introduction = if is_last {
            None
        } else {
            let introduction = self.introduce(state, end)?;
            state.matrix.set_column(end_col, &state.current);
            state.introductions.push(IntroductionEvent {
                window: state.window,
                time: end,
                col: end_col,
                introduction,
            });
            Some(introduction)
        };

        observer.on_window(&WindowReport {
            window: state.window,
            n_windows: schedule.n_windows,
            start: state.start,
            end,
            final_state,
            extinct,
            introduction,
        });

        state.window += 1;
        state.start = end;

        Ok(())
    }

    fn introduce(&self, state: &mut LoopState, time: f64) -> SimResult<Introduction> {
        // A free slot in the table must also hold exactly zero density.
        let introduction = match state.slots.first_free() {
            Some(i_slot) if state.current[i_slot + 1] == 0.0 => state.slots.introduce(),
            _ => None,
        }
        .ok_or(SimError::NoExtinctionSlot {
            window: state.window,
            time,
        })?;
        state.current[introduction.slot + 1] = self.schedule.seed_density;

        log::debug!(
            "introduced strain {} into slot {} at t = {time}",
            introduction.strain,
            introduction.slot
        );

        Ok(introduction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::{OdeSystem, Sample, SolverOptions};
    use crate::model::Slot;
    use crate::params::{HostParams, tests::host};

    /// Holds the state constant except for the first strain, which lands just below zero.
    struct Overshoot;

    impl Integrator for Overshoot {
        fn integrate<S: OdeSystem>(
            &self,
            _sys: &S,
            state0: &[f64],
            _t0: f64,
            sample_times: &[f64],
        ) -> SimResult<Vec<Sample>> {
            let samples = sample_times
                .iter()
                .enumerate()
                .map(|(i_sample, &time)| {
                    let mut state = state0.to_vec();
                    if i_sample > 0 {
                        state[1] = -1e-9;
                    }
                    Sample { time, state }
                })
                .collect();
            Ok(samples)
        }
    }

    fn schedule(n_windows: usize, window_length: f64) -> Schedule {
        Schedule {
            t0: 0.0,
            n_windows,
            window_length,
            stride: 1.0,
            seed_density: 1.0,
            extinction_threshold: 0.0,
        }
    }

    fn two_strain_params() -> ParameterSet {
        ParameterSet::new(
            host(),
            2,
            vec![0.5, 0.5],
            vec![0.3, 0.3],
            vec![0.4, 0.4],
            vec![0.2, 0.2],
        )
        .unwrap()
    }

    /// Strains with no transmission and no births decay as `exp(-death t)`.
    fn decaying_params(death: Vec<f64>) -> ParameterSet {
        let n_slots = death.len();
        ParameterSet::new(
            HostParams {
                birth_rate: 0.0,
                death_rate: 0.0,
                carrying_capacity: 100.0,
                contact_rate: 0.0,
            },
            n_slots,
            vec![0.0; n_slots],
            death,
            vec![0.0; n_slots],
            vec![0.0; n_slots],
        )
        .unwrap()
    }

    fn engine(params: ParameterSet, schedule: Schedule) -> Engine {
        Engine::new(params, schedule, DormandPrince::default()).unwrap()
    }

    #[test]
    fn first_window_of_two_strain_scenario() {
        let engine = engine(two_strain_params(), schedule(1, 10.0));
        let run = engine.run(&[10.0, 1.0, 0.0], &mut Silent).unwrap();

        let mat = &run.matrix;
        assert_eq!(mat.n_rows(), 3);
        assert_eq!(mat.n_cols(), 11);
        assert_eq!(mat.column(0), &[10.0, 1.0, 0.0]);
        for column in mat.columns() {
            assert!(column.iter().all(|val| val.is_finite() && *val >= 0.0));
        }
        assert!(run.introductions.is_empty());
    }

    #[test]
    fn empty_slot_is_seeded_at_window_boundary() {
        let engine = engine(two_strain_params(), schedule(2, 10.0));

        let mut reports = Vec::new();
        let mut observer = |report: &WindowReport| {
            reports.push((report.final_state.to_vec(), report.introduction));
        };
        let run = engine.run(&[10.0, 1.0, 0.0], &mut observer).unwrap();

        let mat = &run.matrix;
        assert_eq!(mat.n_cols(), 21);
        assert_eq!(mat.get(2, 9), 0.0);
        assert_eq!(mat.get(2, 10), 1.0);
        assert!(mat.get(2, 11) > 0.0);

        // Only the seeded slot differs from the state before the introduction.
        let (pre_state, introduction) = &reports[0];
        let introduction = introduction.unwrap();
        assert_eq!(introduction.slot, 1);
        assert_eq!(introduction.strain, 1);
        assert_eq!(introduction.replaced, None);
        assert_eq!(pre_state[2], 0.0);
        assert_eq!(mat.get(0, 10), pre_state[0]);
        assert_eq!(mat.get(1, 10), pre_state[1]);

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].1, None);
        assert_eq!(run.introductions.len(), 1);
        assert_eq!(run.introductions[0].col, 10);
        assert_eq!(run.introductions[0].time, 10.0);
    }

    #[test]
    fn single_slot_covers_exactly_one_window() {
        let params = ParameterSet::new(host(), 1, vec![0.5], vec![0.3], vec![0.4], vec![0.2])
            .unwrap();
        let engine = engine(params, schedule(1, 20.0));
        let run = engine.run(&[10.0, 1.0], &mut Silent).unwrap();
        assert_eq!(run.matrix.n_cols(), 21);
        assert!(run.introductions.is_empty());
        assert_eq!(run.slots.n_strains(), 1);
    }

    #[test]
    fn persistent_strains_leave_no_slot() {
        let params = ParameterSet::new(host(), 1, vec![0.5], vec![0.3], vec![0.4], vec![0.2])
            .unwrap();
        let engine = engine(params, schedule(2, 10.0));
        let result = engine.run(&[10.0, 1.0], &mut Silent);
        assert_eq!(
            result,
            Err(SimError::NoExtinctionSlot {
                window: 0,
                time: 10.0
            })
        );
    }

    #[test]
    fn extinct_slot_is_reused() {
        let mut sched = schedule(3, 10.0);
        sched.extinction_threshold = 1e-6;
        let engine = engine(decaying_params(vec![5.0, 0.01]), sched);

        let run = engine.run(&[0.0, 1.0, 1.0], &mut Silent).unwrap();

        // Slot 0 decays below the threshold within every window and is reseeded.
        assert_eq!(run.introductions.len(), 2);
        for (event, strain) in run.introductions.iter().zip([2, 3]) {
            assert_eq!(event.introduction.slot, 0);
            assert_eq!(event.introduction.strain, strain);
            assert_eq!(run.matrix.get(1, event.col), 1.0);
        }
        assert_eq!(run.introductions[0].introduction.replaced, Some(0));
        assert_eq!(run.introductions[1].introduction.replaced, Some(2));
        assert!(run.matrix.get(2, 30) > 0.0);
    }

    #[test]
    fn simultaneous_extinctions_reuse_lowest_slot() {
        let mut sched = schedule(2, 10.0);
        sched.extinction_threshold = 1e-6;
        let engine = engine(decaying_params(vec![0.01, 5.0, 5.0]), sched);

        let run = engine.run(&[0.0, 1.0, 1.0, 1.0], &mut Silent).unwrap();
        let event = run.introductions[0];
        assert_eq!(event.introduction.slot, 1);
        assert_eq!(run.matrix.strains(10)[1], 1.0);
        assert_eq!(run.matrix.strains(10)[2], 0.0);
    }

    #[test]
    fn negative_samples_are_clamped_and_reseeded() {
        let engine = Engine::new(two_strain_params(), schedule(3, 5.0), Overshoot).unwrap();

        let mut reports = Vec::new();
        let mut observer = |report: &WindowReport| reports.push(report.clone());
        let run = engine.run(&[10.0, 1.0, 1.0], &mut observer).unwrap();

        let mat = &run.matrix;
        for column in mat.columns() {
            assert!(column.iter().all(|&val| val >= 0.0));
        }
        assert_eq!(mat.column(4), &[10.0, 0.0, 1.0]);
        assert_eq!(mat.column(5), &[10.0, 1.0, 1.0]);
        assert_eq!(mat.column(15), &[10.0, 0.0, 1.0]);

        // The clamped density is exactly zero when handed to the next window.
        for report in &reports {
            assert_eq!(report.final_state[1], 0.0);
        }
        assert_eq!(reports[0].extinct, vec![0]);
        assert_eq!(reports[1].extinct, vec![2]);
        assert_eq!(reports[2].extinct, vec![3]);

        let events: Vec<_> = run
            .introductions
            .iter()
            .map(|event| (event.col, event.introduction.slot, event.introduction.replaced))
            .collect();
        assert_eq!(events, vec![(5, 0, Some(0)), (10, 0, Some(2))]);
        assert_eq!(run.slots.slots()[0], Slot::Extinct { strain: 3 });
        assert_eq!(run.slots.slots()[1], Slot::Occupied { strain: 1 });
    }

    #[test]
    fn second_introduction_needs_an_extinction() {
        let engine = engine(two_strain_params(), schedule(3, 5.0));
        let mut boundaries = Vec::new();
        let mut observer = |report: &WindowReport| boundaries.push(report.end);
        let run = engine.run(&[10.0, 1.0, 0.0], &mut observer);

        // Both slots are occupied after the first introduction.
        assert!(matches!(run, Err(SimError::NoExtinctionSlot { window: 1, .. })));
        assert_eq!(boundaries, vec![5.0]);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let engine = engine(two_strain_params(), schedule(2, 50.0));
        let run_a = engine.run(&[10.0, 1.0, 0.0], &mut Silent).unwrap();
        let run_b = engine.run(&[10.0, 1.0, 0.0], &mut Silent).unwrap();
        assert_eq!(run_a, run_b);
    }

    #[test]
    fn clamps_negative_values() {
        let mut state = vec![1.0, -1e-12, 0.0, -3.0];
        clamp_negative(&mut state);
        assert_eq!(state, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn rejects_bad_initial_state() {
        let engine = engine(two_strain_params(), schedule(1, 10.0));
        assert!(matches!(
            engine.run(&[10.0, 1.0], &mut Silent),
            Err(SimError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            engine.run(&[10.0, -1.0, 0.0], &mut Silent),
            Err(SimError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_misaligned_stride() {
        let mut sched = schedule(1, 10.0);
        sched.stride = 3.0;
        let result = Engine::new(two_strain_params(), sched, DormandPrince::default());
        assert!(matches!(result, Err(SimError::InvalidInput(_))));
    }

    #[test]
    fn tight_step_budget_fails_the_run() {
        let opts = SolverOptions {
            max_steps: 2,
            ..SolverOptions::default()
        };
        let integrator = DormandPrince::new(opts).unwrap();
        let engine = Engine::new(two_strain_params(), schedule(1, 100.0), integrator).unwrap();
        let result = engine.run(&[10.0, 1.0, 0.0], &mut Silent);
        assert!(matches!(result, Err(SimError::IntegrationFailure { .. })));
    }
}
