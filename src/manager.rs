use crate::analysis::{Analyzer, Results};
use crate::config::Config;
use crate::engine::{Engine, Run, WindowReport};
use crate::integrator::DormandPrince;
use crate::params::ParameterSet;
use crate::sampler::sample_params;
use anyhow::{Context, Result};
use glob::glob;
use rmp_serde::{decode, encode};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    /// Build the parameters of a new run, simulate it and save the outcome.
    pub fn create_run(&self) -> Result<()> {
        let run_idx = self.count_run_dirs().context("failed to count run dirs")?;

        let params = self.build_params().context("failed to build parameters")?;
        let integrator =
            DormandPrince::new(self.cfg.solver).context("failed to construct integrator")?;
        let engine = Engine::new(params, self.cfg.schedule(), integrator)
            .context("failed to construct engine")?;

        let mut observer = |report: &WindowReport| {
            let progress = 100.0 * (report.window + 1) as f64 / report.n_windows as f64;
            log::info!("completed {progress:06.2}%");
            log::debug!(
                "window [{}, {}]: host density {:.6}, extinct strains {:?}",
                report.start,
                report.end,
                report.final_state[0],
                report.extinct
            );
            if let Some(intro) = report.introduction {
                log::debug!(
                    "t = {}: strain {} enters slot {}",
                    report.end,
                    intro.strain,
                    intro.slot
                );
            }
        };
        let run = engine
            .run(&self.cfg.initial_state(), &mut observer)
            .context("failed to run simulation")?;

        // Only complete runs get a directory.
        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        write_file(self.params_file(run_idx), engine.params())
            .context("failed to save parameters")?;
        write_file(self.run_file(run_idx), &run).context("failed to save run")?;

        log::info!(
            "introduced {} strains, {} alive at the end",
            run.introductions.len(),
            run.slots.n_alive()
        );

        Ok(())
    }

    /// Analyze every run and save its results.
    pub fn analyze_sim(&self) -> Result<()> {
        let tail_cols = self.cfg.schedule().samples_per_window() + 1;

        let n_runs = self.count_run_dirs().context("failed to count run dirs")?;
        for run_idx in 0..n_runs {
            let params: ParameterSet =
                read_file(self.params_file(run_idx)).context("failed to load parameters")?;
            params.validate().context("invalid saved parameters")?;
            let run: Run = read_file(self.run_file(run_idx)).context("failed to load run")?;

            let results = Analyzer::new(&params).analyze(&run.matrix, tail_cols);
            log_summary(run_idx, &results);

            write_file(self.results_file(run_idx), &results)
                .context("failed to save results")?;
        }

        Ok(())
    }

    /// Remove the analysis results of every run.
    pub fn clean_sim(&self) -> Result<()> {
        let pattern = self.sim_dir.join("run-*").join("results.msgpack");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        for file in glob(pattern)
            .context("failed to glob results files")?
            .filter_map(Result::ok)
        {
            fs::remove_file(&file).with_context(|| format!("failed to remove {file:?}"))?;
            log::info!("removed {file:?}");
        }
        Ok(())
    }

    fn build_params(&self) -> Result<ParameterSet> {
        let strains = &self.cfg.strains;
        if let Some(traits) = &strains.traits {
            let params = ParameterSet::new(
                self.cfg.host,
                strains.n_slots,
                traits.birth.clone(),
                traits.death.clone(),
                traits.transmission.clone(),
                traits.external.clone(),
            )?;
            return Ok(params);
        }
        let sampler = strains
            .sampler
            .as_ref()
            .context("strains define neither traits nor sampler")?;
        let (seed, params) = sample_params(self.cfg.host, strains.n_slots, sampler)?;
        log::info!("sampled strain parameters with seed {seed}");
        Ok(params)
    }

    fn count_run_dirs(&self) -> Result<usize> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let count = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .count();
        Ok(count)
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }

    fn params_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("params.msgpack")
    }

    fn run_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("population.msgpack")
    }

    fn results_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("results.msgpack")
    }
}

fn log_summary(run_idx: usize, results: &Results) {
    for name in ["prevalence", "avg_virulence", "avg_r0", "evenness"] {
        if let Some(report) = results.get(name) {
            log::info!(
                "run {run_idx:04} {name}: {:.6} +/- {:.6}",
                report.tail.mean,
                report.tail.std_dev
            );
        }
    }
}

fn write_file<P: AsRef<Path>, T: Serialize>(file: P, val: &T) -> Result<()> {
    let file = file.as_ref();
    let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(file);
    encode::write(&mut writer, val).context("failed to serialize value")?;
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}

fn read_file<P: AsRef<Path>, T: DeserializeOwned>(file: P) -> Result<T> {
    let file = file.as_ref();
    let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
    let mut reader = BufReader::new(file);
    let val = decode::from_read(&mut reader).context("failed to deserialize value")?;
    Ok(val)
}
