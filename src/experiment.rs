use crate::adaptation::{AdaptationLoop, Termination, TrialRecord};
use crate::archive::{load_map, ArchiveLayout};
use crate::config::AdaptationConfig;
use crate::evaluator::TableEvaluator;
use crate::util::now_unix_s;
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One archive replicate and the recorded real outcomes to adapt against.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchJob {
    pub name: String,
    pub archive: PathBuf,
    pub truth: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchManifest {
    pub centroids: PathBuf,
    #[serde(default = "default_controller_dim")]
    pub controller_dim: usize,
    pub jobs: Vec<BatchJob>,
}

fn default_controller_dim() -> usize {
    32
}

impl BatchManifest {
    /// Reads a JSON manifest. Relative paths resolve against the manifest's
    /// directory.
    pub fn load(path: &Path) -> Result<Self> {
        let data =
            fs::read(path).with_context(|| format!("failed reading manifest {}", path.display()))?;
        let mut manifest: Self = serde_json::from_slice(&data)
            .with_context(|| format!("invalid manifest {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        manifest.centroids = base.join(&manifest.centroids);
        for job in &mut manifest.jobs {
            job.archive = base.join(&job.archive);
            job.truth = base.join(&job.truth);
        }
        Ok(manifest)
    }
}

#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub manifest: BatchManifest,
    pub adaptation: AdaptationConfig,
    pub out_dir: PathBuf,
    pub jobs: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    pub archive: String,
    pub entries: usize,
    pub threshold: f64,
    pub termination: Termination,
    pub iterations_used: u32,
    pub best_index: Option<usize>,
    pub best_real_fitness: Option<f64>,
    pub evaluator_failures: usize,
    pub corrected_map: String,
    pub trials: Vec<TrialRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchReport {
    pub generated_unix_s: u64,
    pub jobs: Option<usize>,
    pub config: AdaptationConfig,
    pub job_count: usize,
    pub success_rate: f64,
    pub avg_iterations: f64,
    pub avg_iterations_on_success: Option<f64>,
    pub records: Vec<JobRecord>,
}

/// Runs every job's adaptation independently and writes `summary.json` plus
/// one corrected map per job into `out_dir`.
pub fn run_batch(config: BatchConfig) -> Result<BatchReport> {
    if config.manifest.jobs.is_empty() {
        return Err(anyhow!("batch manifest has no jobs"));
    }
    if let Some(jobs) = config.jobs {
        if jobs == 0 {
            return Err(anyhow!("batch --jobs must be >= 1 when provided"));
        }
    }
    config.adaptation.validate()?;

    let mut claimed: HashMap<String, &str> = HashMap::new();
    for job in &config.manifest.jobs {
        if let Some(previous) = claimed.insert(corrected_map_name(&job.name), &job.name) {
            return Err(anyhow!(
                "batch jobs '{}' and '{}' would both write {}",
                previous,
                job.name,
                corrected_map_name(&job.name)
            ));
        }
    }

    fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("failed creating {}", config.out_dir.display()))?;

    let run_one = |job: &BatchJob| -> Result<JobRecord> {
        run_job(job, &config).with_context(|| format!("batch job '{}' failed", job.name))
    };

    let results: Vec<Result<JobRecord>> = if let Some(jobs) = config.jobs {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("failed to build rayon threadpool")?;
        pool.install(|| config.manifest.jobs.par_iter().map(run_one).collect())
    } else {
        config.manifest.jobs.par_iter().map(run_one).collect()
    };

    let mut records = Vec::with_capacity(results.len());
    for result in results {
        records.push(result?);
    }

    let job_count = records.len();
    let successes: Vec<&JobRecord> = records
        .iter()
        .filter(|r| r.termination.is_success())
        .collect();
    let total_iterations: u64 = records.iter().map(|r| r.iterations_used as u64).sum();
    let success_iterations: u64 = successes.iter().map(|r| r.iterations_used as u64).sum();

    let report = BatchReport {
        generated_unix_s: now_unix_s(),
        jobs: config.jobs,
        config: config.adaptation,
        job_count,
        success_rate: successes.len() as f64 / job_count as f64,
        avg_iterations: total_iterations as f64 / job_count as f64,
        avg_iterations_on_success: if successes.is_empty() {
            None
        } else {
            Some(success_iterations as f64 / successes.len() as f64)
        },
        records,
    };

    let report_path = config.out_dir.join("summary.json");
    fs::write(
        &report_path,
        serde_json::to_vec_pretty(&report).context("failed to serialize summary json")?,
    )
    .with_context(|| format!("failed writing {}", report_path.display()))?;

    Ok(report)
}

fn corrected_map_name(job_name: &str) -> String {
    let safe_name = job_name.replace(['/', '\\', ' '], "-");
    format!("{safe_name}-corrected.dat")
}

fn run_job(job: &BatchJob, config: &BatchConfig) -> Result<JobRecord> {
    let manifest = &config.manifest;
    let (archive, _centroids) = load_map(&job.archive, &manifest.centroids, manifest.controller_dim)?;
    let mut evaluator = TableEvaluator::load(
        &job.truth,
        ArchiveLayout::new(archive.descriptor_dim(), archive.controller_dim()),
    )?;

    let span = tracing::info_span!("job", name = %job.name);
    let _guard = span.enter();
    let result = AdaptationLoop::new(&archive, config.adaptation)?.run(&mut evaluator)?;

    let map_path = config.out_dir.join(corrected_map_name(&job.name));
    result.corrected_map.write(&map_path)?;

    Ok(JobRecord {
        name: job.name.clone(),
        archive: job.archive.to_string_lossy().into_owned(),
        entries: archive.len(),
        threshold: result.threshold,
        termination: result.termination,
        iterations_used: result.iterations_used,
        best_index: result.best_index(),
        best_real_fitness: result.best_real_fitness(),
        evaluator_failures: result.trials.iter().filter(|t| t.evaluator_failed).count(),
        corrected_map: map_path.to_string_lossy().into_owned(),
        trials: result.trials,
    })
}
