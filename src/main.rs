use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use map_adapt::adaptation::{AdaptationLoop, RunResult};
use map_adapt::archive::{load_map, ArchiveLayout};
use map_adapt::config::AdaptationConfig;
use map_adapt::evaluator::TableEvaluator;
use map_adapt::experiment::{run_batch, BatchConfig, BatchManifest};
use map_adapt::util::{log_filter, timestamp_suffix};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "map-adapt")]
#[command(about = "Recover a working controller from a behaviour archive in a few real trials")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct TuningArgs {
    /// JSON adaptation config; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Success threshold as a fraction of the best simulated fitness
    #[arg(long)]
    alpha: Option<f64>,
    /// UCB exploration weight
    #[arg(long)]
    kappa: Option<f64>,
    /// Matérn 5/2 kernel length-scale
    #[arg(long)]
    rho: Option<f64>,
    #[arg(long)]
    noise_variance: Option<f64>,
    #[arg(long)]
    max_iter: Option<u32>,
    /// Observations required before the discrepancy model is used. With the
    /// default of 2, a first trial below the threshold makes the next
    /// selection repeat it, so the run ends `exhausted` after one trial;
    /// pass 1 to refit from the first observation
    #[arg(long)]
    min_observations: Option<usize>,
}

impl TuningArgs {
    fn resolve(&self) -> Result<AdaptationConfig> {
        let mut config = match &self.config {
            Some(path) => AdaptationConfig::load(path)?,
            None => AdaptationConfig::default(),
        };
        if let Some(alpha) = self.alpha {
            config.alpha = alpha;
        }
        if let Some(kappa) = self.kappa {
            config.kappa = kappa;
        }
        if let Some(rho) = self.rho {
            config.kernel.length_scale = rho;
        }
        if let Some(noise) = self.noise_variance {
            config.kernel.noise_variance = noise;
        }
        if let Some(max_iter) = self.max_iter {
            config.max_iter = max_iter;
        }
        if let Some(min_observations) = self.min_observations {
            config.min_observations = min_observations;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print archive and centroid shapes and the success threshold
    Inspect {
        #[arg(long)]
        archive: PathBuf,
        #[arg(long)]
        centroids: PathBuf,
        #[arg(long, default_value_t = 32)]
        controller_dim: usize,
        #[arg(long, default_value_t = 0.90)]
        alpha: f64,
    },
    /// Adapt one archive against a table of recorded real outcomes
    Adapt {
        #[arg(long)]
        archive: PathBuf,
        #[arg(long)]
        centroids: PathBuf,
        /// Archive-layout table whose fitness/descriptor columns are the real outcomes
        #[arg(long)]
        truth: PathBuf,
        #[arg(long, default_value_t = 32)]
        controller_dim: usize,
        #[command(flatten)]
        tuning: TuningArgs,
        /// Write the corrected map here
        #[arg(long)]
        output: Option<PathBuf>,
        /// Write the run summary and trial history as JSON
        #[arg(long)]
        result_json: Option<PathBuf>,
    },
    /// Run every job of a JSON manifest, in parallel
    Batch {
        #[arg(long)]
        manifest: PathBuf,
        #[command(flatten)]
        tuning: TuningArgs,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        jobs: Option<usize>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Inspect {
            archive,
            centroids,
            controller_dim,
            alpha,
        } => {
            let (map, centroid_set) = load_map(&archive, &centroids, controller_dim)
                .with_context(|| format!("failed loading {}", archive.display()))?;
            let best = map.max_fitness().unwrap_or_default();
            println!("archive={}", archive.display());
            println!("entries={}", map.len());
            println!("centroids={}", centroid_set.len());
            println!("descriptor_dim={}", map.descriptor_dim());
            println!("controller_dim={}", map.controller_dim());
            println!("columns={}", ArchiveLayout::new(map.descriptor_dim(), controller_dim).columns());
            println!("best_simulated={best}");
            println!("threshold={}", alpha * best);
        }
        Commands::Adapt {
            archive,
            centroids,
            truth,
            controller_dim,
            tuning,
            output,
            result_json,
        } => {
            let config = tuning.resolve()?;
            let (map, _) = load_map(&archive, &centroids, controller_dim)?;
            let mut evaluator = TableEvaluator::load(
                &truth,
                ArchiveLayout::new(map.descriptor_dim(), controller_dim),
            )
            .with_context(|| format!("failed loading truth table {}", truth.display()))?;
            let result = AdaptationLoop::new(&map, config)?.run(&mut evaluator)?;

            print_result(&result);
            if let Some(path) = output {
                result.corrected_map.write(&path)?;
                println!("corrected_map={}", path.display());
            }
            if let Some(path) = result_json {
                write_result_json(&path, &result, &config)?;
                println!("result_json={}", path.display());
            }
        }
        Commands::Batch {
            manifest,
            tuning,
            out_dir,
            jobs,
        } => {
            let adaptation = tuning.resolve()?;
            let manifest = BatchManifest::load(&manifest)?;
            let out_dir = out_dir
                .unwrap_or_else(|| PathBuf::from(format!("adapt-runs/{}", timestamp_suffix())));

            let report = run_batch(BatchConfig {
                manifest,
                adaptation,
                out_dir: out_dir.clone(),
                jobs,
            })?;

            println!("jobs={}", report.job_count);
            println!(
                "threads={}",
                report
                    .jobs
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| "auto".to_string())
            );
            println!("success_rate={:.2}", report.success_rate);
            println!("avg_iterations={:.2}", report.avg_iterations);
            println!("out_dir={}", out_dir.display());
            for record in &report.records {
                println!(
                    "  {}  {}  iterations={} best_index={} best_real={}",
                    record.name,
                    record.termination.as_str(),
                    record.iterations_used,
                    record
                        .best_index
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "none".to_string()),
                    record
                        .best_real_fitness
                        .map(|v| format!("{v:.4}"))
                        .unwrap_or_else(|| "none".to_string()),
                );
            }
        }
    }

    Ok(())
}

fn print_result(result: &RunResult) {
    println!("termination={}", result.termination.as_str());
    println!("iterations={}", result.iterations_used);
    println!("threshold={}", result.threshold);
    match result.best {
        Some(best) => {
            println!("best_index={}", best.index);
            println!("best_real_fitness={}", best.real_fitness);
        }
        None => println!("best_index=none"),
    }
    for trial in &result.trials {
        println!(
            "  trial {:>3}: index={} expected={:.4} real={:.4}{}",
            trial.iteration,
            trial.index,
            trial.expected_fitness,
            trial.real_fitness,
            if trial.evaluator_failed { " (failed)" } else { "" }
        );
    }
}

fn write_result_json(path: &Path, result: &RunResult, config: &AdaptationConfig) -> Result<()> {
    let summary = serde_json::json!({
        "config": config,
        "termination": result.termination,
        "iterations_used": result.iterations_used,
        "threshold": result.threshold,
        "best": result.best,
        "trials": result.trials,
    });
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(&summary)?)
        .with_context(|| format!("failed writing {}", path.display()))
}
