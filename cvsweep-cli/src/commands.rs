//! Command handlers for the cvsweep CLI.

use crate::{Commands, ConfigAction, EvalArgs};
use anyhow::{Context, bail};
use cvsweep_core::config::{SweepOverrides, load_config, user_config_path};
use cvsweep_core::data::source_for_path;
use cvsweep_core::evaluation::HoldoutReport;
use cvsweep_core::training::{Domain, ParamValue};
use cvsweep_core::{
    Budget, CrossValidator, Dataset, JsonlRecorder, MemoryRecorder, MetricRegistry, ModelRegistry,
    RunRecorder, SearchSpace, SweepConfig, SweepController, SweepReport, SweepState, TrialStatus,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Sweep {
            eval,
            out,
            budget,
            model,
            holdout,
            trial_workers,
        } => {
            let overrides = SweepOverrides {
                budget,
                model,
                trial_workers,
                ..eval_overrides(&eval)
            };
            handle_sweep(&eval, &overrides, out, holdout).await
        }
        Commands::Run {
            eval,
            model,
            params,
        } => handle_run(&eval, model, &params).await,
        Commands::Models => {
            for name in ModelRegistry::with_builtins().names() {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Metrics => {
            let registry = MetricRegistry::with_builtins();
            for name in registry.names() {
                let metric = registry.resolve(name)?;
                if metric.needs_probabilities() {
                    println!("{name}  (needs class probabilities)");
                } else {
                    println!("{name}");
                }
            }
            Ok(())
        }
        Commands::Config { action } => handle_config(action),
    }
}

fn eval_overrides(eval: &EvalArgs) -> SweepOverrides {
    SweepOverrides {
        k: eval.k,
        seed: eval.seed,
        metrics: eval.metrics.clone(),
        ..SweepOverrides::default()
    }
}

fn handle_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let path =
                user_config_path().context("Could not determine the user config directory")?;
            if path.exists() {
                println!("Configuration file already exists at: {}", path.display());
                return Ok(());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let toml_str = toml::to_string_pretty(&SweepConfig::default())?;
            std::fs::write(&path, toml_str)?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show { config } => {
            let config = load_config(config.as_deref(), None)
                .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn load_dataset(path: &Path) -> anyhow::Result<Dataset> {
    if !path.exists() {
        bail!("Dataset not found: {}", path.display());
    }
    let source = source_for_path(path);
    let dataset = source
        .load()
        .await
        .with_context(|| format!("Failed to load dataset from {}", path.display()))?;
    let info = source.source_info();
    tracing::info!(
        source = %info.source_type,
        location = %info.location,
        samples = dataset.n_samples(),
        features = dataset.n_features(),
        classes = dataset.class_counts().len(),
        "Loaded dataset"
    );
    Ok(dataset)
}

fn resolve_config(
    config_path: Option<&Path>,
    overrides: &SweepOverrides,
) -> anyhow::Result<SweepConfig> {
    if let Some(path) = config_path {
        if !path.exists() {
            bail!("Configuration file not found: {}", path.display());
        }
    }
    load_config(config_path, Some(overrides))
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

/// Cancel `token` on Ctrl-C. In-flight trials still finish.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight trials");
            token.cancel();
        }
    });
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("runs").join(chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string())
}

async fn handle_sweep(
    eval: &EvalArgs,
    overrides: &SweepOverrides,
    out: Option<PathBuf>,
    holdout: Option<f64>,
) -> anyhow::Result<()> {
    let config = resolve_config(eval.config.as_deref(), overrides)?;
    let dataset = load_dataset(&eval.data).await?;
    let out = out.unwrap_or_else(default_out_dir);

    let token = CancellationToken::new();
    cancel_on_ctrl_c(token.clone());
    let outcome = run_sweep(dataset, &config, &out, holdout, token).await?;

    print_report(&outcome.report);
    if let Some(holdout) = &outcome.holdout {
        print_holdout(holdout);
    }
    println!("\nResults written to {}", out.display());
    Ok(())
}

/// Everything a sweep command produced.
pub(crate) struct SweepOutcome {
    pub report: SweepReport,
    pub holdout: Option<HoldoutReport>,
}

/// Run a recorded sweep into `out`, optionally scoring the best configuration
/// on a held-out split.
pub(crate) async fn run_sweep(
    dataset: Dataset,
    config: &SweepConfig,
    out: &Path,
    holdout: Option<f64>,
    token: CancellationToken,
) -> anyhow::Result<SweepOutcome> {
    let models = Arc::new(ModelRegistry::with_builtins());
    let metrics = Arc::new(MetricRegistry::with_builtins());
    let recorder = Arc::new(JsonlRecorder::new(out));

    let (train, test) = match holdout {
        Some(fraction) => {
            let (train, test) = dataset.train_test_split(fraction, config.seed)?;
            tracing::info!(
                train = train.n_samples(),
                test = test.n_samples(),
                "Holding out test split"
            );
            (Arc::new(train), Some(Arc::new(test)))
        }
        None => (Arc::new(dataset), None),
    };

    recorder
        .record_artifact(
            "class_proportions.json",
            &serde_json::to_vec_pretty(&train.class_distribution())?,
        )
        .await?;
    recorder
        .record_artifact("config.json", &serde_json::to_vec_pretty(config)?)
        .await?;

    let controller = SweepController::new(
        Arc::clone(&train),
        Arc::clone(&models),
        Arc::clone(&metrics),
        recorder.clone(),
    )
    .with_cancellation(token);
    let report = controller.start(config).await?;
    recorder
        .record_artifact("report.json", &serde_json::to_vec_pretty(&report)?)
        .await?;

    let holdout = match (test, report.best()) {
        (Some(test), Some(best)) if report.state == SweepState::Completed => {
            let factory = models.resolve(&best.model)?.bind(&best.configuration);
            let scores = CrossValidator::new(config.fold_workers)
                .evaluate_holdout(train, test, factory, metrics.select(&config.metrics)?)
                .await?;
            recorder
                .record_artifact("holdout_scores.json", &serde_json::to_vec_pretty(&scores)?)
                .await?;
            Some(scores)
        }
        _ => None,
    };

    Ok(SweepOutcome { report, holdout })
}

/// Parse `key=value` pairs into single-valued domains.
fn params_to_space(params: &[String]) -> anyhow::Result<SearchSpace> {
    let mut space = SearchSpace::new();
    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            bail!("Invalid parameter '{param}': expected key=value");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid parameter '{param}': empty key");
        }
        space = space.with(
            key,
            Domain::Categorical {
                values: vec![ParamValue::parse_literal(value.trim())],
            },
        );
    }
    Ok(space)
}

async fn handle_run(eval: &EvalArgs, model: String, params: &[String]) -> anyhow::Result<()> {
    let overrides = SweepOverrides {
        model: Some(model),
        budget: Some(Budget::Trials(1)),
        ..eval_overrides(eval)
    };
    let mut config = resolve_config(eval.config.as_deref(), &overrides)?;
    config.search_space = params_to_space(params)?;
    config.objective = None;

    let dataset = Arc::new(load_dataset(&eval.data).await?);
    let controller = SweepController::new(
        dataset,
        Arc::new(ModelRegistry::with_builtins()),
        Arc::new(MetricRegistry::with_builtins()),
        Arc::new(MemoryRecorder::new()),
    );
    let report = controller.start(&config).await?;

    let Some(trial) = report.trials.first() else {
        bail!("No trial was run");
    };
    match &trial.status {
        TrialStatus::Ok => {
            println!("{} {} ({}-fold)", trial.model, trial.configuration, config.k);
            for (metric, mean) in &trial.scores {
                let std = trial.score_std.get(metric).copied().unwrap_or(0.0);
                println!("  {metric:<20} {mean:.4} ± {std:.4}");
                if let Some(folds) = trial.fold_scores.get(metric) {
                    let folds: Vec<String> = folds.iter().map(|s| format!("{s:.4}")).collect();
                    println!("  {:<20} [{}]", "", folds.join(", "));
                }
            }
            Ok(())
        }
        TrialStatus::Failed { reason } => bail!("Evaluation failed: {reason}"),
    }
}

fn print_report(report: &SweepReport) {
    println!(
        "\nSweep {}: {} trials, {} failed ({})",
        report.state,
        report.trials.len(),
        report.failed_count(),
        report.objective
    );
    for trial in &report.trials {
        let score = trial
            .score(&report.objective.name)
            .map(|s| format!("{s:.4}"))
            .unwrap_or_else(|| "-".to_string());
        let status = match &trial.status {
            TrialStatus::Ok => "ok".to_string(),
            TrialStatus::Failed { reason } => format!("failed: {reason}"),
        };
        println!(
            "  #{:<4} {:<18} {:>8}  {}  {}",
            trial.trial_number, trial.model, score, trial.configuration, status
        );
    }
    match report.best() {
        Some(best) => println!(
            "\nBest: #{} {} {}",
            best.trial_number, best.model, best.configuration
        ),
        None => println!("\nNo successful trials"),
    }
    if report.state == SweepState::Cancelled {
        println!("Sweep was cancelled before the budget was exhausted");
    }
}

fn print_holdout(holdout: &HoldoutReport) {
    println!(
        "\nHoldout ({} train / {} test, {}):",
        holdout.n_train, holdout.n_test, holdout.model
    );
    for (metric, value) in &holdout.scores {
        println!("  {metric:<20} {value:.4}");
    }
}
