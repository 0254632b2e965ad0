use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::Confirm;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use steprunner::{
    config::Config, config_finder, progress::ProgressObserver, settings::Settings,
    validator::validate_config, OutputMode, RunStatus, StepRunner, TokioLauncher,
};

#[derive(Parser, Debug)]
#[command(
    name = "steprunner",
    about = "Run build steps in order, stopping at the first failure",
    version
)]
struct Args {
    /// Path to the YAML step file (discovered in the current directory if omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Dry run - show the commands without executing them
    #[arg(long)]
    dry_run: bool,

    /// Ask for confirmation before running
    #[arg(long)]
    confirm: bool,

    #[command(flatten)]
    settings: Settings,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose {
        "steprunner=debug,info"
    } else {
        "steprunner=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            config_finder::choose_config(&cwd, &args.settings.config_pattern)?
        }
    };
    tracing::info!("Using step file: {}", config_path.display());

    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    tracing::debug!("Loaded configuration: {:#?}", config);

    let mut settings = args.settings.clone();
    if let Some(yaml_settings) = &config.settings {
        settings.merge_with_yaml(yaml_settings);
    }

    let base_dir = config_path.parent().unwrap_or(Path::new(""));
    let validation = validate_config(&config, base_dir);
    for warning in &validation.warnings {
        tracing::warn!("{}", warning);
    }
    if !validation.is_valid {
        for error in &validation.errors {
            tracing::error!("{}", error);
        }
        anyhow::bail!(
            "Step file {} has {} error(s)",
            config_path.display(),
            validation.errors.len()
        );
    }

    let steps = config.into_steps(&settings, base_dir);

    if args.dry_run {
        tracing::info!("Running in dry-run mode - no commands will be executed");
        for (i, step) in steps.iter().enumerate() {
            match step.working_dir() {
                Some(dir) => println!("{}. {} (in {})", i + 1, step, dir.display()),
                None => println!("{}. {}", i + 1, step),
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    if args.confirm {
        let proceed = Confirm::new()
            .with_prompt(format!("Run {} steps from {}?", steps.len(), config_path.display()))
            .default(true)
            .interact()?;
        if !proceed {
            tracing::info!("Nothing run");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let mut runner = StepRunner::new(TokioLauncher::new(settings.output));
    if settings.output == OutputMode::Capture {
        runner = runner.with_observer(ProgressObserver::new(steps.len()));
    }

    let cancel = runner.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping run");
            cancel.cancel();
        }
    });

    let run = runner.run(&steps).await?;

    match &run.status {
        RunStatus::Completed => {
            for (step, result) in steps.iter().zip(&run.results) {
                if let Some(out) = result.stdout.as_deref().filter(|s| !s.is_empty()) {
                    tracing::debug!("{} stdout:\n{}", step.name(), out.trim_end());
                }
            }
            tracing::info!("All {} steps completed successfully", steps.len());
        }
        RunStatus::Aborted { index, cause } => {
            tracing::error!(
                "Step {}/{} ({}) failed: {}",
                index + 1,
                steps.len(),
                steps[*index].name(),
                cause
            );
            if let Some(failed) = run.failed_result() {
                for output in [&failed.stdout, &failed.stderr].into_iter().flatten() {
                    if !output.is_empty() {
                        eprintln!("{}", output.trim_end());
                    }
                }
            }
            let skipped = steps.len() - index - 1;
            if skipped > 0 {
                tracing::warn!("{} remaining step(s) not run", skipped);
            }
        }
    }

    Ok(ExitCode::from(u8::try_from(run.exit_code()).unwrap_or(1)))
}
