use crate::cli::DynamicsArgs;
use crate::config::PartialAnalysisConfig;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use statdyn::{
    core::io::{traits::TrajectoryFile, xyz::XyzFile},
    core::models::trajectory::Trajectory,
    engine::{
        cancel::CancellationToken, features::ThresholdClassifier, progress::ProgressReporter,
        relaxation::RelaxationEstimate,
    },
    workflows::{self, dynamics::DynamicsReport},
};
use tracing::{info, warn};

pub async fn run(args: DynamicsArgs) -> Result<()> {
    let partial_config = PartialAnalysisConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_with_cli(&args)?;

    info!("Indexing trajectory {:?}", &args.input);
    let mut trajectory = XyzFile::open(&args.input).map_err(|e| CliError::Trajectory {
        path: args.input.clone(),
        source: e,
    })?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the current lag before stopping.");
            signal_token.cancel();
        }
    });

    println!(
        "Analyzing {} frames of {} particles...",
        trajectory.frame_count(),
        trajectory.particle_count()
    );
    let result = tokio::task::block_in_place(|| {
        workflows::dynamics::run(&mut trajectory, &config, &reporter, &cancel)
    });
    signal_task.abort();
    let report = result?;

    print_summary(&report);

    let classifier = ThresholdClassifier::new(config.observables.mobility_threshold);
    let written = workflows::export::write_report(&report, &args.output, Some(&classifier))?;
    for path in &written {
        println!("  wrote {}", path.display());
    }

    if report.cancelled {
        warn!("Analysis was interrupted; results cover the completed lags only.");
        println!("Warning: analysis was interrupted; results cover the completed lags only.");
    }
    Ok(())
}

fn print_summary(report: &DynamicsReport) {
    println!(
        "Analyzed {} lag(s), skipped {}.",
        report.statistics.len(),
        report.skipped.len()
    );
    for (name, estimate) in &report.relaxation.estimates {
        let text = match estimate {
            RelaxationEstimate::Crossed { time } => format!("{:.4}", time),
            RelaxationEstimate::AlreadyRelaxed { first_lag } => {
                format!("relaxed before the first lag ({})", first_lag)
            }
            RelaxationEstimate::NotReached { last_lag } => {
                format!("not reached by lag {}", last_lag)
            }
        };
        println!("  tau[{}] = {}", name, text);
    }
    if let Some(diffusion) = report.relaxation.diffusion {
        println!("  D = {:.6e}", diffusion);
    }
}
