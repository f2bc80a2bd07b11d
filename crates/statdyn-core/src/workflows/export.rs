use crate::engine::features::{FeatureError, FeatureTable, Mobility, MobilityClassifier};
use crate::engine::observables::Observable;
use crate::engine::relaxation::RelaxationResult;
use crate::workflows::dynamics::DynamicsReport;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const CURVES_FILE: &str = "curves.csv";
pub const FEATURES_FILE: &str = "features.csv";
pub const SUMMARY_FILE: &str = "relaxation.toml";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),
    #[error("Classification failed: {0}")]
    Feature(#[from] FeatureError),
    #[error("{labels} mobility labels for a table of {rows} particles")]
    LabelCount { labels: usize, rows: usize },
}

/// Writes one row per analyzed lag with every measured observable as a column.
pub fn write_curves_csv<W: Write>(report: &DynamicsReport, writer: W) -> Result<(), ExportError> {
    let observables: Vec<Observable> = Observable::ALL
        .into_iter()
        .filter(|o| report.curve(*o).is_some())
        .collect();

    let mut csv = csv::Writer::from_writer(writer);
    let mut header = vec!["lag".to_string(), "origins".to_string()];
    header.extend(observables.iter().map(|o| o.name().to_string()));
    csv.write_record(&header)?;

    for stats in &report.statistics {
        let mut record = vec![stats.lag.to_string(), stats.origins.to_string()];
        record.extend(
            observables
                .iter()
                .map(|o| o.value(stats).map(|v| v.to_string()).unwrap_or_default()),
        );
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes one row per particle, optionally followed by its mobility label.
pub fn write_features_csv<W: Write>(
    table: &FeatureTable,
    labels: Option<&[Mobility]>,
    writer: W,
) -> Result<(), ExportError> {
    if let Some(labels) = labels {
        if labels.len() != table.rows() {
            return Err(ExportError::LabelCount {
                labels: labels.len(),
                rows: table.rows(),
            });
        }
    }

    let mut csv = csv::Writer::from_writer(writer);
    let mut header = vec!["particle".to_string()];
    header.extend(table.column_names().map(str::to_string));
    if labels.is_some() {
        header.push("mobility".to_string());
    }
    csv.write_record(&header)?;

    for index in 0..table.rows() {
        let mut record = vec![index.to_string()];
        if let Some(row) = table.row(index) {
            record.extend(row.iter().map(|v| v.to_string()));
        }
        if let Some(labels) = labels {
            let label = match labels[index] {
                Mobility::Mobile => "mobile",
                Mobility::Immobile => "immobile",
            };
            record.push(label.to_string());
        }
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    cancelled: bool,
    analyzed_lags: Vec<u64>,
    skipped_lags: Vec<u64>,
    warnings: &'a [String],
    relaxation: &'a RelaxationResult,
}

pub fn relaxation_summary_toml(report: &DynamicsReport) -> Result<String, ExportError> {
    let summary = Summary {
        cancelled: report.cancelled,
        analyzed_lags: report.lags(),
        skipped_lags: report.skipped.iter().map(|s| s.lag).collect(),
        warnings: &report.warnings,
        relaxation: &report.relaxation,
    };
    Ok(toml::to_string(&summary)?)
}

/// Writes the curves, relaxation summary and (when present) feature table into `directory`.
///
/// Returns the paths of the files written.
pub fn write_report(
    report: &DynamicsReport,
    directory: &Path,
    classifier: Option<&dyn MobilityClassifier>,
) -> Result<Vec<PathBuf>, ExportError> {
    fs::create_dir_all(directory)?;
    let mut written = Vec::new();

    let curves_path = directory.join(CURVES_FILE);
    write_curves_csv(report, File::create(&curves_path)?)?;
    written.push(curves_path);

    let summary_path = directory.join(SUMMARY_FILE);
    fs::write(&summary_path, relaxation_summary_toml(report)?)?;
    written.push(summary_path);

    if let Some(table) = &report.features {
        let labels = classifier.map(|c| c.classify(table)).transpose()?;
        let features_path = directory.join(FEATURES_FILE);
        write_features_csv(table, labels.as_deref(), File::create(&features_path)?)?;
        written.push(features_path);
    }

    info!(
        directory = %directory.display(),
        files = written.len(),
        "Wrote analysis results."
    );
    Ok(written)
}
