use crate::cli::{DriftRemoval, DynamicsArgs};
use crate::error::{CliError, Result};
use serde::Deserialize;
use statdyn::engine::config as core_config;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const DEFAULT_MOBILITY_THRESHOLD: f64 = 0.3;
const DEFAULT_MIN_ORIGINS: usize = 1;
const DEFAULT_MAX_ORIGINS: usize = 500;
const DEFAULT_FRAME_CACHE_CAPACITY: usize = 64;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialDisplacementConfig {
    dimensions: Option<u8>,
    #[serde(rename = "box-policy")]
    box_policy: Option<core_config::BoxPolicy>,
    #[serde(rename = "remove-drift")]
    remove_drift: Option<bool>,
    /// Number of leading particles to analyze, e.g. the rigid-body centres.
    particles: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialObservableConfig {
    #[serde(rename = "mobility-threshold")]
    mobility_threshold: Option<f64>,
    #[serde(rename = "relaxation-threshold")]
    relaxation_threshold: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", tag = "type", deny_unknown_fields)]
enum PartialLagSpec {
    Explicit {
        values: Vec<u64>,
    },
    Geometric {
        start: u64,
        stop: u64,
        #[serde(rename = "points-per-decade")]
        points_per_decade: u32,
    },
    LinearPerDecade {
        stop: u64,
        #[serde(rename = "num-linear")]
        num_linear: u64,
    },
}

impl From<PartialLagSpec> for core_config::LagSpec {
    fn from(p: PartialLagSpec) -> Self {
        match p {
            PartialLagSpec::Explicit { values } => core_config::LagSpec::Explicit(values),
            PartialLagSpec::Geometric {
                start,
                stop,
                points_per_decade,
            } => core_config::LagSpec::Geometric {
                start,
                stop,
                points_per_decade,
            },
            PartialLagSpec::LinearPerDecade { stop, num_linear } => {
                core_config::LagSpec::LinearPerDecade { stop, num_linear }
            }
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialSamplingConfig {
    #[serde(rename = "min-origins")]
    min_origins: Option<usize>,
    #[serde(rename = "max-origins")]
    max_origins: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialFeatureConfig {
    #[serde(rename = "reference-lag")]
    reference_lag: Option<u64>,
    #[serde(rename = "neighbor-cutoff")]
    neighbor_cutoff: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialResourceConfig {
    #[serde(rename = "frame-cache-capacity")]
    frame_cache_capacity: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialAnalysisConfig {
    displacement: Option<PartialDisplacementConfig>,
    observables: Option<PartialObservableConfig>,
    lags: Option<PartialLagSpec>,
    sampling: Option<PartialSamplingConfig>,
    features: Option<PartialFeatureConfig>,
    resources: Option<PartialResourceConfig>,
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value))
    })
}

impl PartialAnalysisConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn merge_with_cli(mut self, args: &DynamicsArgs) -> Result<core_config::AnalysisConfig> {
        self.apply_set_values(&args.set_values)?;

        let displacement = self.displacement.take().unwrap_or_default();
        let observables = self.observables.take().unwrap_or_default();
        let sampling = self.sampling.take().unwrap_or_default();
        let resources = self.resources.take().unwrap_or_default();

        let dimensions = args.dimensions.or(displacement.dimensions).ok_or_else(|| {
            CliError::Config(
                "`displacement.dimensions` is required either in the config file or via --dimensions."
                    .to_string(),
            )
        })?;
        let lags = self.lags.take().ok_or_else(|| {
            CliError::Config("`lags` section is required.".to_string())
        })?;

        let mut builder = core_config::AnalysisConfigBuilder::new()
            .dimensions(dimensions)
            .box_policy(
                args.box_policy
                    .or(displacement.box_policy)
                    .unwrap_or(core_config::BoxPolicy::OriginBox),
            )
            .particles(
                args.particles
                    .or(displacement.particles)
                    .map_or(core_config::ParticleSelection::All, |count| {
                        core_config::ParticleSelection::Leading(count)
                    }),
            )
            .mobility_threshold(
                args.mobility_threshold
                    .or(observables.mobility_threshold)
                    .unwrap_or(DEFAULT_MOBILITY_THRESHOLD),
            )
            .relaxation_threshold(
                args.relaxation_threshold
                    .or(observables.relaxation_threshold)
                    .unwrap_or_else(|| std::f64::consts::E.recip()),
            )
            .lags(lags.into())
            .min_origins(sampling.min_origins.unwrap_or(DEFAULT_MIN_ORIGINS))
            .max_origins(
                args.max_origins
                    .or(sampling.max_origins)
                    .unwrap_or(DEFAULT_MAX_ORIGINS),
            )
            .frame_cache_capacity(
                resources
                    .frame_cache_capacity
                    .unwrap_or(DEFAULT_FRAME_CACHE_CAPACITY),
            );

        builder = Self::merge_drift(builder, args.drift, displacement.remove_drift);
        builder = Self::merge_features(
            builder,
            args.no_features,
            args.reference_lag,
            self.features.take(),
        )?;

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn merge_drift(
        builder: core_config::AnalysisConfigBuilder,
        cli_flags: DriftRemoval,
        file_val: Option<bool>,
    ) -> core_config::AnalysisConfigBuilder {
        if cli_flags.remove_drift {
            builder.remove_drift(true)
        } else if cli_flags.keep_drift {
            builder.remove_drift(false)
        } else {
            builder.remove_drift(file_val.unwrap_or(false))
        }
    }

    fn merge_features(
        builder: core_config::AnalysisConfigBuilder,
        cli_no_features: bool,
        cli_reference_lag: Option<u64>,
        partial: Option<PartialFeatureConfig>,
    ) -> Result<core_config::AnalysisConfigBuilder> {
        if cli_no_features {
            return Ok(builder.no_features());
        }
        if partial.is_none() && cli_reference_lag.is_none() {
            return Ok(builder.no_features());
        }
        let partial = partial.unwrap_or_default();
        let reference_lag = cli_reference_lag
            .or(partial.reference_lag)
            .ok_or_else(|| CliError::Config("`features` requires `reference-lag`".to_string()))?;
        Ok(builder.features(core_config::FeatureConfig {
            reference_lag,
            neighbor_cutoff: partial.neighbor_cutoff,
        }))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            match key.trim() {
                "displacement.dimensions" => {
                    self.displacement
                        .get_or_insert_with(Default::default)
                        .dimensions = Some(parse_value(key, value_str, "integer")?);
                }
                "displacement.box-policy" => {
                    let policy = value_str
                        .parse()
                        .map_err(|e: core_config::ConfigError| CliError::Config(e.to_string()))?;
                    self.displacement
                        .get_or_insert_with(Default::default)
                        .box_policy = Some(policy);
                }
                "displacement.remove-drift" => {
                    self.displacement
                        .get_or_insert_with(Default::default)
                        .remove_drift = Some(parse_value(key, value_str, "boolean")?);
                }
                "displacement.particles" => {
                    self.displacement
                        .get_or_insert_with(Default::default)
                        .particles = Some(parse_value(key, value_str, "integer")?);
                }
                "observables.mobility-threshold" => {
                    self.observables
                        .get_or_insert_with(Default::default)
                        .mobility_threshold = Some(parse_value(key, value_str, "float")?);
                }
                "observables.relaxation-threshold" => {
                    self.observables
                        .get_or_insert_with(Default::default)
                        .relaxation_threshold = Some(parse_value(key, value_str, "float")?);
                }
                "sampling.min-origins" => {
                    self.sampling
                        .get_or_insert_with(Default::default)
                        .min_origins = Some(parse_value(key, value_str, "integer")?);
                }
                "sampling.max-origins" => {
                    self.sampling
                        .get_or_insert_with(Default::default)
                        .max_origins = Some(parse_value(key, value_str, "integer")?);
                }
                "features.reference-lag" => {
                    self.features
                        .get_or_insert_with(Default::default)
                        .reference_lag = Some(parse_value(key, value_str, "integer")?);
                }
                "features.neighbor-cutoff" => {
                    self.features
                        .get_or_insert_with(Default::default)
                        .neighbor_cutoff = Some(parse_value(key, value_str, "float")?);
                }
                "resources.frame-cache-capacity" => {
                    self.resources
                        .get_or_insert_with(Default::default)
                        .frame_cache_capacity = Some(parse_value(key, value_str, "integer")?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use statdyn::core::utils::geometry::Dimensionality;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    const BASE_CONFIG: &str = r#"
        [displacement]
        dimensions = 2
        box-policy = "averaged-box"

        [observables]
        mobility-threshold = 0.4

        [lags]
        type = "explicit"
        values = [10, 100, 1000]

        [sampling]
        min-origins = 2
        max-origins = 50

        [features]
        reference-lag = 100
        neighbor-cutoff = 1.5
    "#;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("analysis.toml");
        fs::write(&path, content).unwrap();
        path
    }

    fn dynamics_args(config_path: &Path, extra: &[&str]) -> DynamicsArgs {
        let mut args = vec![
            "sdrun".to_string(),
            "dynamics".to_string(),
            "-i".to_string(),
            "traj.xyz".to_string(),
            "-o".to_string(),
            "results".to_string(),
            "-c".to_string(),
            config_path.to_str().unwrap().to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        match Cli::parse_from(args).command {
            Commands::Dynamics(args) => args,
            _ => panic!("Expected 'dynamics' subcommand"),
        }
    }

    fn merged(content: &str, extra: &[&str]) -> Result<core_config::AnalysisConfig> {
        let dir = tempdir().unwrap();
        let path = write_config(&dir, content);
        let args = dynamics_args(&path, extra);
        PartialAnalysisConfig::from_file(&path)?.merge_with_cli(&args)
    }

    #[test]
    fn file_values_are_merged_with_defaults() {
        let config = merged(BASE_CONFIG, &[]).unwrap();
        assert_eq!(config.displacement.dimensions, Dimensionality::Two);
        assert_eq!(
            config.displacement.box_policy,
            core_config::BoxPolicy::AveragedBox
        );
        assert!(!config.displacement.remove_drift);
        assert_eq!(
            config.displacement.particles,
            core_config::ParticleSelection::All
        );
        assert_eq!(config.observables.mobility_threshold, 0.4);
        assert!((config.observables.relaxation_threshold - 0.367_879_441).abs() < 1e-6);
        assert_eq!(config.sampling.lags, vec![10, 100, 1000]);
        assert_eq!(config.sampling.min_origins, 2);
        assert_eq!(config.sampling.max_origins, 50);
        assert_eq!(config.frame_cache_capacity, DEFAULT_FRAME_CACHE_CAPACITY);
        let features = config.features.unwrap();
        assert_eq!(features.reference_lag, 100);
        assert_eq!(features.neighbor_cutoff, Some(1.5));
    }

    #[test]
    fn cli_args_override_file_values() {
        let config = merged(
            BASE_CONFIG,
            &[
                "--dimensions",
                "3",
                "--box-policy",
                "image-flags",
                "--remove-drift",
                "--mobility-threshold",
                "0.25",
                "--max-origins",
                "7",
                "--reference-lag",
                "1000",
            ],
        )
        .unwrap();
        assert_eq!(config.displacement.dimensions, Dimensionality::Three);
        assert_eq!(
            config.displacement.box_policy,
            core_config::BoxPolicy::ImageFlags
        );
        assert!(config.displacement.remove_drift);
        assert_eq!(config.observables.mobility_threshold, 0.25);
        assert_eq!(config.sampling.max_origins, 7);
        assert_eq!(config.features.unwrap().reference_lag, 1000);
    }

    #[test]
    fn no_features_flag_disables_extraction() {
        let config = merged(BASE_CONFIG, &["--no-features"]).unwrap();
        assert!(config.features.is_none());
    }

    #[test]
    fn set_values_override_file_values() {
        let config = merged(
            BASE_CONFIG,
            &[
                "-S",
                "sampling.min-origins=3",
                "-S",
                "resources.frame-cache-capacity=8",
                "-S",
                "displacement.box-policy=origin-box",
            ],
        )
        .unwrap();
        assert_eq!(config.sampling.min_origins, 3);
        assert_eq!(config.frame_cache_capacity, 8);
        assert_eq!(
            config.displacement.box_policy,
            core_config::BoxPolicy::OriginBox
        );
    }

    #[test]
    fn unsupported_set_key_is_rejected() {
        let result = merged(BASE_CONFIG, &["-S", "sampling.stride=3"]);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("sampling.stride")));
        let result = merged(BASE_CONFIG, &["-S", "sampling.min-origins"]);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("KEY=VALUE")));
    }

    #[test]
    fn geometric_lags_are_parsed() {
        let content = r#"
            [displacement]
            dimensions = 3

            [lags]
            type = "geometric"
            start = 1
            stop = 100
            points-per-decade = 1
        "#;
        let config = merged(content, &[]).unwrap();
        assert_eq!(config.sampling.lags, vec![1, 10, 100]);
        assert!(config.features.is_none());
    }

    #[test]
    fn missing_required_values_are_reported() {
        let no_lags = "[displacement]\ndimensions = 3\n";
        assert!(matches!(merged(no_lags, &[]), Err(CliError::Config(msg)) if msg.contains("lags")));

        let no_dimensions = "[lags]\ntype = \"explicit\"\nvalues = [1]\n";
        assert!(
            matches!(merged(no_dimensions, &[]), Err(CliError::Config(msg)) if msg.contains("dimensions"))
        );
    }

    #[test]
    fn unknown_fields_fail_to_parse() {
        let content = "[displacement]\ndimensions = 3\nwrap = true\n";
        assert!(matches!(
            merged(content, &[]),
            Err(CliError::FileParsing { .. })
        ));
    }

    #[test]
    fn misspelled_lag_keys_fail_to_parse() {
        let content = r#"
            [displacement]
            dimensions = 3

            [lags]
            type = "geometric"
            start = 1
            stop = 100
            points-per-decade = 4
            point-per-decade = 8
        "#;
        assert!(matches!(
            merged(content, &[]),
            Err(CliError::FileParsing { .. })
        ));
    }

    #[test]
    fn particle_selection_comes_from_file_set_or_flag() {
        let content = BASE_CONFIG.replace("dimensions = 2", "dimensions = 2\nparticles = 100");
        let config = merged(&content, &[]).unwrap();
        assert_eq!(
            config.displacement.particles,
            core_config::ParticleSelection::Leading(100)
        );

        let config = merged(&content, &["-S", "displacement.particles=64"]).unwrap();
        assert_eq!(
            config.displacement.particles,
            core_config::ParticleSelection::Leading(64)
        );

        let config = merged(
            &content,
            &["-S", "displacement.particles=64", "--particles", "32"],
        )
        .unwrap();
        assert_eq!(
            config.displacement.particles,
            core_config::ParticleSelection::Leading(32)
        );

        assert!(matches!(
            merged(BASE_CONFIG, &["--particles", "0"]),
            Err(CliError::Config(msg)) if msg.contains("particles")
        ));
    }

    #[test]
    fn invalid_values_surface_as_config_errors() {
        let content = BASE_CONFIG.replace("mobility-threshold = 0.4", "mobility-threshold = -1.0");
        assert!(matches!(
            merged(&content, &[]),
            Err(CliError::Config(msg)) if msg.contains("mobility_threshold")
        ));
    }
}
