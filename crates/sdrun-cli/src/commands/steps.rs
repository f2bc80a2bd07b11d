use crate::cli::StepsArgs;
use crate::error::{CliError, Result};
use statdyn::engine::utils::steps::StepSeries;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tracing::info;

pub async fn run(args: StepsArgs) -> Result<()> {
    if args.num_linear == 0 {
        return Err(CliError::Argument(
            "--num-linear must be at least 1".to_string(),
        ));
    }
    if args.max_gen == 0 {
        return Err(CliError::Argument("--max-gen must be at least 1".to_string()));
    }

    let series = StepSeries::new(args.total_steps, args.num_linear, args.gen_steps, args.max_gen);
    info!(
        timesteps = series.len(),
        total_steps = args.total_steps,
        "Generated output step series."
    );

    match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            write_series(&series, args.with_origins, &mut writer)?;
            writer.flush()?;
            println!("Wrote {} timesteps to {}", series.len(), path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            write_series(&series, args.with_origins, &mut writer)?;
        }
    }
    Ok(())
}

fn write_series(series: &StepSeries, with_origins: bool, writer: &mut impl Write) -> io::Result<()> {
    for (timestep, origins) in series.entries() {
        if with_origins {
            let indices: Vec<String> = origins.iter().map(usize::to_string).collect();
            writeln!(writer, "{} {}", timestep, indices.join(","))?;
        } else {
            writeln!(writer, "{}", timestep)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::fs;
    use tempfile::tempdir;

    fn steps_args(extra: &[&str]) -> StepsArgs {
        let mut args = vec!["sdrun", "steps"];
        args.extend_from_slice(extra);
        match Cli::parse_from(args).command {
            Commands::Steps(args) => args,
            _ => panic!("Expected 'steps' subcommand"),
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let args = steps_args(&["--total-steps", "1000"]);
        assert_eq!(args.num_linear, 9);
        assert_eq!(args.gen_steps, 20_000);
        assert_eq!(args.max_gen, 500);
        assert!(args.output.is_none());
    }

    #[test]
    fn single_origin_series_is_log_spaced() {
        let series = StepSeries::new(100, 9, 1000, 500);
        let mut buffer = Vec::new();
        write_series(&series, false, &mut buffer).unwrap();
        let values: Vec<u64> = String::from_utf8(buffer)
            .unwrap()
            .lines()
            .map(|l| l.parse().unwrap())
            .collect();
        let mut expected: Vec<u64> = (0..10).collect();
        expected.extend((1..=10).map(|k| k * 10));
        assert_eq!(values, expected);
    }

    #[test]
    fn origins_are_listed_per_timestep() {
        let series = StepSeries::new(20, 9, 10, 2);
        let mut buffer = Vec::new();
        write_series(&series, true, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.lines().any(|l| l == "10 0,1"));
        assert!(text.lines().any(|l| l == "0 0"));
        assert_eq!(text.lines().last(), Some("20 0,1"));
    }

    #[tokio::test]
    async fn steps_are_written_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("steps.txt");
        let mut args = steps_args(&["--total-steps", "1000", "--gen-steps", "100"]);
        args.output = Some(path.clone());
        run(args).await.unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.starts_with("0\n1\n2\n"));
        assert!(content.trim_end().ends_with("1000"));
    }

    #[tokio::test]
    async fn zero_num_linear_is_rejected() {
        let args = steps_args(&["--total-steps", "10", "--num-linear", "0"]);
        assert!(matches!(run(args).await, Err(CliError::Argument(_))));
    }
}
