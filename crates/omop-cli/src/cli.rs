//! CLI argument definitions for the migration tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use colorchoice_clap::Color;
use omop_cli::commands::Phases;

#[derive(Parser)]
#[command(
    name = "omop-forge",
    version,
    about = "MIMIC-IV to OMOP CDM migration",
    long_about = "Migrate MIMIC-IV-shaped EHR extracts into the OMOP Common Data Model.\n\n\
                  Builds the lookup vocabulary (Athena reference plus fuzzy-matched\n\
                  custom mappings), stages the source CSVs, runs the entity-mapping\n\
                  transform, and unloads the CDM tables as CSV delivery files."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for warnings only).
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the migration described by a TOML run configuration.
    Run(RunArgs),

    /// List the source tables the import phase understands.
    Tables,
}

#[derive(Parser)]
pub struct RunArgs {
    /// Path to the TOML run configuration.
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Build the lookup vocabulary (reference load + custom build).
    #[arg(long = "lookup")]
    pub lookup: bool,

    /// Import the source extract CSVs into staging.
    #[arg(long = "import")]
    pub import: bool,

    /// Run the entity-mapping transform.
    #[arg(long = "etl")]
    pub etl: bool,

    /// Unload the CDM and vocabulary tables into the delivery directory.
    #[arg(long = "unload")]
    pub unload: bool,
}

impl RunArgs {
    /// No explicit phase flag means all phases.
    pub fn phases(&self) -> Phases {
        let any = self.lookup || self.import || self.etl || self.unload;
        if any {
            Phases {
                lookup: self.lookup,
                import: self.import,
                etl: self.etl,
                unload: self.unload,
            }
        } else {
            Phases::ALL
        }
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(flags: &[&str]) -> RunArgs {
        let mut argv = vec!["omop-forge", "run", "run.toml"];
        argv.extend(flags);
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Run(args) => args,
            Command::Tables => unreachable!(),
        }
    }

    #[test]
    fn no_phase_flags_means_all_phases() {
        let phases = args(&[]).phases();
        assert!(phases.lookup && phases.import && phases.etl && phases.unload);
    }

    #[test]
    fn explicit_flags_select_only_those_phases() {
        let phases = args(&["--lookup", "--etl"]).phases();
        assert!(phases.lookup);
        assert!(!phases.import);
        assert!(phases.etl);
        assert!(!phases.unload);
    }
}
