//! abtrack CLI — tracks the ABI compatibility of a library across releases.
//!
//! Provides `abtrack build` to run the incremental pipeline over the versions
//! listed in a profile and `abtrack clear` to drop a library's cache.

#![warn(missing_docs)]

mod build;
mod clear;
mod codes;
mod logging;

use std::path::{Path, PathBuf};
use std::process;

use abtrack_common::Stage;
use clap::{Parser, Subcommand, ValueEnum};

/// Exit status of an interrupted run.
pub const EXIT_INTERRUPTED: i32 = 130;

/// abtrack — ABI compatibility tracker.
#[derive(Parser, Debug)]
#[command(name = "abtrack", version, about = "ABI compatibility tracker")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build (or bring up to date) the artifacts of a library.
    Build(BuildArgs),
    /// Delete every cached artifact and the store of a library.
    Clear(ClearArgs),
}

/// Arguments for the `abtrack build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Path to the library profile (TOML or JSON).
    pub profile: PathBuf,

    /// Regenerate every selected artifact, archival ones included.
    #[arg(long)]
    pub rebuild: bool,

    /// Only process this version (and the pair it is the newer half of).
    #[arg(long = "target-version", value_name = "VERSION")]
    pub target_version: Option<String>,

    /// Stages to run, comma separated; all stages when omitted.
    #[arg(long = "stage", value_delimiter = ',', value_name = "STAGE")]
    pub stages: Vec<Stage>,
}

/// Arguments for the `abtrack clear` subcommand.
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Path to the library profile (TOML or JSON).
    pub profile: PathBuf,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from the environment.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
}

/// Directory relative profile paths are resolved against.
pub(crate) fn profile_dir(profile: &Path) -> PathBuf {
    match profile.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => std::env::var_os("NO_COLOR").is_none() && std::env::var_os("TERM").is_some(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
    };
    logging::init(&global);

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Clear(ref args) => clear::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_build_default() {
        let cli = Cli::parse_from(["abtrack", "build", "libfoo.toml"]);
        match cli.command {
            Command::Build(ref args) => {
                assert_eq!(args.profile, PathBuf::from("libfoo.toml"));
                assert!(!args.rebuild);
                assert!(args.target_version.is_none());
                assert!(args.stages.is_empty());
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn parse_build_with_filters() {
        let cli = Cli::parse_from([
            "abtrack",
            "build",
            "libfoo.toml",
            "--rebuild",
            "--target-version",
            "2.0",
            "--stage",
            "abidump,abireport",
        ]);
        match cli.command {
            Command::Build(ref args) => {
                assert!(args.rebuild);
                assert_eq!(args.target_version.as_deref(), Some("2.0"));
                assert_eq!(args.stages, vec![Stage::AbiDump, Stage::AbiReport]);
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn parse_repeated_stage_flags() {
        let cli = Cli::parse_from(["abtrack", "build", "p.toml", "--stage", "graph", "--stage", "date"]);
        match cli.command {
            Command::Build(ref args) => assert_eq!(args.stages, vec![Stage::Graph, Stage::Date]),
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let err = Cli::try_parse_from(["abtrack", "build", "p.toml", "--stage", "abi"]).unwrap_err();
        assert!(err.to_string().contains("unknown stage 'abi'"));
    }

    #[test]
    fn build_requires_profile() {
        assert!(Cli::try_parse_from(["abtrack", "build"]).is_err());
    }

    #[test]
    fn parse_clear() {
        let cli = Cli::parse_from(["abtrack", "clear", "profiles/libfoo.json"]);
        match cli.command {
            Command::Clear(ref args) => assert_eq!(args.profile, PathBuf::from("profiles/libfoo.json")),
            _ => panic!("expected Clear command"),
        }
    }

    #[test]
    fn profile_dir_of_bare_file_name_is_cwd() {
        assert_eq!(profile_dir(Path::new("libfoo.toml")), PathBuf::from("."));
        assert_eq!(
            profile_dir(Path::new("/work/profiles/libfoo.toml")),
            PathBuf::from("/work/profiles")
        );
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from(["abtrack", "--quiet", "--color", "never", "build", "p.toml"]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.color, ColorChoice::Never);
    }

    #[test]
    fn parse_verbose_after_subcommand() {
        let cli = Cli::parse_from(["abtrack", "build", "p.toml", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.color, ColorChoice::Auto);
    }
}
