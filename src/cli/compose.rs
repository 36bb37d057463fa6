//! Compose subcommand for expconf

use crate::config::ComposePaths;
use crate::format::OutputFormat;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the compose subcommand
#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Config directory; repeat to search several, highest priority first
    #[arg(short = 'd', long, value_name = "DIR")]
    pub config_dir: Vec<PathBuf>,

    /// Primary config file name without extension (default: config)
    #[arg(short = 'n', long, value_name = "NAME")]
    pub config_name: Option<String>,

    /// Schema file to validate the resolved config against
    #[arg(short, long, value_name = "FILE")]
    pub schema: Option<PathBuf>,

    /// Output format: yaml (default) or json
    #[arg(short, long, default_value = "yaml", value_name = "FORMAT", value_parser = parse_format)]
    pub format: OutputFormat,

    /// Print only the subtree at this dotted path
    #[arg(long, value_name = "PATH")]
    pub select: Option<String>,

    /// Overrides: group=preset, key=value, +key=value, ++key=value, ~key
    #[arg(value_name = "OVERRIDE", allow_hyphen_values = true)]
    pub overrides: Vec<String>,
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    OutputFormat::from_str(s).ok_or_else(|| format!("Invalid format '{}'. Valid options: yaml, json", s))
}

impl ComposeArgs {
    /// Search paths: explicit flags replace the discovered environment values.
    pub fn paths(&self) -> ComposePaths {
        self.apply_to(ComposePaths::discover())
    }

    pub fn apply_to(&self, mut paths: ComposePaths) -> ComposePaths {
        if !self.config_dir.is_empty() {
            paths.config_dirs = self.config_dir.clone();
        }
        if let Some(name) = &self.config_name {
            paths.config_name = name.clone();
        }
        paths
    }
}
