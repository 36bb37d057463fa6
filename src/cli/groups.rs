//! Groups subcommand for expconf

use crate::config::ComposePaths;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the groups subcommand
#[derive(Args, Debug)]
pub struct GroupsArgs {
    /// Config directory; repeat to search several
    #[arg(short = 'd', long, value_name = "DIR")]
    pub config_dir: Vec<PathBuf>,
}

impl GroupsArgs {
    pub fn paths(&self) -> ComposePaths {
        let mut paths = ComposePaths::discover();
        if !self.config_dir.is_empty() {
            paths.config_dirs = self.config_dir.clone();
        }
        paths
    }
}
