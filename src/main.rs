//! expconf
//!
//! Composes experiment configurations from a directory of YAML presets and
//! prints the resolved result.

use anyhow::{Context, Result, bail};
use clap::Parser;
use expconf::cli::compose::ComposeArgs;
use expconf::cli::groups::GroupsArgs;
use expconf::cli::{Cli, Command};
use expconf::config::{Composer, ConfigRepository, Schema, parse_overrides};
use expconf::format::{format_groups_markdown, render};
use expconf::logging::{LogTarget, init_logging};
use tracing::{debug, info};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LogTarget::parse(&cli.log), cli.verbose)?;

    match cli.command {
        Command::Compose(args) => run_compose(args),
        Command::Groups(args) => run_groups(args),
    }
}

fn run_compose(args: ComposeArgs) -> Result<()> {
    let paths = args.paths();
    let repo = ConfigRepository::from_paths(&paths);
    debug!(roots = ?repo.roots(), config_name = %paths.config_name, "Composing");

    let overrides = parse_overrides(&args.overrides)?;
    let schema = args
        .schema
        .as_deref()
        .map(Schema::load)
        .transpose()
        .context("Failed to load schema")?;

    let composer = Composer::new(repo);
    let config = composer.compose_validated(&paths.config_name, &overrides, schema.as_ref())?;
    info!(
        config_name = %paths.config_name,
        overrides = overrides.len(),
        "Composed configuration"
    );

    let node = match &args.select {
        Some(path) => config.require(path)?,
        None => config.root(),
    };
    print!("{}", render(node, args.format)?);
    Ok(())
}

fn run_groups(args: GroupsArgs) -> Result<()> {
    let repo = ConfigRepository::from_paths(&args.paths());
    let groups: Vec<(String, Vec<String>)> = repo
        .groups()
        .into_iter()
        .map(|group| {
            let presets = repo.presets(&group);
            (group, presets)
        })
        .collect();

    if groups.is_empty() {
        bail!("No config groups found in {:?}", repo.roots());
    }
    print!("{}", format_groups_markdown(&groups));
    Ok(())
}
