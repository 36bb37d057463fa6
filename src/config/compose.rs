//! Composition of a run configuration from a config directory.
//!
//! 1. **Selection** - walk the primary file's defaults list depth-first,
//!    loading each selected preset and its own defaults. `override` directives
//!    found anywhere in the tree, then command-line `group=preset` arguments,
//!    change which preset a declared group loads. The walk repeats until the
//!    set of file overrides stops changing; presets that fail to load only
//!    count in the final walk.
//! 2. **Merge** - every file contributes its defaults in list order with its
//!    own body at the `_self_` position (end of list when absent); the bodies
//!    are folded with [`apply_override_sequence`].
//! 3. **Command-line values** - `a.b=v`, `+a.b=v`, `++a.b=v`, `~a.b`.
//! 4. **Resolution** - `${...}` references, then optional validation.

use super::defaults::{Choice, DefaultsEntry, OverrideDirective, normalize_group};
use super::loader::{ConfigFile, ConfigRepository};
use super::merge::apply_override_sequence;
use super::node::{ConfigNode, Origin};
use super::overrides::{Override, OverrideAction, apply_value_override};
use super::resolve::{ResolvedConfig, resolve_references};
use super::schema::{Schema, validate};
use crate::error::{ConfigError, ConfigResult};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Upper bound on selection passes before giving up on convergence.
const MAX_SELECTION_PASSES: usize = 16;

/// The preset chosen for one group after all overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSelection {
    pub group: String,
    pub choice: Choice,
    /// File that declared the group in its defaults list
    pub declared_in: Origin,
    /// File or argument that made the final choice
    pub chosen_by: Origin,
}

/// Outcome of the selection and merge phases, before command-line values
/// and reference resolution.
#[derive(Debug, Clone)]
pub struct CompositionPlan {
    /// Groups in declaration order.
    pub selections: Vec<GroupSelection>,
    /// Partial trees in merge order.
    pub sources: Vec<ConfigNode>,
}

impl CompositionPlan {
    pub fn selection(&self, group: &str) -> Option<&GroupSelection> {
        self.selections.iter().find(|s| s.group == group)
    }

    /// Origins of the merged bodies, lowest precedence first.
    pub fn merge_order(&self) -> Vec<&Origin> {
        self.sources.iter().map(ConfigNode::origin).collect()
    }

    /// Fold the sources into one tree.
    pub fn merged(&self) -> ConfigNode {
        match self.sources.split_first() {
            Some((base, rest)) => apply_override_sequence(base, rest),
            None => ConfigNode::empty(Origin::inline()),
        }
    }
}

/// Composes run configurations from a [`ConfigRepository`].
#[derive(Debug, Clone)]
pub struct Composer {
    repo: ConfigRepository,
}

impl Composer {
    pub fn new(repo: ConfigRepository) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &ConfigRepository {
        &self.repo
    }

    /// Compose, apply command-line values and resolve references.
    pub fn compose(&self, config_name: &str, overrides: &[Override]) -> ConfigResult<ResolvedConfig> {
        let tree = self.compose_unresolved(config_name, overrides)?;
        resolve_references(tree)
    }

    /// [`Composer::compose`] followed by validation.
    pub fn compose_validated(
        &self,
        config_name: &str,
        overrides: &[Override],
        schema: Option<&Schema>,
    ) -> ConfigResult<ResolvedConfig> {
        validate(self.compose(config_name, overrides)?, schema)
    }

    /// Merged tree with command-line values applied, references untouched.
    pub fn compose_unresolved(&self, config_name: &str, overrides: &[Override]) -> ConfigResult<ConfigNode> {
        let (group_overrides, value_overrides) = self.split_overrides(overrides);
        let plan = self.plan_with(config_name, &group_overrides)?;
        let mut tree = plan.merged();
        for ov in value_overrides {
            apply_value_override(&mut tree, ov)?;
        }
        Ok(tree)
    }

    /// Run the selection and merge phases.
    pub fn plan(&self, config_name: &str, overrides: &[Override]) -> ConfigResult<CompositionPlan> {
        let (group_overrides, _) = self.split_overrides(overrides);
        self.plan_with(config_name, &group_overrides)
    }

    /// Separate group selections from value overrides. A key names a group
    /// when the repository has a directory for it.
    fn split_overrides<'o>(&self, overrides: &'o [Override]) -> (Vec<&'o Override>, Vec<&'o Override>) {
        overrides.iter().partition(|ov| {
            ov.action != OverrideAction::Delete && self.repo.has_group(&ov.key)
        })
    }

    fn plan_with(&self, config_name: &str, group_overrides: &[&Override]) -> ConfigResult<CompositionPlan> {
        let mut primary = self.repo.load_primary(config_name)?;

        // `+group=preset` appends a new group to the primary defaults list;
        // `++group=preset` does so only when no file declares the group
        let mut cli_choices = BTreeMap::new();
        let mut forced = Vec::new();
        for ov in group_overrides {
            let group = normalize_group(&ov.key);
            let choice = Choice::parse(ov.value.as_deref().unwrap_or_default());
            match ov.action {
                OverrideAction::Add => primary.defaults.push(DefaultsEntry::Group {
                    group: group.clone(),
                    choice: choice.clone(),
                }),
                OverrideAction::ForceSet => forced.push((group.clone(), choice.clone())),
                OverrideAction::Set | OverrideAction::Delete => {}
            }
            cli_choices.insert(
                group.clone(),
                OverrideDirective {
                    group,
                    choice,
                    origin: ov.origin(),
                },
            );
        }

        let mut cache = FileCache::default();
        let mut selection = self.select(&primary, &cli_choices, &mut cache)?;

        let undeclared: Vec<_> = forced
            .into_iter()
            .filter(|(group, _)| selection.selection(group).is_none())
            .collect();
        if !undeclared.is_empty() {
            for (group, choice) in undeclared {
                primary.defaults.push(DefaultsEntry::Group { group, choice });
            }
            selection = self.select(&primary, &cli_choices, &mut cache)?;
        }

        selection.check_overrides(&cli_choices)?;
        selection.finish()
    }

    /// Repeat the defaults walk until the file overrides it discovers stop
    /// changing. Preset load failures only count once the walk has converged,
    /// so a default that an `override` replaces is never required to exist.
    fn select(
        &self,
        primary: &ConfigFile,
        cli_choices: &BTreeMap<String, OverrideDirective>,
        cache: &mut FileCache,
    ) -> ConfigResult<Selection> {
        let mut file_overrides: Vec<OverrideDirective> = Vec::new();

        for pass in 0..MAX_SELECTION_PASSES {
            let mut walk = Walk::new(&file_overrides, cli_choices);
            self.walk(primary, &mut walk, cache)?;

            if walk.found_overrides == file_overrides {
                debug!(passes = pass + 1, "Defaults selection converged");
                if let Some(err) = walk.deferred {
                    return Err(err);
                }
                return Ok(Selection {
                    selections: walk.selections,
                    found_overrides: walk.found_overrides,
                    sources: walk.sources,
                });
            }
            if let Some(err) = &walk.deferred {
                debug!(error = %err, pass = pass + 1, "Preset load failed before selection converged");
            }
            let found = walk.found_overrides;
            file_overrides = found;
        }

        Err(ConfigError::invalid_override(
            &primary.origin.to_string(),
            "override directives keep changing which presets are selected",
        ))
    }

    /// Expand `file`: its defaults in order, its body at `_self_`.
    fn walk(&self, file: &ConfigFile, walk: &mut Walk<'_>, cache: &mut FileCache) -> ConfigResult<()> {
        let mut self_merged = false;

        for entry in &file.defaults {
            match entry {
                DefaultsEntry::SelfMarker => {
                    walk.sources.push(file.body.clone());
                    self_merged = true;
                }
                DefaultsEntry::Override { group, choice } => {
                    walk.record_override(OverrideDirective {
                        group: group.clone(),
                        choice: choice.clone(),
                        origin: file.origin.clone(),
                    });
                }
                DefaultsEntry::Group { group, choice } => {
                    let selection = walk.declare(group, choice, &file.origin)?;
                    if let Choice::Preset(preset) = &selection.choice {
                        match cache.load(&self.repo, group, preset, &selection.chosen_by) {
                            Ok(preset_file) => self.walk(&preset_file, walk, cache)?,
                            Err(err) => walk.defer(err),
                        }
                    }
                }
            }
        }

        if !self_merged {
            walk.sources.push(file.body.clone());
        }
        Ok(())
    }
}

/// Loaded preset files, kept across selection passes.
#[derive(Default)]
struct FileCache {
    files: HashMap<(String, String), ConfigFile>,
}

impl FileCache {
    fn load(
        &mut self,
        repo: &ConfigRepository,
        group: &str,
        preset: &str,
        selected_in: &Origin,
    ) -> ConfigResult<ConfigFile> {
        let key = (group.to_string(), preset.to_string());
        if let Some(file) = self.files.get(&key) {
            return Ok(file.clone());
        }
        let file = repo.load_preset(group, preset, selected_in)?;
        self.files.insert(key, file.clone());
        Ok(file)
    }
}

/// State of one selection pass.
struct Walk<'p> {
    /// File overrides found by the previous pass, in discovery order.
    file_overrides: &'p [OverrideDirective],
    cli_choices: &'p BTreeMap<String, OverrideDirective>,
    selections: Vec<GroupSelection>,
    found_overrides: Vec<OverrideDirective>,
    sources: Vec<ConfigNode>,
    /// First preset that failed to load in this pass.
    deferred: Option<ConfigError>,
}

impl<'p> Walk<'p> {
    fn new(
        file_overrides: &'p [OverrideDirective],
        cli_choices: &'p BTreeMap<String, OverrideDirective>,
    ) -> Self {
        Self {
            file_overrides,
            cli_choices,
            selections: Vec::new(),
            found_overrides: Vec::new(),
            sources: Vec::new(),
            deferred: None,
        }
    }

    /// Declare `group` and work out its effective choice: the command line
    /// wins, then the last file override, then the declared default.
    fn declare(&mut self, group: &str, declared: &Choice, declared_in: &Origin) -> ConfigResult<GroupSelection> {
        if let Some(existing) = self.selections.iter().find(|s| s.group == group) {
            return Err(ConfigError::DuplicateGroup {
                group: group.to_string(),
                first: existing.declared_in.clone(),
                origin: declared_in.clone(),
            });
        }

        let file_override = self.file_overrides.iter().rev().find(|o| o.group == group);
        let (choice, chosen_by) = match (self.cli_choices.get(group), file_override) {
            (Some(cli), _) => (cli.choice.clone(), cli.origin.clone()),
            (None, Some(file)) => (file.choice.clone(), file.origin.clone()),
            (None, None) => (declared.clone(), declared_in.clone()),
        };

        let selection = GroupSelection {
            group: group.to_string(),
            choice,
            declared_in: declared_in.clone(),
            chosen_by,
        };
        self.selections.push(selection.clone());
        Ok(selection)
    }

    fn record_override(&mut self, directive: OverrideDirective) {
        self.found_overrides.push(directive);
    }

    fn defer(&mut self, err: ConfigError) {
        if self.deferred.is_none() {
            self.deferred = Some(err);
        }
    }
}

/// Result of a converged selection walk.
struct Selection {
    selections: Vec<GroupSelection>,
    found_overrides: Vec<OverrideDirective>,
    sources: Vec<ConfigNode>,
}

impl Selection {
    fn selection(&self, group: &str) -> Option<&GroupSelection> {
        self.selections.iter().find(|s| s.group == group)
    }

    /// Every override must target a group declared somewhere in the tree.
    fn check_overrides(&self, cli_choices: &BTreeMap<String, OverrideDirective>) -> ConfigResult<()> {
        for directive in self.found_overrides.iter().chain(cli_choices.values()) {
            if self.selection(&directive.group).is_none() {
                return Err(ConfigError::MissingGroup {
                    group: directive.group.clone(),
                    origin: directive.origin.clone(),
                    reason: format!(
                        "the group is not in the defaults list; add it with '+{}=<preset>'",
                        directive.group
                    ),
                });
            }
        }
        Ok(())
    }

    fn finish(self) -> ConfigResult<CompositionPlan> {
        if let Some(unset) = self.selections.iter().find(|s| s.choice == Choice::Mandatory) {
            return Err(ConfigError::MandatoryGroup {
                group: unset.group.clone(),
                origin: unset.chosen_by.clone(),
            });
        }
        Ok(CompositionPlan {
            selections: self.selections,
            sources: self.sources,
        })
    }
}
