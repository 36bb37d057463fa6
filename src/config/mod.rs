//! Hierarchical experiment configuration.
//!
//! A run configuration is composed from a directory of YAML presets:
//! 1. **Defaults lists** - each file names the group presets it builds on and
//!    where its own body sits in the merge order (`_self_`)
//! 2. **Merge** - later sources override earlier ones key by key; `???`
//!    never erases a value
//! 3. **Command line** - `group=preset` selections and `key=value` edits
//! 4. **References** - `${a.b}` values resolve against the final tree
//! 5. **Validation** - leftover `???` values and schema rules
//!
//! ## Environment Variables
//! - `EXPCONF_CONFIG_DIR` - Config directory (default: `./configs`)
//! - `EXPCONF_CONFIG_NAME` - Primary config name (default: `config`)
//! - `EXPCONF_USER_DIR` - User config dir (default: `~/.expconf/configs`)

mod compose;
mod defaults;
mod interpolation;
mod loader;
mod merge;
mod node;
mod overrides;
mod path;
mod resolve;
mod schema;

pub use compose::{Composer, CompositionPlan, GroupSelection};
pub use defaults::{Choice, DEFAULTS_KEY, DefaultsEntry, OverrideDirective, SELF_MARKER, parse_defaults};
pub use interpolation::{Interpolation, Part};
pub use loader::{ComposePaths, ConfigFile, ConfigRepository, DEFAULT_CONFIG_NAME, Package, load_base};
pub use merge::{apply_override, apply_override_sequence, deep_merge};
pub use node::{ConfigNode, MISSING_MARKER, Mapping, NodeKind, Origin, Scalar};
pub use overrides::{Override, OverrideAction, apply_value_override, parse_overrides};
pub use path::ConfigPath;
pub use resolve::{ResolvedConfig, resolve_references};
pub use schema::{FieldRule, Schema, ValueKind, validate};
