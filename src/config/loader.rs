//! Loading config files from an ordered set of search roots.
//!
//! A config directory holds a primary file (`config.yaml`) and one
//! subdirectory per group, each containing preset files:
//!
//! ```text
//! configs/
//!   config.yaml
//!   algo/default.yaml  algo/ppo.yaml  algo/sac.yaml
//!   env/default.yaml   env/gym.yaml
//!   exp/ppo.yaml
//! ```
//!
//! Files are found first-found-wins from the highest-priority root.

use super::defaults::{DEFAULTS_KEY, DefaultsEntry, normalize_group, parse_defaults};
use super::node::{ConfigNode, Mapping, Origin};
use super::path::ConfigPath;
use crate::error::{ConfigError, ConfigResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Header that places a preset at the root instead of under its group.
const GLOBAL_PACKAGE_HEADER: &str = "@package _global_";

const EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Default name of the primary config file (without extension).
pub const DEFAULT_CONFIG_NAME: &str = "config";

/// Parse a structured text file into a tree.
pub fn load_base(path: &Path) -> ConfigResult<ConfigNode> {
    let text = read_file(path)?;
    ConfigNode::parse_yaml(&text, &Origin::file(path))
}

fn read_file(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Where config files are searched for.
#[derive(Debug, Clone)]
pub struct ComposePaths {
    /// Config directories in priority order (highest first)
    pub config_dirs: Vec<PathBuf>,
    /// User-level config directory, searched last
    pub user_dir: Option<PathBuf>,
    /// Name of the primary config file
    pub config_name: String,
}

impl Default for ComposePaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ComposePaths {
    /// Discover search paths from environment and defaults.
    pub fn discover() -> Self {
        Self::from_env(|key| std::env::var(key).ok(), dirs::home_dir())
    }

    /// Build search paths from an environment lookup and a home directory.
    pub fn from_env(var: impl Fn(&str) -> Option<String>, home: Option<PathBuf>) -> Self {
        // Config dir: EXPCONF_CONFIG_DIR or ./configs
        let config_dir = var("EXPCONF_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("configs"));

        // User dir: EXPCONF_USER_DIR or ~/.expconf/configs
        let user_dir = var("EXPCONF_USER_DIR")
            .map(PathBuf::from)
            .or_else(|| home.map(|h| h.join(".expconf").join("configs")));

        let config_name = var("EXPCONF_CONFIG_NAME").unwrap_or_else(|| DEFAULT_CONFIG_NAME.to_string());

        Self {
            config_dirs: vec![config_dir],
            user_dir,
            config_name,
        }
    }

    /// Create paths with explicit directories and no user directory.
    pub fn with_dirs(config_dirs: Vec<PathBuf>) -> Self {
        Self {
            config_dirs,
            user_dir: None,
            config_name: DEFAULT_CONFIG_NAME.to_string(),
        }
    }

    /// All roots in priority order.
    pub fn search_roots(&self) -> Vec<PathBuf> {
        self.config_dirs
            .iter()
            .cloned()
            .chain(self.user_dir.clone())
            .collect()
    }
}

/// Where a loaded file's body goes in the composed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Package {
    /// At the root.
    Global,
    /// Under the group's path.
    Group(ConfigPath),
}

/// A parsed config file: its defaults list and its own body.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub origin: Origin,
    pub defaults: Vec<DefaultsEntry>,
    /// Body with `defaults` removed, already placed at its package.
    pub body: ConfigNode,
}

impl ConfigFile {
    /// Parse `text`, placing the body according to `package` unless the
    /// file's header says `# @package _global_`.
    pub fn parse(text: &str, origin: Origin, package: Package) -> ConfigResult<Self> {
        let package = if has_global_header(text) {
            Package::Global
        } else {
            package
        };

        let mut node = ConfigNode::parse_yaml(text, &origin)?;
        let Some(entries) = node.as_mapping_mut() else {
            return Err(ConfigError::parse(&origin, "top level of a config file must be a mapping"));
        };
        let defaults = match entries.remove(DEFAULTS_KEY) {
            Some(list) => parse_defaults(&list, &origin)?,
            None => Vec::new(),
        };

        let body = match package {
            Package::Global => node,
            Package::Group(path) => nest(node, &path, &origin),
        };
        Ok(Self {
            origin,
            defaults,
            body,
        })
    }
}

fn has_global_header(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .take_while(|line| line.is_empty() || line.starts_with('#'))
        .filter_map(|line| line.strip_prefix('#'))
        .any(|comment| comment.trim() == GLOBAL_PACKAGE_HEADER)
}

/// Wrap `node` in mappings so it sits at `path`.
fn nest(node: ConfigNode, path: &ConfigPath, origin: &Origin) -> ConfigNode {
    path.segments().iter().rev().fold(node, |inner, key| {
        let mut wrapper = Mapping::new();
        wrapper.insert(key.clone(), inner);
        ConfigNode::mapping(wrapper, origin.clone())
    })
}

/// Config files across an ordered list of search roots.
#[derive(Debug, Clone)]
pub struct ConfigRepository {
    roots: Vec<PathBuf>,
}

impl ConfigRepository {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn from_paths(paths: &ComposePaths) -> Self {
        Self::new(paths.search_roots())
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Find `relative` (without extension) in the highest-priority root.
    pub fn find_file(&self, relative: &str) -> Option<PathBuf> {
        self.roots.iter().find_map(|root| {
            EXTENSIONS
                .iter()
                .map(|ext| root.join(format!("{}.{}", relative, ext)))
                .find(|path| path.is_file())
        })
    }

    /// Whether any root has a directory for `group`.
    pub fn has_group(&self, group: &str) -> bool {
        let group = normalize_group(group);
        is_relative_name(&group) && self.roots.iter().any(|root| root.join(&group).is_dir())
    }

    /// Every group (directory holding at least one preset), sorted.
    pub fn groups(&self) -> Vec<String> {
        let mut groups = BTreeSet::new();
        for root in &self.roots {
            collect_groups(root, "", &mut groups);
        }
        groups.into_iter().collect()
    }

    /// Preset names available for `group` across all roots, sorted.
    pub fn presets(&self, group: &str) -> Vec<String> {
        let group = normalize_group(group);
        let mut presets = BTreeSet::new();
        for root in &self.roots {
            let Ok(entries) = std::fs::read_dir(root.join(&group)) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if let Some(name) = preset_name(&path) {
                    presets.insert(name);
                }
            }
        }
        presets.into_iter().collect()
    }

    /// Load the primary config file `<name>.yaml`.
    pub fn load_primary(&self, name: &str) -> ConfigResult<ConfigFile> {
        let path = self.find_file(name).ok_or_else(|| ConfigError::Io {
            path: PathBuf::from(format!("{}.yaml", name)),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("primary config not found in search path {:?}", self.roots),
            ),
        })?;
        debug!(path = %path.display(), "Loading primary config");
        ConfigFile::parse(&read_file(&path)?, Origin::file(&path), Package::Global)
    }

    /// Load `preset` of `group`. `selected_in` is where the selection was made.
    pub fn load_preset(&self, group: &str, preset: &str, selected_in: &Origin) -> ConfigResult<ConfigFile> {
        let group = normalize_group(group);
        if !is_relative_name(&group) {
            return Err(ConfigError::MissingGroup {
                group,
                origin: selected_in.clone(),
                reason: "group names must stay inside the config directory".to_string(),
            });
        }
        if !is_relative_name(preset) {
            return Err(ConfigError::parse(
                selected_in,
                format!("invalid preset name '{}' for group '{}'", preset, group),
            ));
        }
        if !self.has_group(&group) {
            return Err(ConfigError::MissingGroup {
                group,
                origin: selected_in.clone(),
                reason: "no such group directory in the config search path".to_string(),
            });
        }
        let Some(path) = self.find_file(&format!("{}/{}", group, preset)) else {
            return Err(ConfigError::MissingPreset {
                available: self.presets(&group),
                group,
                preset: preset.to_string(),
                origin: selected_in.clone(),
            });
        };
        debug!(group = %group, preset = %preset, path = %path.display(), "Loading preset");
        let package = Package::Group(ConfigPath::from_group(&group)?);
        ConfigFile::parse(&read_file(&path)?, Origin::file(&path), package)
    }
}

/// `a` or `a/b`, with no empty, `.` or `..` segments and no backslashes.
fn is_relative_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != ".." && !part.contains('\\'))
}

fn preset_name(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !path.is_file() || !EXTENSIONS.contains(&ext) {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}

fn collect_groups(root: &Path, prefix: &str, groups: &mut BTreeSet<String>) {
    let Ok(entries) = std::fs::read_dir(root.join(prefix)) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let group = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        };
        let has_presets = std::fs::read_dir(&path)
            .map(|entries| entries.flatten().any(|e| preset_name(&e.path()).is_some()))
            .unwrap_or(false);
        if has_presets {
            groups.insert(group.clone());
        }
        collect_groups(root, &group, groups);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scalar;
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_compose_paths_discover() {
        let paths = ComposePaths::discover();
        assert_eq!(paths.config_dirs.len(), 1);
        // user_dir may or may not exist depending on environment
    }

    #[test]
    fn test_compose_paths_from_env_values() {
        let env = |key: &str| match key {
            "EXPCONF_CONFIG_DIR" => Some("/srv/configs".to_string()),
            "EXPCONF_CONFIG_NAME" => Some("train".to_string()),
            "EXPCONF_USER_DIR" => Some("/home/me/presets".to_string()),
            _ => None,
        };
        let paths = ComposePaths::from_env(env, Some(PathBuf::from("/home/me")));
        assert_eq!(paths.config_dirs, vec![PathBuf::from("/srv/configs")]);
        assert_eq!(paths.config_name, "train");
        assert_eq!(paths.user_dir, Some(PathBuf::from("/home/me/presets")));
        assert_eq!(
            paths.search_roots(),
            vec![PathBuf::from("/srv/configs"), PathBuf::from("/home/me/presets")]
        );
    }

    #[test]
    fn test_compose_paths_defaults_without_env() {
        let paths = ComposePaths::from_env(|_| None, Some(PathBuf::from("/home/me")));
        assert_eq!(paths.config_dirs, vec![PathBuf::from("configs")]);
        assert_eq!(paths.config_name, DEFAULT_CONFIG_NAME);
        assert_eq!(paths.user_dir, Some(PathBuf::from("/home/me/.expconf/configs")));

        let paths = ComposePaths::from_env(|_| None, None);
        assert_eq!(paths.user_dir, None);
    }

    #[test]
    fn test_load_base_parses_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "base.yaml", "algo:\n  lr: 0.001\n");
        let node = load_base(&temp.path().join("base.yaml")).unwrap();
        let lr = node.get(&ConfigPath::parse("algo.lr").unwrap()).unwrap();
        assert_eq!(lr.as_scalar(), Some(&Scalar::Float(0.001)));
        assert!(lr.origin().as_str().ends_with("base.yaml"));
    }

    #[test]
    fn test_load_base_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = load_base(&temp.path().join("nope.yaml")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Io);
    }

    #[test]
    fn test_preset_is_placed_under_group() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "algo/ppo.yaml", "name: ppo\nrollout_steps: 128\n");
        let repo = ConfigRepository::new(vec![temp.path().to_path_buf()]);
        let file = repo.load_preset("algo", "ppo", &Origin::inline()).unwrap();
        let name = file.body.get(&ConfigPath::parse("algo.name").unwrap()).unwrap();
        assert_eq!(name.as_scalar(), Some(&Scalar::String("ppo".into())));
    }

    #[test]
    fn test_nested_group_placement() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "env/atari/pong.yml", "frame_skip: 4\n");
        let repo = ConfigRepository::new(vec![temp.path().to_path_buf()]);
        let file = repo.load_preset("/env/atari", "pong", &Origin::inline()).unwrap();
        assert!(file.body.get(&ConfigPath::parse("env.atari.frame_skip").unwrap()).is_some());
        assert_eq!(repo.groups(), vec!["env/atari"]);
    }

    #[test]
    fn test_global_header_places_at_root() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "exp/ppo.yaml",
            "# @package _global_\n\ndefaults:\n  - override /algo: ppo\n  - _self_\n\nseed: 7\n",
        );
        let repo = ConfigRepository::new(vec![temp.path().to_path_buf()]);
        let file = repo.load_preset("exp", "ppo", &Origin::inline()).unwrap();
        assert!(file.body.get(&ConfigPath::parse("seed").unwrap()).is_some());
        assert_eq!(file.defaults.len(), 2);
        assert!(file.body.get(&ConfigPath::parse("defaults").unwrap()).is_none());
    }

    #[test]
    fn test_first_root_wins() {
        let high = TempDir::new().unwrap();
        let low = TempDir::new().unwrap();
        write(high.path(), "algo/ppo.yaml", "name: high\n");
        write(low.path(), "algo/ppo.yaml", "name: low\n");
        write(low.path(), "algo/sac.yaml", "name: sac\n");
        let repo = ConfigRepository::new(vec![high.path().to_path_buf(), low.path().to_path_buf()]);

        let file = repo.load_preset("algo", "ppo", &Origin::inline()).unwrap();
        let name = file.body.get(&ConfigPath::parse("algo.name").unwrap()).unwrap();
        assert_eq!(name.as_scalar(), Some(&Scalar::String("high".into())));
        assert_eq!(repo.presets("algo"), vec!["ppo", "sac"]);
    }

    #[test]
    fn test_missing_group_and_preset() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "algo/ppo.yaml", "name: ppo\n");
        let repo = ConfigRepository::new(vec![temp.path().to_path_buf()]);
        let origin = Origin::new("exp/x.yaml");

        let err = repo.load_preset("optim", "adam", &origin).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingGroup);

        let err = repo.load_preset("algo", "nonexistent_preset", &origin).unwrap_err();
        match err {
            ConfigError::MissingPreset {
                preset,
                available,
                origin,
                ..
            } => {
                assert_eq!(preset, "nonexistent_preset");
                assert_eq!(available, vec!["ppo"]);
                assert_eq!(origin.as_str(), "exp/x.yaml");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_mapping_file_rejected() {
        let err = ConfigFile::parse("- 1\n- 2\n", Origin::inline(), Package::Global).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Parse);
    }

    #[test]
    fn test_names_cannot_leave_the_config_directory() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "configs/algo/ppo.yaml", "name: ppo\n");
        write(temp.path(), "outside.yaml", "secret: 1\n");
        write(temp.path(), "other/x.yaml", "secret: 2\n");
        let repo = ConfigRepository::new(vec![temp.path().join("configs")]);
        let origin = Origin::new("exp/x.yaml");

        let err = repo.load_preset("algo", "../../outside", &origin).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Parse);
        let err = repo.load_preset("../other", "x", &origin).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingGroup);
        assert!(!repo.has_group("../other"));
        assert!(repo.has_group("algo"));
    }
}
