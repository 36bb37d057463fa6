//! Output formatting for composed configs and group listings.

use crate::config::ConfigNode;
use anyhow::Result;

/// Output format for composed configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Yaml => write!(f, "yaml"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Render a config tree.
pub fn render(node: &ConfigNode, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => Ok(serde_yaml::to_string(node)?),
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(node)?;
            out.push('\n');
            Ok(out)
        }
    }
}

/// Format groups and their presets as markdown.
pub fn format_groups_markdown(groups: &[(String, Vec<String>)]) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Config groups ({})\n\n", groups.len()));

    for (group, presets) in groups {
        if presets.is_empty() {
            md.push_str(&format!("- **{}**\n", group));
        } else {
            md.push_str(&format!("- **{}**: {}\n", group, presets.join(", ")));
        }
    }

    md
}
