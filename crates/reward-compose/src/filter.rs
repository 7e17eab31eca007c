//! Presentation cleanup for composer output shown to the user.

use regex::Regex;
use std::sync::LazyLock;

static DELEGATION_LINES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        "--file",
        "--project-name",
        "--project-directory",
        "default: docker-compose.yml",
        "default: directory name",
    ]
    .iter()
    .map(|needle| {
        Regex::new(&format!(r"(?m)[\r\n]+^.*{}.*$", regex::escape(needle)))
            .expect("delegation pattern is valid")
    })
    .collect()
});

/// Hides the fact that commands are delegated to the composer: help lines
/// for the flags Reward sets itself are removed and the composer's name is
/// replaced with `env`.
#[derive(Debug, Clone)]
pub struct OutputFilter {
    replacement: String,
}

impl Default for OutputFilter {
    fn default() -> Self {
        Self {
            replacement: "env".to_owned(),
        }
    }
}

impl OutputFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, raw: &str) -> String {
        let mut out = raw.to_owned();
        for re in DELEGATION_LINES.iter() {
            out = re.replace_all(&out, "").into_owned();
        }
        out.replace("docker-compose", &self.replacement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELP: &str = "Define and run multi-container applications with Docker.

Usage:
  docker-compose [-f <arg>...] [options] [COMMAND] [ARGS...]

Options:
  -f, --file FILE             Specify an alternate compose file
                              (default: docker-compose.yml)
  -p, --project-name NAME     Specify an alternate project name
                              (default: directory name)
  --verbose                   Show more output
  --project-directory PATH    Specify an alternate working directory
";

    #[test]
    fn strips_delegated_flags_and_renames() {
        let out = OutputFilter::new().apply(HELP);
        assert!(!out.contains("--file"));
        assert!(!out.contains("--project-name"));
        assert!(!out.contains("--project-directory"));
        assert!(!out.contains("default:"));
        assert!(!out.contains("docker-compose"));
        assert!(out.contains("env [-f <arg>...] [options]"));
        assert!(out.contains("--verbose"));
    }

    #[test]
    fn unrelated_output_is_untouched() {
        let text = "Creating network shop_default\nStarting php-fpm ... done\n";
        assert_eq!(OutputFilter::new().apply(text), text);
    }
}
