//! Template rendering.
//!
//! Templates are Tera documents rendered with the flattened configuration
//! snapshot as their context. On top of Tera's built-in filters (`upper`,
//! `lower`, `trim`, `default`, ...) the helper vocabulary adds:
//!
//! * `isEnabled(value=x)`: true for boolean `true`, integer `1`, or the
//!   strings `"1"`/`"true"` (any case);
//! * the `enabled` test, the same predicate in `{% if x is enabled %}` form.
//!
//! Environment lookups are unavailable: `get_env` fails, so all
//! values reach a template through the snapshot.

use crate::select::{select_sync_config, Fragment, FragmentSet};
use crate::ComposeError;
use reward_config::{is_enabled, ConfigSnapshot};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tera::{Context, Tera, Value};
use tracing::{debug, trace};

/// Renders fragments against one configuration snapshot.
pub struct Renderer {
    tera: Tera,
    context: Context,
}

impl Renderer {
    pub fn new(cfg: &ConfigSnapshot) -> Result<Self, ComposeError> {
        let context = Context::from_value(cfg.template_context()).map_err(|source| {
            ComposeError::TemplateExec {
                name: "<context>".to_owned(),
                source,
            }
        })?;
        Ok(Self {
            tera: engine(),
            context,
        })
    }

    pub fn render(&mut self, fragment: &Fragment) -> Result<String, ComposeError> {
        self.tera
            .add_raw_template(&fragment.name, &fragment.source)
            .map_err(|source| ComposeError::TemplateParse {
                name: fragment.name.clone(),
                source,
            })?;
        self.tera
            .render(&fragment.name, &self.context)
            .map_err(|source| ComposeError::TemplateExec {
                name: fragment.name.clone(),
                source,
            })
    }
}

fn engine() -> Tera {
    let mut tera = Tera::default();
    tera.autoescape_on(Vec::new());
    tera.register_function("isEnabled", is_enabled_fn);
    tera.register_tester("enabled", enabled_test);
    tera.register_function("get_env", refuse_env);
    tera
}

fn is_enabled_fn(args: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::Bool(args.get("value").is_some_and(is_enabled)))
}

fn enabled_test(value: Option<&Value>, _args: &[Value]) -> tera::Result<bool> {
    Ok(value.is_some_and(is_enabled))
}

fn refuse_env(_args: &HashMap<String, Value>) -> tera::Result<Value> {
    Err(tera::Error::msg(
        "environment lookups are not available in templates",
    ))
}

/// One rendered, parsed fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFragment {
    pub name: String,
    pub document: serde_yaml::Value,
}

impl RenderedFragment {
    pub fn to_yaml(&self) -> Result<String, ComposeError> {
        serde_yaml::to_string(&self.document).map_err(|source| ComposeError::Yaml {
            name: self.name.clone(),
            source,
        })
    }
}

/// Rendered fragments in merge order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composition {
    fragments: Vec<RenderedFragment>,
}

impl Composition {
    pub fn fragments(&self) -> &[RenderedFragment] {
        &self.fragments
    }

    pub fn names(&self) -> Vec<&str> {
        self.fragments.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

fn is_blank(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .all(|l| l.is_empty() || l.starts_with('#'))
}

/// Render and parse every fragment of `set`. Fragments that render to an
/// empty document are dropped.
pub fn render_fragments(
    set: &FragmentSet,
    cfg: &ConfigSnapshot,
) -> Result<Composition, ComposeError> {
    let mut renderer = Renderer::new(cfg)?;
    let mut fragments = Vec::with_capacity(set.len());
    for fragment in set {
        let mut text = renderer.render(fragment)?;
        text.push('\n');
        if is_blank(&text) {
            debug!(template = %fragment.name, "rendered empty, skipping");
            continue;
        }
        let document: serde_yaml::Value =
            serde_yaml::from_str(&text).map_err(|source| ComposeError::Yaml {
                name: fragment.name.clone(),
                source,
            })?;
        if document.is_null() {
            continue;
        }
        trace!(template = %fragment.name, "rendered");
        fragments.push(RenderedFragment {
            name: fragment.name.clone(),
            document,
        });
    }
    Ok(Composition { fragments })
}

/// Write the per-project sync configuration to `path` unless it exists.
/// Returns whether a file was written.
pub fn render_sync_config(cfg: &ConfigSnapshot, path: &Path) -> Result<bool, ComposeError> {
    if path.exists() {
        trace!(path = %path.display(), "sync configuration present");
        return Ok(false);
    }
    let set = select_sync_config(cfg.env_type()?, cfg.os());
    let mut renderer = Renderer::new(cfg)?;
    let mut out = String::new();
    for fragment in &set {
        out.push_str(&renderer.render(fragment)?);
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, out)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o640))?;
    }
    debug!(path = %path.display(), "sync configuration written");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::FragmentOrigin;
    use reward_config::{HostOs, Platform};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn cfg(values: &[(&str, Value)]) -> ConfigSnapshot {
        let values: BTreeMap<String, Value> = values
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        ConfigSnapshot::new(
            PathBuf::from("/work/shop"),
            PathBuf::from("/home/dev/.reward"),
            Platform::new(HostOs::Linux, "amd64", false),
            values,
        )
    }

    fn fragment(name: &str, source: &str) -> Fragment {
        Fragment {
            name: name.to_owned(),
            origin: FragmentOrigin::Embedded,
            source: source.to_owned(),
        }
    }

    fn render_one(values: &[(&str, Value)], source: &str) -> Result<String, ComposeError> {
        Renderer::new(&cfg(values))?.render(&fragment("t.yml", source))
    }

    #[test]
    fn is_enabled_helper_and_test() {
        let source = "{{ isEnabled(value=a) }} {{ isEnabled(value=b) }} \
                      {% if c is enabled %}c{% endif %}{% if d is enabled %}d{% endif %}\
                      {% if missing is enabled %}m{% endif %}";
        let out = render_one(
            &[
                ("a", json!("TRUE")),
                ("b", json!("yes")),
                ("c", json!(1)),
                ("d", json!(2)),
            ],
            source,
        )
        .unwrap();
        assert_eq!(out, "true false c");
    }

    #[test]
    fn string_helpers_are_available() {
        let out = render_one(
            &[("name", json!("  Shop "))],
            "{{ name | trim | lower }}-{{ other | default(value='x') | upper }}",
        )
        .unwrap();
        assert_eq!(out, "shop-X");
    }

    #[test]
    fn environment_lookup_is_refused() {
        let err = render_one(&[], "{{ get_env(name='HOME') }}").unwrap_err();
        assert!(matches!(err, ComposeError::TemplateExec { ref name, .. } if name == "t.yml"));
    }

    #[test]
    fn parse_error_names_the_fragment() {
        let err = render_one(&[], "{% if %}").unwrap_err();
        match err {
            ComposeError::TemplateParse { name, .. } => assert_eq!(name, "t.yml"),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn empty_fragments_are_dropped() {
        let mut set = FragmentSet::new();
        set.push(fragment("a.yml", "services:\n  a:\n    image: x\n"));
        set.push(fragment("b.yml", "{% if off is enabled %}services: {}{% endif %}"));
        set.push(fragment("c.yml", "# only a comment\n"));
        let composition = render_fragments(&set, &cfg(&[])).unwrap();
        assert_eq!(composition.names(), vec!["a.yml"]);
        let yaml = composition.fragments()[0].to_yaml().unwrap();
        assert!(yaml.contains("image: x"));
    }

    #[test]
    fn invalid_yaml_names_the_fragment() {
        let mut set = FragmentSet::new();
        set.push(fragment("bad.yml", "services: [unclosed\n"));
        match render_fragments(&set, &cfg(&[])).unwrap_err() {
            ComposeError::Yaml { name, .. } => assert_eq!(name, "bad.yml"),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn sync_config_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".reward/mutagen.yml");
        let snapshot = cfg(&[("reward_env_type", json!("magento2"))]);

        assert!(render_sync_config(&snapshot, &path).unwrap());
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("two-way-resolved"));
        assert!(written.contains("/.reward"));

        fs::write(&path, "custom\n").unwrap();
        assert!(!render_sync_config(&snapshot, &path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "custom\n");
    }
}
