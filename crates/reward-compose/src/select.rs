//! Fragment selection.
//!
//! A fragment is named by its path relative to the template root, e.g.
//! `templates/docker-compose/environments/includes/db.base.yml`. Each name
//! resolves from the project's `.reward/` directory first, then the
//! application home, then the embedded assets. The first fragment added
//! under a name wins; later additions of the same name are ignored.

use crate::{assets, ComposeError};
use reward_config::{ConfigSnapshot, EnvType, Feature, HostOs, APP_NAME};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

const ENVIRONMENTS: &str = "templates/docker-compose/environments";
const SERVICES: &str = "templates/docker-compose/common-services/docker-compose.yml";

/// Where a fragment's source text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOrigin {
    Project(PathBuf),
    Home(PathBuf),
    Embedded,
}

#[derive(Debug, Clone)]
pub struct Fragment {
    pub name: String,
    pub origin: FragmentOrigin,
    pub source: String,
}

/// Override directories searched before the embedded assets.
#[derive(Debug, Clone, Default)]
pub struct TemplateSources {
    project: Option<PathBuf>,
    home: Option<PathBuf>,
}

impl TemplateSources {
    pub fn new(project: Option<PathBuf>, home: Option<PathBuf>) -> Self {
        Self { project, home }
    }

    /// `<cwd>/.reward` and the application home of `cfg`.
    pub fn for_snapshot(cfg: &ConfigSnapshot) -> Self {
        Self::new(Some(cfg.local_dir()), Some(cfg.app_home().to_path_buf()))
    }

    pub fn embedded_only() -> Self {
        Self::default()
    }

    fn local(&self, name: &str) -> Result<Option<Fragment>, ComposeError> {
        let candidates: [(Option<&Path>, fn(PathBuf) -> FragmentOrigin); 2] = [
            (self.project.as_deref(), FragmentOrigin::Project),
            (self.home.as_deref(), FragmentOrigin::Home),
        ];
        for (dir, origin) in candidates {
            let Some(dir) = dir else { continue };
            let path = join_slashed(dir, name);
            if !path.is_file() {
                trace!(template = name, dir = %dir.display(), "no override");
                continue;
            }
            let source = fs::read_to_string(&path).map_err(|source| ComposeError::Override {
                path: path.clone(),
                source,
            })?;
            return Ok(Some(Fragment {
                name: name.to_owned(),
                origin: origin(path),
                source,
            }));
        }
        Ok(None)
    }

    fn resolve(&self, name: &str) -> Result<Option<Fragment>, ComposeError> {
        if let Some(found) = self.local(name)? {
            return Ok(Some(found));
        }
        Ok(assets::embedded(name).map(|source| Fragment {
            name: name.to_owned(),
            origin: FragmentOrigin::Embedded,
            source: source.to_owned(),
        }))
    }
}

fn join_slashed(dir: &Path, name: &str) -> PathBuf {
    name.split('/').fold(dir.to_path_buf(), |p, part| p.join(part))
}

/// Ordered, name-unique list of fragments.
#[derive(Debug, Clone, Default)]
pub struct FragmentSet {
    fragments: Vec<Fragment>,
    seen: HashSet<String>,
}

impl FragmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `fragment` unless one with the same name is already present.
    pub fn push(&mut self, fragment: Fragment) -> bool {
        if !self.seen.insert(fragment.name.clone()) {
            trace!(template = %fragment.name, "already selected, skipping");
            return false;
        }
        self.fragments.push(fragment);
        true
    }

    pub fn names(&self) -> Vec<&str> {
        self.fragments.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    fn add(&mut self, sources: &TemplateSources, name: &str) -> Result<(), ComposeError> {
        if self.seen.contains(name) {
            return Ok(());
        }
        if let Some(fragment) = sources.resolve(name)? {
            self.push(fragment);
        }
        Ok(())
    }

    fn add_local(&mut self, sources: &TemplateSources, name: &str) -> Result<(), ComposeError> {
        if self.seen.contains(name) {
            return Ok(());
        }
        if let Some(fragment) = sources.local(name)? {
            self.push(fragment);
        }
        Ok(())
    }

    /// Shared include, then the type-specific variant, each as a base file
    /// followed by an OS-specific one.
    fn add_partial(
        &mut self,
        sources: &TemplateSources,
        partial: &str,
        env_type: EnvType,
        os: HostOs,
    ) -> Result<(), ComposeError> {
        for dir in ["includes", env_type.as_str()] {
            for suffix in ["base", os.as_str()] {
                self.add(sources, &format!("{ENVIRONMENTS}/{dir}/{partial}.{suffix}.yml"))?;
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a FragmentSet {
    type Item = &'a Fragment;
    type IntoIter = std::slice::Iter<'a, Fragment>;

    fn into_iter(self) -> Self::IntoIter {
        self.fragments.iter()
    }
}

/// Fragments composing a project environment, in merge order.
pub fn select_environment(
    cfg: &ConfigSnapshot,
    sources: &TemplateSources,
) -> Result<FragmentSet, ComposeError> {
    let env_type = cfg.env_type()?;
    let os = cfg.os();
    let features = cfg.features();
    let t = env_type.as_str();
    let mut set = FragmentSet::new();

    set.add_partial(sources, "networks", env_type, os)?;

    for svc in Feature::SERVICES {
        if features.is_on(svc) {
            set.add_partial(sources, &svc.component(), env_type, os)?;
        }
    }

    set.add_partial(sources, t, env_type, os)?;

    let extras: [(Feature, Vec<String>); 7] = [
        (Feature::TestDb, vec![format!("{t}.tests")]),
        (Feature::SplitSales, vec![format!("{t}.splitdb.sales")]),
        (Feature::SplitCheckout, vec![format!("{t}.splitdb.checkout")]),
        (
            Feature::Blackfire,
            vec!["blackfire".to_owned(), format!("{t}.blackfire")],
        ),
        (Feature::Allure, vec!["allure".to_owned()]),
        (Feature::Selenium, vec!["selenium".to_owned()]),
        (Feature::Magepack, vec![format!("{t}.magepack")]),
    ];
    for (feature, partials) in extras {
        if features.is_on(feature) {
            for partial in partials {
                set.add_partial(sources, &partial, env_type, os)?;
            }
        }
    }

    set.add_local(sources, &format!("{APP_NAME}-env.yml"))?;
    set.add_local(sources, &format!("{APP_NAME}-env.{}.yml", os.as_str()))?;

    trace!(fragments = ?set.names(), "environment fragments selected");
    Ok(set)
}

/// The global services composition.
pub fn select_services(sources: &TemplateSources) -> Result<FragmentSet, ComposeError> {
    let mut set = FragmentSet::new();
    set.add(sources, SERVICES)?;
    Ok(set)
}

/// Sync configuration template for `env_type`, base then OS-specific.
pub fn select_sync_config(env_type: EnvType, os: HostOs) -> FragmentSet {
    let t = env_type.as_str();
    let mut set = FragmentSet::new();
    for name in [
        format!("{ENVIRONMENTS}/{t}/{t}.mutagen.yml"),
        format!("{ENVIRONMENTS}/{t}/{t}.mutagen.{}.yml", os.as_str()),
    ] {
        if let Some(source) = assets::embedded(&name) {
            set.push(Fragment {
                name,
                origin: FragmentOrigin::Embedded,
                source: source.to_owned(),
            });
        }
    }
    set
}
