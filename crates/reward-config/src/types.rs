//! Environment types, feature toggles and the validated project name.

use crate::value::is_enabled;
use crate::{app_key, ConfigError};
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::LazyLock;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

static PROJECT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9\-]{0,61}[A-Za-z0-9])?$")
        .expect("project name regex is valid")
});

/// A lowercased, hostname-safe project name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ProjectName(String);

impl ProjectName {
    /// Validate `raw` against the RFC-1178 hostname rule and lowercase it.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EnvEmpty(app_key("env_name").to_uppercase()));
        }
        if !PROJECT_NAME_RE.is_match(trimmed) {
            return Err(ConfigError::Invalid(format!(
                "project name '{trimmed}' is not a valid hostname (letters, digits and inner hyphens, at most 63 characters)"
            )));
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<project>_default`, the network the composer creates for the project.
    pub fn network_name(&self) -> String {
        format!("{}_default", self.0)
    }
}

impl Deref for ProjectName {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Recognised application profiles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, Display, AsRefStr, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum EnvType {
    #[strum(serialize = "generic-php")]
    GenericPhp,
    #[strum(serialize = "magento1")]
    Magento1,
    #[strum(serialize = "magento2")]
    Magento2,
    #[strum(serialize = "laravel")]
    Laravel,
    #[strum(serialize = "pwa-studio")]
    PwaStudio,
    #[strum(serialize = "symfony")]
    Symfony,
    #[strum(serialize = "shopware")]
    Shopware,
    #[strum(serialize = "wordpress")]
    Wordpress,
    #[strum(serialize = "local")]
    Local,
}

impl EnvType {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Self::from_str(raw.trim()).map_err(|_| {
            let known: Vec<&str> = Self::iter().map(Self::as_str).collect();
            ConfigError::Invalid(format!(
                "unknown environment type '{}' (expected one of: {})",
                raw.trim(),
                known.join(", ")
            ))
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GenericPhp => "generic-php",
            Self::Magento1 => "magento1",
            Self::Magento2 => "magento2",
            Self::Laravel => "laravel",
            Self::PwaStudio => "pwa-studio",
            Self::Symfony => "symfony",
            Self::Shopware => "shopware",
            Self::Wordpress => "wordpress",
            Self::Local => "local",
        }
    }

    /// Types that ship their own php-fpm image variant.
    pub fn has_php_variant(self) -> bool {
        matches!(
            self,
            Self::Magento1 | Self::Magento2 | Self::Wordpress | Self::Shopware
        )
    }

    pub fn default_synced_container(self) -> &'static str {
        match self {
            Self::PwaStudio => "node",
            _ => "php-fpm",
        }
    }

    pub fn default_synced_dir(self) -> &'static str {
        match self {
            Self::PwaStudio => "/usr/src/app",
            _ => "/var/www/html",
        }
    }
}

/// Per-environment feature toggles. The serialised key is `reward_<name>`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, Display, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Feature {
    PhpFpm,
    Nginx,
    Db,
    Elasticsearch,
    Opensearch,
    Varnish,
    Rabbitmq,
    Redis,
    Node,
    Mercure,
    Valkey,
    Blackfire,
    Allure,
    Selenium,
    Magepack,
    SplitSales,
    SplitCheckout,
    TestDb,
}

impl Feature {
    /// Service containers, in the order their fragments are composed.
    pub const SERVICES: [Feature; 11] = [
        Feature::PhpFpm,
        Feature::Nginx,
        Feature::Db,
        Feature::Elasticsearch,
        Feature::Opensearch,
        Feature::Varnish,
        Feature::Rabbitmq,
        Feature::Redis,
        Feature::Node,
        Feature::Mercure,
        Feature::Valkey,
    ];

    /// Configuration key, e.g. `reward_php_fpm`.
    pub fn key(self) -> String {
        app_key(self.as_ref())
    }

    /// Fragment component name, e.g. `php-fpm`.
    pub fn component(self) -> String {
        self.as_ref().replace('_', "-")
    }
}

/// Feature toggle record. Absence means off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Features {
    toggles: BTreeMap<Feature, bool>,
}

impl Features {
    pub fn from_values(values: &BTreeMap<String, Value>) -> Self {
        let toggles = Feature::iter()
            .filter_map(|f| values.get(&f.key()).map(|v| (f, is_enabled(v))))
            .collect();
        Self { toggles }
    }

    pub fn is_on(&self, feature: Feature) -> bool {
        self.toggles.get(&feature).copied().unwrap_or(false)
    }

    pub fn set(&mut self, feature: Feature, on: bool) {
        self.toggles.insert(feature, on);
    }

    pub fn enabled(&self) -> impl Iterator<Item = Feature> + '_ {
        self.toggles.iter().filter(|(_, on)| **on).map(|(f, _)| *f)
    }
}

impl Serialize for Features {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.toggles.len()))?;
        for (feature, on) in &self.toggles {
            map.serialize_entry(&feature.key(), on)?;
        }
        map.end()
    }
}
