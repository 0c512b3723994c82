//! Validator configuration and cache settings
//!
//! [`Config`] selects which annotation keys a validator reads. It is part of the
//! descriptor cache key, so two validators that read different keys never share
//! descriptors for the same type.
//!
//! [`CacheSettings`] sizes the shared caches. It is loaded with figment from
//! defaults layered under `FIELDCHECK_`-prefixed environment variables.

use crate::error::Result;
use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default annotation key holding the constraint source
pub const DEFAULT_CHECK_TAG: &str = "check";

/// Default annotation key holding the error message
pub const DEFAULT_ERROR_TAG: &str = "invalid";

/// Default annotation key holding the display name (the serialization name)
pub const DEFAULT_NAME_TAG: &str = "json";

/// Default capacity of each cache
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Prefix for cache settings read from the environment
pub const ENV_PREFIX: &str = "FIELDCHECK_";

/// Which annotations a validator consults, and where its paths start
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Config {
    /// Key of the constraint expression annotation
    pub check_tag: String,
    /// Key of the error message annotation
    pub error_tag: String,
    /// Key of the display name annotation
    pub name_tag: String,
    /// Prefix of every reported path
    pub base_path: String,
    /// Treat unsupported value shapes as configuration errors
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_tag: DEFAULT_CHECK_TAG.to_string(),
            error_tag: DEFAULT_ERROR_TAG.to_string(),
            name_tag: DEFAULT_NAME_TAG.to_string(),
            base_path: String::new(),
            strict: false,
        }
    }
}

impl Config {
    /// Apply options in order; later options override earlier ones
    pub fn with_options<I>(self, options: I) -> Self
    where
        I: IntoIterator<Item = ValidatorOption>,
    {
        options.into_iter().fold(self, Config::apply)
    }

    /// Apply a single option
    pub fn apply(mut self, option: ValidatorOption) -> Self {
        match option {
            ValidatorOption::CheckTag(tag) => self.check_tag = tag,
            ValidatorOption::ErrorTag(tag) => self.error_tag = tag,
            ValidatorOption::NameTag(tag) => self.name_tag = tag,
            ValidatorOption::BasePath(path) => self.base_path = path,
            ValidatorOption::Strict(strict) => self.strict = strict,
        }
        self
    }
}

/// A single configuration override
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorOption {
    CheckTag(String),
    ErrorTag(String),
    NameTag(String),
    BasePath(String),
    Strict(bool),
}

/// Validate under a named mode: read constraints from the annotation `name`
///
/// `mode("create")` and `mode("update")` let one type carry different
/// constraints for different operations.
pub fn mode(name: impl Into<String>) -> ValidatorOption {
    ValidatorOption::CheckTag(name.into())
}

/// Capacities of the descriptor and expression caches; zero disables a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_size")]
    pub type_cache_size: usize,
    #[serde(default = "default_cache_size")]
    pub expr_cache_size: usize,
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            type_cache_size: DEFAULT_CACHE_SIZE,
            expr_cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl CacheSettings {
    /// Settings with both caches disabled
    pub fn disabled() -> Self {
        Self {
            type_cache_size: 0,
            expr_cache_size: 0,
        }
    }

    /// Load settings from `FIELDCHECK_TYPE_CACHE_SIZE` and `FIELDCHECK_EXPR_CACHE_SIZE`
    ///
    /// Unset variables keep their defaults. A value that is not a non-negative
    /// integer is an error; callers are expected to treat it as fatal at startup.
    pub fn from_env() -> Result<Self> {
        let settings = Self::figment().extract::<CacheSettings>()?;
        debug!(
            "Loaded cache settings: type_cache_size={}, expr_cache_size={}",
            settings.type_cache_size, settings.expr_cache_size
        );
        Ok(settings)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(CacheSettings::default()))
            .merge(Env::prefixed(ENV_PREFIX).only(&["type_cache_size", "expr_cache_size"]))
    }
}
