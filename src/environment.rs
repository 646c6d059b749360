//! Explicit key/value environment.
//!
//! Instead of reading and writing the process environment implicitly, the
//! initializer works on an [`Environment`] value: it is loaded from the env
//! file (or layered over a process snapshot), mutated in memory, and only
//! pushed into the process by an explicit [`Environment::export`].

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use crate::error::Result;

/// Ordered mapping from env keys to values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the env file at `path`. A missing file yields an empty mapping.
    ///
    /// Lines `dotenvy` cannot parse are skipped with a warning; the editor
    /// keeps them untouched, so they must not block reading the rest.
    pub fn load(path: &Path) -> Result<Self> {
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(dotenvy::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut env = Self::new();
        let mut skipped = 0usize;
        for item in iter {
            match item {
                Ok((key, value)) => {
                    env.vars.insert(key, value);
                }
                // The line text may hold a secret, only the position is logged
                Err(dotenvy::Error::LineParse(_, index)) => {
                    skipped += 1;
                    tracing::warn!(
                        path = %path.display(),
                        index,
                        "Skipping unparseable line in env file"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(
            path = %path.display(),
            keys = env.vars.len(),
            skipped,
            "Loaded env file"
        );
        Ok(env)
    }

    /// Snapshot of the current process environment (non-UTF-8 entries skipped)
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    /// Process environment with the env file filling in keys it does not define
    pub fn layered(path: &Path) -> Result<Self> {
        let mut env = Self::from_process();
        env.fill_from(Self::load(path)?);
        Ok(env)
    }

    /// Add entries from `other` whose keys are not already present
    pub fn fill_from(&mut self, other: Environment) {
        for (key, value) in other.vars {
            self.vars.entry(key).or_insert(value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries whose key starts with `{alias}_`
    pub fn keys_with_prefix<'a>(&'a self, alias: &str) -> impl Iterator<Item = (&'a str, &'a str)> {
        let prefix = format!("{}_", alias);
        self.iter().filter(move |(k, _)| k.starts_with(&prefix))
    }

    /// Copy every entry into the process environment.
    ///
    /// Must run before any other thread is spawned; the binary calls it from
    /// `main` right after initialization.
    pub fn export(&self) {
        for (key, value) in &self.vars {
            #[allow(unsafe_code)]
            // SAFETY: single-threaded at the call site (see above).
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
}

impl FromIterator<(String, String)> for Environment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}
