//! Explicit child-process environment for the benchmark executor.
//!
//! The child never inherits the host environment. It receives exactly the
//! variables in `ALLOWED_VARS`: the credential, plus `PATH` and `HOME`
//! copied from the host through a lookup function.

use std::collections::BTreeMap;
use std::fmt;

use zeroize::Zeroize;

use crate::job::Credential;

/// Variable the executor reads its API credential from.
pub const CREDENTIAL_VAR: &str = "ANTHROPIC_API_KEY";

/// Search path the executor needs to locate its own tools.
pub const PATH_VAR: &str = "PATH";

/// Home directory the executor uses for its caches.
pub const HOME_VAR: &str = "HOME";

/// The complete set of variable names a child process can see.
pub const ALLOWED_VARS: [&str; 3] = [CREDENTIAL_VAR, PATH_VAR, HOME_VAR];

/// Environment map handed to the executor process.
pub struct ChildEnvironment {
    vars: BTreeMap<&'static str, String>,
}

impl ChildEnvironment {
    /// Builds the environment from the real host `PATH` and `HOME`.
    pub fn from_host(credential: &Credential) -> Self {
        Self::from_lookup(credential, |name| std::env::var(name).ok())
    }

    /// Builds the environment, asking `lookup` only for `PATH` and `HOME`.
    ///
    /// A variable the lookup cannot supply is passed with an empty value,
    /// so the child always sees exactly three variables.
    pub fn from_lookup<F>(credential: &Credential, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = BTreeMap::new();
        vars.insert(CREDENTIAL_VAR, credential.expose().to_string());
        for name in [PATH_VAR, HOME_VAR] {
            vars.insert(name, lookup(name).unwrap_or_default());
        }
        Self { vars }
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Names of all variables in the map.
    pub fn names(&self) -> Vec<&'static str> {
        self.vars.keys().copied().collect()
    }

    /// Returns the value of one variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Replaces the command's environment with this map.
    pub(crate) fn apply(&self, cmd: &mut tokio::process::Command) {
        cmd.env_clear();
        cmd.envs(self.iter());
    }
}

impl fmt::Debug for ChildEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.iter() {
            if name == CREDENTIAL_VAR {
                map.entry(&name, &"[REDACTED]");
            } else {
                map.entry(&name, &value);
            }
        }
        map.finish()
    }
}

impl Drop for ChildEnvironment {
    fn drop(&mut self) {
        if let Some(secret) = self.vars.get_mut(CREDENTIAL_VAR) {
            secret.zeroize();
        }
    }
}
