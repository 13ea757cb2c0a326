//! Run-time secrets.

use std::collections::HashMap;
use std::fmt;

/// Caller-supplied secrets for a single run, keyed by secret name.
///
/// Lives only inside the run's context and is dropped with it. Deliberately
/// not `Serialize`: there is no path from here to any persisted store, and
/// `Debug` redacts values so secrets cannot leak through logging.
#[derive(Clone, Default)]
pub struct RunSecrets {
    values: HashMap<String, String>,
}

impl RunSecrets {
    /// Key used by password-entry steps.
    pub const PASSWORD: &'static str = "password";

    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for the common password-only case.
    pub fn with_password(password: impl Into<String>) -> Self {
        let mut secrets = Self::new();
        secrets.insert(Self::PASSWORD, password);
        secrets
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn password(&self) -> Option<&str> {
        self.get(Self::PASSWORD)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for RunSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for key in self.values.keys() {
            map.entry(key, &"********");
        }
        map.finish()
    }
}
