use std::path::PathBuf;

use crate::{BootstrapError, Value};

pub const RESOURCE_SCHEME: &str = "resource:";

/// Initial value of `$VERBOSE`: nil silences warnings, false is the normal
/// level and true is verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Nil,
    False,
    True,
}

impl Verbosity {
    pub fn as_value(self) -> Value {
        match self {
            Verbosity::Nil => Value::Nil,
            Verbosity::False => Value::Bool(false),
            Verbosity::True => Value::Bool(true),
        }
    }
}

/// Per-site entry limits for the inline caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub class_cache: usize,
    pub identity_cache: usize,
    pub method_lookup_cache: usize,
    pub dispatch_cache: usize,
    pub storage_site_failures: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            class_cache: 8,
            identity_cache: 1,
            method_lookup_cache: 8,
            dispatch_cache: 8,
            storage_site_failures: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    pub core_load_path: String,
    pub home: Option<PathBuf>,
    pub patching: bool,
    pub verbosity: Verbosity,
    pub debug: bool,
    pub caches: CacheLimits,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            core_load_path: format!("{RESOURCE_SCHEME}/truffleruby"),
            home: None,
            patching: true,
            verbosity: Verbosity::False,
            debug: false,
            caches: CacheLimits::default(),
        }
    }
}

impl Options {
    /// Normalizes the core load path. Resource paths pass through, file
    /// paths are canonicalized.
    pub fn resolved_core_load_path(&self) -> Result<String, BootstrapError> {
        let path = self.core_load_path.trim_end_matches('/');
        if path.starts_with(RESOURCE_SCHEME) {
            return Ok(path.to_string());
        }
        let canonical = std::fs::canonicalize(path).map_err(|source| {
            BootstrapError::Io {
                path: path.to_string(),
                source,
            }
        })?;
        Ok(canonical.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_path_passes_through() {
        let options = Options {
            core_load_path: "resource:/truffleruby//".into(),
            ..Options::default()
        };
        assert_eq!(
            options.resolved_core_load_path().unwrap(),
            "resource:/truffleruby"
        );
    }

    #[test]
    fn file_path_is_canonicalized() {
        let dir = std::env::temp_dir();
        let options = Options {
            core_load_path: format!("{}/", dir.display()),
            ..Options::default()
        };
        let resolved = options.resolved_core_load_path().unwrap();
        assert_eq!(
            resolved,
            std::fs::canonicalize(&dir).unwrap().to_string_lossy()
        );
    }

    #[test]
    fn missing_path_is_io_error() {
        let options = Options {
            core_load_path: "/definitely/not/here/garnet".into(),
            ..Options::default()
        };
        assert!(matches!(
            options.resolved_core_load_path(),
            Err(BootstrapError::Io { .. })
        ));
    }
}
