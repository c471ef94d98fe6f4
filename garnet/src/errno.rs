use std::collections::HashMap;

use parking_lot::RwLock;

use crate::{CoreTypes, RegistryError, TypeId, TypeRegistry, Value};

pub const ERRNO_PREFIX: &str = "platform.errno.";

/// Names that share their number with a more common name on most hosts.
/// They are processed last so the common name owns the class.
const SECONDARY_NAMES: &[&str] = &["EWOULDBLOCK", "EDEADLOCK", "ENOTSUP"];

/// Integer facts about the host platform, in the order they were supplied.
#[derive(Debug, Clone, Default)]
pub struct NativeConfiguration {
    entries: Vec<(String, i64)>,
    index: HashMap<String, usize>,
}

impl NativeConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: i64) {
        match self.index.get(key) {
            Some(&slot) => self.entries[slot].1 = value,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.index.get(key).map(|&slot| self.entries[slot].1)
    }

    /// Entries under `prefix`, with the prefix stripped.
    pub fn section<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, i64)> + 'a {
        self.entries.iter().filter_map(move |(key, value)| {
            key.strip_prefix(prefix).map(|name| (name, *value))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Errno numbers of a Linux host.
    pub fn linux() -> Self {
        let mut config = Self::new();
        for (name, value) in [
            ("EPERM", 1),
            ("ENOENT", 2),
            ("ESRCH", 3),
            ("EINTR", 4),
            ("EIO", 5),
            ("ENXIO", 6),
            ("E2BIG", 7),
            ("ENOEXEC", 8),
            ("EBADF", 9),
            ("ECHILD", 10),
            ("EAGAIN", 11),
            ("EWOULDBLOCK", 11),
            ("ENOMEM", 12),
            ("EACCES", 13),
            ("EFAULT", 14),
            ("EBUSY", 16),
            ("EEXIST", 17),
            ("EXDEV", 18),
            ("ENODEV", 19),
            ("ENOTDIR", 20),
            ("EISDIR", 21),
            ("EINVAL", 22),
            ("ENFILE", 23),
            ("EMFILE", 24),
            ("ENOTTY", 25),
            ("EFBIG", 27),
            ("ENOSPC", 28),
            ("ESPIPE", 29),
            ("EROFS", 30),
            ("EMLINK", 31),
            ("EPIPE", 32),
            ("EDOM", 33),
            ("ERANGE", 34),
            ("EDEADLK", 35),
            ("EDEADLOCK", 35),
            ("ENAMETOOLONG", 36),
            ("ENOSYS", 38),
            ("ENOTEMPTY", 39),
            ("ELOOP", 40),
            ("ENOTSOCK", 88),
            ("EOPNOTSUPP", 95),
            ("ENOTSUP", 95),
            ("EADDRINUSE", 98),
            ("ECONNRESET", 104),
            ("ETIMEDOUT", 110),
            ("ECONNREFUSED", 111),
            ("EINPROGRESS", 115),
        ] {
            config.insert(&format!("{ERRNO_PREFIX}{name}"), value);
        }
        config
    }
}

/// The `Errno::*` classes, one per distinct errno number.
pub struct ErrnoTable {
    classes: RwLock<HashMap<String, TypeId>>,
    names: RwLock<HashMap<i64, String>>,
}

impl ErrnoTable {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
            names: RwLock::new(HashMap::new()),
        }
    }

    /// Defines a class under `Errno` for each configured errno. A name whose
    /// number is already taken becomes a constant alias of the existing
    /// class.
    pub fn define(
        &self,
        registry: &TypeRegistry,
        core: &CoreTypes,
        config: &NativeConfiguration,
    ) -> Result<(), RegistryError> {
        let (secondary, primary): (Vec<_>, Vec<_>) = config
            .section(ERRNO_PREFIX)
            .partition(|(name, _)| SECONDARY_NAMES.contains(name));

        let mut by_number: HashMap<i64, TypeId> = HashMap::new();
        for (name, number) in primary.into_iter().chain(secondary) {
            if let Some(&class) = by_number.get(&number) {
                registry.set_constant(core.errno, name, registry.type_value(class));
                self.classes.write().insert(name.to_string(), class);
                log::trace!("Errno::{name} aliases {}", registry.display_name(class));
                continue;
            }
            let class = registry.define_class_under(
                core.errno,
                Some(core.system_call_error),
                name,
                None,
            )?;
            registry.set_constant(class, "Errno", Value::Fixnum(number));
            by_number.insert(number, class);
            self.classes.write().insert(name.to_string(), class);
            self.names.write().insert(number, name.to_string());
        }
        log::debug!("defined {} errno classes", by_number.len());
        Ok(())
    }

    pub fn class(&self, name: &str) -> Option<TypeId> {
        self.classes.read().get(name).copied()
    }

    /// Canonical name of an errno number.
    pub fn name_of(&self, number: i64) -> Option<String> {
        self.names.read().get(&number).cloned()
    }

    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ErrnoTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (TypeRegistry, CoreTypes) {
        let registry = TypeRegistry::new().unwrap();
        let core = CoreTypes::define(&registry).unwrap();
        (registry, core)
    }

    #[test]
    fn section_strips_prefix_in_order() {
        let mut config = NativeConfiguration::new();
        config.insert("platform.errno.EPERM", 1);
        config.insert("platform.signal.SIGINT", 2);
        config.insert("platform.errno.ENOENT", 2);
        let names: Vec<_> = config.section(ERRNO_PREFIX).collect();
        assert_eq!(names, vec![("EPERM", 1), ("ENOENT", 2)]);
        config.insert("platform.errno.EPERM", 5);
        assert_eq!(config.get("platform.errno.EPERM"), Some(5));
        assert_eq!(config.len(), 3);
    }

    #[test]
    fn aliases_collapse_to_one_class() {
        let (registry, core) = setup();
        let table = ErrnoTable::new();
        let mut config = NativeConfiguration::new();
        config.insert("platform.errno.EWOULDBLOCK", 11);
        config.insert("platform.errno.EAGAIN", 11);
        config.insert("platform.errno.EPERM", 1);
        table.define(&registry, &core, &config).unwrap();

        let eagain = table.class("EAGAIN").unwrap();
        assert_eq!(table.class("EWOULDBLOCK"), Some(eagain));
        assert_eq!(table.name_of(11).as_deref(), Some("EAGAIN"));
        assert_eq!(table.len(), 2);
        assert_eq!(
            registry.get_constant(core.errno, "EWOULDBLOCK"),
            Some(registry.type_value(eagain))
        );
        assert_eq!(registry.name(eagain).as_deref(), Some("Errno::EAGAIN"));
        assert_eq!(
            registry.get_constant(eagain, "Errno"),
            Some(Value::Fixnum(11))
        );
        assert_eq!(registry.superclass(eagain), Some(core.system_call_error));
    }

    #[test]
    fn unknown_duplicates_keep_first_name() {
        let (registry, core) = setup();
        let table = ErrnoTable::new();
        let mut config = NativeConfiguration::new();
        config.insert("platform.errno.EDEADLK", 35);
        config.insert("platform.errno.EFOO", 35);
        table.define(&registry, &core, &config).unwrap();
        assert_eq!(table.name_of(35).as_deref(), Some("EDEADLK"));
        assert_eq!(table.class("EFOO"), table.class("EDEADLK"));
    }

    #[test]
    fn linux_table_is_consistent() {
        let (registry, core) = setup();
        let table = ErrnoTable::new();
        table.define(&registry, &core, &NativeConfiguration::linux()).unwrap();
        assert_eq!(table.class("ENOTSUP"), table.class("EOPNOTSUPP"));
        assert_eq!(table.class("EDEADLOCK"), table.class("EDEADLK"));
        assert_eq!(table.name_of(2).as_deref(), Some("ENOENT"));
    }
}
