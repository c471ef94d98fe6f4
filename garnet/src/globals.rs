use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::{RaiseException, Value};

pub type GlobalGetter = Arc<dyn Fn() -> Result<Value, RaiseException> + Send + Sync>;
pub type GlobalSetter = Arc<dyn Fn(Value) -> Result<(), RaiseException> + Send + Sync>;
pub type GlobalDefined = Arc<dyn Fn() -> bool + Send + Sync>;

/// Accessors backing a hooked global.
#[derive(Clone)]
pub struct GlobalHooks {
    pub getter: GlobalGetter,
    pub setter: GlobalSetter,
    pub defined: GlobalDefined,
}

enum GlobalKind {
    Plain { value: Value, defined: bool },
    Hooked(GlobalHooks),
}

/// One global variable. Aliases share the same storage.
pub struct GlobalStorage {
    kind: RwLock<GlobalKind>,
}

impl GlobalStorage {
    fn new() -> Self {
        Self {
            kind: RwLock::new(GlobalKind::Plain {
                value: Value::Nil,
                defined: false,
            }),
        }
    }

    /// Hooks run outside the lock, so a hook may touch other globals.
    pub fn get(&self) -> Result<Value, RaiseException> {
        let hooks = match &*self.kind.read() {
            GlobalKind::Plain { value, .. } => return Ok(value.clone()),
            GlobalKind::Hooked(hooks) => hooks.getter.clone(),
        };
        hooks()
    }

    pub fn set(&self, new_value: Value) -> Result<(), RaiseException> {
        let setter = {
            let mut kind = self.kind.write();
            match &mut *kind {
                GlobalKind::Plain { value, defined } => {
                    *value = new_value;
                    *defined = true;
                    return Ok(());
                }
                GlobalKind::Hooked(hooks) => hooks.setter.clone(),
            }
        };
        setter(new_value)
    }

    /// Stores into plain storage, bypassing hooks.
    pub fn set_internal(&self, new_value: Value) {
        *self.kind.write() = GlobalKind::Plain {
            value: new_value,
            defined: true,
        };
    }

    pub fn is_defined(&self) -> bool {
        let defined = match &*self.kind.read() {
            GlobalKind::Plain { defined, .. } => return *defined,
            GlobalKind::Hooked(hooks) => hooks.defined.clone(),
        };
        defined()
    }

    pub fn is_hooked(&self) -> bool {
        matches!(&*self.kind.read(), GlobalKind::Hooked(_))
    }
}

/// Cheap handle on a global's storage, for hot reads.
#[derive(Clone)]
pub struct GlobalReader(Arc<GlobalStorage>);

impl GlobalReader {
    pub fn get(&self) -> Result<Value, RaiseException> {
        self.0.get()
    }

    pub fn is_defined(&self) -> bool {
        self.0.is_defined()
    }
}

pub struct GlobalTable {
    storages: RwLock<HashMap<Arc<str>, Arc<GlobalStorage>>>,
}

impl GlobalTable {
    pub fn new() -> Self {
        Self {
            storages: RwLock::new(HashMap::new()),
        }
    }

    fn storage(&self, name: &str) -> Arc<GlobalStorage> {
        if let Some(storage) = self.storages.read().get(name) {
            return storage.clone();
        }
        self.storages
            .write()
            .entry(Arc::from(name))
            .or_insert_with(|| Arc::new(GlobalStorage::new()))
            .clone()
    }

    /// Undefined globals read as nil.
    pub fn get(&self, name: &str) -> Result<Value, RaiseException> {
        let storage = self.storages.read().get(name).cloned();
        match storage {
            Some(storage) => storage.get(),
            None => Ok(Value::Nil),
        }
    }

    pub fn set(&self, name: &str, value: Value) -> Result<(), RaiseException> {
        self.storage(name).set(value)
    }

    pub fn set_internal(&self, name: &str, value: Value) {
        self.storage(name).set_internal(value);
    }

    /// Turns `name` into a hooked global. The storage object is kept so
    /// existing aliases and readers see the hooks.
    pub fn define_hooked(&self, name: &str, hooks: GlobalHooks) {
        *self.storage(name).kind.write() = GlobalKind::Hooked(hooks);
    }

    pub fn is_defined(&self, name: &str) -> bool {
        let storage = self.storages.read().get(name).cloned();
        storage.is_some_and(|storage| storage.is_defined())
    }

    /// Makes `new_name` another name for `old_name`'s storage.
    pub fn alias(&self, new_name: &str, old_name: &str) {
        let storage = self.storage(old_name);
        self.storages.write().insert(Arc::from(new_name), storage);
    }

    pub fn reader(&self, name: &str) -> GlobalReader {
        GlobalReader(self.storage(name))
    }

    pub fn names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<_> = self.storages.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for GlobalTable {
    fn default() -> Self {
        Self::new()
    }
}
