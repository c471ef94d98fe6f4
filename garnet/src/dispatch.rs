use std::sync::Arc;

use crate::{
    CacheLimits, ForeignCallSite, GuardChain, MetaTypeSite, Method,
    RaiseException, RuntimeShared, TypeId, Value,
};

struct LookupEntry {
    meta: TypeId,
    epoch: u64,
    name: Arc<str>,
    method: Option<Method>,
}

/// Ordinary message send with a per-site lookup cache.
///
/// Lookups are keyed by the receiver's meta type and the registry's method
/// epoch, so any definition or inclusion invalidates them. A miss on a
/// foreign receiver is handed to the site's foreign call cache.
pub struct DispatchSite {
    meta: MetaTypeSite,
    lookups: GuardChain<LookupEntry>,
    foreign: ForeignCallSite,
}

impl DispatchSite {
    pub fn new(limits: &CacheLimits) -> Self {
        Self {
            meta: MetaTypeSite::new(limits),
            lookups: GuardChain::new("method lookup", limits.method_lookup_cache),
            foreign: ForeignCallSite::new(limits),
        }
    }

    pub fn call(
        &self,
        runtime: &RuntimeShared,
        receiver: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RaiseException> {
        let meta = self.meta.resolve(runtime.core(), receiver);
        let method = self.lookup(runtime, meta, name);
        match (method, receiver) {
            (Some(method), _) => method.invoke(runtime, receiver, args),
            (None, Value::Foreign(object)) => {
                self.foreign.call(runtime, object, name, args)
            }
            (None, _) => Err(runtime.no_method_error(receiver, name)),
        }
    }

    fn lookup(
        &self,
        runtime: &RuntimeShared,
        meta: TypeId,
        name: &str,
    ) -> Option<Method> {
        let epoch = runtime.registry().epoch();
        let hit = self.lookups.find_map(|entry| {
            (entry.meta == meta && entry.epoch == epoch && &*entry.name == name)
                .then(|| entry.method.clone())
        });
        if let Some(method) = hit {
            return method;
        }
        self.lookups.retain(|entry| entry.epoch == epoch);
        let method = runtime.registry().find_method(meta, name);
        let entry = LookupEntry {
            meta,
            epoch,
            name: Arc::from(name),
            method: method.clone(),
        };
        self.lookups.install(entry, |a, b| {
            a.meta == b.meta && a.epoch == b.epoch && a.name == b.name
        });
        method
    }

    pub fn is_megamorphic(&self) -> bool {
        self.lookups.is_megamorphic()
    }

    pub fn foreign_site(&self) -> &ForeignCallSite {
        &self.foreign
    }
}

/// Uncached send, used where no call site owns a cache.
pub fn call_uncached(
    runtime: &RuntimeShared,
    receiver: &Value,
    name: &str,
    args: &[Value],
) -> Result<Value, RaiseException> {
    let meta = runtime.meta_type(receiver);
    match (runtime.registry().find_method(meta, name), receiver) {
        (Some(method), _) => method.invoke(runtime, receiver, args),
        (None, Value::Foreign(object)) => {
            crate::interop::call_foreign_uncached(runtime, object, name, args)
        }
        (None, _) => Err(runtime.no_method_error(receiver, name)),
    }
}
