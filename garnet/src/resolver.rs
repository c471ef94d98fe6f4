use std::sync::Arc;

use crate::{CacheLimits, CoreTypes, GuardChain, RObject, TypeId, Value, ValueKind};

/// Logical type of any value: the type user code sees as its class.
pub fn logical_type_of(core: &CoreTypes, value: &Value) -> TypeId {
    match value {
        Value::Object(object) => object.logical_type(),
        other => immediate_type(core, other.kind(), core.polyglot_foreign_object),
    }
}

/// Meta type of any value: where method lookup starts. Differs from the
/// logical type only for heap objects carrying a singleton type and for
/// foreign values.
pub fn meta_type_of(core: &CoreTypes, value: &Value) -> TypeId {
    match value {
        Value::Object(object) => object.meta_type(),
        other => immediate_type(core, other.kind(), core.interop_foreign),
    }
}

fn immediate_type(core: &CoreTypes, kind: ValueKind, foreign: TypeId) -> TypeId {
    match kind {
        ValueKind::Nil => core.nil_class,
        ValueKind::True => core.true_class,
        ValueKind::False => core.false_class,
        ValueKind::Fixnum | ValueKind::Bignum => core.integer,
        ValueKind::Float => core.float,
        ValueKind::Symbol => core.symbol,
        ValueKind::Foreign => foreign,
        ValueKind::Object => core.basic_object,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Fixed(TypeId),
    LogicalField,
    MetaField,
}

#[derive(Debug, Clone, Copy)]
struct KindRule {
    kind: ValueKind,
    resolution: Resolution,
}

impl KindRule {
    #[inline]
    fn apply(&self, value: &Value) -> Option<TypeId> {
        if value.kind() != self.kind {
            return None;
        }
        Some(match (self.resolution, value) {
            (Resolution::Fixed(id), _) => id,
            (Resolution::LogicalField, Value::Object(o)) => o.logical_type(),
            (Resolution::MetaField, Value::Object(o)) => o.meta_type(),
            _ => return None,
        })
    }
}

/// Call-site cache for the logical type. One rule per value kind seen; heap
/// objects read their header field.
pub struct LogicalTypeSite {
    kinds: GuardChain<KindRule>,
}

impl LogicalTypeSite {
    pub fn new(limits: &CacheLimits) -> Self {
        Self {
            kinds: GuardChain::new("logical type", limits.class_cache),
        }
    }

    pub fn resolve(&self, core: &CoreTypes, value: &Value) -> TypeId {
        if let Some(id) = self.kinds.find_map(|rule| rule.apply(value)) {
            return id;
        }
        let kind = value.kind();
        let resolution = match kind {
            ValueKind::Object => Resolution::LogicalField,
            _ => Resolution::Fixed(logical_type_of(core, value)),
        };
        self.kinds
            .install(KindRule { kind, resolution }, |a, b| a.kind == b.kind);
        logical_type_of(core, value)
    }

    pub fn is_megamorphic(&self) -> bool {
        self.kinds.is_megamorphic()
    }
}

struct IdentityRule {
    object: Arc<RObject>,
    singleton: TypeId,
}

/// Call-site cache for the meta type.
///
/// Objects that already carry a singleton type are cached by identity, at
/// most `identity_cache` of them; past that the identity tier is abandoned and
/// such objects fall through to the field read of the kind tier. A cached
/// identity stays valid because a singleton is attached at most once.
pub struct MetaTypeSite {
    identities: GuardChain<IdentityRule>,
    kinds: GuardChain<KindRule>,
}

impl MetaTypeSite {
    pub fn new(limits: &CacheLimits) -> Self {
        Self {
            identities: GuardChain::new("meta type identity", limits.identity_cache),
            kinds: GuardChain::new("meta type", limits.class_cache),
        }
    }

    pub fn resolve(&self, core: &CoreTypes, value: &Value) -> TypeId {
        if let Value::Object(object) = value {
            let hit = self.identities.find_map(|rule| {
                Arc::ptr_eq(&rule.object, object).then_some(rule.singleton)
            });
            if let Some(id) = hit {
                return id;
            }
            if let Some(singleton) = object.singleton() {
                let rule = IdentityRule {
                    object: object.clone(),
                    singleton,
                };
                self.identities
                    .install(rule, |a, b| Arc::ptr_eq(&a.object, &b.object));
                return singleton;
            }
        }
        if let Some(id) = self.kinds.find_map(|rule| rule.apply(value)) {
            return id;
        }
        let kind = value.kind();
        let resolution = match kind {
            ValueKind::Object => Resolution::MetaField,
            _ => Resolution::Fixed(meta_type_of(core, value)),
        };
        self.kinds
            .install(KindRule { kind, resolution }, |a, b| a.kind == b.kind);
        meta_type_of(core, value)
    }

    pub fn cached_identities(&self) -> usize {
        self.identities.len()
    }

    pub fn identities_abandoned(&self) -> bool {
        self.identities.is_megamorphic()
    }

    pub fn is_megamorphic(&self) -> bool {
        self.kinds.is_megamorphic()
    }
}
