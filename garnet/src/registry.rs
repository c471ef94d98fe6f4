use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;

use crate::{
    ObjectData, RObject, RaiseException, RuntimeShared, Shape, ShapeTable,
    Value,
};

pub const BASIC_OBJECT_SHAPE: &str = "basic_object";
pub const MODULE_SHAPE: &str = "module";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Module,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    #[inline]
    pub fn accepts(self, given: usize) -> bool {
        match self {
            Arity::Exact(n) => given == n,
            Arity::AtLeast(n) => given >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "{n}+"),
        }
    }
}

pub type MethodFn = Arc<
    dyn Fn(&RuntimeShared, &Value, &[Value]) -> Result<Value, RaiseException>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub struct Method {
    name: Arc<str>,
    owner: TypeId,
    arity: Arity,
    body: MethodFn,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> TypeId {
        self.owner
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn invoke(
        &self,
        runtime: &RuntimeShared,
        receiver: &Value,
        args: &[Value],
    ) -> Result<Value, RaiseException> {
        if !self.arity.accepts(args.len()) {
            return Err(runtime
                .exceptions()
                .argument_error(args.len(), self.arity));
        }
        (self.body)(runtime, receiver, args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    MissingSuperclass { name: String },
    SuperclassNotClass { name: String },
    SuperclassMismatch { name: String },
    NotAClass { name: String },
    NotAModule { name: String },
    IncludeNotModule { name: String },
    CyclicInclude { name: String },
    MalformedTypeGraph { reason: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::MissingSuperclass { name } => {
                write!(f, "class {name} defined without a superclass")
            }
            RegistryError::SuperclassNotClass { name } => {
                write!(f, "superclass must be a Class ({name} given)")
            }
            RegistryError::SuperclassMismatch { name } => {
                write!(f, "superclass mismatch for class {name}")
            }
            RegistryError::NotAClass { name } => {
                write!(f, "{name} is not a class")
            }
            RegistryError::NotAModule { name } => {
                write!(f, "{name} is not a module")
            }
            RegistryError::IncludeNotModule { name } => {
                write!(f, "wrong argument type {name} (expected Module)")
            }
            RegistryError::CyclicInclude { name } => {
                write!(f, "cyclic include detected ({name})")
            }
            RegistryError::MalformedTypeGraph { reason } => {
                write!(f, "malformed type graph: {reason}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// The four types created before anything else can be defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapTypes {
    pub class: TypeId,
    pub basic_object: TypeId,
    pub object: TypeId,
    pub module: TypeId,
}

struct TypeData {
    kind: TypeKind,
    name: Option<Arc<str>>,
    lexical_parent: Option<TypeId>,
    superclass: Option<TypeId>,
    /// Most recently included module first.
    includes: Vec<TypeId>,
    constants: HashMap<Arc<str>, Value>,
    methods: HashMap<Arc<str>, Method>,
    shape: Arc<Shape>,
    object: Arc<RObject>,
    attached: Option<Arc<RObject>>,
}

struct TypeArena {
    types: Vec<TypeData>,
    type_shape: Arc<Shape>,
    root_namespace: Option<TypeId>,
}

impl TypeArena {
    fn new(type_shape: Arc<Shape>) -> Self {
        Self {
            types: Vec::new(),
            type_shape,
            root_namespace: None,
        }
    }

    #[inline]
    fn get(&self, id: TypeId) -> &TypeData {
        &self.types[id.index()]
    }

    #[inline]
    fn get_mut(&mut self, id: TypeId) -> &mut TypeData {
        &mut self.types[id.index()]
    }

    fn alloc(
        &mut self,
        kind: TypeKind,
        meta: TypeId,
        superclass: Option<TypeId>,
        shape: Arc<Shape>,
    ) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        let object = Arc::new(RObject::new(
            meta,
            self.type_shape.clone(),
            ObjectData::Type(id),
        ));
        self.types.push(TypeData {
            kind,
            name: None,
            lexical_parent: None,
            superclass,
            includes: Vec::new(),
            constants: HashMap::new(),
            methods: HashMap::new(),
            shape,
            object,
            attached: None,
        });
        id
    }

    /// Names `id` after `name` inside `parent` and binds the constant.
    fn adopt(&mut self, id: TypeId, parent: TypeId, name: &str) {
        let qualified: Arc<str> = match &self.get(parent).name {
            Some(outer) if Some(parent) != self.root_namespace => {
                Arc::from(format!("{outer}::{name}"))
            }
            _ => Arc::from(name),
        };
        let value = Value::Object(self.get(id).object.clone());
        let data = self.get_mut(id);
        if data.name.is_none() {
            data.name = Some(qualified);
            data.lexical_parent = Some(parent);
        }
        self.get_mut(parent).constants.insert(Arc::from(name), value);
    }

    fn display_name(&self, id: TypeId) -> String {
        let data = self.get(id);
        if let Some(name) = &data.name {
            return name.to_string();
        }
        if let Some(attached) = &data.attached {
            return match attached.as_type() {
                Some(ty) => format!("#<Class:{}>", self.display_name(ty)),
                None => format!(
                    "#<Class:#<{}>>",
                    self.display_name(attached.logical_type())
                ),
            };
        }
        match data.kind {
            TypeKind::Class => format!("#<Class:0x{:04x}>", id.0),
            TypeKind::Module => format!("#<Module:0x{:04x}>", id.0),
        }
    }

    fn ancestors(&self, start: TypeId) -> Vec<TypeId> {
        let mut out = Vec::new();
        let mut current = Some(start);
        while let Some(id) = current {
            if !out.contains(&id) {
                out.push(id);
            }
            for &module in &self.get(id).includes {
                self.module_ancestors(module, &mut out);
            }
            current = self.get(id).superclass;
        }
        out
    }

    fn module_ancestors(&self, module: TypeId, out: &mut Vec<TypeId>) {
        if out.contains(&module) {
            return;
        }
        out.push(module);
        for &inner in &self.get(module).includes {
            self.module_ancestors(inner, out);
        }
    }

    fn includes_transitively(&self, module: TypeId, target: TypeId) -> bool {
        self.get(module).includes.iter().any(|&inner| {
            inner == target || self.includes_transitively(inner, target)
        })
    }
}

/// Phase one allocates the metatype with itself as a placeholder superclass
/// so the others can be stamped with a valid logical type. Phase two closes
/// the `Class < Module < Object < BasicObject` chain and binds the names.
fn create_bootstrap_triad(
    arena: &mut TypeArena,
    basic_shape: Arc<Shape>,
    module_shape: Arc<Shape>,
) -> BootstrapTypes {
    let class = TypeId(arena.types.len() as u32);
    arena.alloc(TypeKind::Class, class, Some(class), module_shape.clone());
    let basic_object =
        arena.alloc(TypeKind::Class, class, None, basic_shape.clone());
    let object =
        arena.alloc(TypeKind::Class, class, Some(basic_object), basic_shape);
    let module =
        arena.alloc(TypeKind::Class, class, Some(object), module_shape);

    arena.get_mut(class).superclass = Some(module);
    arena.root_namespace = Some(object);

    for (id, name) in [
        (class, "Class"),
        (basic_object, "BasicObject"),
        (object, "Object"),
        (module, "Module"),
    ] {
        arena.adopt(id, object, name);
    }

    BootstrapTypes {
        class,
        basic_object,
        object,
        module,
    }
}

/// Owns every class and module. Types live in an arena indexed by
/// [`TypeId`]; structural reads take the read lock, definitions the write
/// lock. Any change that can alter method lookup bumps the method epoch.
pub struct TypeRegistry {
    arena: RwLock<TypeArena>,
    shapes: ShapeTable,
    roots: BootstrapTypes,
    method_epoch: AtomicU64,
}

impl TypeRegistry {
    pub fn new() -> Result<Self, RegistryError> {
        let shapes = ShapeTable::new();
        let basic_shape = shapes.define(BASIC_OBJECT_SHAPE, &[]);
        let module_shape = shapes.define(MODULE_SHAPE, &[]);
        let mut arena = TypeArena::new(module_shape.clone());
        let roots =
            create_bootstrap_triad(&mut arena, basic_shape, module_shape);
        let registry = Self {
            arena: RwLock::new(arena),
            shapes,
            roots,
            method_epoch: AtomicU64::new(0),
        };
        registry.verify()?;
        log::debug!("type registry bootstrapped: {roots:?}");
        Ok(registry)
    }

    /// Checks that every class chain terminates at the universal root and
    /// that the bootstrap cycle was closed.
    pub fn verify(&self) -> Result<(), RegistryError> {
        let arena = self.arena.read();
        let roots = self.roots;
        let malformed = |reason: String| -> Result<(), RegistryError> {
            Err(RegistryError::MalformedTypeGraph { reason })
        };
        if arena.get(roots.class).superclass != Some(roots.module) {
            return malformed("metatype is not a subclass of Module".into());
        }
        if arena.get(roots.basic_object).superclass.is_some() {
            return malformed("universal root has a superclass".into());
        }
        for (index, data) in arena.types.iter().enumerate() {
            if data.kind == TypeKind::Module {
                continue;
            }
            let mut current = data.superclass;
            let mut steps = 0;
            let mut last = TypeId(index as u32);
            while let Some(next) = current {
                steps += 1;
                if steps > arena.types.len() {
                    return malformed(format!(
                        "superclass cycle through {}",
                        arena.display_name(TypeId(index as u32))
                    ));
                }
                last = next;
                current = arena.get(next).superclass;
            }
            if last != roots.basic_object {
                return malformed(format!(
                    "{} does not descend from BasicObject",
                    arena.display_name(TypeId(index as u32))
                ));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn roots(&self) -> BootstrapTypes {
        self.roots
    }

    pub fn shapes(&self) -> &ShapeTable {
        &self.shapes
    }

    #[inline]
    pub fn epoch(&self) -> u64 {
        self.method_epoch.load(Ordering::Acquire)
    }

    fn bump_epoch(&self) {
        self.method_epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn len(&self) -> usize {
        self.arena.read().types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn types(&self) -> Vec<TypeId> {
        (0..self.len() as u32).map(TypeId).collect()
    }

    pub fn kind(&self, id: TypeId) -> TypeKind {
        self.arena.read().get(id).kind
    }

    pub fn name(&self, id: TypeId) -> Option<Arc<str>> {
        self.arena.read().get(id).name.clone()
    }

    pub fn display_name(&self, id: TypeId) -> String {
        self.arena.read().display_name(id)
    }

    pub fn superclass(&self, id: TypeId) -> Option<TypeId> {
        self.arena.read().get(id).superclass
    }

    pub fn includes(&self, id: TypeId) -> Vec<TypeId> {
        self.arena.read().get(id).includes.clone()
    }

    pub fn lexical_parent(&self, id: TypeId) -> Option<TypeId> {
        self.arena.read().get(id).lexical_parent
    }

    pub fn shape(&self, id: TypeId) -> Arc<Shape> {
        self.arena.read().get(id).shape.clone()
    }

    pub fn type_object(&self, id: TypeId) -> Arc<RObject> {
        self.arena.read().get(id).object.clone()
    }

    pub fn type_value(&self, id: TypeId) -> Value {
        Value::Object(self.type_object(id))
    }

    pub fn is_singleton(&self, id: TypeId) -> bool {
        self.arena.read().get(id).attached.is_some()
    }

    pub fn attached(&self, id: TypeId) -> Option<Arc<RObject>> {
        self.arena.read().get(id).attached.clone()
    }

    pub fn define_class(
        &self,
        superclass: Option<TypeId>,
        name: &str,
        shape: Option<Arc<Shape>>,
    ) -> Result<TypeId, RegistryError> {
        self.define_class_under(self.roots.object, superclass, name, shape)
    }

    /// Defines `parent::name`, or reopens it when it already exists.
    ///
    /// A new class must name its superclass; it inherits the superclass's
    /// shape unless `shape` is given. Reopening with a different superclass
    /// is an error, reopening without naming one is not.
    pub fn define_class_under(
        &self,
        parent: TypeId,
        superclass: Option<TypeId>,
        name: &str,
        shape: Option<Arc<Shape>>,
    ) -> Result<TypeId, RegistryError> {
        let mut arena = self.arena.write();

        if let Some(existing) = arena.get(parent).constants.get(name) {
            let existing = match existing.as_type() {
                Some(id) if arena.get(id).kind == TypeKind::Class => id,
                _ => {
                    return Err(RegistryError::NotAClass {
                        name: name.to_string(),
                    });
                }
            };
            return match superclass {
                Some(requested)
                    if arena.get(existing).superclass != Some(requested) =>
                {
                    Err(RegistryError::SuperclassMismatch {
                        name: arena.display_name(existing),
                    })
                }
                _ => Ok(existing),
            };
        }

        let Some(superclass) = superclass else {
            return Err(RegistryError::MissingSuperclass {
                name: name.to_string(),
            });
        };
        if arena.get(superclass).kind != TypeKind::Class {
            return Err(RegistryError::SuperclassNotClass {
                name: arena.display_name(superclass),
            });
        }

        let shape = shape.unwrap_or_else(|| arena.get(superclass).shape.clone());
        let id = arena.alloc(
            TypeKind::Class,
            self.roots.class,
            Some(superclass),
            shape,
        );
        arena.adopt(id, parent, name);
        log::trace!(
            "defined class {} < {}",
            arena.display_name(id),
            arena.display_name(superclass)
        );
        Ok(id)
    }

    /// Creates a class with no name. It is named when first bound to a
    /// constant.
    pub fn define_anonymous_class(
        &self,
        superclass: TypeId,
        shape: Option<Arc<Shape>>,
    ) -> Result<TypeId, RegistryError> {
        let mut arena = self.arena.write();
        if arena.get(superclass).kind != TypeKind::Class {
            return Err(RegistryError::SuperclassNotClass {
                name: arena.display_name(superclass),
            });
        }
        let shape = shape.unwrap_or_else(|| arena.get(superclass).shape.clone());
        Ok(arena.alloc(
            TypeKind::Class,
            self.roots.class,
            Some(superclass),
            shape,
        ))
    }

    pub fn define_module(&self, name: &str) -> Result<TypeId, RegistryError> {
        self.define_module_under(self.roots.object, name)
    }

    pub fn define_module_under(
        &self,
        parent: TypeId,
        name: &str,
    ) -> Result<TypeId, RegistryError> {
        let mut arena = self.arena.write();
        if let Some(existing) = arena.get(parent).constants.get(name) {
            return match existing.as_type() {
                Some(id) if arena.get(id).kind == TypeKind::Module => Ok(id),
                _ => Err(RegistryError::NotAModule {
                    name: name.to_string(),
                }),
            };
        }
        let shape = arena.type_shape.clone();
        let id = arena.alloc(TypeKind::Module, self.roots.module, None, shape);
        arena.adopt(id, parent, name);
        log::trace!("defined module {}", arena.display_name(id));
        Ok(id)
    }

    /// Mixes `module` into `target`. Including an already included module
    /// moves it to the front instead of duplicating it.
    pub fn include(
        &self,
        target: TypeId,
        module: TypeId,
    ) -> Result<(), RegistryError> {
        let mut arena = self.arena.write();
        if arena.get(module).kind != TypeKind::Module {
            return Err(RegistryError::IncludeNotModule {
                name: arena.display_name(module),
            });
        }
        if target == module || arena.includes_transitively(module, target) {
            return Err(RegistryError::CyclicInclude {
                name: arena.display_name(module),
            });
        }
        let includes = &mut arena.get_mut(target).includes;
        includes.retain(|&existing| existing != module);
        includes.insert(0, module);
        drop(arena);
        self.bump_epoch();
        Ok(())
    }

    /// Binds a constant. An anonymous type assigned to a constant takes
    /// that constant's name.
    pub fn set_constant(&self, owner: TypeId, name: &str, value: Value) {
        let mut arena = self.arena.write();
        if let Some(id) = value.as_type() {
            if arena.get(id).name.is_none() && arena.get(id).attached.is_none()
            {
                arena.adopt(id, owner, name);
                return;
            }
        }
        arena.get_mut(owner).constants.insert(Arc::from(name), value);
    }

    /// Reads a constant from `owner`'s own table.
    pub fn get_constant(&self, owner: TypeId, name: &str) -> Option<Value> {
        self.arena.read().get(owner).constants.get(name).cloned()
    }

    /// Reads a constant through `start`'s ancestors, then through Object.
    pub fn find_constant(&self, start: TypeId, name: &str) -> Option<Value> {
        let arena = self.arena.read();
        let mut search = arena.ancestors(start);
        if !search.contains(&self.roots.object) {
            search.extend(arena.ancestors(self.roots.object));
        }
        search
            .into_iter()
            .find_map(|id| arena.get(id).constants.get(name).cloned())
    }

    /// Resolves a `A::B::C` path starting at Object.
    pub fn resolve_path(&self, path: &str) -> Option<Value> {
        let mut segments = path.split("::").filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut value = self.find_constant(self.roots.object, first)?;
        for segment in segments {
            let owner = value.as_type()?;
            value = self.find_constant(owner, segment)?;
        }
        Some(value)
    }

    pub fn constant_names(&self, owner: TypeId) -> Vec<Arc<str>> {
        let mut names: Vec<_> = self
            .arena
            .read()
            .get(owner)
            .constants
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn define_method(
        &self,
        owner: TypeId,
        name: &str,
        arity: Arity,
        body: MethodFn,
    ) {
        let name: Arc<str> = Arc::from(name);
        let method = Method {
            name: name.clone(),
            owner,
            arity,
            body,
        };
        self.arena.write().get_mut(owner).methods.insert(name, method);
        self.bump_epoch();
    }

    pub fn find_method(&self, start: TypeId, name: &str) -> Option<Method> {
        let arena = self.arena.read();
        arena
            .ancestors(start)
            .into_iter()
            .find_map(|id| arena.get(id).methods.get(name).cloned())
    }

    pub fn method_names(&self, owner: TypeId) -> Vec<Arc<str>> {
        let mut names: Vec<_> = self
            .arena
            .read()
            .get(owner)
            .methods
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn ancestors(&self, start: TypeId) -> Vec<TypeId> {
        self.arena.read().ancestors(start)
    }

    pub fn is_ancestor(&self, id: TypeId, ancestor: TypeId) -> bool {
        self.arena.read().ancestors(id).contains(&ancestor)
    }

    /// Returns the singleton type of a heap object, creating it on first
    /// request. Creation happens under the write lock so an object is never
    /// given two singleton types.
    pub fn singleton_class_of(&self, object: &Arc<RObject>) -> TypeId {
        if let Some(id) = object.singleton() {
            return id;
        }
        let mut arena = self.arena.write();
        self.singleton_locked(&mut arena, object)
    }

    fn singleton_locked(
        &self,
        arena: &mut TypeArena,
        object: &Arc<RObject>,
    ) -> TypeId {
        if let Some(id) = object.singleton() {
            return id;
        }
        let superclass = match object.as_type() {
            Some(ty) => {
                let kind = arena.get(ty).kind;
                let parent = arena.get(ty).superclass;
                match (kind, parent) {
                    (TypeKind::Module, _) => self.roots.module,
                    (TypeKind::Class, None) => self.roots.class,
                    (TypeKind::Class, Some(parent)) => {
                        let parent = arena.get(parent).object.clone();
                        self.singleton_locked(arena, &parent)
                    }
                }
            }
            None => object.logical_type(),
        };
        let shape = arena.get(superclass).shape.clone();
        let id = arena.alloc(
            TypeKind::Class,
            self.roots.class,
            Some(superclass),
            shape,
        );
        arena.get_mut(id).attached = Some(object.clone());
        let attached = object.attach_singleton(id);
        log::trace!("attached singleton {}", arena.display_name(attached));
        attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::new().unwrap()
    }

    #[test]
    fn bootstrap_closes_metatype_cycle() {
        let registry = registry();
        let roots = registry.roots();

        assert_eq!(registry.superclass(roots.class), Some(roots.module));
        assert_eq!(registry.superclass(roots.module), Some(roots.object));
        assert_eq!(registry.superclass(roots.object), Some(roots.basic_object));
        assert_eq!(registry.superclass(roots.basic_object), None);

        for id in [roots.class, roots.basic_object, roots.object, roots.module] {
            assert_eq!(registry.type_object(id).logical_type(), roots.class);
        }
    }

    #[test]
    fn bootstrap_types_are_constants_of_object() {
        let registry = registry();
        let roots = registry.roots();
        for (name, id) in [
            ("Class", roots.class),
            ("BasicObject", roots.basic_object),
            ("Object", roots.object),
            ("Module", roots.module),
        ] {
            let value = registry.get_constant(roots.object, name).unwrap();
            assert_eq!(value.as_type(), Some(id));
            assert_eq!(registry.name(id).as_deref(), Some(name));
        }
    }

    #[test]
    fn define_class_requires_superclass() {
        let registry = registry();
        let err = registry.define_class(None, "Orphan", None).unwrap_err();
        assert!(matches!(err, RegistryError::MissingSuperclass { .. }));
    }

    #[test]
    fn subclass_inherits_shape() {
        let registry = registry();
        let roots = registry.roots();
        let shape = registry.shapes().define("exception", &["message"]);
        let exception = registry
            .define_class(Some(roots.object), "Exception", Some(shape.clone()))
            .unwrap();
        let error = registry
            .define_class(Some(exception), "StandardError", None)
            .unwrap();
        assert!(Arc::ptr_eq(&registry.shape(error), &shape));
    }

    #[test]
    fn reopen_and_mismatch() {
        let registry = registry();
        let roots = registry.roots();
        let a = registry.define_class(Some(roots.object), "A", None).unwrap();
        assert_eq!(registry.define_class(None, "A", None), Ok(a));
        assert_eq!(registry.define_class(Some(roots.object), "A", None), Ok(a));
        let err = registry
            .define_class(Some(roots.module), "A", None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::SuperclassMismatch { .. }));

        registry.define_module("M").unwrap();
        let err = registry.define_class(Some(roots.object), "M", None);
        assert!(matches!(err, Err(RegistryError::NotAClass { .. })));
    }

    #[test]
    fn nested_names_are_qualified() {
        let registry = registry();
        let roots = registry.roots();
        let outer = registry.define_module("Truffle").unwrap();
        let inner = registry.define_module_under(outer, "Interop").unwrap();
        let class = registry
            .define_class_under(inner, Some(roots.object), "Foreign", None)
            .unwrap();
        assert_eq!(
            registry.name(class).as_deref(),
            Some("Truffle::Interop::Foreign")
        );
        assert_eq!(
            registry.resolve_path("Truffle::Interop::Foreign"),
            Some(registry.type_value(class))
        );
    }

    #[test]
    fn include_is_idempotent_and_moves_to_front() {
        let registry = registry();
        let roots = registry.roots();
        let a = registry.define_module("A").unwrap();
        let b = registry.define_module("B").unwrap();
        registry.include(roots.object, a).unwrap();
        registry.include(roots.object, b).unwrap();
        registry.include(roots.object, a).unwrap();
        assert_eq!(registry.includes(roots.object), vec![a, b]);
        let ancestors = registry.ancestors(roots.object);
        assert_eq!(ancestors, vec![roots.object, a, b, roots.basic_object]);
    }

    #[test]
    fn include_rejects_classes_and_cycles() {
        let registry = registry();
        let roots = registry.roots();
        let err = registry.include(roots.object, roots.module).unwrap_err();
        assert!(matches!(err, RegistryError::IncludeNotModule { .. }));

        let a = registry.define_module("A").unwrap();
        let b = registry.define_module("B").unwrap();
        registry.include(a, b).unwrap();
        assert!(matches!(
            registry.include(b, a),
            Err(RegistryError::CyclicInclude { .. })
        ));
        assert!(matches!(
            registry.include(a, a),
            Err(RegistryError::CyclicInclude { .. })
        ));
    }

    #[test]
    fn method_lookup_follows_ancestors_and_bumps_epoch() {
        let registry = registry();
        let roots = registry.roots();
        let kernel = registry.define_module("Kernel").unwrap();
        registry.include(roots.object, kernel).unwrap();
        let before = registry.epoch();
        registry.define_method(
            kernel,
            "hello",
            Arity::Exact(0),
            Arc::new(|_, _, _| Ok(Value::Nil)),
        );
        assert!(registry.epoch() > before);
        let found = registry.find_method(roots.class, "hello").unwrap();
        assert_eq!(found.owner(), kernel);
        assert!(registry.find_method(roots.basic_object, "hello").is_none());
    }

    #[test]
    fn anonymous_type_named_on_assignment() {
        let registry = registry();
        let roots = registry.roots();
        let anonymous =
            registry.define_anonymous_class(roots.object, None).unwrap();
        assert!(registry.name(anonymous).is_none());
        let outer = registry.define_module("Outer").unwrap();
        registry.set_constant(outer, "Inner", registry.type_value(anonymous));
        assert_eq!(registry.name(anonymous).as_deref(), Some("Outer::Inner"));
        assert_eq!(registry.lexical_parent(anonymous), Some(outer));

        // Rebinding does not rename.
        registry.set_constant(roots.object, "Alias", registry.type_value(anonymous));
        assert_eq!(registry.name(anonymous).as_deref(), Some("Outer::Inner"));
    }

    #[test]
    fn singleton_display_name() {
        let registry = registry();
        let roots = registry.roots();
        let shape = registry.shape(roots.object);
        let object = Arc::new(RObject::new(roots.object, shape, ObjectData::Plain));
        let singleton = registry.singleton_class_of(&object);
        assert!(registry.name(singleton).is_none());
        assert_eq!(registry.display_name(singleton), "#<Class:#<Object>>");
    }

    #[test]
    fn singleton_attached_once() {
        let registry = registry();
        let roots = registry.roots();
        let shape = registry.shape(roots.object);
        let object = Arc::new(RObject::new(roots.object, shape, ObjectData::Plain));
        assert_eq!(object.meta_type(), roots.object);
        let first = registry.singleton_class_of(&object);
        let second = registry.singleton_class_of(&object);
        assert_eq!(first, second);
        assert_eq!(object.meta_type(), first);
        assert_eq!(object.logical_type(), roots.object);
        assert_eq!(registry.superclass(first), Some(roots.object));
        assert!(registry.is_singleton(first));
    }

    #[test]
    fn metaclass_chain_mirrors_class_chain() {
        let registry = registry();
        let roots = registry.roots();
        let meta_object =
            registry.singleton_class_of(&registry.type_object(roots.object));
        let meta_basic = registry
            .singleton_class_of(&registry.type_object(roots.basic_object));
        assert_eq!(registry.superclass(meta_object), Some(meta_basic));
        assert_eq!(registry.superclass(meta_basic), Some(roots.class));
        assert_eq!(registry.display_name(meta_object), "#<Class:Object>");
        registry.verify().unwrap();
    }

    #[test]
    fn structural_mutation_under_concurrent_readers() {
        use std::{sync::Barrier, thread};

        const WRITERS: usize = 4;
        const READERS: usize = 4;
        const ROUNDS: usize = 32;

        let registry = Arc::new(registry());
        let roots = registry.roots();
        let shared = registry.define_module("Shared").unwrap();
        registry.set_constant(shared, "SEED", Value::Fixnum(1));
        registry.define_method(
            shared,
            "seed",
            Arity::Exact(0),
            Arc::new(|_, _, _| Ok(Value::Fixnum(1))),
        );
        let epoch = registry.epoch();

        let barrier = Arc::new(Barrier::new(WRITERS + READERS));
        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for r in 0..ROUNDS {
                        let module = registry.define_module(&format!("M{w}_{r}")).unwrap();
                        let class = registry
                            .define_class(Some(roots.object), &format!("C{w}_{r}"), None)
                            .unwrap();
                        registry.include(class, shared).unwrap();
                        registry.include(class, module).unwrap();
                        registry.set_constant(class, "ID", Value::Fixnum((w * 1000 + r) as i64));
                    }
                })
            })
            .collect();
        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..ROUNDS {
                        for ty in registry.types() {
                            let ancestors = registry.ancestors(ty);
                            assert_eq!(ancestors[0], ty);
                            if registry.superclass(ty).is_some() {
                                assert_eq!(ancestors.last(), Some(&roots.basic_object));
                            }
                            if ancestors.contains(&shared) {
                                assert_eq!(
                                    registry.find_constant(ty, "SEED"),
                                    Some(Value::Fixnum(1))
                                );
                                assert!(registry.find_method(ty, "seed").is_some());
                            }
                        }
                        assert!(registry.find_constant(roots.object, "Shared").is_some());
                    }
                })
            })
            .collect();
        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }

        registry.verify().unwrap();
        assert!(registry.epoch() >= epoch + (WRITERS * ROUNDS * 2) as u64);
        for w in 0..WRITERS {
            for r in 0..ROUNDS {
                let class = registry
                    .resolve_path(&format!("C{w}_{r}"))
                    .and_then(|value| value.as_type())
                    .unwrap();
                let module = registry
                    .resolve_path(&format!("M{w}_{r}"))
                    .and_then(|value| value.as_type())
                    .unwrap();
                assert_eq!(registry.includes(class), vec![module, shared]);
                assert_eq!(&registry.ancestors(class)[..3], &[class, module, shared]);
                assert_eq!(
                    registry.get_constant(class, "ID"),
                    Some(Value::Fixnum((w * 1000 + r) as i64))
                );
                assert!(registry.find_method(class, "seed").is_some());
            }
        }
    }
}
