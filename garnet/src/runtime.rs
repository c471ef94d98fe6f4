use std::{
    marker::PhantomData,
    sync::{Arc, OnceLock},
};

use crate::{
    Arity, BootstrapError, CodeLoader, CoreExceptions, CoreTypes,
    DeclarationContext, ErrnoTable, GlobalReader, GlobalTable, Lifecycle,
    LifecycleState, LoadPlan, MethodFn, NativeConfiguration, ObjectData,
    Options, PatchFiles, RObject, RaiseException, SourceLoader, SymbolTable,
    TypeId, TypeRegistry, Value, dispatch, install_primitives,
    logical_type_of, meta_type_of,
};

pub const ENGINE: &str = "garnet";
pub const LANGUAGE_VERSION: &str = "3.2.2";

pub const LOAD_PATH: &str = "$LOAD_PATH";
pub const DEBUG: &str = "$DEBUG";
pub const VERBOSE: &str = "$VERBOSE";
pub const PROGRAM_NAME: &str = "$0";

/// Handles to the globals consulted after the core library has loaded.
struct GlobalReaders {
    load_path: GlobalReader,
    debug: GlobalReader,
    verbose: GlobalReader,
}

/// Process-scoped state shared by every thread of a runtime.
pub struct RuntimeShared {
    options: Options,
    core_load_path: String,
    symbols: SymbolTable,
    registry: TypeRegistry,
    core: CoreTypes,
    globals: GlobalTable,
    errno: ErrnoTable,
    patches: PatchFiles,
    lifecycle: Lifecycle,
    main_object: Value,
    undefined: Value,
    readers: OnceLock<GlobalReaders>,
}

/// Owning handle of a runtime. Not `Send`; other threads use a
/// [`RuntimeProxy`].
pub struct Runtime {
    inner: Arc<RuntimeShared>,
    _marker: PhantomData<*const ()>,
}

#[derive(Clone)]
pub struct RuntimeProxy {
    pub shared: Arc<RuntimeShared>,
}

pub struct RuntimeCreateInfo {
    pub options: Options,
    pub native_config: NativeConfiguration,
}

impl Default for RuntimeCreateInfo {
    fn default() -> Self {
        Self {
            options: Options::default(),
            native_config: NativeConfiguration::linux(),
        }
    }
}

impl Runtime {
    pub fn new(info: RuntimeCreateInfo) -> Result<Self, BootstrapError> {
        let RuntimeCreateInfo {
            options,
            native_config,
        } = info;
        let core_load_path = options.resolved_core_load_path()?;

        let registry = TypeRegistry::new()?;
        let core = CoreTypes::define(&registry)?;
        install_primitives(&registry, &core);

        let errno = ErrnoTable::new();
        errno.define(&registry, &core, &native_config)?;
        registry.verify()?;

        let patches = match (&options.home, options.patching) {
            (Some(home), true) => PatchFiles::discover(home),
            _ => PatchFiles::empty(),
        };

        let plain = |ty: TypeId| {
            Value::Object(Arc::new(RObject::new(
                ty,
                registry.shape(ty),
                ObjectData::Plain,
            )))
        };
        let main_object = plain(core.object);
        let undefined = plain(core.object);

        let globals = GlobalTable::new();
        globals.set_internal(DEBUG, Value::Bool(options.debug));
        globals.set_internal(VERBOSE, options.verbosity.as_value());
        globals.set_internal(LOAD_PATH, Value::Nil);
        globals.alias("$:", LOAD_PATH);
        globals.alias("$-I", LOAD_PATH);
        globals.alias("$-d", DEBUG);
        globals.alias("$-v", VERBOSE);
        globals.alias("$-w", VERBOSE);

        let shared = RuntimeShared {
            options,
            core_load_path,
            symbols: SymbolTable::new(),
            registry,
            core,
            globals,
            errno,
            patches,
            lifecycle: Lifecycle::new(),
            main_object,
            undefined,
            readers: OnceLock::new(),
        };
        shared.define_boot_constants()?;
        log::debug!(
            "bootstrapped {} types, {} errno classes",
            shared.registry.len(),
            shared.errno.len()
        );

        Ok(Self {
            inner: Arc::new(shared),
            _marker: PhantomData,
        })
    }

    pub fn shared(&self) -> &Arc<RuntimeShared> {
        &self.inner
    }

    pub fn new_proxy(&self) -> RuntimeProxy {
        RuntimeProxy {
            shared: self.inner.clone(),
        }
    }
}

impl std::ops::Deref for Runtime {
    type Target = RuntimeShared;

    fn deref(&self) -> &RuntimeShared {
        &self.inner
    }
}

impl RuntimeProxy {
    pub fn create_proxy(&self) -> Self {
        self.clone()
    }
}

impl RuntimeShared {
    fn define_boot_constants(&self) -> Result<(), BootstrapError> {
        let object = self.core.object;
        let platform = format!(
            "{}-{}",
            std::env::consts::ARCH,
            std::env::consts::OS
        );
        self.registry
            .set_constant(object, "RUBY_ENGINE", self.new_string(ENGINE));
        self.registry
            .set_constant(object, "RUBY_VERSION", self.new_string(LANGUAGE_VERSION));
        self.registry
            .set_constant(object, "RUBY_PATCHLEVEL", Value::Fixnum(0));
        self.registry
            .set_constant(object, "RUBY_PLATFORM", self.new_string(&platform));
        self.registry.set_constant(
            self.core.basic_object,
            "BasicObject",
            self.registry.type_value(self.core.basic_object),
        );
        self.registry
            .set_constant(self.core.truffle, "UNDEFINED", self.undefined.clone());

        let to_s: MethodFn = Arc::new(|runtime, _, _| Ok(runtime.new_string("main")));
        self.define_singleton_method(&self.main_object, "to_s", Arity::Exact(0), to_s.clone())
            .and_then(|()| {
                self.define_singleton_method(&self.main_object, "inspect", Arity::Exact(0), to_s)
            })
            .map_err(|exception| BootstrapError::CoreLibraryRaised {
                unit: "<boot>".to_string(),
                exception,
            })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The normalized core load path.
    pub fn core_load_path(&self) -> &str {
        &self.core_load_path
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn core(&self) -> &CoreTypes {
        &self.core
    }

    pub fn globals(&self) -> &GlobalTable {
        &self.globals
    }

    pub fn errno(&self) -> &ErrnoTable {
        &self.errno
    }

    pub fn patches(&self) -> &PatchFiles {
        &self.patches
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// `self` at top level.
    pub fn main_object(&self) -> &Value {
        &self.main_object
    }

    /// Marker for an argument that was not passed.
    pub fn undefined(&self) -> &Value {
        &self.undefined
    }

    pub fn exceptions(&self) -> CoreExceptions<'_> {
        CoreExceptions::new(&self.registry, &self.core)
    }

    #[inline]
    pub fn logical_type(&self, value: &Value) -> TypeId {
        logical_type_of(&self.core, value)
    }

    #[inline]
    pub fn meta_type(&self, value: &Value) -> TypeId {
        meta_type_of(&self.core, value)
    }

    /// Singleton type of `value`, created on first request.
    pub fn singleton_class(&self, value: &Value) -> Result<TypeId, RaiseException> {
        match value {
            Value::Nil => Ok(self.core.nil_class),
            Value::Bool(true) => Ok(self.core.true_class),
            Value::Bool(false) => Ok(self.core.false_class),
            Value::Object(object) => Ok(self.registry.singleton_class_of(object)),
            _ => Err(self.exceptions().type_error("can't define singleton")),
        }
    }

    pub fn define_singleton_method(
        &self,
        value: &Value,
        name: &str,
        arity: Arity,
        body: MethodFn,
    ) -> Result<(), RaiseException> {
        let singleton = self.singleton_class(value)?;
        self.registry.define_method(singleton, name, arity, body);
        Ok(())
    }

    /// Sends `name` without an inline cache.
    pub fn call(
        &self,
        receiver: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RaiseException> {
        dispatch::call_uncached(self, receiver, name, args)
    }

    pub fn new_string(&self, text: &str) -> Value {
        let string = self.core.string;
        Value::Object(Arc::new(RObject::new(
            string,
            self.registry.shape(string),
            ObjectData::Str(Arc::from(text)),
        )))
    }

    pub fn new_object(&self, ty: TypeId) -> Value {
        Value::Object(Arc::new(RObject::new(
            ty,
            self.registry.shape(ty),
            ObjectData::Plain,
        )))
    }

    pub fn intern(&self, name: &str) -> Value {
        Value::Symbol(self.symbols.intern(name))
    }

    /// Text of a symbol or string argument naming a method or member.
    pub fn name_to_string(&self, value: &Value) -> Result<String, RaiseException> {
        if let Value::Symbol(symbol) = value {
            if let Some(name) = self.symbols.name(*symbol) {
                return Ok(name.to_string());
            }
        }
        match value.as_str() {
            Some(text) => Ok(text.to_string()),
            None => Err(self
                .exceptions()
                .type_error(format!("{} is not a symbol nor a string", self.inspect(value)))),
        }
    }

    /// Host-side rendering of a value for error messages.
    pub fn inspect(&self, value: &Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(value) => value.to_string(),
            Value::Fixnum(value) => value.to_string(),
            Value::Bignum(value) => value.to_string(),
            Value::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                format!("{value:.1}")
            }
            Value::Float(value) if value.is_nan() => "NaN".to_string(),
            Value::Float(value) if *value > 0.0 && value.is_infinite() => {
                "Infinity".to_string()
            }
            Value::Float(value) if value.is_infinite() => "-Infinity".to_string(),
            Value::Float(value) => value.to_string(),
            Value::Symbol(symbol) => match self.symbols.name(*symbol) {
                Some(name) => format!(":{name}"),
                None => format!(":<unknown {}>", symbol.index()),
            },
            Value::Object(object) => {
                if let Some(text) = object.as_str() {
                    return format!("{text:?}");
                }
                if let Some(ty) = object.as_type() {
                    return self.registry.display_name(ty);
                }
                if self.main_object.identical(value) {
                    return "main".to_string();
                }
                format!("#<{}>", self.registry.display_name(object.logical_type()))
            }
            Value::Foreign(_) => {
                format!("#<{}>", self.registry.display_name(self.core.polyglot_foreign_object))
            }
        }
    }

    pub fn no_method_error(&self, receiver: &Value, name: &str) -> RaiseException {
        self.exceptions()
            .no_method_error(name, &self.inspect(receiver))
    }

    /// Runs every unit of `plan` in order. The post-boot unit is preceded by
    /// the after-load hook and the transition to `Loaded`. Any raise or read
    /// failure aborts the boot.
    pub fn load_core_library<S: SourceLoader, C: CodeLoader>(
        &self,
        sources: &S,
        code: &C,
        plan: &LoadPlan,
    ) -> Result<(), BootstrapError> {
        self.lifecycle.advance(LifecycleState::LoadingCoreLibrary)?;
        for unit in &plan.units {
            let path = format!("{}{}", self.core_load_path, unit);
            if *unit == plan.post_boot {
                self.after_load_core_library(&plan.required_constants)?;
                self.lifecycle.advance(LifecycleState::Loaded)?;
            }
            log::debug!("loading {path}");
            self.load_unit(sources, code, &path)?;
        }
        if !self.lifecycle.is_loaded() {
            log::debug!("no post-boot unit in the load plan");
            self.after_load_core_library(&plan.required_constants)?;
            self.lifecycle.advance(LifecycleState::Loaded)?;
        }
        Ok(())
    }

    fn load_unit<S: SourceLoader, C: CodeLoader>(
        &self,
        sources: &S,
        code: &C,
        path: &str,
    ) -> Result<(), BootstrapError> {
        let source = sources.load(path).map_err(|source| BootstrapError::Io {
            path: path.to_string(),
            source,
        })?;
        let raised = |exception| BootstrapError::CoreLibraryRaised {
            unit: path.to_string(),
            exception,
        };
        let unit = code.parse(self, &source).map_err(raised)?;
        code.run(self, unit, DeclarationContext::TopLevel, &self.main_object)
            .map_err(raised)?;
        Ok(())
    }

    /// Checks the constants the core library must have defined and switches
    /// the runtime over to reading its flags from globals.
    pub fn after_load_core_library(
        &self,
        required_constants: &[String],
    ) -> Result<(), BootstrapError> {
        for path in required_constants {
            if self.registry.resolve_path(path).is_none() {
                return Err(BootstrapError::MissingConstant { path: path.clone() });
            }
        }
        let readers = GlobalReaders {
            load_path: self.globals.reader(LOAD_PATH),
            debug: self.globals.reader(DEBUG),
            verbose: self.globals.reader(VERBOSE),
        };
        if self.readers.set(readers).is_err() {
            log::warn!("after-load hook ran twice");
        }
        self.globals
            .set_internal(PROGRAM_NAME, self.new_string("-"));
        Ok(())
    }

    pub fn debug(&self) -> bool {
        match self.readers.get() {
            Some(readers) => readers
                .debug
                .get()
                .map(|value| value.is_truthy())
                .unwrap_or(false),
            None => self.options.debug,
        }
    }

    /// Current `$VERBOSE`: nil, false or true.
    pub fn verbosity(&self) -> Value {
        match self.readers.get() {
            Some(readers) => readers.verbose.get().unwrap_or(Value::Nil),
            None => self.options.verbosity.as_value(),
        }
    }

    pub fn warnings_enabled(&self) -> bool {
        !self.verbosity().is_nil()
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity() == Value::Bool(true)
    }

    pub fn load_path(&self) -> Value {
        match self.readers.get() {
            Some(readers) => readers.load_path.get().unwrap_or(Value::Nil),
            None => self.globals.get(LOAD_PATH).unwrap_or(Value::Nil),
        }
    }
}
