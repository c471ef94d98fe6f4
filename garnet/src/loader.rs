use std::{
    collections::HashMap,
    fs, io,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use crate::{BootstrapError, RESOURCE_SCHEME, RaiseException, RuntimeShared, TypeId, Value};

pub const POST_BOOT_FILE: &str = "/post-boot/post-boot.rb";

/// Core library units in load order. Paths are relative to the core load
/// path.
pub const CORE_FILES: &[&str] = &[
    "/core/pre.rb",
    "/core/basic_object.rb",
    "/core/array.rb",
    "/core/channel.rb",
    "/core/configuration.rb",
    "/core/false.rb",
    "/core/gc.rb",
    "/core/nil.rb",
    "/core/truffle/platform.rb",
    "/core/string.rb",
    "/core/random.rb",
    "/core/truffle/kernel_operations.rb",
    "/core/truffle/exception_operations.rb",
    "/core/truffle/feature_loader.rb",
    "/core/truffle/thread_operations.rb",
    "/core/thread.rb",
    "/core/true.rb",
    "/core/type.rb",
    "/core/weakref.rb",
    "/core/truffle/ffi/pointer.rb",
    "/core/truffle/ffi/pointer_access.rb",
    "/core/truffle/ffi/pointer_extra.rb",
    "/core/truffle/internal.rb",
    "/core/kernel.rb",
    "/core/lazy_rubygems.rb",
    "/core/truffle/boot.rb",
    "/core/truffle/debug.rb",
    "/core/truffle/encoding_operations.rb",
    "/core/truffle/hash_operations.rb",
    "/core/truffle/numeric_operations.rb",
    "/core/truffle/proc_operations.rb",
    "/core/truffle/range_operations.rb",
    "/core/truffle/regexp_operations.rb",
    "/core/truffle/stat_operations.rb",
    "/core/truffle/string_operations.rb",
    "/core/truffle/backward.rb",
    "/core/truffle/truffleruby.rb",
    "/core/splitter.rb",
    "/core/stat.rb",
    "/core/io.rb",
    "/core/immediate.rb",
    "/core/module.rb",
    "/core/proc.rb",
    "/core/enumerable_helper.rb",
    "/core/enumerable.rb",
    "/core/enumerator.rb",
    "/core/argf.rb",
    "/core/exception.rb",
    "/core/hash.rb",
    "/core/comparable.rb",
    "/core/numeric.rb",
    "/core/truffle/ctype.rb",
    "/core/integer.rb",
    "/core/regexp.rb",
    "/core/transcoding.rb",
    "/core/encoding.rb",
    "/core/env.rb",
    "/core/errno.rb",
    "/core/file.rb",
    "/core/dir.rb",
    "/core/dir_glob.rb",
    "/core/file_test.rb",
    "/core/float.rb",
    "/core/marshal.rb",
    "/core/object_space.rb",
    "/core/range.rb",
    "/core/struct.rb",
    "/core/tms.rb",
    "/core/process.rb",
    "/core/truffle/process_operations.rb",
    "/core/signal.rb",
    "/core/symbol.rb",
    "/core/mutex.rb",
    "/core/throw_catch.rb",
    "/core/time.rb",
    "/core/rational.rb",
    "/core/rationalizer.rb",
    "/core/complex.rb",
    "/core/complexifier.rb",
    "/core/class.rb",
    "/core/binding.rb",
    "/core/math.rb",
    "/core/method.rb",
    "/core/unbound_method.rb",
    "/core/warning.rb",
    "/core/tracepoint.rb",
    "/core/truffle/interop.rb",
    "/core/truffle/polyglot.rb",
    "/core/posix.rb",
    "/core/main.rb",
    "/core/post.rb",
    POST_BOOT_FILE,
];

/// Constants the core library must define before boot completes.
pub const REQUIRED_CONSTANTS: &[&str] = &[
    "IO::EAGAINWaitReadable",
    "IO::EAGAINWaitWritable",
    "TOPLEVEL_BINDING",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    Initializing = 0,
    LoadingCoreLibrary = 1,
    Loaded = 2,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LifecycleState::Initializing,
            1 => LifecycleState::LoadingCoreLibrary,
            _ => LifecycleState::Loaded,
        }
    }
}

/// Monotonic boot state, readable from any thread.
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Initializing as u8),
        }
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves forward to `to`. Staying put or going back is an error.
    pub fn advance(&self, to: LifecycleState) -> Result<(), BootstrapError> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let from = LifecycleState::from_u8(current);
            if from >= to {
                return Err(BootstrapError::IllegalTransition { from, to });
            }
            match self.state.compare_exchange(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    log::info!("lifecycle {from:?} -> {to:?}");
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn is_initializing(&self) -> bool {
        self.state() == LifecycleState::Initializing
    }

    pub fn is_loading_core_library(&self) -> bool {
        self.state() == LifecycleState::LoadingCoreLibrary
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == LifecycleState::Loaded
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: String,
    pub text: Arc<str>,
}

/// Where source text comes from.
pub trait SourceLoader {
    fn load(&self, path: &str) -> io::Result<SourceUnit>;
}

/// Reads units from disk. `resource:` paths resolve under
/// `resource_root`.
pub struct FileSourceLoader {
    resource_root: Option<PathBuf>,
}

impl FileSourceLoader {
    pub fn new(resource_root: Option<PathBuf>) -> Self {
        Self { resource_root }
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        match path.strip_prefix(RESOURCE_SCHEME) {
            Some(resource) => match &self.resource_root {
                Some(root) => Ok(root.join(resource.trim_start_matches('/'))),
                None => Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no resource root for {path}"),
                )),
            },
            None => Ok(PathBuf::from(path)),
        }
    }
}

impl SourceLoader for FileSourceLoader {
    fn load(&self, path: &str) -> io::Result<SourceUnit> {
        let text = fs::read_to_string(self.resolve(path)?)?;
        Ok(SourceUnit {
            path: path.to_string(),
            text: Arc::from(text),
        })
    }
}

/// Units held in memory, keyed by full path.
#[derive(Default)]
pub struct MemorySourceLoader {
    units: HashMap<String, Arc<str>>,
}

impl MemorySourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, text: &str) {
        self.units.insert(path.to_string(), Arc::from(text));
    }
}

impl SourceLoader for MemorySourceLoader {
    fn load(&self, path: &str) -> io::Result<SourceUnit> {
        self.units
            .get(path)
            .map(|text| SourceUnit {
                path: path.to_string(),
                text: text.clone(),
            })
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("{path} not found"))
            })
    }
}

/// Self and definee of code run at top level, or the module it runs
/// wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationContext {
    TopLevel,
    Wrapped(TypeId),
}

/// Turns source into something runnable, and runs it. Parsing is
/// separated from running so the caller controls what happens between.
pub trait CodeLoader {
    type Unit;

    fn parse(
        &self,
        runtime: &RuntimeShared,
        source: &SourceUnit,
    ) -> Result<Self::Unit, RaiseException>;

    fn run(
        &self,
        runtime: &RuntimeShared,
        unit: Self::Unit,
        context: DeclarationContext,
        receiver: &Value,
    ) -> Result<Value, RaiseException>;
}

/// What to load during boot.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub units: Vec<String>,
    pub post_boot: String,
    pub required_constants: Vec<String>,
}

impl LoadPlan {
    pub fn core() -> Self {
        Self {
            units: CORE_FILES.iter().map(|unit| unit.to_string()).collect(),
            post_boot: POST_BOOT_FILE.to_string(),
            required_constants: REQUIRED_CONSTANTS
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}
