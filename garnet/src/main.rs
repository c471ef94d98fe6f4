use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use parking_lot::Mutex;

use garnet::{
    BootstrapError, CodeLoader, DeclarationContext, FileSourceLoader, LoadPlan,
    Options, RESOURCE_SCHEME, RaiseException, Runtime, RuntimeCreateInfo,
    RuntimeShared, SourceUnit, TypeId, TypeKind, Value, Verbosity,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VerbosityArg {
    Nil,
    False,
    True,
}

impl From<VerbosityArg> for Verbosity {
    fn from(arg: VerbosityArg) -> Self {
        match arg {
            VerbosityArg::Nil => Verbosity::Nil,
            VerbosityArg::False => Verbosity::False,
            VerbosityArg::True => Verbosity::True,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long, help = "Directory or resource path holding the core library")]
    core_load_path: Option<String>,

    #[arg(long, help = "Runtime home; also the root for resource: paths")]
    home: Option<PathBuf>,

    #[arg(long, help = "Do not register library patch files")]
    no_patching: bool,

    #[arg(long, value_enum, default_value = "false", help = "Initial $VERBOSE")]
    verbosity: VerbosityArg,

    #[arg(long, help = "Initial $DEBUG")]
    debug: bool,

    /// Reads every core unit in load order without running it
    #[arg(long, help = "Read the core library units through the loader")]
    load_core: bool,

    #[arg(long, help = "Print the class hierarchy after boot")]
    dump_types: bool,
}

impl Cli {
    fn options(&self) -> Options {
        let mut options = Options {
            home: self.home.clone(),
            patching: !self.no_patching,
            verbosity: self.verbosity.into(),
            debug: self.debug,
            ..Options::default()
        };
        if let Some(path) = &self.core_load_path {
            options.core_load_path = path.clone();
        }
        options
    }
}

/// Accepts every unit and records its path. Nothing is executed.
#[derive(Default)]
struct RecordingLoader {
    seen: Mutex<Vec<(String, usize)>>,
}

impl CodeLoader for RecordingLoader {
    type Unit = SourceUnit;

    fn parse(
        &self,
        _runtime: &RuntimeShared,
        source: &SourceUnit,
    ) -> Result<SourceUnit, RaiseException> {
        Ok(source.clone())
    }

    fn run(
        &self,
        _runtime: &RuntimeShared,
        unit: SourceUnit,
        _context: DeclarationContext,
        _receiver: &Value,
    ) -> Result<Value, RaiseException> {
        self.seen.lock().push((unit.path, unit.text.len()));
        Ok(Value::Nil)
    }
}

fn dump_types(runtime: &RuntimeShared) {
    let registry = runtime.registry();
    let types: Vec<TypeId> = registry
        .types()
        .into_iter()
        .filter(|&ty| !registry.is_singleton(ty) && registry.name(ty).is_some())
        .collect();

    fn walk(runtime: &RuntimeShared, types: &[TypeId], ty: TypeId, depth: usize) {
        let registry = runtime.registry();
        let includes: Vec<String> = registry
            .includes(ty)
            .into_iter()
            .map(|module| registry.display_name(module))
            .collect();
        if includes.is_empty() {
            println!("{}{}", "  ".repeat(depth), registry.display_name(ty));
        } else {
            println!(
                "{}{} [{}]",
                "  ".repeat(depth),
                registry.display_name(ty),
                includes.join(", ")
            );
        }
        for &child in types {
            if registry.kind(child) == TypeKind::Class
                && registry.superclass(child) == Some(ty)
            {
                walk(runtime, types, child, depth + 1);
            }
        }
    }

    walk(runtime, &types, runtime.core().basic_object, 0);
    println!();
    for &ty in &types {
        if registry.kind(ty) == TypeKind::Module {
            println!("module {}", registry.display_name(ty));
        }
    }
}

fn run(cli: &Cli) -> Result<(), BootstrapError> {
    let runtime = Runtime::new(RuntimeCreateInfo {
        options: cli.options(),
        ..RuntimeCreateInfo::default()
    })?;
    let shared = runtime.shared();
    log::info!(
        "booted with core load path {}, {} patch files",
        shared.core_load_path(),
        shared.patches().len()
    );

    if cli.load_core {
        let resource_root = if shared.core_load_path().starts_with(RESOURCE_SCHEME) {
            cli.home.clone()
        } else {
            None
        };
        let sources = FileSourceLoader::new(resource_root);
        let code = RecordingLoader::default();
        let mut plan = LoadPlan::core();
        plan.required_constants.clear();
        shared.load_core_library(&sources, &code, &plan)?;
        let seen = code.seen.lock();
        let bytes: usize = seen.iter().map(|(_, len)| len).sum();
        println!("read {} core units ({bytes} bytes)", seen.len());
    }

    if cli.dump_types {
        dump_types(shared);
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("garnet: {err}");
        std::process::exit(1);
    }
}
