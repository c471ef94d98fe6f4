mod common;

use std::sync::Arc;

use common::runtime;
use garnet::{
    BootstrapError, CodeLoader, DeclarationContext, LifecycleState, LoadPlan,
    MemorySourceLoader, RaiseException, RuntimeShared, SourceUnit, Value,
};
use parking_lot::Mutex;

const PREFIX: &str = "resource:/truffleruby";

/// Runs each unit by name: `define NAME` binds a constant on Object,
/// `raise` raises a RuntimeError, anything else does nothing. Records the
/// lifecycle state seen by every unit.
#[derive(Default)]
struct ScriptLoader {
    seen: Mutex<Vec<(String, LifecycleState)>>,
}

impl CodeLoader for ScriptLoader {
    type Unit = SourceUnit;

    fn parse(&self, _: &RuntimeShared, source: &SourceUnit) -> Result<SourceUnit, RaiseException> {
        Ok(source.clone())
    }

    fn run(
        &self,
        runtime: &RuntimeShared,
        unit: SourceUnit,
        context: DeclarationContext,
        receiver: &Value,
    ) -> Result<Value, RaiseException> {
        assert_eq!(context, DeclarationContext::TopLevel);
        assert!(receiver.identical(runtime.main_object()));
        self.seen
            .lock()
            .push((unit.path.clone(), runtime.lifecycle().state()));
        let text = unit.text.trim();
        if let Some(path) = text.strip_prefix("define ") {
            let mut segments: Vec<&str> = path.split("::").collect();
            let name = segments.pop().unwrap_or_default();
            let mut owner = runtime.core().object;
            for segment in segments {
                owner = runtime
                    .registry()
                    .find_constant(owner, segment)
                    .and_then(|value| value.as_type())
                    .ok_or_else(|| runtime.exceptions().name_error(segment.to_string()))?;
            }
            runtime.registry().set_constant(owner, name, Value::Bool(true));
        } else if text == "raise" {
            return Err(runtime
                .exceptions()
                .raise(runtime.core().runtime_error, "boom"));
        }
        Ok(Value::Nil)
    }
}

fn plan(units: &[&str], required: &[&str]) -> LoadPlan {
    LoadPlan {
        units: units.iter().map(|unit| unit.to_string()).collect(),
        post_boot: "/post-boot/post-boot.rb".to_string(),
        required_constants: required.iter().map(|name| name.to_string()).collect(),
    }
}

fn sources(units: &[(&str, &str)]) -> MemorySourceLoader {
    let mut loader = MemorySourceLoader::new();
    for (unit, text) in units {
        loader.insert(&format!("{PREFIX}{unit}"), text);
    }
    loader
}

#[test]
fn post_boot_runs_after_transition_to_loaded() {
    let rt = runtime();
    let loader = sources(&[
        ("/core/pre.rb", "define IO::EAGAINWaitReadable"),
        ("/core/post.rb", "define TOPLEVEL_BINDING"),
        ("/post-boot/post-boot.rb", ""),
    ]);
    let code = ScriptLoader::default();
    let plan = plan(
        &["/core/pre.rb", "/core/post.rb", "/post-boot/post-boot.rb"],
        &["IO::EAGAINWaitReadable", "TOPLEVEL_BINDING"],
    );
    rt.load_core_library(&loader, &code, &plan).unwrap();

    let seen = code.seen.lock();
    let states: Vec<_> = seen.iter().map(|(_, state)| *state).collect();
    assert_eq!(
        states,
        vec![
            LifecycleState::LoadingCoreLibrary,
            LifecycleState::LoadingCoreLibrary,
            LifecycleState::Loaded,
        ]
    );
    assert_eq!(seen[0].0, format!("{PREFIX}/core/pre.rb"));
    assert!(rt.lifecycle().is_loaded());
    assert_eq!(rt.globals().get("$0").unwrap().as_str(), Some("-"));
}

#[test]
fn missing_required_constant_is_fatal() {
    let rt = runtime();
    let loader = sources(&[("/core/pre.rb", ""), ("/post-boot/post-boot.rb", "")]);
    let code = ScriptLoader::default();
    let plan = plan(&["/core/pre.rb", "/post-boot/post-boot.rb"], &["TOPLEVEL_BINDING"]);
    let err = rt.load_core_library(&loader, &code, &plan).unwrap_err();
    assert!(matches!(
        &err,
        BootstrapError::MissingConstant { path } if path == "TOPLEVEL_BINDING"
    ));
    assert_eq!(code.seen.lock().len(), 1);
    assert!(rt.lifecycle().is_loading_core_library());
}

#[test]
fn raise_while_loading_is_fatal() {
    let rt = runtime();
    let loader = sources(&[("/core/pre.rb", "raise"), ("/core/post.rb", "")]);
    let code = ScriptLoader::default();
    let err = rt
        .load_core_library(&loader, &code, &plan(&["/core/pre.rb", "/core/post.rb"], &[]))
        .unwrap_err();
    match err {
        BootstrapError::CoreLibraryRaised { unit, exception } => {
            assert_eq!(unit, format!("{PREFIX}/core/pre.rb"));
            assert_eq!(exception.class_name(), "RuntimeError");
            assert_eq!(exception.message(), "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(code.seen.lock().len(), 1);
}

#[test]
fn missing_unit_is_fatal() {
    let rt = runtime();
    let loader = sources(&[]);
    let err = rt
        .load_core_library(&loader, &ScriptLoader::default(), &plan(&["/core/pre.rb"], &[]))
        .unwrap_err();
    assert!(matches!(err, BootstrapError::Io { .. }));
}

#[test]
fn core_library_loads_only_once() {
    let rt = runtime();
    let loader = sources(&[("/core/pre.rb", "")]);
    let code = ScriptLoader::default();
    let plan = plan(&["/core/pre.rb"], &[]);
    rt.load_core_library(&loader, &code, &plan).unwrap();
    assert!(rt.lifecycle().is_loaded());
    let err = rt.load_core_library(&loader, &code, &plan).unwrap_err();
    assert!(matches!(err, BootstrapError::IllegalTransition { .. }));
}

#[test]
fn lifecycle_is_visible_from_other_threads() {
    let rt = runtime();
    let shared = Arc::clone(rt.shared());
    let loader = sources(&[("/core/pre.rb", "")]);
    rt.load_core_library(&loader, &ScriptLoader::default(), &plan(&["/core/pre.rb"], &[]))
        .unwrap();
    let state = std::thread::spawn(move || shared.lifecycle().state())
        .join()
        .unwrap();
    assert_eq!(state, LifecycleState::Loaded);
}
