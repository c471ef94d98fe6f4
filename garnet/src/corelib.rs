use crate::{RegistryError, TypeId, TypeRegistry};

pub const EXCEPTION_SHAPE: &str = "exception";
pub const NAME_ERROR_SHAPE: &str = "name_error";
pub const NO_METHOD_ERROR_SHAPE: &str = "no_method_error";
pub const SYSTEM_CALL_ERROR_SHAPE: &str = "system_call_error";
pub const STRING_SHAPE: &str = "string";
pub const ARRAY_SHAPE: &str = "array";
pub const HASH_SHAPE: &str = "hash";
pub const RANGE_SHAPE: &str = "range";
pub const PROC_SHAPE: &str = "proc";
pub const IO_SHAPE: &str = "io";

/// Handles to the types every part of the runtime needs by identity.
#[derive(Debug, Clone, Copy)]
pub struct CoreTypes {
    pub class: TypeId,
    pub basic_object: TypeId,
    pub object: TypeId,
    pub module: TypeId,

    pub kernel: TypeId,
    pub comparable: TypeId,
    pub enumerable: TypeId,

    pub nil_class: TypeId,
    pub true_class: TypeId,
    pub false_class: TypeId,
    pub numeric: TypeId,
    pub integer: TypeId,
    pub float: TypeId,
    pub symbol: TypeId,
    pub string: TypeId,
    pub array: TypeId,
    pub hash: TypeId,
    pub range: TypeId,
    pub proc: TypeId,
    pub io: TypeId,
    pub dir: TypeId,

    pub exception: TypeId,
    pub no_memory_error: TypeId,
    pub script_error: TypeId,
    pub load_error: TypeId,
    pub not_implemented_error: TypeId,
    pub syntax_error: TypeId,
    pub security_error: TypeId,
    pub signal_exception: TypeId,
    pub interrupt: TypeId,
    pub system_exit: TypeId,
    pub system_stack_error: TypeId,
    pub standard_error: TypeId,
    pub argument_error: TypeId,
    pub encoding_error: TypeId,
    pub fiber_error: TypeId,
    pub io_error: TypeId,
    pub eof_error: TypeId,
    pub index_error: TypeId,
    pub key_error: TypeId,
    pub stop_iteration: TypeId,
    pub local_jump_error: TypeId,
    pub name_error: TypeId,
    pub no_method_error: TypeId,
    pub range_error: TypeId,
    pub float_domain_error: TypeId,
    pub regexp_error: TypeId,
    pub runtime_error: TypeId,
    pub frozen_error: TypeId,
    pub system_call_error: TypeId,
    pub thread_error: TypeId,
    pub type_error: TypeId,
    pub zero_division_error: TypeId,

    pub errno: TypeId,

    pub polyglot: TypeId,
    pub polyglot_foreign_object: TypeId,
    pub unsupported_message_error: TypeId,

    pub truffle: TypeId,
    pub truffle_interop: TypeId,
    pub interop_foreign: TypeId,
    pub interop_exception: TypeId,
    pub unsupported_message_exception: TypeId,
    pub invalid_array_index_exception: TypeId,
    pub unknown_identifier_exception: TypeId,
    pub unsupported_type_exception: TypeId,
    pub arity_exception: TypeId,
}

impl CoreTypes {
    /// Defines the core hierarchy on top of the bootstrap types, then mixes
    /// in the core modules.
    pub fn define(registry: &TypeRegistry) -> Result<Self, RegistryError> {
        let roots = registry.roots();
        let object = roots.object;
        let shapes = registry.shapes();
        let exception_shape =
            shapes.define(EXCEPTION_SHAPE, &["message", "backtrace", "cause"]);
        let name_error_shape = shapes.define(
            NAME_ERROR_SHAPE,
            &["message", "backtrace", "cause", "name", "receiver"],
        );
        let no_method_error_shape = shapes.define(
            NO_METHOD_ERROR_SHAPE,
            &["message", "backtrace", "cause", "name", "receiver", "args"],
        );
        let system_call_error_shape = shapes.define(
            SYSTEM_CALL_ERROR_SHAPE,
            &["message", "backtrace", "cause", "errno"],
        );

        let class = |superclass: TypeId, name: &str| {
            registry.define_class(Some(superclass), name, None)
        };
        let class_under = |parent: TypeId, superclass: TypeId, name: &str| {
            registry.define_class_under(parent, Some(superclass), name, None)
        };
        let shaped = |superclass: TypeId, name: &str, shape: &str| {
            let shape = shapes.define(shape, &[]);
            registry.define_class(Some(superclass), name, Some(shape))
        };

        let kernel = registry.define_module("Kernel")?;
        let comparable = registry.define_module("Comparable")?;
        let enumerable = registry.define_module("Enumerable")?;

        let nil_class = class(object, "NilClass")?;
        let true_class = class(object, "TrueClass")?;
        let false_class = class(object, "FalseClass")?;
        let numeric = class(object, "Numeric")?;
        let integer = class(numeric, "Integer")?;
        let float = class(numeric, "Float")?;
        let symbol = class(object, "Symbol")?;
        let string = shaped(object, "String", STRING_SHAPE)?;
        let array = shaped(object, "Array", ARRAY_SHAPE)?;
        let hash = shaped(object, "Hash", HASH_SHAPE)?;
        let range = shaped(object, "Range", RANGE_SHAPE)?;
        let proc = shaped(object, "Proc", PROC_SHAPE)?;
        let io = shaped(object, "IO", IO_SHAPE)?;
        let dir = class(object, "Dir")?;

        let exception = registry.define_class(
            Some(object),
            "Exception",
            Some(exception_shape),
        )?;
        let no_memory_error = class(exception, "NoMemoryError")?;
        let script_error = class(exception, "ScriptError")?;
        let load_error = class(script_error, "LoadError")?;
        let not_implemented_error =
            class(script_error, "NotImplementedError")?;
        let syntax_error = class(script_error, "SyntaxError")?;
        let security_error = class(exception, "SecurityError")?;
        let signal_exception = class(exception, "SignalException")?;
        let interrupt = class(signal_exception, "Interrupt")?;
        let system_exit = class(exception, "SystemExit")?;
        let system_stack_error = class(exception, "SystemStackError")?;
        let standard_error = class(exception, "StandardError")?;
        let argument_error = class(standard_error, "ArgumentError")?;
        let encoding_error = class(standard_error, "EncodingError")?;
        let fiber_error = class(standard_error, "FiberError")?;
        let io_error = class(standard_error, "IOError")?;
        let eof_error = class(io_error, "EOFError")?;
        let index_error = class(standard_error, "IndexError")?;
        let key_error = class(index_error, "KeyError")?;
        let stop_iteration = class(index_error, "StopIteration")?;
        let local_jump_error = class(standard_error, "LocalJumpError")?;
        let name_error = registry.define_class(
            Some(standard_error),
            "NameError",
            Some(name_error_shape),
        )?;
        let no_method_error = registry.define_class(
            Some(name_error),
            "NoMethodError",
            Some(no_method_error_shape),
        )?;
        let range_error = class(standard_error, "RangeError")?;
        let float_domain_error = class(range_error, "FloatDomainError")?;
        let regexp_error = class(standard_error, "RegexpError")?;
        let runtime_error = class(standard_error, "RuntimeError")?;
        let frozen_error = class(runtime_error, "FrozenError")?;
        let system_call_error = registry.define_class(
            Some(standard_error),
            "SystemCallError",
            Some(system_call_error_shape),
        )?;
        let thread_error = class(standard_error, "ThreadError")?;
        let type_error = class(standard_error, "TypeError")?;
        let zero_division_error = class(standard_error, "ZeroDivisionError")?;

        let errno = registry.define_module("Errno")?;

        let polyglot = registry.define_module("Polyglot")?;
        let polyglot_foreign_object =
            class_under(polyglot, object, "ForeignObject")?;
        let unsupported_message_error =
            class_under(polyglot, standard_error, "UnsupportedMessageError")?;

        let truffle = registry.define_module("Truffle")?;
        let truffle_interop = registry.define_module_under(truffle, "Interop")?;
        let interop_foreign = class_under(truffle_interop, object, "Foreign")?;
        let interop_exception =
            class_under(truffle_interop, exception, "InteropException")?;
        let unsupported_message_exception = class_under(
            truffle_interop,
            interop_exception,
            "UnsupportedMessageException",
        )?;
        let invalid_array_index_exception = class_under(
            truffle_interop,
            interop_exception,
            "InvalidArrayIndexException",
        )?;
        let unknown_identifier_exception = class_under(
            truffle_interop,
            interop_exception,
            "UnknownIdentifierException",
        )?;
        let unsupported_type_exception = class_under(
            truffle_interop,
            interop_exception,
            "UnsupportedTypeException",
        )?;
        let arity_exception =
            class_under(truffle_interop, interop_exception, "ArityException")?;

        let core = Self {
            class: roots.class,
            basic_object: roots.basic_object,
            object,
            module: roots.module,
            kernel,
            comparable,
            enumerable,
            nil_class,
            true_class,
            false_class,
            numeric,
            integer,
            float,
            symbol,
            string,
            array,
            hash,
            range,
            proc,
            io,
            dir,
            exception,
            no_memory_error,
            script_error,
            load_error,
            not_implemented_error,
            syntax_error,
            security_error,
            signal_exception,
            interrupt,
            system_exit,
            system_stack_error,
            standard_error,
            argument_error,
            encoding_error,
            fiber_error,
            io_error,
            eof_error,
            index_error,
            key_error,
            stop_iteration,
            local_jump_error,
            name_error,
            no_method_error,
            range_error,
            float_domain_error,
            regexp_error,
            runtime_error,
            frozen_error,
            system_call_error,
            thread_error,
            type_error,
            zero_division_error,
            errno,
            polyglot,
            polyglot_foreign_object,
            unsupported_message_error,
            truffle,
            truffle_interop,
            interop_foreign,
            interop_exception,
            unsupported_message_exception,
            invalid_array_index_exception,
            unknown_identifier_exception,
            unsupported_type_exception,
            arity_exception,
        };
        core.include_core_modules(registry)?;
        Ok(core)
    }

    fn include_core_modules(
        &self,
        registry: &TypeRegistry,
    ) -> Result<(), RegistryError> {
        registry.include(self.object, self.kernel)?;
        for target in [self.numeric, self.symbol, self.string] {
            registry.include(target, self.comparable)?;
        }
        for target in [self.array, self.hash, self.range, self.dir] {
            registry.include(target, self.enumerable)?;
        }
        Ok(())
    }
}
