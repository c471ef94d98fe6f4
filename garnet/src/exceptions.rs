use std::{fmt, io, sync::Arc};

use crate::{
    Arity, CoreTypes, InteropError, LifecycleState, RegistryError, TypeId,
    TypeRegistry,
};

/// A guest-level exception on its way up the host stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaiseException {
    class: TypeId,
    class_name: Arc<str>,
    message: String,
}

impl RaiseException {
    pub fn new(class: TypeId, class_name: &str, message: String) -> Self {
        Self {
            class,
            class_name: Arc::from(class_name),
            message,
        }
    }

    pub fn class(&self) -> TypeId {
        self.class
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RaiseException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.class_name)
    }
}

impl std::error::Error for RaiseException {}

/// Failures that abort startup. None of these are recoverable.
#[derive(Debug)]
pub enum BootstrapError {
    Registry(RegistryError),
    Io { path: String, source: io::Error },
    CoreLibraryRaised { unit: String, exception: RaiseException },
    MissingConstant { path: String },
    IllegalTransition { from: LifecycleState, to: LifecycleState },
}

impl fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapError::Registry(err) => write!(f, "{err}"),
            BootstrapError::Io { path, source } => {
                write!(f, "error reading {path}: {source}")
            }
            BootstrapError::CoreLibraryRaised { unit, exception } => {
                write!(f, "exception while loading core library {unit}: {exception}")
            }
            BootstrapError::MissingConstant { path } => {
                write!(f, "core library did not define {path}")
            }
            BootstrapError::IllegalTransition { from, to } => {
                write!(f, "illegal lifecycle transition {from:?} -> {to:?}")
            }
        }
    }
}

impl std::error::Error for BootstrapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BootstrapError::Registry(err) => Some(err),
            BootstrapError::Io { source, .. } => Some(source),
            BootstrapError::CoreLibraryRaised { exception, .. } => {
                Some(exception)
            }
            _ => None,
        }
    }
}

impl From<RegistryError> for BootstrapError {
    fn from(err: RegistryError) -> Self {
        BootstrapError::Registry(err)
    }
}

/// Builds exceptions of the core exception types.
pub struct CoreExceptions<'a> {
    registry: &'a TypeRegistry,
    core: &'a CoreTypes,
}

impl<'a> CoreExceptions<'a> {
    pub fn new(registry: &'a TypeRegistry, core: &'a CoreTypes) -> Self {
        Self { registry, core }
    }

    pub fn raise(&self, class: TypeId, message: impl Into<String>) -> RaiseException {
        RaiseException::new(
            class,
            &self.registry.display_name(class),
            message.into(),
        )
    }

    pub fn argument_error(&self, given: usize, expected: Arity) -> RaiseException {
        self.raise(
            self.core.argument_error,
            format!("wrong number of arguments (given {given}, expected {expected})"),
        )
    }

    pub fn type_error(&self, message: impl Into<String>) -> RaiseException {
        self.raise(self.core.type_error, message)
    }

    pub fn type_error_no_implicit_conversion(
        &self,
        from: &str,
        into: &str,
    ) -> RaiseException {
        self.type_error(format!("no implicit conversion of {from} into {into}"))
    }

    pub fn name_error(&self, message: impl Into<String>) -> RaiseException {
        self.raise(self.core.name_error, message)
    }

    pub fn no_method_error(&self, name: &str, receiver: &str) -> RaiseException {
        self.raise(
            self.core.no_method_error,
            format!("undefined method `{name}' for {receiver}"),
        )
    }

    pub fn index_error(&self, message: impl Into<String>) -> RaiseException {
        self.raise(self.core.index_error, message)
    }

    pub fn range_error(&self, message: impl Into<String>) -> RaiseException {
        self.raise(self.core.range_error, message)
    }

    pub fn zero_division_error(&self) -> RaiseException {
        self.raise(self.core.zero_division_error, "divided by 0")
    }

    pub fn unsupported_message_error(
        &self,
        message: impl Into<String>,
    ) -> RaiseException {
        self.raise(self.core.unsupported_message_error, message)
    }

    pub fn unsupported_type(&self, reason: &str) -> RaiseException {
        self.type_error(format!("unsupported type: {reason}"))
    }

    /// Guest view of a type-definition failure.
    pub fn from_registry(&self, err: &RegistryError) -> RaiseException {
        match err {
            RegistryError::CyclicInclude { .. } => {
                self.raise(self.core.argument_error, err.to_string())
            }
            _ => self.type_error(err.to_string()),
        }
    }

    /// Guest view of a failed foreign message.
    pub fn from_interop(&self, err: &InteropError) -> RaiseException {
        match err {
            InteropError::UnsupportedMessage { .. } => {
                self.unsupported_message_error(err.to_string())
            }
            InteropError::InvalidArrayIndex { index } => {
                self.index_error(format!("invalid array index {index}"))
            }
            InteropError::UnknownIdentifier { name } => {
                self.name_error(format!("unknown identifier {name}"))
            }
            InteropError::Arity { expected, actual } => {
                self.argument_error(*actual, Arity::Exact(*expected))
            }
            InteropError::UnsupportedType { reason } => {
                self.unsupported_type(reason)
            }
        }
    }
}
