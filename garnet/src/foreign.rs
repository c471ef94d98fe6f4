use std::fmt;

use crate::Value;

/// Failure reported by a foreign object for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteropError {
    UnsupportedMessage { message: &'static str },
    InvalidArrayIndex { index: i64 },
    UnknownIdentifier { name: String },
    Arity { expected: usize, actual: usize },
    UnsupportedType { reason: String },
}

impl fmt::Display for InteropError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteropError::UnsupportedMessage { message } => {
                write!(f, "message not supported: {message}")
            }
            InteropError::InvalidArrayIndex { index } => {
                write!(f, "invalid array index {index}")
            }
            InteropError::UnknownIdentifier { name } => {
                write!(f, "unknown identifier {name}")
            }
            InteropError::Arity { expected, actual } => {
                write!(f, "arity error: expected {expected}, got {actual}")
            }
            InteropError::UnsupportedType { reason } => {
                write!(f, "unsupported type: {reason}")
            }
        }
    }
}

impl std::error::Error for InteropError {}

#[inline]
fn unsupported<T>(message: &'static str) -> Result<T, InteropError> {
    Err(InteropError::UnsupportedMessage { message })
}

/// The message protocol a value owned by another language runtime
/// understands. Every message defaults to unsupported; implementors
/// override the ones their values answer.
pub trait ForeignObject: Send + Sync + fmt::Debug {
    fn read_array_element(&self, _index: i64) -> Result<Value, InteropError> {
        unsupported("readArrayElement")
    }

    fn read_member(&self, _name: &str) -> Result<Value, InteropError> {
        unsupported("readMember")
    }

    fn write_member(&self, _name: &str, _value: Value) -> Result<(), InteropError> {
        unsupported("writeMember")
    }

    fn is_member_invocable(&self, _name: &str) -> bool {
        false
    }

    fn invoke_member(
        &self,
        _name: &str,
        _args: &[Value],
    ) -> Result<Value, InteropError> {
        unsupported("invokeMember")
    }

    fn instantiate(&self, _args: &[Value]) -> Result<Value, InteropError> {
        unsupported("instantiate")
    }

    fn execute(&self, _args: &[Value]) -> Result<Value, InteropError> {
        unsupported("execute")
    }

    fn is_boolean(&self) -> bool {
        false
    }

    fn as_boolean(&self) -> Result<bool, InteropError> {
        unsupported("asBoolean")
    }

    fn is_string(&self) -> bool {
        false
    }

    fn as_string(&self) -> Result<String, InteropError> {
        unsupported("asString")
    }

    fn is_number(&self) -> bool {
        false
    }

    fn fits_in_int(&self) -> bool {
        false
    }

    fn fits_in_long(&self) -> bool {
        false
    }

    fn fits_in_double(&self) -> bool {
        false
    }

    fn as_int(&self) -> Result<i32, InteropError> {
        unsupported("asInt")
    }

    fn as_long(&self) -> Result<i64, InteropError> {
        unsupported("asLong")
    }

    fn as_double(&self) -> Result<f64, InteropError> {
        unsupported("asDouble")
    }
}

/// Which primitive a foreign receiver unboxes to before an operator is
/// re-dispatched on it. Classification order matters: a boolean is never
/// treated as a number, and a number is the narrowest width it fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    String,
    Int,
    Long,
    Double,
    Other,
}

impl PrimitiveKind {
    pub fn of(receiver: &dyn ForeignObject) -> Self {
        if receiver.is_boolean() {
            PrimitiveKind::Boolean
        } else if receiver.is_string() {
            PrimitiveKind::String
        } else if receiver.is_number() {
            if receiver.fits_in_int() {
                PrimitiveKind::Int
            } else if receiver.fits_in_long() {
                PrimitiveKind::Long
            } else if receiver.fits_in_double() {
                PrimitiveKind::Double
            } else {
                PrimitiveKind::Other
            }
        } else {
            PrimitiveKind::Other
        }
    }
}
