#![allow(dead_code)]

use std::collections::HashMap;

use garnet::{ForeignObject, InteropError, Runtime, RuntimeCreateInfo, Value};
use parking_lot::Mutex;

pub fn runtime() -> Runtime {
    Runtime::new(RuntimeCreateInfo::default()).expect("runtime boots")
}

/// A foreign number that answers the numeric unboxing messages.
#[derive(Debug)]
pub struct ForeignNumber(pub f64);

impl ForeignObject for ForeignNumber {
    fn is_number(&self) -> bool {
        true
    }

    fn fits_in_int(&self) -> bool {
        self.0.fract() == 0.0 && self.0 >= i32::MIN as f64 && self.0 <= i32::MAX as f64
    }

    fn fits_in_long(&self) -> bool {
        self.0.fract() == 0.0 && self.0.abs() < 9.0e18
    }

    fn fits_in_double(&self) -> bool {
        true
    }

    fn as_int(&self) -> Result<i32, InteropError> {
        Ok(self.0 as i32)
    }

    fn as_long(&self) -> Result<i64, InteropError> {
        Ok(self.0 as i64)
    }

    fn as_double(&self) -> Result<f64, InteropError> {
        Ok(self.0)
    }
}

/// A foreign record with readable and writable members, some of them
/// invocable. Every message received is logged.
#[derive(Debug, Default)]
pub struct ForeignRecord {
    pub members: Mutex<HashMap<String, Value>>,
    pub invocable: Vec<String>,
    pub log: Mutex<Vec<String>>,
}

impl ForeignRecord {
    pub fn with_members(members: &[(&str, Value)], invocable: &[&str]) -> Self {
        Self {
            members: Mutex::new(
                members
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.clone()))
                    .collect(),
            ),
            invocable: invocable.iter().map(|name| name.to_string()).collect(),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl ForeignObject for ForeignRecord {
    fn read_member(&self, name: &str) -> Result<Value, InteropError> {
        self.log.lock().push(format!("read_member {name}"));
        self.members
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| InteropError::UnknownIdentifier {
                name: name.to_string(),
            })
    }

    fn write_member(&self, name: &str, value: Value) -> Result<(), InteropError> {
        self.log.lock().push(format!("write_member {name}"));
        self.members.lock().insert(name.to_string(), value);
        Ok(())
    }

    fn is_member_invocable(&self, name: &str) -> bool {
        self.invocable.iter().any(|member| member == name)
    }

    fn invoke_member(&self, name: &str, args: &[Value]) -> Result<Value, InteropError> {
        self.log
            .lock()
            .push(format!("invoke_member {name}/{}", args.len()));
        if !self.is_member_invocable(name) {
            return Err(InteropError::UnknownIdentifier {
                name: name.to_string(),
            });
        }
        Ok(Value::Fixnum(self.members.lock().len() as i64))
    }
}

/// A foreign array of fixnums.
#[derive(Debug)]
pub struct ForeignArray(pub Vec<i64>);

impl ForeignObject for ForeignArray {
    fn read_array_element(&self, index: i64) -> Result<Value, InteropError> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.0.get(index))
            .map(|value| Value::Fixnum(*value))
            .ok_or(InteropError::InvalidArrayIndex { index })
    }
}

/// A foreign constructor that is also callable. Records the arguments of
/// every `instantiate` and `execute`.
#[derive(Debug, Default)]
pub struct ForeignCallable {
    pub calls: Mutex<Vec<(&'static str, Vec<Value>)>>,
}

impl ForeignCallable {
    pub fn calls(&self) -> Vec<(&'static str, Vec<Value>)> {
        self.calls.lock().clone()
    }
}

impl ForeignObject for ForeignCallable {
    fn instantiate(&self, args: &[Value]) -> Result<Value, InteropError> {
        self.calls.lock().push(("instantiate", args.to_vec()));
        Ok(Value::Fixnum(100 + args.len() as i64))
    }

    fn execute(&self, args: &[Value]) -> Result<Value, InteropError> {
        self.calls.lock().push(("execute", args.to_vec()));
        Ok(Value::Fixnum(200 + args.len() as i64))
    }
}
