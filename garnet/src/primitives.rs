use std::{cmp::Ordering, sync::Arc};

use crate::{
    Arity, Bignum, CoreTypes, MethodFn, RaiseException, RuntimeShared, TypeId,
    TypeRegistry, Value,
};

pub type PrimitiveFn =
    fn(&RuntimeShared, &Value, &[Value]) -> Result<Value, RaiseException>;

pub struct PrimitiveDesc {
    pub owner: fn(&CoreTypes) -> TypeId,
    pub name: &'static str,
    pub arity: Arity,
    pub func: PrimitiveFn,
}

impl PrimitiveDesc {
    const fn new(
        owner: fn(&CoreTypes) -> TypeId,
        name: &'static str,
        arity: Arity,
        func: PrimitiveFn,
    ) -> Self {
        Self {
            owner,
            name,
            arity,
            func,
        }
    }
}

pub fn default_primitives() -> Vec<PrimitiveDesc> {
    use Arity::Exact;
    vec![
        PrimitiveDesc::new(|c| c.integer, "+", Exact(1), integer_add),
        PrimitiveDesc::new(|c| c.integer, "-", Exact(1), integer_sub),
        PrimitiveDesc::new(|c| c.integer, "*", Exact(1), integer_mul),
        PrimitiveDesc::new(|c| c.integer, "==", Exact(1), integer_eq),
        PrimitiveDesc::new(|c| c.integer, "<", Exact(1), integer_lt),
        PrimitiveDesc::new(|c| c.integer, ">", Exact(1), integer_gt),
        PrimitiveDesc::new(|c| c.float, "+", Exact(1), float_add),
        PrimitiveDesc::new(|c| c.float, "-", Exact(1), float_sub),
        PrimitiveDesc::new(|c| c.float, "*", Exact(1), float_mul),
        PrimitiveDesc::new(|c| c.float, "==", Exact(1), float_eq),
        PrimitiveDesc::new(|c| c.float, "<", Exact(1), float_lt),
        PrimitiveDesc::new(|c| c.float, ">", Exact(1), float_gt),
        PrimitiveDesc::new(|c| c.string, "+", Exact(1), string_plus),
        PrimitiveDesc::new(|c| c.string, "==", Exact(1), string_eq),
        PrimitiveDesc::new(|c| c.string, "size", Exact(0), string_size),
        PrimitiveDesc::new(|c| c.true_class, "&", Exact(1), true_and),
        PrimitiveDesc::new(|c| c.true_class, "|", Exact(1), true_or),
        PrimitiveDesc::new(|c| c.false_class, "&", Exact(1), false_and),
        PrimitiveDesc::new(|c| c.false_class, "|", Exact(1), false_or),
        PrimitiveDesc::new(|c| c.basic_object, "!", Exact(0), basic_not),
        PrimitiveDesc::new(|c| c.basic_object, "==", Exact(1), basic_equal),
        PrimitiveDesc::new(|c| c.nil_class, "nil?", Exact(0), nil_p),
        PrimitiveDesc::new(|c| c.nil_class, "to_s", Exact(0), nil_to_s),
        PrimitiveDesc::new(|c| c.kernel, "class", Exact(0), kernel_class),
        PrimitiveDesc::new(|c| c.kernel, "equal?", Exact(1), basic_equal),
        PrimitiveDesc::new(|c| c.kernel, "nil?", Exact(0), kernel_nil_p),
        PrimitiveDesc::new(|c| c.kernel, "respond_to?", Exact(1), kernel_respond_to),
    ]
}

/// Installs every primitive on its owner. Each definition bumps the
/// method epoch; this runs before any call site exists.
pub fn install_primitives(registry: &TypeRegistry, core: &CoreTypes) {
    for desc in default_primitives() {
        let body: MethodFn = Arc::new(desc.func);
        registry.define_method((desc.owner)(core), desc.name, desc.arity, body);
    }
}

fn coerce_error(runtime: &RuntimeShared, other: &Value, into: &str) -> RaiseException {
    let class = runtime.registry().display_name(runtime.logical_type(other));
    runtime
        .exceptions()
        .type_error(format!("{class} can't be coerced into {into}"))
}

/// Integer arithmetic on `i128`, redone on bignums when that overflows.
fn integer_arith(
    runtime: &RuntimeShared,
    receiver: &Value,
    other: &Value,
    int: fn(i128, i128) -> Option<i128>,
    big: fn(&Bignum, &Bignum) -> Bignum,
    float: fn(f64, f64) -> f64,
) -> Result<Value, RaiseException> {
    match other {
        Value::Fixnum(_) | Value::Bignum(_) => {
            if let (Some(lhs), Some(rhs)) = (receiver.as_integer(), other.as_integer()) {
                if let Some(result) = int(lhs, rhs) {
                    return Ok(Value::integer(result));
                }
            }
            match (receiver.to_bignum(), other.to_bignum()) {
                (Some(lhs), Some(rhs)) => Ok(Value::from_bignum(big(&lhs, &rhs))),
                _ => Err(coerce_error(runtime, receiver, "Integer")),
            }
        }
        Value::Float(rhs) => match receiver.as_f64() {
            Some(lhs) => Ok(Value::Float(float(lhs, *rhs))),
            None => Err(coerce_error(runtime, receiver, "Float")),
        },
        _ => Err(coerce_error(runtime, other, "Integer")),
    }
}

fn integer_add(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    integer_arith(rt, recv, &args[0], i128::checked_add, |a, b| a + b, |a, b| a + b)
}

fn integer_sub(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    integer_arith(rt, recv, &args[0], i128::checked_sub, |a, b| a - b, |a, b| a - b)
}

fn integer_mul(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    integer_arith(rt, recv, &args[0], i128::checked_mul, |a, b| a * b, |a, b| a * b)
}

/// Orders a number against another. `None` for non-numbers.
fn compare_numbers(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Fixnum(a), Value::Fixnum(b)) => Some(a.cmp(b)),
        (Value::Fixnum(_) | Value::Bignum(_), Value::Fixnum(_) | Value::Bignum(_)) => {
            let (a, b) = lhs.to_bignum().zip(rhs.to_bignum())?;
            Some(a.cmp(&b))
        }
        _ => {
            let (a, b) = lhs.as_f64().zip(rhs.as_f64())?;
            a.partial_cmp(&b)
        }
    }
}

fn numeric_relation(
    runtime: &RuntimeShared,
    receiver: &Value,
    other: &Value,
    accept: fn(Ordering) -> bool,
) -> Result<Value, RaiseException> {
    match (compare_numbers(receiver, other), other) {
        (Some(ordering), _) => Ok(Value::Bool(accept(ordering))),
        (None, Value::Float(_)) => Ok(Value::Bool(false)),
        (None, _) => {
            let lhs = runtime.registry().display_name(runtime.logical_type(receiver));
            let rhs = runtime.inspect(other);
            Err(runtime
                .exceptions()
                .raise(runtime.core().argument_error, format!("comparison of {lhs} with {rhs} failed")))
        }
    }
}

fn numeric_eq(rt: &RuntimeShared, recv: &Value, other: &Value) -> Result<Value, RaiseException> {
    let equal = compare_numbers(recv, other) == Some(Ordering::Equal);
    Ok(Value::Bool(equal))
}

fn integer_eq(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    numeric_eq(rt, recv, &args[0])
}

fn integer_lt(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    numeric_relation(rt, recv, &args[0], Ordering::is_lt)
}

fn integer_gt(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    numeric_relation(rt, recv, &args[0], Ordering::is_gt)
}

fn float_arith(
    runtime: &RuntimeShared,
    receiver: &Value,
    other: &Value,
    op: fn(f64, f64) -> f64,
) -> Result<Value, RaiseException> {
    let lhs = receiver.as_float().unwrap_or_default();
    let Some(rhs) = other.as_f64() else {
        return Err(coerce_error(runtime, other, "Float"));
    };
    Ok(Value::Float(op(lhs, rhs)))
}

fn float_add(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    float_arith(rt, recv, &args[0], |a, b| a + b)
}

fn float_sub(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    float_arith(rt, recv, &args[0], |a, b| a - b)
}

fn float_mul(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    float_arith(rt, recv, &args[0], |a, b| a * b)
}

fn float_eq(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    numeric_eq(rt, recv, &args[0])
}

fn float_lt(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    numeric_relation(rt, recv, &args[0], Ordering::is_lt)
}

fn float_gt(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    numeric_relation(rt, recv, &args[0], Ordering::is_gt)
}

fn string_plus(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    let lhs = recv.as_str().unwrap_or_default();
    let Some(rhs) = args[0].as_str() else {
        let class = rt.registry().display_name(rt.logical_type(&args[0]));
        return Err(rt
            .exceptions()
            .type_error_no_implicit_conversion(&class, "String"));
    };
    Ok(rt.new_string(&format!("{lhs}{rhs}")))
}

fn string_eq(_rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    let equal = match (recv.as_str(), args[0].as_str()) {
        (Some(lhs), Some(rhs)) => lhs == rhs,
        _ => false,
    };
    Ok(Value::Bool(equal))
}

fn string_size(_rt: &RuntimeShared, recv: &Value, _args: &[Value]) -> Result<Value, RaiseException> {
    let size = recv.as_str().map_or(0, |text| text.chars().count());
    Ok(Value::Fixnum(size as i64))
}

fn true_and(_rt: &RuntimeShared, _recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    Ok(Value::Bool(args[0].is_truthy()))
}

fn true_or(_rt: &RuntimeShared, _recv: &Value, _args: &[Value]) -> Result<Value, RaiseException> {
    Ok(Value::Bool(true))
}

fn false_and(_rt: &RuntimeShared, _recv: &Value, _args: &[Value]) -> Result<Value, RaiseException> {
    Ok(Value::Bool(false))
}

fn false_or(_rt: &RuntimeShared, _recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    Ok(Value::Bool(args[0].is_truthy()))
}

fn basic_not(_rt: &RuntimeShared, recv: &Value, _args: &[Value]) -> Result<Value, RaiseException> {
    Ok(Value::Bool(!recv.is_truthy()))
}

fn basic_equal(_rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    Ok(Value::Bool(recv.identical(&args[0])))
}

fn nil_p(_rt: &RuntimeShared, _recv: &Value, _args: &[Value]) -> Result<Value, RaiseException> {
    Ok(Value::Bool(true))
}

fn nil_to_s(rt: &RuntimeShared, _recv: &Value, _args: &[Value]) -> Result<Value, RaiseException> {
    Ok(rt.new_string(""))
}

fn kernel_class(rt: &RuntimeShared, recv: &Value, _args: &[Value]) -> Result<Value, RaiseException> {
    Ok(rt.registry().type_value(rt.logical_type(recv)))
}

fn kernel_nil_p(_rt: &RuntimeShared, _recv: &Value, _args: &[Value]) -> Result<Value, RaiseException> {
    Ok(Value::Bool(false))
}

fn kernel_respond_to(rt: &RuntimeShared, recv: &Value, args: &[Value]) -> Result<Value, RaiseException> {
    let name = rt.name_to_string(&args[0])?;
    let meta = rt.meta_type(recv);
    Ok(Value::Bool(rt.registry().find_method(meta, &name).is_some()))
}
