use std::{
    cmp::Ordering,
    fmt,
    ops::{Add, Mul, Neg, Sub},
    sync::{Arc, OnceLock},
};

use crate::{ForeignObject, Shape, Symbol, TypeId};

/// Coarse classification of a value, used as the cheap guard of
/// kind-keyed inline cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Nil,
    True,
    False,
    Fixnum,
    Bignum,
    Float,
    Symbol,
    Object,
    Foreign,
}

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Fixnum(i64),
    Bignum(Arc<Bignum>),
    Float(f64),
    Symbol(Symbol),
    Object(Arc<RObject>),
    Foreign(Arc<dyn ForeignObject>),
}

impl Value {
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Bool(true) => ValueKind::True,
            Value::Bool(false) => ValueKind::False,
            Value::Fixnum(_) => ValueKind::Fixnum,
            Value::Bignum(_) => ValueKind::Bignum,
            Value::Float(_) => ValueKind::Float,
            Value::Symbol(_) => ValueKind::Symbol,
            Value::Object(_) => ValueKind::Object,
            Value::Foreign(_) => ValueKind::Foreign,
        }
    }

    /// Builds an integer, choosing the fixnum form when it fits.
    pub fn integer(value: i128) -> Value {
        match i64::try_from(value) {
            Ok(small) => Value::Fixnum(small),
            Err(_) => Value::Bignum(Arc::new(Bignum::from_i128(value))),
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn as_fixnum(&self) -> Option<i64> {
        match self {
            Value::Fixnum(value) => Some(*value),
            _ => None,
        }
    }

    /// Integer value of a fixnum or of a bignum small enough for `i128`.
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Fixnum(value) => Some(*value as i128),
            Value::Bignum(big) => big.to_i128(),
            _ => None,
        }
    }

    /// Arbitrary-precision view of an integer value.
    pub fn to_bignum(&self) -> Option<Bignum> {
        match self {
            Value::Fixnum(value) => Some(Bignum::from_i128(*value as i128)),
            Value::Bignum(big) => Some(Bignum::clone(big)),
            _ => None,
        }
    }

    /// Wraps a bignum result, demoting it to a fixnum when it fits.
    pub fn from_bignum(big: Bignum) -> Value {
        match big.to_i128().and_then(|value| i64::try_from(value).ok()) {
            Some(small) => Value::Fixnum(small),
            None => Value::Bignum(Arc::new(big)),
        }
    }

    /// Any number as a float, possibly losing precision.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Fixnum(value) => Some(*value as f64),
            Value::Bignum(big) => Some(big.to_f64()),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<Symbol> {
        match self {
            Value::Symbol(symbol) => Some(*symbol),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<RObject>> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_foreign(&self) -> Option<&Arc<dyn ForeignObject>> {
        match self {
            Value::Foreign(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_object().and_then(|object| object.as_str())
    }

    /// The type this value denotes, if it is a class or module object.
    pub fn as_type(&self) -> Option<TypeId> {
        self.as_object().and_then(|object| object.as_type())
    }

    /// Reference identity for heap values, value equality for immediates.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Foreign(a), Value::Foreign(b)) => same_foreign(a, b),
            (Value::Bignum(a), Value::Bignum(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

fn same_foreign(a: &Arc<dyn ForeignObject>, b: &Arc<dyn ForeignObject>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Fixnum(a), Value::Fixnum(b)) => a == b,
            (Value::Bignum(a), Value::Bignum(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Foreign(a), Value::Foreign(b)) => same_foreign(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Fixnum(value) => write!(f, "{value}"),
            Value::Bignum(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value:?}"),
            Value::Symbol(symbol) => write!(f, "Symbol({})", symbol.index()),
            Value::Object(object) => object.fmt(f),
            Value::Foreign(object) => write!(f, "Foreign({object:?})"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Fixnum(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Symbol> for Value {
    fn from(value: Symbol) -> Self {
        Value::Symbol(value)
    }
}

impl From<Arc<RObject>> for Value {
    fn from(value: Arc<RObject>) -> Self {
        Value::Object(value)
    }
}

/// Payload carried by a heap object beyond its header.
#[derive(Debug)]
pub enum ObjectData {
    Plain,
    Str(Arc<str>),
    /// The object is the runtime representation of a class or module.
    Type(TypeId),
}

/// A heap object. The logical type never changes; the singleton type can
/// be attached at most once, after which it is the object's meta type.
pub struct RObject {
    logical_type: TypeId,
    singleton: OnceLock<TypeId>,
    shape: Arc<Shape>,
    data: ObjectData,
}

impl RObject {
    pub fn new(logical_type: TypeId, shape: Arc<Shape>, data: ObjectData) -> Self {
        Self {
            logical_type,
            singleton: OnceLock::new(),
            shape,
            data,
        }
    }

    #[inline]
    pub fn logical_type(&self) -> TypeId {
        self.logical_type
    }

    #[inline]
    pub fn meta_type(&self) -> TypeId {
        self.singleton.get().copied().unwrap_or(self.logical_type)
    }

    #[inline]
    pub fn singleton(&self) -> Option<TypeId> {
        self.singleton.get().copied()
    }

    /// Attaches `singleton` unless another type already won; returns the
    /// attached type either way.
    pub(crate) fn attach_singleton(&self, singleton: TypeId) -> TypeId {
        *self.singleton.get_or_init(|| singleton)
    }

    #[inline]
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    pub fn data(&self) -> &ObjectData {
        &self.data
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            ObjectData::Str(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<TypeId> {
        match self.data {
            ObjectData::Type(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Debug for RObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RObject")
            .field("logical_type", &self.logical_type)
            .field("singleton", &self.singleton.get())
            .field("shape", &self.shape.name())
            .field("data", &self.data)
            .finish()
    }
}

/// Sign-magnitude integer outside the fixnum range. Limbs are base 2^32,
/// least significant first, with no trailing zero limbs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bignum {
    negative: bool,
    magnitude: Vec<u32>,
}

impl Bignum {
    pub fn from_i128(value: i128) -> Self {
        let mut rest = value.unsigned_abs();
        let mut magnitude = Vec::with_capacity(4);
        while rest != 0 {
            magnitude.push(rest as u32);
            rest >>= 32;
        }
        Self {
            negative: value < 0,
            magnitude,
        }
    }

    fn normalized(negative: bool, mut magnitude: Vec<u32>) -> Self {
        magnitude.truncate(normalize_len(&magnitude));
        Self {
            negative: negative && !magnitude.is_empty(),
            magnitude,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude.is_empty()
    }

    pub fn limbs(&self) -> &[u32] {
        &self.magnitude
    }

    pub fn to_i128(&self) -> Option<i128> {
        if self.magnitude.len() > 4 {
            return None;
        }
        let mut unsigned: u128 = 0;
        for &limb in self.magnitude.iter().rev() {
            unsigned = (unsigned << 32) | limb as u128;
        }
        if self.negative {
            if unsigned == 1u128 << 127 {
                Some(i128::MIN)
            } else {
                i128::try_from(unsigned).ok().map(|v| -v)
            }
        } else {
            i128::try_from(unsigned).ok()
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn to_f64(&self) -> f64 {
        let mut result = 0.0f64;
        for &limb in self.magnitude.iter().rev() {
            result = result * 4294967296.0 + limb as f64;
        }
        if self.negative { -result } else { result }
    }
}

fn normalize_len(limbs: &[u32]) -> usize {
    let mut len = limbs.len();
    while len > 0 && limbs[len - 1] == 0 {
        len -= 1;
    }
    len
}

fn cmp_mag(a: &[u32], b: &[u32]) -> Ordering {
    a.len()
        .cmp(&b.len())
        .then_with(|| a.iter().rev().cmp(b.iter().rev()))
}

fn add_mag(a: &[u32], b: &[u32]) -> Vec<u32> {
    let len = a.len().max(b.len());
    let mut out = Vec::with_capacity(len + 1);
    let mut carry = 0u64;
    for i in 0..len {
        let av = a.get(i).copied().unwrap_or(0) as u64;
        let bv = b.get(i).copied().unwrap_or(0) as u64;
        let sum = av + bv + carry;
        out.push(sum as u32);
        carry = sum >> 32;
    }
    if carry != 0 {
        out.push(carry as u32);
    }
    out
}

/// `a - b` for `|a| >= |b|`.
fn sub_mag(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len());
    let mut borrow = false;
    for (i, &av) in a.iter().enumerate() {
        let bv = b.get(i).copied().unwrap_or(0);
        let (partial, under1) = av.overflowing_sub(bv);
        let (diff, under2) = partial.overflowing_sub(borrow as u32);
        out.push(diff);
        borrow = under1 | under2;
    }
    out
}

fn mul_mag(a: &[u32], b: &[u32]) -> Vec<u32> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0u32; a.len() + b.len()];
    for (i, &av) in a.iter().enumerate() {
        let mut carry = 0u64;
        for (j, &bv) in b.iter().enumerate() {
            let acc = out[i + j] as u64 + av as u64 * bv as u64 + carry;
            out[i + j] = acc as u32;
            carry = acc >> 32;
        }
        out[i + b.len()] = carry as u32;
    }
    out
}

impl Ord for Bignum {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => cmp_mag(&self.magnitude, &other.magnitude),
            (true, true) => cmp_mag(&other.magnitude, &self.magnitude),
        }
    }
}

impl PartialOrd for Bignum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Neg for &Bignum {
    type Output = Bignum;

    fn neg(self) -> Bignum {
        Bignum::normalized(!self.negative, self.magnitude.clone())
    }
}

impl Add for &Bignum {
    type Output = Bignum;

    fn add(self, other: &Bignum) -> Bignum {
        if self.negative == other.negative {
            return Bignum::normalized(
                self.negative,
                add_mag(&self.magnitude, &other.magnitude),
            );
        }
        match cmp_mag(&self.magnitude, &other.magnitude) {
            Ordering::Less => Bignum::normalized(
                other.negative,
                sub_mag(&other.magnitude, &self.magnitude),
            ),
            _ => Bignum::normalized(
                self.negative,
                sub_mag(&self.magnitude, &other.magnitude),
            ),
        }
    }
}

impl Sub for &Bignum {
    type Output = Bignum;

    fn sub(self, other: &Bignum) -> Bignum {
        self + &-other
    }
}

impl Mul for &Bignum {
    type Output = Bignum;

    fn mul(self, other: &Bignum) -> Bignum {
        Bignum::normalized(
            self.negative != other.negative,
            mul_mag(&self.magnitude, &other.magnitude),
        )
    }
}

impl fmt::Display for Bignum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.magnitude.is_empty() {
            return write!(f, "0");
        }
        const CHUNK: u64 = 1_000_000_000;
        let mut limbs = self.magnitude.clone();
        let mut chunks = Vec::new();
        while limbs.iter().any(|&limb| limb != 0) {
            let mut remainder: u64 = 0;
            for limb in limbs.iter_mut().rev() {
                let current = (remainder << 32) | *limb as u64;
                *limb = (current / CHUNK) as u32;
                remainder = current % CHUNK;
            }
            chunks.push(remainder as u32);
        }
        if self.negative {
            write!(f, "-")?;
        }
        let mut chunks = chunks.iter().rev();
        if let Some(first) = chunks.next() {
            write!(f, "{first}")?;
        }
        for chunk in chunks {
            write!(f, "{chunk:09}")?;
        }
        Ok(())
    }
}
