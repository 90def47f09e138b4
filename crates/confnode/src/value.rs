//! Scalar payloads and the typed conversions layered on top of them.
//!
//! A [`Value`] never converts implicitly: callers ask for a concrete Rust type
//! through [`FromValue`] and get an error when the stored type differs. The
//! only relaxation is the optional Int <-> Float auto-conversion, which both the
//! strict and the permissive accessors route through the same functions here.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Type tag of a setting node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SettingType {
    None,
    Group,
    Int,
    Float,
    String,
    Boolean,
    Array,
    List,
}

impl SettingType {
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            SettingType::Int | SettingType::Float | SettingType::String | SettingType::Boolean
        )
    }

    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            SettingType::Group | SettingType::Array | SettingType::List
        )
    }

    pub fn is_number(self) -> bool {
        matches!(self, SettingType::Int | SettingType::Float)
    }

    /// Placeholder value for a freshly created scalar node.
    pub(crate) fn default_value(self) -> Option<Value> {
        match self {
            SettingType::Int => Some(Value::Int(0)),
            SettingType::Float => Some(Value::Float(0.0)),
            SettingType::String => Some(Value::String(String::new())),
            SettingType::Boolean => Some(Value::Bool(false)),
            _ => None,
        }
    }
}

/// Rendering hint for integer settings. Has no effect on the stored value.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SettingFormat {
    #[default]
    Default,
    Hex,
}

/// Scalar payload of a leaf setting.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
}

impl Value {
    pub fn setting_type(&self) -> SettingType {
        match self {
            Value::Int(_) => SettingType::Int,
            Value::Float(_) => SettingType::Float,
            Value::String(_) => SettingType::String,
            Value::Bool(_) => SettingType::Boolean,
        }
    }

    /// Structural equality used by tree comparison. Every NaN equals every
    /// other NaN, whatever its sign or payload, since text keeps neither.
    pub(crate) fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => (a.is_nan() && b.is_nan()) || a == b,
            _ => self == other,
        }
    }

    /// Convert `self` so it can be stored in a node of type `target`.
    pub(crate) fn coerce(self, target: SettingType, auto_convert: bool) -> Result<Value, Conversion> {
        match (self, target) {
            (v, t) if v.setting_type() == t => Ok(v),
            (Value::Int(i), SettingType::Float) if auto_convert => Ok(Value::Float(i as f64)),
            (Value::Float(f), SettingType::Int) if auto_convert => {
                float_to_i64(f).map(Value::Int).ok_or(Conversion::Range("i64"))
            }
            (v, t) => Err(Conversion::Mismatch {
                expected: t,
                found: v.setting_type(),
            }),
        }
    }
}

/// Why a value could not be converted. Setting accessors turn this into an
/// [`Error`](crate::Error) carrying the setting path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conversion {
    Mismatch {
        expected: SettingType,
        found: SettingType,
    },
    Range(&'static str),
}

impl Conversion {
    pub(crate) fn into_error(self, path: impl Into<String>) -> crate::Error {
        match self {
            Conversion::Mismatch { expected, found } => {
                crate::Error::mismatch(path, format!("expected {expected}, found {found}"))
            }
            Conversion::Range(target) => crate::Error::OutOfRange {
                path: path.into(),
                target,
            },
        }
    }
}

fn float_to_i64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

/// Rust types that can be read out of a scalar [`Value`].
pub trait FromValue: Sized {
    /// Setting type this Rust type maps to.
    const TYPE: SettingType;

    #[doc(hidden)]
    fn from_value(value: &Value, auto_convert: bool) -> Result<Self, Conversion>;
}

/// Rust types that can be written into a scalar [`Value`].
pub trait IntoValue {
    #[doc(hidden)]
    fn into_value(self) -> Result<Value, Conversion>;
}

fn stored_int(value: &Value, auto_convert: bool) -> Result<i64, Conversion> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Float(f) if auto_convert => float_to_i64(*f).ok_or(Conversion::Range("i64")),
        other => Err(Conversion::Mismatch {
            expected: SettingType::Int,
            found: other.setting_type(),
        }),
    }
}

fn stored_float(value: &Value, auto_convert: bool) -> Result<f64, Conversion> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) if auto_convert => Ok(*i as f64),
        other => Err(Conversion::Mismatch {
            expected: SettingType::Float,
            found: other.setting_type(),
        }),
    }
}

macro_rules! int_value {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const TYPE: SettingType = SettingType::Int;

                fn from_value(value: &Value, auto_convert: bool) -> Result<Self, Conversion> {
                    let raw = stored_int(value, auto_convert)?;
                    <$ty>::try_from(raw).map_err(|_| Conversion::Range($name))
                }
            }

            impl IntoValue for $ty {
                fn into_value(self) -> Result<Value, Conversion> {
                    i64::try_from(self)
                        .map(Value::Int)
                        .map_err(|_| Conversion::Range("i64"))
                }
            }
        )*
    };
}

int_value!(
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
);

impl FromValue for f64 {
    const TYPE: SettingType = SettingType::Float;

    fn from_value(value: &Value, auto_convert: bool) -> Result<Self, Conversion> {
        stored_float(value, auto_convert)
    }
}

impl FromValue for f32 {
    const TYPE: SettingType = SettingType::Float;

    fn from_value(value: &Value, auto_convert: bool) -> Result<Self, Conversion> {
        stored_float(value, auto_convert).map(|f| f as f32)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Result<Value, Conversion> {
        Ok(Value::Float(self))
    }
}

impl IntoValue for f32 {
    fn into_value(self) -> Result<Value, Conversion> {
        Ok(Value::Float(self as f64))
    }
}

impl FromValue for bool {
    const TYPE: SettingType = SettingType::Boolean;

    fn from_value(value: &Value, _auto_convert: bool) -> Result<Self, Conversion> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(Conversion::Mismatch {
                expected: SettingType::Boolean,
                found: other.setting_type(),
            }),
        }
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Result<Value, Conversion> {
        Ok(Value::Bool(self))
    }
}

impl FromValue for String {
    const TYPE: SettingType = SettingType::String;

    fn from_value(value: &Value, _auto_convert: bool) -> Result<Self, Conversion> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(Conversion::Mismatch {
                expected: SettingType::String,
                found: other.setting_type(),
            }),
        }
    }
}

impl IntoValue for String {
    fn into_value(self) -> Result<Value, Conversion> {
        Ok(Value::String(self))
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Result<Value, Conversion> {
        Ok(Value::String(self.to_owned()))
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Result<Value, Conversion> {
        Ok(self)
    }
}
