// Copyright 2025 the Strata authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The typed value model exchanged between the cache and the graph.
//!
//! The graph declares exactly one [`ValueType`] per attribute. The cache
//! decodes each value once into a [`Value`] and hands strongly-typed copies
//! to consumers through the [`PropertyValue`] bridge trait. Type tags are
//! deliberately narrow: `Float` and `Double` are distinct, as are the fixed
//! `Vec3f` and the dynamic `FloatArray` — a disagreement between the
//! requested Rust type and the declared tag is a programmer error, never a
//! silent coercion.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::ids::Token;

/// A three-component `f32` vector, plain-old-data for SoA column storage.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3f {
    /// Creates a vector from its three components.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// The set of property types the cache layer can decode and store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    Int64,
    Float,
    Double,
    Vec3f,
    Token,
    String,
    /// Dynamically sized `f32` array. Distinct from `Vec3f`.
    FloatArray,
    /// Dynamically sized `f64` array.
    DoubleArray,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Int64 => "int64",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Vec3f => "vec3f",
            ValueType::Token => "token",
            ValueType::String => "string",
            ValueType::FloatArray => "float[]",
            ValueType::DoubleArray => "double[]",
        };
        f.write_str(name)
    }
}

/// A decoded property value, tagged with its declared type.
///
/// One variant per [`ValueType`]; `value_type` is total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Vec3f(Vec3f),
    Token(Token),
    String(String),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
}

impl Value {
    /// Returns the type tag of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Int64(_) => ValueType::Int64,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::Vec3f(_) => ValueType::Vec3f,
            Value::Token(_) => ValueType::Token,
            Value::String(_) => ValueType::String,
            Value::FloatArray(_) => ValueType::FloatArray,
            Value::DoubleArray(_) => ValueType::DoubleArray,
        }
    }
}

/// Compile-time bridge between a Rust type and its [`ValueType`] tag.
///
/// `from_value` returns `None` on a tag mismatch; callers escalate that to
/// [`CacheError::TypeMismatch`](crate::error::CacheError::TypeMismatch)
/// rather than reinterpreting bits.
pub trait PropertyValue: Sized {
    /// The type tag the graph must declare for this Rust type.
    const TYPE: ValueType;

    /// Wraps the value in its tagged variant.
    fn into_value(self) -> Value;

    /// Unwraps the tagged variant, failing on a tag mismatch.
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_property_value {
    ($rust:ty, $variant:ident) => {
        impl PropertyValue for $rust {
            const TYPE: ValueType = ValueType::$variant;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

impl_property_value!(bool, Bool);
impl_property_value!(i32, Int);
impl_property_value!(i64, Int64);
impl_property_value!(f32, Float);
impl_property_value!(f64, Double);
impl_property_value!(Vec3f, Vec3f);
impl_property_value!(Token, Token);
impl_property_value!(String, String);
impl_property_value!(Vec<f32>, FloatArray);
impl_property_value!(Vec<f64>, DoubleArray);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_tags_round_trip() {
        assert_eq!(Value::Float(1.5).value_type(), ValueType::Float);
        assert_eq!(Value::Double(1.5).value_type(), ValueType::Double);
        assert_eq!(
            Value::FloatArray(vec![1.0, 2.0]).value_type(),
            ValueType::FloatArray
        );
    }

    #[test]
    fn from_value_rejects_mismatched_tag() {
        // float and double must never coerce into each other.
        let v = Value::Float(2.0);
        assert_eq!(f32::from_value(&v), Some(2.0));
        assert_eq!(f64::from_value(&v), None);

        let fixed = Value::Vec3f(Vec3f::new(1.0, 2.0, 3.0));
        assert_eq!(<Vec<f32>>::from_value(&fixed), None);
    }
}
