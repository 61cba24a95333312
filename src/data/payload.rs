//! Payload types carried by [`DataObject`](super::DataObject)s.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Type-erased payload of a data object.
///
/// Implement it with [`impl_data_payload!`](crate::impl_data_payload) for any
/// `Clone + Debug + Send + Sync + 'static` type.
pub trait DataPayload: Any + Send + Sync + fmt::Debug {
    fn clone_payload(&self) -> Box<dyn DataPayload>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Implements [`DataPayload`] for one or more concrete types.
#[macro_export]
macro_rules! impl_data_payload {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::data::DataPayload for $ty {
                fn clone_payload(&self) -> Box<dyn $crate::data::DataPayload> {
                    Box::new(self.clone())
                }

                fn as_any(&self) -> &dyn std::any::Any {
                    self
                }

                fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                    self
                }
            }
        )+
    };
}

crate::impl_data_payload!(EmptyPayload, AttributeValue, PropertyArray, DataTable);

impl Clone for Box<dyn DataPayload> {
    fn clone(&self) -> Self {
        (**self).clone_payload()
    }
}

/// Payload of pure container objects whose content lives in sub-objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmptyPayload;

/// Value of a global attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value, widening integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

/// Per-element property column with a fixed number of components.
///
/// Values are stored row-major: element `i`, component `c` lives at
/// `values[i * components + c]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyArray {
    values: Vec<f64>,
    components: usize,
}

impl Default for PropertyArray {
    /// Empty scalar property.
    fn default() -> Self {
        Self::scalar(Vec::new())
    }
}

impl PropertyArray {
    /// Scalar property.
    pub fn scalar(values: Vec<f64>) -> Self {
        Self {
            values,
            components: 1,
        }
    }

    /// Vector property. Trailing values that do not fill a whole element are dropped.
    pub fn vector(mut values: Vec<f64>, components: usize) -> Self {
        let components = components.max(1);
        let whole = values.len() / components * components;
        values.truncate(whole);
        Self { values, components }
    }

    pub fn len(&self) -> usize {
        self.values.len() / self.components
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn get(&self, element: usize, component: usize) -> Option<f64> {
        if component >= self.components {
            return None;
        }
        self.values.get(element * self.components + component).copied()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Iterator over one component of every element.
    pub fn component_iter(&self, component: usize) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .skip(component)
            .step_by(self.components)
            .copied()
    }

    /// Keep only the elements for which `keep[i]` is true.
    pub fn retain_elements(&mut self, keep: &[bool]) {
        let components = self.components;
        let mut out = Vec::with_capacity(self.values.len());
        for (i, chunk) in self.values.chunks(components).enumerate() {
            if keep.get(i).copied().unwrap_or(true) {
                out.extend_from_slice(chunk);
            }
        }
        self.values = out;
    }
}

/// Two-column table, used for histograms and other plots.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataTable {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl DataTable {
    pub fn rows(&self) -> usize {
        self.x.len().min(self.y.len())
    }
}
