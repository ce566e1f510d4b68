//! String-to-type conversion for route and query values.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::BindingConversionError;

/// Converts one raw value; the error string becomes the failure reason.
pub type Converter<T> = Arc<dyn Fn(&str) -> Result<T, String> + Send + Sync>;

/// Converters keyed by target type.
///
/// Looked up once per parameter at registration; the compiled handler keeps
/// the converter itself, so requests never touch the map.
pub struct ConversionRegistry {
    converters: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ConversionRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Registry with `String`, `bool`, `char`, the numeric primitives and
    /// `Uuid`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register::<String, _>(|s| Ok(s.to_string()));
        registry.register_from_str::<bool>();
        registry.register_from_str::<char>();
        registry.register_from_str::<i8>();
        registry.register_from_str::<i16>();
        registry.register_from_str::<i32>();
        registry.register_from_str::<i64>();
        registry.register_from_str::<i128>();
        registry.register_from_str::<isize>();
        registry.register_from_str::<u8>();
        registry.register_from_str::<u16>();
        registry.register_from_str::<u32>();
        registry.register_from_str::<u64>();
        registry.register_from_str::<u128>();
        registry.register_from_str::<usize>();
        registry.register_from_str::<f32>();
        registry.register_from_str::<f64>();
        registry.register_from_str::<Uuid>();
        registry
    }

    /// Register (or replace) the converter for `T`.
    pub fn register<T, F>(&mut self, convert: F)
    where
        T: 'static,
        F: Fn(&str) -> Result<T, String> + Send + Sync + 'static,
    {
        let converter: Converter<T> = Arc::new(convert);
        self.converters.insert(TypeId::of::<T>(), Box::new(converter));
    }

    /// Register `T`'s `FromStr` implementation.
    pub fn register_from_str<T>(&mut self)
    where
        T: FromStr + 'static,
        T::Err: Display,
    {
        self.register::<T, _>(|s| s.parse::<T>().map_err(|e| e.to_string()));
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.converters.contains_key(&TypeId::of::<T>())
    }

    pub fn get<T: 'static>(&self) -> Option<Converter<T>> {
        self.converters
            .get(&TypeId::of::<T>())
            .and_then(|c| c.downcast_ref::<Converter<T>>())
            .cloned()
    }

    /// Convert `value` for `parameter`.
    pub fn convert<T: 'static>(&self, parameter: &str, value: &str) -> Result<T, BindingConversionError> {
        let converter = self.get::<T>().ok_or_else(|| BindingConversionError {
            parameter: parameter.to_string(),
            value: value.to_string(),
            target: type_name::<T>(),
            reason: "no converter registered".to_string(),
        })?;
        apply(&converter, parameter, value)
    }
}

/// Run a converter, naming the parameter in the error.
pub(crate) fn apply<T>(
    converter: &Converter<T>,
    parameter: &str,
    value: &str,
) -> Result<T, BindingConversionError> {
    converter(value).map_err(|reason| BindingConversionError {
        parameter: parameter.to_string(),
        value: value.to_string(),
        target: type_name::<T>(),
        reason,
    })
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionRegistry")
            .field("types", &self.converters.len())
            .finish()
    }
}
