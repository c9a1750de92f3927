//! Data types: the OID registry, value conversion and parameter encoding.
//!
//! The registry is immutable once built. [`TypeRegistry::standard`] hands out
//! a shared instance holding the built-in types; build your own with
//! [`TypeRegistry::with_standard_types`] and [`TypeRegistry::register`] to add
//! more, then put it in [`Opts::type_registry`](crate::Opts::type_registry).

pub mod deserialize;
mod param;
mod value;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

pub use deserialize::Deserializer;
pub use param::encode_param;
pub use value::Value;

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid};

/// A registered type: OID, SQL name and text deserializer.
#[derive(Clone)]
pub struct DataType {
    oid: Oid,
    name: Arc<str>,
    deserializer: Deserializer,
}

impl DataType {
    pub fn new(oid: Oid, name: &str, deserializer: Deserializer) -> Self {
        Self {
            oid,
            name: Arc::from(name),
            deserializer,
        }
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// Name of the type as used in SQL.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Convert a field of this type. NULL always becomes [`Value::Null`].
    ///
    /// Binary-format fields are returned as raw bytes.
    pub fn deserialize(&self, format: FormatCode, bytes: Option<&[u8]>) -> Result<Value> {
        match (bytes, format) {
            (None, _) => Ok(Value::Null),
            (Some(bytes), FormatCode::Binary) => Ok(Value::Bytes(bytes.to_vec())),
            (Some(bytes), FormatCode::Text) => (self.deserializer)(bytes),
        }
    }
}

impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid && self.name == other.name
    }
}

impl Eq for DataType {}

impl std::fmt::Debug for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DataType({}, {:?})", self.oid, self.name)
    }
}

/// Registry of known types, keyed by OID.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<Oid, DataType>,
}

static STANDARD: LazyLock<Arc<TypeRegistry>> =
    LazyLock::new(|| Arc::new(TypeRegistry::with_standard_types()));

impl TypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh registry holding the built-in types.
    pub fn with_standard_types() -> Self {
        let mut registry = Self::new();
        registry
            .register(5, "bool", deserialize::boolean)
            .register(6, "integer", deserialize::integer)
            .register(7, "float", deserialize::float)
            .register(8, "char", deserialize::unicode_string)
            .register(9, "varchar", deserialize::unicode_string)
            .register(10, "date", deserialize::date)
            .register(11, "time", deserialize::generic)
            .register(12, "timestamp", deserialize::timestamp)
            .register(13, "timestamp_tz", deserialize::timestamp_tz)
            .register(14, "time_tz", deserialize::generic)
            .register(15, "interval", deserialize::generic)
            .register(16, "numeric", deserialize::numeric)
            .register(17, "bytes", deserialize::binary_string)
            .register(115, "long varchar", deserialize::unicode_string);
        registry
    }

    /// The shared registry of built-in types.
    pub fn standard() -> Arc<TypeRegistry> {
        Arc::clone(&STANDARD)
    }

    /// Add or replace a type.
    pub fn register(&mut self, oid: Oid, name: &str, deserializer: Deserializer) -> &mut Self {
        self.types.insert(oid, DataType::new(oid, name, deserializer));
        self
    }

    pub fn get(&self, oid: Oid) -> Option<&DataType> {
        self.types.get(&oid)
    }

    /// Look up a type, failing with [`Error::UnknownType`].
    pub fn lookup(&self, oid: Oid) -> Result<&DataType> {
        self.get(oid).ok_or(Error::UnknownType(oid))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
