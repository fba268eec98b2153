use std::collections::HashMap;

/// A D-Bus value with its type tag kept at runtime.
///
/// Variant boxes (`v`) are unwrapped when values come off the bus, so a
/// `Variant` always holds the inner value. Kinds the engine never reads
/// (structures, signatures, file descriptors) become [`Variant::Unsupported`].
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Bool(bool),
    Byte(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Double(f64),
    Str(String),
    ObjectPath(String),
    Array(Vec<Variant>),
    Dict(HashMap<String, Variant>),
    Unsupported,
}

impl Variant {
    /// Builds a `Dict` from key/value pairs.
    pub fn dict<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Variant)>,
    {
        Variant::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds an `Array` of strings.
    pub fn str_list<S, I>(items: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        Variant::Array(items.into_iter().map(|s| Variant::Str(s.into())).collect())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Strings and object paths both read as text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::Str(v) | Variant::ObjectPath(v) => Some(v),
            _ => None,
        }
    }

    /// A 64-bit integer, signed or unsigned. Unsigned values beyond `i64::MAX`
    /// are rejected rather than wrapped.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Variant::I64(v) => Some(*v),
            Variant::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// An array whose every element is a string.
    pub fn as_str_list(&self) -> Option<Vec<&str>> {
        match self {
            Variant::Array(items) => items.iter().map(Variant::as_str).collect(),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&HashMap<String, Variant>> {
        match self {
            Variant::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Short type name, used in log lines and decode errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Variant::Bool(_) => "bool",
            Variant::Byte(_) => "byte",
            Variant::I16(_) => "int16",
            Variant::U16(_) => "uint16",
            Variant::I32(_) => "int32",
            Variant::U32(_) => "uint32",
            Variant::I64(_) => "int64",
            Variant::U64(_) => "uint64",
            Variant::Double(_) => "double",
            Variant::Str(_) => "string",
            Variant::ObjectPath(_) => "object path",
            Variant::Array(_) => "array",
            Variant::Dict(_) => "dict",
            Variant::Unsupported => "unsupported",
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::I64(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::Str(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::Str(value)
    }
}
