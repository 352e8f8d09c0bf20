//! Records stored by the call ledger.

use std::fmt;

use crate::emulation::capture::report::stringify;

/// One recorded parameter or return value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamValue {
    /// A raw integer or pointer.
    Integer(u64),
    /// Decoded guest text.
    Text(String),
    /// A decoded GUID.
    Guid(uguid::Guid),
    /// No value, e.g. the return value of a `void` routine.
    Absent,
}

impl ParamValue {
    /// Returns `true` unless this is [`ParamValue::Absent`].
    #[must_use]
    pub fn is_present(&self) -> bool {
        !matches!(self, ParamValue::Absent)
    }

    /// The integer value, if this is one.
    #[must_use]
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            ParamValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// The text value, if this is one.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(value) => write!(f, "{value:#x}"),
            ParamValue::Text(text) => f.write_str(&stringify(text)),
            ParamValue::Guid(guid) => write!(f, "{guid}"),
            ParamValue::Absent => f.write_str("NULL"),
        }
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Integer(u64::from(value))
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<uguid::Guid> for ParamValue {
    fn from(value: uguid::Guid) -> Self {
        ParamValue::Guid(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Absent, Into::into)
    }
}

/// One intercepted API or system call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord {
    /// Routine name with the hook prefix removed.
    pub name: String,
    /// Parameters in declaration order.
    pub params: Vec<(String, ParamValue)>,
    /// Return value.
    pub retval: ParamValue,
    /// Guest address of the intercepted routine.
    pub address: u64,
    /// Guest address the routine returns to.
    pub retaddr: u64,
    /// Position in the ledger, starting at 0.
    pub position: usize,
}

impl CallRecord {
    /// Looks up a parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value)
    }
}
