//! Canonical node contract for the Graticule table engine
//!
//! This crate defines the capability surface a domain model exposes to the
//! conversion engine: which header/value groups an entity contributes to the
//! final table, and where it prefers to sit when layers of mixed type are
//! reconciled. The engine consumes nothing else about an entity; everything
//! from parsing to export formats stays on the domain side.
//!
//! # Usage
//!
//! ```ignore
//! use graticule_node_contracts::{NO_ORDER_HINT, TabularSource, ValueGroup};
//!
//! struct Probe {
//!     label: String,
//! }
//!
//! impl TabularSource for Probe {
//!     fn value_groups(&self) -> Vec<ValueGroup> {
//!         vec![ValueGroup::single("Probe", &self.label)]
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Order hint value meaning "no positional constraint".
pub const NO_ORDER_HINT: i32 = -1;

/// Errors raised when a contract value is constructed from invalid parts
#[derive(Debug, Error)]
pub enum ContractError {
    /// A value group must carry at least one header
    #[error("value group has no headers")]
    EmptyHeaders,

    /// More values than headers cannot be placed in the table
    #[error("value group has {values} values but only {headers} headers")]
    TooManyValues { headers: usize, values: usize },
}

/// One semantic field's contribution to the table: a header list and the
/// values that sit under it.
///
/// The first header doubles as the group's (and, for the first group of a
/// node, the node's) semantic type. Groups are validated on construction:
/// at least one header, and never more values than headers. Missing trailing
/// values are legal and read as empty cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawValueGroup")]
pub struct ValueGroup {
    headers: Vec<String>,
    values: Vec<String>,
}

impl ValueGroup {
    /// Create a group from parallel header/value lists
    pub fn new(
        headers: Vec<String>,
        values: Vec<String>,
    ) -> std::result::Result<Self, ContractError> {
        if headers.is_empty() {
            return Err(ContractError::EmptyHeaders);
        }
        if values.len() > headers.len() {
            return Err(ContractError::TooManyValues {
                headers: headers.len(),
                values: values.len(),
            });
        }
        Ok(Self { headers, values })
    }

    /// Create a single-column group
    pub fn single(header: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            headers: vec![header.into()],
            values: vec![value.into()],
        }
    }

    /// Headers, in column order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Values, in column order; may be shorter than the header list
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// The first header, i.e. the group's semantic type
    pub fn first_header(&self) -> &str {
        &self.headers[0]
    }

    /// Number of columns this group spans
    pub fn width(&self) -> usize {
        self.headers.len()
    }
}

/// Shadow type so deserialized groups pass the same validation as
/// constructed ones.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawValueGroup {
    headers: Vec<String>,
    #[serde(default)]
    values: Vec<String>,
}

impl TryFrom<RawValueGroup> for ValueGroup {
    type Error = ContractError;

    fn try_from(raw: RawValueGroup) -> std::result::Result<Self, Self::Error> {
        ValueGroup::new(raw.headers, raw.values)
    }
}

/// Capability contract a domain entity implements to appear in a table
///
/// `value_groups` must report a group's headers consistently across all
/// instances of that semantic field. Omitting a field only when its value
/// happens to be empty misaligns columns between entities, and the engine
/// has no way to repair that.
pub trait TabularSource {
    /// Ordered tab value groups this entity contributes to the table
    fn value_groups(&self) -> Vec<ValueGroup>;

    /// Positional constraint used only to resolve same-layer type
    /// collisions; [`NO_ORDER_HINT`] (the default) means indifferent.
    fn order_hint(&self) -> i32 {
        NO_ORDER_HINT
    }

    /// The entity's semantic type: the first header of its first group
    fn type_name(&self) -> Option<String> {
        self.value_groups()
            .first()
            .map(|g| g.first_header().to_string())
    }
}
