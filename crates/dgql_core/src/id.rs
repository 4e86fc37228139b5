//! Opaque identifier and cursor codec.
//!
//! Every node is addressed by a global identifier formed from its type name
//! and its raw persistence identity. The wire form is opaque; the codec is
//! pluggable and the base64 `type:rawId` scheme is only the default.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Reserved type name used when encoding pagination cursors.
pub const CURSOR_TYPE: &str = "cursor";

/// A decoded global identifier: a type name plus the raw identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalId {
    pub type_name: String,
    pub id: String,
}

impl GlobalId {
    /// Creates a new global identifier.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for GlobalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}

/// Encodes and decodes opaque identifiers and cursors.
pub trait IdCodec: Send + Sync {
    /// Encodes a (type name, raw id) pair into an opaque string.
    fn encode(&self, type_name: &str, raw_id: &str) -> String;

    /// Decodes an opaque string back into its parts.
    ///
    /// Returns `None` for values that were not produced by this codec.
    fn decode(&self, opaque: &str) -> Option<GlobalId>;
}

/// The default codec: base64 over `type:rawId`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl IdCodec for Base64Codec {
    fn encode(&self, type_name: &str, raw_id: &str) -> String {
        STANDARD.encode(format!("{type_name}:{raw_id}"))
    }

    fn decode(&self, opaque: &str) -> Option<GlobalId> {
        let bytes = STANDARD.decode(opaque).ok()?;
        let plain = String::from_utf8(bytes).ok()?;
        let (type_name, id) = plain.split_once(':')?;
        if type_name.is_empty() {
            return None;
        }
        Some(GlobalId::new(type_name, id))
    }
}
