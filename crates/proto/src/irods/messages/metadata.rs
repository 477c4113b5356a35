//! AVU metadata messages: `ModAVUMetadataInp_PI`.

use crate::irods::common::MOD_AVU_METADATA_AN;
use crate::irods::messages::{KeyValPair, RequestMessage};
use crate::irods::xml::{PackedStructWriter, XmlEra};
use rods_platform::RodsResult;

/// What kind of catalog entity an AVU is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataTarget {
    /// A data object (`-d`).
    DataObject,
    /// A collection (`-C`).
    Collection,
    /// A user (`-u`).
    User,
}

impl MetadataTarget {
    fn flag(self) -> &'static str {
        match self {
            MetadataTarget::DataObject => "-d",
            MetadataTarget::Collection => "-C",
            MetadataTarget::User => "-u",
        }
    }
}

/// An attribute-value-unit triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Avu {
    /// Attribute name.
    pub attribute: String,
    /// Attribute value.
    pub value: String,
    /// Optional unit.
    pub unit: String,
}

impl Avu {
    /// Creates an AVU; pass an empty unit when unused.
    pub fn new(attribute: &str, value: &str, unit: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            value: value.to_string(),
            unit: unit.to_string(),
        }
    }
}

/// Adds or removes an AVU on a catalog entity.
#[derive(Debug, Clone)]
pub struct ModifyMetadataRequest {
    operation: &'static str,
    target: MetadataTarget,
    path: String,
    avu: Avu,
}

impl ModifyMetadataRequest {
    /// Attach `avu` to the entity at `path`.
    pub fn add(target: MetadataTarget, path: &str, avu: Avu) -> Self {
        Self {
            operation: "add",
            target,
            path: path.to_string(),
            avu,
        }
    }

    /// Detach `avu` from the entity at `path`.
    pub fn remove(target: MetadataTarget, path: &str, avu: Avu) -> Self {
        Self {
            operation: "rm",
            target,
            path: path.to_string(),
            avu,
        }
    }
}

impl RequestMessage for ModifyMetadataRequest {
    fn int_info(&self) -> i32 {
        MOD_AVU_METADATA_AN
    }

    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>> {
        let mut w = PackedStructWriter::new("ModAVUMetadataInp_PI", era);
        w.tag("arg0", self.operation);
        w.tag("arg1", self.target.flag());
        w.tag("arg2", &self.path);
        w.tag("arg3", &self.avu.attribute);
        w.tag("arg4", &self.avu.value);
        w.tag("arg5", &self.avu.unit);
        for arg in 6..10 {
            w.tag(&format!("arg{}", arg), "");
        }
        KeyValPair::new().write_into(&mut w);
        Ok(w.finish())
    }
}
