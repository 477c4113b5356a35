//! Collection messages: create, remove, and rename.

use crate::irods::common::{
    COLL_CREATE_AN, DATA_OBJ_RENAME_AN, RECURSIVE_OPR_KW, RM_COLL_AN,
};
use crate::irods::messages::{KeyValPair, RequestMessage};
use crate::irods::xml::{PackedStructWriter, XmlEra};
use rods_platform::RodsResult;

/// `CollInpNew_PI`: create or remove a collection.
#[derive(Debug, Clone)]
pub struct CollectionRequest {
    api_number: i32,
    path: String,
    kvp: KeyValPair,
}

impl CollectionRequest {
    /// Create a collection.
    pub fn create(path: &str) -> Self {
        Self {
            api_number: COLL_CREATE_AN,
            path: path.to_string(),
            kvp: KeyValPair::new(),
        }
    }

    /// Remove a collection, optionally with its contents.
    pub fn remove(path: &str, recursive: bool) -> Self {
        let mut kvp = KeyValPair::new();
        if recursive {
            kvp.set(RECURSIVE_OPR_KW, "");
        }
        Self {
            api_number: RM_COLL_AN,
            path: path.to_string(),
            kvp,
        }
    }
}

impl RequestMessage for CollectionRequest {
    fn int_info(&self) -> i32 {
        self.api_number
    }

    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>> {
        let mut w = PackedStructWriter::new("CollInpNew_PI", era);
        w.tag("collName", &self.path);
        w.tag_i32("flags", 0);
        w.tag_i32("oprType", 0);
        self.kvp.write_into(&mut w);
        Ok(w.finish())
    }
}

/// `DataObjCopyInp_PI`: rename (move) a data object or collection.
///
/// The operation type distinguishes object renames from collection renames;
/// see [`crate::irods::common::RENAME_DATA_OBJ_OPR`] and
/// [`crate::irods::common::RENAME_COLL_OPR`].
#[derive(Debug, Clone)]
pub struct RenameRequest {
    source: String,
    destination: String,
    opr_type: i32,
}

impl RenameRequest {
    /// Builds a rename from `source` to `destination`.
    pub fn new(source: &str, destination: &str, opr_type: i32) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            opr_type,
        }
    }

    fn write_half(&self, w: &mut PackedStructWriter, path: &str) {
        w.open("DataObjInp_PI");
        w.tag("objPath", path);
        w.tag_i32("createMode", 0);
        w.tag_i32("openFlags", 0);
        w.tag_i64("offset", 0);
        w.tag_i64("dataSize", 0);
        w.tag_i32("numThreads", 0);
        w.tag_i32("oprType", self.opr_type);
        KeyValPair::new().write_into(w);
        w.close("DataObjInp_PI");
    }
}

impl RequestMessage for RenameRequest {
    fn int_info(&self) -> i32 {
        DATA_OBJ_RENAME_AN
    }

    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>> {
        let mut w = PackedStructWriter::new("DataObjCopyInp_PI", era);
        self.write_half(&mut w, &self.source);
        self.write_half(&mut w, &self.destination);
        Ok(w.finish())
    }
}
