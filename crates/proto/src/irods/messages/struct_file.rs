//! Struct-file extraction: `StructFileExtAndRegInp_PI`.

use crate::irods::common::{DATA_TYPE_KW, DEST_RESC_NAME_KW, FORCE_FLAG_KW, STRUCT_FILE_EXT_AND_REG_AN};
use crate::irods::messages::{KeyValPair, RequestMessage};
use crate::irods::xml::{PackedStructWriter, XmlEra};
use rods_platform::{RodsError, RodsResult};

/// Archive formats the server can extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructFileType {
    /// Plain tar archive.
    Tar,
    /// Gzip-compressed tar archive.
    GzipTar,
    /// Bzip2-compressed tar archive.
    Bzip2Tar,
    /// Zip archive.
    Zip,
}

impl StructFileType {
    /// Returns the catalog data-type name.
    pub fn data_type(&self) -> &'static str {
        match self {
            StructFileType::Tar => "tar file",
            StructFileType::GzipTar => "gzipTar",
            StructFileType::Bzip2Tar => "bzip2Tar",
            StructFileType::Zip => "zipFile",
        }
    }

    /// Maps a catalog data-type name.
    pub fn from_data_type(name: &str) -> RodsResult<Self> {
        match name {
            "tar file" => Ok(StructFileType::Tar),
            "gzipTar" => Ok(StructFileType::GzipTar),
            "bzip2Tar" => Ok(StructFileType::Bzip2Tar),
            "zipFile" => Ok(StructFileType::Zip),
            _ => Err(RodsError::Unsupported(format!(
                "cannot extract data type '{}'",
                name
            ))),
        }
    }
}

/// Asks the server to extract an archive object into a collection.
#[derive(Debug, Clone)]
pub struct ExtractStructFileRequest {
    path: String,
    target_collection: String,
    kvp: KeyValPair,
}

impl ExtractStructFileRequest {
    /// Extract `path` (an archive data object) into `target_collection`.
    pub fn new(
        path: &str,
        target_collection: &str,
        resource: Option<&str>,
        file_type: StructFileType,
        force: bool,
    ) -> Self {
        let mut kvp = KeyValPair::new();
        kvp.set(DATA_TYPE_KW, file_type.data_type());
        if let Some(resource) = resource {
            kvp.set(DEST_RESC_NAME_KW, resource);
        }
        if force {
            kvp.set(FORCE_FLAG_KW, "");
        }
        Self {
            path: path.to_string(),
            target_collection: target_collection.to_string(),
            kvp,
        }
    }
}

impl RequestMessage for ExtractStructFileRequest {
    fn int_info(&self) -> i32 {
        STRUCT_FILE_EXT_AND_REG_AN
    }

    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>> {
        let mut w = PackedStructWriter::new("StructFileExtAndRegInp_PI", era);
        w.tag("objPath", &self.path);
        w.tag("collection", &self.target_collection);
        w.tag_i32("oprType", 0);
        w.tag_i32("flags", 0);
        self.kvp.write_into(&mut w);
        Ok(w.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irods::xml::XmlNode;

    #[test]
    fn test_struct_file_type_tokens() {
        for file_type in [
            StructFileType::Tar,
            StructFileType::GzipTar,
            StructFileType::Bzip2Tar,
            StructFileType::Zip,
        ] {
            assert_eq!(
                StructFileType::from_data_type(file_type.data_type()).unwrap(),
                file_type
            );
        }
        assert!(StructFileType::from_data_type("generic").is_err());
    }

    #[test]
    fn test_extract_request_body() {
        let request = ExtractStructFileRequest::new(
            "/tempZone/home/rods/archive.tar",
            "/tempZone/home/rods/out",
            Some("demoResc"),
            StructFileType::Tar,
            false,
        );
        assert_eq!(request.int_info(), STRUCT_FILE_EXT_AND_REG_AN);
        let body = request.to_body_bytes(XmlEra::Standard).unwrap();
        let node = XmlNode::parse(&body, XmlEra::Standard).unwrap();
        assert_eq!(node.text_of("objPath").unwrap(), "/tempZone/home/rods/archive.tar");
        assert_eq!(node.text_of("collection").unwrap(), "/tempZone/home/rods/out");
        let kvp = KeyValPair::from_node(node.child("KeyValPair_PI").unwrap()).unwrap();
        assert_eq!(kvp.get(DATA_TYPE_KW), Some("tar file"));
    }
}
