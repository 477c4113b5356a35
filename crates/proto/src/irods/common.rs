//! Protocol constants: API numbers, operation types, catalog columns.
//!
//! API numbers ride in the frame header's `intInfo` field on `RODS_API_REQ`
//! messages and select the server-side operation. Column numbers identify
//! catalog attributes in general queries.

/// Native authentication challenge request.
pub const AUTH_REQUEST_AN: i32 = 703;
/// Native authentication challenge response.
pub const AUTH_RESPONSE_AN: i32 = 704;
/// PAM authentication exchange (TLS only).
pub const PAM_AUTH_REQUEST_AN: i32 = 725;

/// General (catalog) query.
pub const GEN_QUERY_AN: i32 = 702;

/// Create a data object.
pub const DATA_OBJ_CREATE_AN: i32 = 601;
/// Open a data object.
pub const DATA_OBJ_OPEN_AN: i32 = 602;
/// Upload a data object (single stream or parallel portal).
pub const DATA_OBJ_PUT_AN: i32 = 606;
/// Download a data object (single stream or parallel portal).
pub const DATA_OBJ_GET_AN: i32 = 608;
/// Unlink (delete) a data object.
pub const DATA_OBJ_UNLINK_AN: i32 = 615;
/// Truncate a data object to a given size.
pub const DATA_OBJ_TRUNCATE_AN: i32 = 616;
/// Complete a portal (parallel) operation.
pub const OPR_COMPLETE_AN: i32 = 626;
/// Rename a data object or collection.
pub const DATA_OBJ_RENAME_AN: i32 = 627;
/// Close an open data-object descriptor.
pub const DATA_OBJ_CLOSE_AN: i32 = 673;
/// Seek within an open data-object descriptor.
pub const DATA_OBJ_LSEEK_AN: i32 = 674;
/// Read from an open data-object descriptor.
pub const DATA_OBJ_READ_AN: i32 = 675;
/// Write to an open data-object descriptor.
pub const DATA_OBJ_WRITE_AN: i32 = 676;
/// Remove a collection.
pub const RM_COLL_AN: i32 = 679;
/// Create a collection.
pub const COLL_CREATE_AN: i32 = 681;
/// Add or remove AVU metadata.
pub const MOD_AVU_METADATA_AN: i32 = 706;
/// Extract a struct file (tar, zip, ...) server side.
pub const STRUCT_FILE_EXT_AND_REG_AN: i32 = 709;

/// Operation type for uploads in `DataObjInp.oprType`.
pub const PUT_OPR: i32 = 1;
/// Operation type for downloads in `DataObjInp.oprType`.
pub const GET_OPR: i32 = 2;
/// Operation type for data-object renames.
pub const RENAME_DATA_OBJ_OPR: i32 = 11;
/// Operation type for collection renames.
pub const RENAME_COLL_OPR: i32 = 12;

/// Native auth challenge length in bytes.
pub const CHALLENGE_LEN: usize = 64;
/// Password pad length for the native auth digest.
pub const MAX_PASSWORD_LENGTH: usize = 50;

/// Default row cap for a single general-query page.
pub const MAX_QUERY_ROWS: i32 = 500;

/// Keyword for the destination resource of an operation.
pub const DEST_RESC_NAME_KW: &str = "destRescName";
/// Keyword forcing an overwrite / non-trash delete.
pub const FORCE_FLAG_KW: &str = "forceFlag";
/// Keyword carrying a data type name (e.g. "tar file").
pub const DATA_TYPE_KW: &str = "dataType";
/// Keyword carrying the total size of a transfer.
pub const DATA_SIZE_KW: &str = "dataSize";
/// Keyword requesting recursive collection removal.
pub const RECURSIVE_OPR_KW: &str = "recursiveOpr";

/// Catalog columns addressable in general queries.
///
/// Only the columns the operation layer actually selects or filters on are
/// listed; the numeric values are fixed by the iRODS catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Column {
    UserId = 201,
    UserName = 202,
    UserType = 203,
    UserZone = 204,
    DataId = 401,
    DataCollId = 402,
    DataName = 403,
    DataReplNum = 404,
    DataSize = 407,
    DataRescName = 409,
    DataPath = 410,
    DataOwnerName = 411,
    DataCreateTime = 419,
    DataModifyTime = 420,
    CollId = 500,
    CollName = 501,
    CollParentName = 502,
    CollOwnerName = 503,
    MetaDataAttrName = 600,
    MetaDataAttrValue = 601,
    MetaDataAttrUnits = 602,
    MetaCollAttrName = 610,
    MetaCollAttrValue = 611,
    MetaCollAttrUnits = 612,
    UserGroupId = 900,
    UserGroupName = 901,
}

impl Column {
    /// Returns the numeric catalog id of the column.
    pub fn id(self) -> i32 {
        self as i32
    }
}
