//! Data-object messages: `DataObjInp_PI`, `OpenedDataObjInp_PI`, and their
//! replies.

use crate::irods::common::{
    DATA_OBJ_CLOSE_AN, DATA_OBJ_CREATE_AN, DATA_OBJ_GET_AN, DATA_OBJ_LSEEK_AN, DATA_OBJ_OPEN_AN,
    DATA_OBJ_PUT_AN, DATA_OBJ_READ_AN, DATA_OBJ_TRUNCATE_AN, DATA_OBJ_UNLINK_AN,
    DATA_OBJ_WRITE_AN, DEST_RESC_NAME_KW, FORCE_FLAG_KW, OPR_COMPLETE_AN,
};
use crate::irods::message::Message;
use crate::irods::messages::{KeyValPair, RequestMessage, ResponseMessage};
use crate::irods::xml::{PackedStructWriter, XmlEra, XmlNode};
use rods_platform::{RodsError, RodsResult};

/// POSIX-style open mode for a data object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read only.
    Read,
    /// Write only.
    Write,
    /// Read and write.
    ReadWrite,
}

impl OpenMode {
    /// Returns the numeric `openFlags` value.
    pub fn flags(self) -> i32 {
        match self {
            OpenMode::Read => 0,      // O_RDONLY
            OpenMode::Write => 1,     // O_WRONLY
            OpenMode::ReadWrite => 2, // O_RDWR
        }
    }
}

/// Seek origin for [`OpenedDataObjRequest::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// From the start of the object.
    Start = 0,
    /// From the current offset.
    Current = 1,
    /// From the end of the object.
    End = 2,
}

/// `DataObjInp_PI`: path-addressed data-object request.
///
/// The same packed struct serves create, open, put, get, unlink, and
/// truncate; the API number and operation type select the behavior.
#[derive(Debug, Clone)]
pub struct DataObjRequest {
    api_number: i32,
    path: String,
    create_mode: i32,
    open_flags: i32,
    offset: i64,
    data_size: i64,
    num_threads: i32,
    opr_type: i32,
    /// Keyword conditions (destination resource, force flag, ...).
    pub kvp: KeyValPair,
}

impl DataObjRequest {
    fn new(api_number: i32, path: &str) -> Self {
        Self {
            api_number,
            path: path.to_string(),
            create_mode: 0,
            open_flags: 0,
            offset: 0,
            data_size: -1,
            num_threads: 0,
            opr_type: 0,
            kvp: KeyValPair::new(),
        }
    }

    /// Create a new data object, optionally on a specific resource.
    pub fn create(path: &str, resource: Option<&str>, force: bool) -> Self {
        let mut request = Self::new(DATA_OBJ_CREATE_AN, path);
        request.create_mode = 0o644;
        request.open_flags = OpenMode::Write.flags();
        if let Some(resource) = resource {
            request.kvp.set(DEST_RESC_NAME_KW, resource);
        }
        if force {
            request.kvp.set(FORCE_FLAG_KW, "");
        }
        request
    }

    /// Open an existing data object.
    pub fn open(path: &str, mode: OpenMode) -> Self {
        let mut request = Self::new(DATA_OBJ_OPEN_AN, path);
        request.open_flags = mode.flags();
        request
    }

    /// Unlink (delete) a data object, bypassing the trash when `force`.
    pub fn unlink(path: &str, force: bool) -> Self {
        let mut request = Self::new(DATA_OBJ_UNLINK_AN, path);
        if force {
            request.kvp.set(FORCE_FLAG_KW, "");
        }
        request
    }

    /// Truncate a data object to `size` bytes.
    pub fn truncate(path: &str, size: i64) -> Self {
        let mut request = Self::new(DATA_OBJ_TRUNCATE_AN, path);
        request.data_size = size;
        request
    }

    /// Start an upload of `size` bytes with the requested stream count.
    /// With `num_threads` >= 2 the server answers with a portal.
    pub fn put(path: &str, size: i64, num_threads: i32, opr_type: i32) -> Self {
        let mut request = Self::new(DATA_OBJ_PUT_AN, path);
        request.open_flags = OpenMode::Write.flags();
        request.data_size = size;
        request.num_threads = num_threads;
        request.opr_type = opr_type;
        request
    }

    /// Start a download with the requested stream count.
    pub fn get(path: &str, num_threads: i32, opr_type: i32) -> Self {
        let mut request = Self::new(DATA_OBJ_GET_AN, path);
        request.num_threads = num_threads;
        request.opr_type = opr_type;
        request
    }
}

impl RequestMessage for DataObjRequest {
    fn int_info(&self) -> i32 {
        self.api_number
    }

    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>> {
        let mut w = PackedStructWriter::new("DataObjInp_PI", era);
        w.tag("objPath", &self.path);
        w.tag_i32("createMode", self.create_mode);
        w.tag_i32("openFlags", self.open_flags);
        w.tag_i64("offset", self.offset);
        w.tag_i64("dataSize", self.data_size);
        w.tag_i32("numThreads", self.num_threads);
        w.tag_i32("oprType", self.opr_type);
        self.kvp.write_into(&mut w);
        Ok(w.finish())
    }
}

/// Reply to create/open: the descriptor rides in `intInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorResponse {
    /// Server-assigned descriptor, valid only on the connection that opened
    /// it.
    pub descriptor: i32,
}

impl ResponseMessage for DescriptorResponse {
    fn from_message(message: &Message, _era: XmlEra) -> RodsResult<Self> {
        if message.body.int_info <= 0 {
            return Err(RodsError::Malformed(format!(
                "server returned descriptor {}",
                message.body.int_info
            )));
        }
        Ok(Self {
            descriptor: message.body.int_info,
        })
    }
}

/// `OpenedDataObjInp_PI`: descriptor-addressed request.
#[derive(Debug, Clone)]
pub struct OpenedDataObjRequest {
    api_number: i32,
    descriptor: i32,
    len: i32,
    whence: i32,
    offset: i64,
}

impl OpenedDataObjRequest {
    /// Read up to `len` bytes from the descriptor.
    pub fn read(descriptor: i32, len: i32) -> Self {
        Self {
            api_number: DATA_OBJ_READ_AN,
            descriptor,
            len,
            whence: 0,
            offset: 0,
        }
    }

    /// Write the accompanying bytestream to the descriptor.
    pub fn write(descriptor: i32, len: i32) -> Self {
        Self {
            api_number: DATA_OBJ_WRITE_AN,
            descriptor,
            len,
            whence: 0,
            offset: 0,
        }
    }

    /// Seek the descriptor.
    pub fn seek(descriptor: i32, offset: i64, whence: Whence) -> Self {
        Self {
            api_number: DATA_OBJ_LSEEK_AN,
            descriptor,
            len: 0,
            whence: whence as i32,
            offset,
        }
    }

    /// Close the descriptor.
    pub fn close(descriptor: i32) -> Self {
        Self {
            api_number: DATA_OBJ_CLOSE_AN,
            descriptor,
            len: 0,
            whence: 0,
            offset: 0,
        }
    }
}

impl RequestMessage for OpenedDataObjRequest {
    fn int_info(&self) -> i32 {
        self.api_number
    }

    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>> {
        let mut w = PackedStructWriter::new("OpenedDataObjInp_PI", era);
        w.tag_i32("l1descInx", self.descriptor);
        w.tag_i32("len", self.len);
        w.tag_i32("whence", self.whence);
        w.tag_i32("oprType", 0);
        w.tag_i64("offset", self.offset);
        w.tag_i64("bytesWritten", 0);
        KeyValPair::new().write_into(&mut w);
        Ok(w.finish())
    }
}

/// Reply to a seek: the resulting absolute offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekResponse {
    /// Absolute offset after the seek.
    pub offset: i64,
}

impl ResponseMessage for SeekResponse {
    fn from_message(message: &Message, era: XmlEra) -> RodsResult<Self> {
        let node = XmlNode::parse(&message.body.message, era)?;
        if node.name != "fileLseekOut_PI" {
            return Err(RodsError::Malformed(format!(
                "expected fileLseekOut_PI, found '{}'",
                node.name
            )));
        }
        Ok(Self {
            offset: node.i64_of("offset")?,
        })
    }
}

/// Marks a portal (parallel) operation complete on the control connection.
#[derive(Debug, Clone, Copy)]
pub struct OperationComplete {
    descriptor: i32,
}

impl OperationComplete {
    /// Completes the portal operation behind `descriptor`.
    pub fn new(descriptor: i32) -> Self {
        Self { descriptor }
    }
}

impl RequestMessage for OperationComplete {
    fn int_info(&self) -> i32 {
        OPR_COMPLETE_AN
    }

    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>> {
        let mut w = PackedStructWriter::new("INT_PI", era);
        w.tag_i32("myInt", self.descriptor);
        Ok(w.finish())
    }
}
