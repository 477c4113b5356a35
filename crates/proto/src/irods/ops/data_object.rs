//! Data-object operations: create, open, read, write, seek, truncate,
//! unlink, stat.

use crate::irods::common::Column;
use crate::irods::connection::Connection;
use crate::irods::messages::data_object::{
    DataObjRequest, DescriptorResponse, OpenMode, OpenedDataObjRequest, SeekResponse, Whence,
};
use crate::irods::messages::query::GenQuery;
use crate::irods::messages::EmptyResponse;
use crate::irods::ops::query;
use rods_platform::{RodsError, RodsResult};
use tracing::warn;

/// Splits an absolute iRODS path into (collection, name).
pub(crate) fn split_path(path: &str) -> RodsResult<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    if !trimmed.starts_with('/') {
        return Err(RodsError::Config(format!(
            "'{}' is not an absolute data-object path",
            path
        )));
    }
    match trimmed.rfind('/') {
        Some(0) | None => Err(RodsError::Config(format!(
            "'{}' is not an absolute data-object path",
            path
        ))),
        Some(idx) => Ok((&trimmed[..idx], &trimmed[idx + 1..])),
    }
}

/// Catalog facts about one data object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObjectStat {
    /// Catalog id.
    pub id: i64,
    /// Object size in bytes.
    pub size: i64,
    /// Owner user name.
    pub owner: String,
}

/// An open server-side descriptor.
///
/// The descriptor is only valid on the connection that opened it, which the
/// borrow enforces: the handle cannot outlive its connection. Close
/// explicitly; a handle dropped open leaves the descriptor to connection
/// teardown.
#[derive(Debug)]
pub struct DataObjectHandle<'c> {
    conn: &'c Connection,
    descriptor: i32,
    closed: bool,
}

impl<'c> DataObjectHandle<'c> {
    /// Returns the server-assigned descriptor.
    pub fn descriptor(&self) -> i32 {
        self.descriptor
    }

    /// Reads up to `len` bytes from the current offset. An empty vector
    /// signals end of file.
    pub async fn read(&self, len: usize) -> RodsResult<Vec<u8>> {
        let request = OpenedDataObjRequest::read(self.descriptor, len as i32);
        let (reply, mut data): (EmptyResponse, Vec<u8>) =
            self.conn.request_with_bytestream(&request, &[]).await?;
        data.truncate(reply.result as usize);
        Ok(data)
    }

    /// Writes the whole buffer at the current offset.
    pub async fn write(&self, data: &[u8]) -> RodsResult<usize> {
        let request = OpenedDataObjRequest::write(self.descriptor, data.len() as i32);
        let (reply, _): (EmptyResponse, Vec<u8>) =
            self.conn.request_with_bytestream(&request, data).await?;
        Ok(reply.result as usize)
    }

    /// Moves the descriptor offset; returns the absolute position.
    pub async fn seek(&self, offset: i64, whence: Whence) -> RodsResult<i64> {
        let reply: SeekResponse = self
            .conn
            .request(&OpenedDataObjRequest::seek(self.descriptor, offset, whence))
            .await?;
        Ok(reply.offset)
    }

    /// Closes the descriptor.
    pub async fn close(mut self) -> RodsResult<()> {
        self.closed = true;
        let descriptor = self.descriptor;
        self.conn
            .request::<EmptyResponse>(&OpenedDataObjRequest::close(descriptor))
            .await?;
        Ok(())
    }
}

impl Drop for DataObjectHandle<'_> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(descriptor = self.descriptor, "data-object handle dropped open");
        }
    }
}

/// Creates a data object and returns its write handle.
pub async fn create<'c>(
    conn: &'c Connection,
    path: &str,
    resource: Option<&str>,
    force: bool,
) -> RodsResult<DataObjectHandle<'c>> {
    let resource = resource.or(conn.account().default_resource.as_deref());
    let reply: DescriptorResponse = conn
        .request(&DataObjRequest::create(path, resource, force))
        .await?;
    Ok(DataObjectHandle {
        conn,
        descriptor: reply.descriptor,
        closed: false,
    })
}

/// Opens an existing data object.
pub async fn open<'c>(
    conn: &'c Connection,
    path: &str,
    mode: OpenMode,
) -> RodsResult<DataObjectHandle<'c>> {
    let reply: DescriptorResponse = conn.request(&DataObjRequest::open(path, mode)).await?;
    Ok(DataObjectHandle {
        conn,
        descriptor: reply.descriptor,
        closed: false,
    })
}

/// Deletes a data object; `force` bypasses the trash.
pub async fn unlink(conn: &Connection, path: &str, force: bool) -> RodsResult<()> {
    conn.request::<EmptyResponse>(&DataObjRequest::unlink(path, force))
        .await?;
    Ok(())
}

/// Truncates a data object to `size` bytes.
pub async fn truncate(conn: &Connection, path: &str, size: i64) -> RodsResult<()> {
    conn.request::<EmptyResponse>(&DataObjRequest::truncate(path, size))
        .await?;
    Ok(())
}

/// Looks the object up in the catalog.
///
/// # Errors
///
/// [`RodsError::FileNotFound`] when no such object exists.
pub async fn stat(conn: &Connection, path: &str) -> RodsResult<DataObjectStat> {
    let (collection, name) = split_path(path)?;
    let lookup = GenQuery::new()
        .select(Column::DataId)
        .select(Column::DataSize)
        .select(Column::DataOwnerName)
        .condition(Column::CollName, &format!("= '{}'", collection))
        .condition(Column::DataName, &format!("= '{}'", name));

    let rows = query::execute(conn, &lookup).await?;
    let row = rows
        .rows
        .first()
        .ok_or_else(|| RodsError::FileNotFound(format!("data object '{}'", path)))?;

    Ok(DataObjectStat {
        id: numeric_field(&rows.columns, row, Column::DataId)?,
        size: numeric_field(&rows.columns, row, Column::DataSize)?,
        owner: text_field(&rows.columns, row, Column::DataOwnerName)?,
    })
}

fn text_field(columns: &[i32], row: &[String], column: Column) -> RodsResult<String> {
    columns
        .iter()
        .position(|&c| c == column.id())
        .map(|i| row[i].clone())
        .ok_or_else(|| RodsError::Malformed(format!("stat reply lacks column {:?}", column)))
}

fn numeric_field(columns: &[i32], row: &[String], column: Column) -> RodsResult<i64> {
    text_field(columns, row, column)?
        .parse()
        .map_err(|_| RodsError::Malformed(format!("column {:?} is not numeric", column)))
}
