//! Server-side struct-file (archive) extraction.

use crate::irods::connection::Connection;
use crate::irods::messages::struct_file::{ExtractStructFileRequest, StructFileType};
use crate::irods::messages::EmptyResponse;
use rods_platform::RodsResult;

/// Extracts an archive data object into a collection on the server.
///
/// Falls back to the account's default resource when `resource` is `None`.
/// A missing archive surfaces as [`rods_platform::RodsError::FileNotFound`].
pub async fn extract(
    conn: &Connection,
    path: &str,
    target_collection: &str,
    resource: Option<&str>,
    file_type: StructFileType,
    force: bool,
) -> RodsResult<()> {
    let resource = resource.or(conn.account().default_resource.as_deref());
    let request =
        ExtractStructFileRequest::new(path, target_collection, resource, file_type, force);
    conn.request::<EmptyResponse>(&request).await?;
    Ok(())
}
