//! AVU metadata operations.

use crate::irods::common::Column;
use crate::irods::connection::Connection;
use crate::irods::messages::metadata::{Avu, MetadataTarget, ModifyMetadataRequest};
use crate::irods::messages::query::GenQuery;
use crate::irods::messages::EmptyResponse;
use crate::irods::ops::data_object::split_path;
use crate::irods::ops::query;
use rods_platform::RodsResult;

/// Attaches an AVU to the entity at `path`.
pub async fn add(
    conn: &Connection,
    target: MetadataTarget,
    path: &str,
    avu: Avu,
) -> RodsResult<()> {
    conn.request::<EmptyResponse>(&ModifyMetadataRequest::add(target, path, avu))
        .await?;
    Ok(())
}

/// Detaches an AVU from the entity at `path`.
pub async fn remove(
    conn: &Connection,
    target: MetadataTarget,
    path: &str,
    avu: Avu,
) -> RodsResult<()> {
    conn.request::<EmptyResponse>(&ModifyMetadataRequest::remove(target, path, avu))
        .await?;
    Ok(())
}

/// Lists the AVUs on a data object.
pub async fn list_for_data_object(conn: &Connection, path: &str) -> RodsResult<Vec<Avu>> {
    let (collection, name) = split_path(path)?;
    let listing = GenQuery::new()
        .select(Column::MetaDataAttrName)
        .select(Column::MetaDataAttrValue)
        .select(Column::MetaDataAttrUnits)
        .condition(Column::CollName, &format!("= '{}'", collection))
        .condition(Column::DataName, &format!("= '{}'", name));
    collect_avus(conn, listing).await
}

/// Lists the AVUs on a collection.
pub async fn list_for_collection(conn: &Connection, path: &str) -> RodsResult<Vec<Avu>> {
    let listing = GenQuery::new()
        .select(Column::MetaCollAttrName)
        .select(Column::MetaCollAttrValue)
        .select(Column::MetaCollAttrUnits)
        .condition(Column::CollName, &format!("= '{}'", path));
    collect_avus(conn, listing).await
}

async fn collect_avus(conn: &Connection, listing: GenQuery) -> RodsResult<Vec<Avu>> {
    let rows = query::execute(conn, &listing).await?;
    Ok(rows
        .rows
        .iter()
        .filter(|row| row.len() >= 3)
        .map(|row| Avu::new(&row[0], &row[1], &row[2]))
        .collect())
}
