//! User and group listing.

use crate::irods::common::Column;
use crate::irods::connection::Connection;
use crate::irods::messages::query::GenQuery;
use crate::irods::ops::query;
use rods_platform::RodsResult;

/// One catalog user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// User name.
    pub name: String,
    /// Home zone.
    pub zone: String,
    /// Catalog user type (`rodsuser`, `rodsadmin`, `rodsgroup`, ...).
    pub user_type: String,
}

/// Lists every user known to the catalog.
pub async fn list(conn: &Connection) -> RodsResult<Vec<User>> {
    let listing = GenQuery::new()
        .select(Column::UserName)
        .select(Column::UserZone)
        .select(Column::UserType);
    let rows = query::execute(conn, &listing).await?;
    Ok(rows
        .rows
        .iter()
        .filter(|row| row.len() >= 3)
        .map(|row| User {
            name: row[0].clone(),
            zone: row[1].clone(),
            user_type: row[2].clone(),
        })
        .collect())
}

/// Lists the members of a group.
pub async fn list_group_members(conn: &Connection, group: &str) -> RodsResult<Vec<User>> {
    let listing = GenQuery::new()
        .select(Column::UserName)
        .select(Column::UserZone)
        .select(Column::UserType)
        .condition(Column::UserGroupName, &format!("= '{}'", group));
    let rows = query::execute(conn, &listing).await?;
    Ok(rows
        .rows
        .iter()
        .filter(|row| row.len() >= 3)
        .map(|row| User {
            name: row[0].clone(),
            zone: row[1].clone(),
            user_type: row[2].clone(),
        })
        .collect())
}
