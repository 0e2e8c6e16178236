use diesel::prelude::*;
use tracing::debug;
use uuid::Uuid;

use crate::models::NewPopularityEvent;
use crate::schema::{popularity_events, users};

pub const VIEW_FILE: &str = "VIEW_FILE";
pub const DOWNLOAD_FILE: &str = "DOWNLOAD_FILE";
pub const PRINT_FILE: &str = "PRINT_FILE";
pub const PREVIEW_FILE: &str = "PREVIEW_FILE";
pub const FILE_LIKE: &str = "FILE_LIKE";
pub const FILE_DISLIKE: &str = "FILE_DISLIKE";
pub const DELETE_FILE: &str = "DELETE_FILE";

/// Moves `recipient`'s popularity score by `delta` and appends the event.
/// A recipient that no longer exists is skipped.
pub fn adjust(
    conn: &mut PgConnection,
    actor: Option<Uuid>,
    recipient: Uuid,
    kind: &str,
    document_id: Uuid,
    delta: i32,
) -> QueryResult<()> {
    let updated = diesel::update(users::table.find(recipient))
        .set(users::popularity.eq(users::popularity + delta))
        .execute(conn)?;
    if updated == 0 {
        debug!(%recipient, kind, "popularity recipient not found");
        return Ok(());
    }

    diesel::insert_into(popularity_events::table)
        .values(&NewPopularityEvent {
            actor_id: actor,
            recipient_id: recipient,
            kind: kind.to_string(),
            document_id,
            delta,
        })
        .execute(conn)?;
    Ok(())
}
