use chrono::Utc;
use diesel::prelude::*;
use tracing::{debug, info};
use uuid::Uuid;

use crate::access::AccessMode;
use crate::db::functions::greatest;
use crate::documents::{self, DeletionReason};
use crate::models::{AccessRecord, Document, NewAccessEvent};
use crate::schema::{access_events, access_records, documents as documents_table, users};

pub const SOURCE_MISSING_COMMENT: &str = "source missing, re-upload required";

/// Records one successful access. Returns the access record after the upsert
/// when the mode keeps one and a user is known.
pub fn record_access(
    conn: &mut PgConnection,
    user_id: Option<Uuid>,
    document: &Document,
    mode: AccessMode,
    premium: bool,
) -> QueryResult<Option<AccessRecord>> {
    diesel::insert_into(access_events::table)
        .values(&NewAccessEvent {
            user_id,
            document_id: document.id,
            kind: mode.event_kind(premium).to_string(),
        })
        .execute(conn)?;

    let record = match mode {
        AccessMode::View | AccessMode::Download => {
            let Some(user_id) = user_id else {
                return Ok(None);
            };
            consume_allowance(conn, user_id, premium)?;

            let target = documents_table::table.find(document.id);
            match (mode, premium) {
                (AccessMode::View, _) => diesel::update(target)
                    .set(documents_table::views.eq(documents_table::views + 1))
                    .execute(conn)?,
                (_, true) => diesel::update(target)
                    .set(
                        documents_table::premium_downloads
                            .eq(documents_table::premium_downloads + 1),
                    )
                    .execute(conn)?,
                (_, false) => diesel::update(target)
                    .set(documents_table::downloads.eq(documents_table::downloads + 1))
                    .execute(conn)?,
            };

            Some(upsert_access_record(conn, user_id, document, premium)?)
        }
        AccessMode::Print => match user_id {
            Some(user_id) => Some(upsert_access_record(conn, user_id, document, false)?),
            None => None,
        },
        AccessMode::Preview => {
            diesel::update(documents_table::table.find(document.id))
                .set(documents_table::previews.eq(documents_table::previews + 1))
                .execute(conn)?;
            None
        }
    };

    debug!(document_id = %document.id, ?mode, premium, "access recorded");
    Ok(record)
}

/// One captcha credit per view or download, plus one premium credit for
/// premium downloads. Both are floored at zero.
fn consume_allowance(conn: &mut PgConnection, user_id: Uuid, premium: bool) -> QueryResult<()> {
    diesel::update(users::table.find(user_id))
        .set((
            users::captcha_counter.eq(greatest(users::captcha_counter - 1, 0)),
            users::premium_downloads.eq(greatest(
                users::premium_downloads - i32::from(premium),
                0,
            )),
            users::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    Ok(())
}

fn upsert_access_record(
    conn: &mut PgConnection,
    user_id: Uuid,
    document: &Document,
    premium: bool,
) -> QueryResult<AccessRecord> {
    let (standard, premium) = if premium { (0, 1) } else { (1, 0) };
    let now = Utc::now().naive_utc();

    diesel::insert_into(access_records::table)
        .values((
            access_records::user_id.eq(user_id),
            access_records::document_id.eq(document.id),
            access_records::upload_id.eq(document.upload_id),
            access_records::downloads.eq(standard),
            access_records::premium_downloads.eq(premium),
            access_records::last_access_at.eq(now),
        ))
        .on_conflict((access_records::user_id, access_records::document_id))
        .do_update()
        .set((
            access_records::downloads.eq(access_records::downloads + standard),
            access_records::premium_downloads.eq(access_records::premium_downloads + premium),
            access_records::last_access_at.eq(now),
        ))
        .get_result(conn)
}

/// Retires a document whose bytes are gone and, when it was the last live
/// document of its upload group, the group and its discussion thread too.
/// Runs in its own transaction, after the access transaction rolled back.
pub fn mark_source_missing(conn: &mut PgConnection, document: &Document) -> QueryResult<()> {
    conn.transaction(|conn| {
        diesel::update(documents_table::table.find(document.id))
            .set(documents_table::stored.eq(false))
            .execute(conn)?;
        documents::soft_delete(
            conn,
            document,
            DeletionReason::SourceMissing,
            Some(SOURCE_MISSING_COMMENT),
        )
    })?;

    info!(
        document_id = %document.id,
        upload_id = %document.upload_id,
        "document retired after its source went missing"
    );
    Ok(())
}
