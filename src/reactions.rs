use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::functions::greatest;
use crate::error::{AppError, CODE_DOCUMENT_NOT_FOUND};
use crate::models::{NewReaction, Reaction};
use crate::popularity;
use crate::schema::{documents, reactions};

#[derive(Debug, Error)]
pub enum ReactionError {
    #[error("vote must be 0 (dislike) or 1 (like)")]
    InvalidVote,
    #[error("owners cannot react to their own documents")]
    SelfReaction,
    #[error("document not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
}

impl From<ReactionError> for AppError {
    fn from(value: ReactionError) -> Self {
        let message = value.to_string();
        match value {
            ReactionError::InvalidVote => AppError::bad_request("FI027", message),
            ReactionError::SelfReaction => AppError::forbidden("FI028", message),
            ReactionError::NotFound => AppError::not_found(CODE_DOCUMENT_NOT_FOUND),
            ReactionError::Database(err) => AppError::internal(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Dislike,
    Like,
}

impl Vote {
    pub fn from_value(value: i64) -> Result<Self, ReactionError> {
        match value {
            0 => Ok(Self::Dislike),
            1 => Ok(Self::Like),
            _ => Err(ReactionError::InvalidVote),
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            Self::Dislike => 0,
            Self::Like => 1,
        }
    }

    fn popularity_kind(self) -> &'static str {
        match self {
            Self::Dislike => popularity::FILE_DISLIKE,
            Self::Like => popularity::FILE_LIKE,
        }
    }
}

/// Change of the requested vote's counter (`main`) and of the other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReactionDelta {
    pub main: i32,
    pub opposite: i32,
}

impl ReactionDelta {
    /// `(likes, dislikes)` adjustments for a request of `vote`.
    pub fn counter_deltas(self, vote: Vote) -> (i32, i32) {
        match vote {
            Vote::Like => (self.main, self.opposite),
            Vote::Dislike => (self.opposite, self.main),
        }
    }

    /// Owner popularity change, in [-2, 2].
    pub fn popularity(self, vote: Vote) -> i32 {
        match vote {
            Vote::Like => self.main - self.opposite,
            Vote::Dislike => self.opposite - self.main,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionChange {
    Insert,
    Delete,
    Switch,
}

pub fn transition(current: Option<Vote>, requested: Vote) -> (ReactionChange, ReactionDelta) {
    match current {
        None => (
            ReactionChange::Insert,
            ReactionDelta {
                main: 1,
                opposite: 0,
            },
        ),
        Some(vote) if vote == requested => (
            ReactionChange::Delete,
            ReactionDelta {
                main: -1,
                opposite: 0,
            },
        ),
        Some(_) => (
            ReactionChange::Switch,
            ReactionDelta {
                main: 1,
                opposite: -1,
            },
        ),
    }
}

/// Applies `vote` to the stored reaction of `user_id` on `document_id`.
///
/// A first vote that loses the insert race to a concurrent first vote is
/// re-applied against the row the winner committed.
pub fn toggle(
    conn: &mut PgConnection,
    user_id: Uuid,
    document_id: Uuid,
    vote: Vote,
) -> QueryResult<ReactionDelta> {
    loop {
        let current = reactions::table
            .find((user_id, document_id))
            .select(reactions::vote)
            .for_update()
            .first::<i16>(conn)
            .optional()?
            .and_then(|stored| Vote::from_value(i64::from(stored)).ok());

        let (change, delta) = transition(current, vote);
        let affected = match change {
            ReactionChange::Insert => diesel::insert_into(reactions::table)
                .values(&NewReaction {
                    user_id,
                    document_id,
                    vote: vote.as_i16(),
                })
                .on_conflict_do_nothing()
                .execute(conn)?,
            ReactionChange::Delete => {
                diesel::delete(reactions::table.find((user_id, document_id))).execute(conn)?
            }
            ReactionChange::Switch => {
                diesel::update(reactions::table.find((user_id, document_id)))
                    .set(reactions::vote.eq(vote.as_i16()))
                    .execute(conn)?
            }
        };

        if change != ReactionChange::Insert || affected > 0 {
            return Ok(delta);
        }
        debug!(%document_id, %user_id, "concurrent first reaction, re-reading");
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReactionTotals {
    pub likes: i32,
    pub dislikes: i32,
    pub main: i32,
    pub opposite: i32,
}

/// Toggles a reaction and keeps the document counters and the owner's
/// popularity in step with it.
pub fn toggle_reaction(
    conn: &mut PgConnection,
    document_id: Uuid,
    user_id: Uuid,
    vote: Vote,
) -> Result<ReactionTotals, ReactionError> {
    let owner_id = documents::table
        .find(document_id)
        .filter(documents::deleted.eq(false))
        .select(documents::owner_id)
        .first::<Option<Uuid>>(conn)
        .optional()?
        .ok_or(ReactionError::NotFound)?;
    if owner_id == Some(user_id) {
        return Err(ReactionError::SelfReaction);
    }

    let totals = conn.transaction(|conn| {
        let delta = toggle(conn, user_id, document_id, vote)?;
        let (likes, dislikes) = delta.counter_deltas(vote);

        let (likes, dislikes) = diesel::update(documents::table.find(document_id))
            .set((
                documents::likes.eq(greatest(documents::likes + likes, 0)),
                documents::dislikes.eq(greatest(documents::dislikes + dislikes, 0)),
            ))
            .returning((documents::likes, documents::dislikes))
            .get_result::<(i32, i32)>(conn)?;

        if let Some(owner_id) = owner_id {
            popularity::adjust(
                conn,
                Some(user_id),
                owner_id,
                vote.popularity_kind(),
                document_id,
                delta.popularity(vote),
            )?;
        }

        Ok::<_, diesel::result::Error>(ReactionTotals {
            likes,
            dislikes,
            main: delta.main,
            opposite: delta.opposite,
        })
    })?;

    info!(
        %document_id,
        %user_id,
        ?vote,
        likes = totals.likes,
        dislikes = totals.dislikes,
        "reaction toggled"
    );
    Ok(totals)
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionView {
    pub user_id: Uuid,
    pub vote: Vote,
    pub created_at: NaiveDateTime,
}

pub fn list_reactions(
    conn: &mut PgConnection,
    document_id: Uuid,
) -> Result<Vec<ReactionView>, AppError> {
    documents::table
        .find(document_id)
        .select(documents::id)
        .first::<Uuid>(conn)?;

    let rows = reactions::table
        .filter(reactions::document_id.eq(document_id))
        .order(reactions::created_at.asc())
        .load::<Reaction>(conn)?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let vote = Vote::from_value(i64::from(row.vote)).ok()?;
            Some(ReactionView {
                user_id: row.user_id,
                vote,
                created_at: row.created_at,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn first_vote_inserts() {
        let (change, delta) = transition(None, Vote::Like);
        assert_eq!(change, ReactionChange::Insert);
        assert_eq!(delta, ReactionDelta { main: 1, opposite: 0 });
        assert_eq!(delta.counter_deltas(Vote::Like), (1, 0));
        assert_eq!(delta.popularity(Vote::Like), 1);
        assert_eq!(delta.popularity(Vote::Dislike), -1);
    }

    #[test]
    fn repeating_a_vote_removes_it() {
        let (first, inserted) = transition(None, Vote::Dislike);
        let (second, removed) = transition(Some(Vote::Dislike), Vote::Dislike);

        assert_eq!(first, ReactionChange::Insert);
        assert_eq!(second, ReactionChange::Delete);
        assert_eq!(
            (inserted.main + removed.main, inserted.opposite + removed.opposite),
            (0, 0)
        );
        assert_eq!(removed.counter_deltas(Vote::Dislike), (0, -1));
        assert_eq!(removed.popularity(Vote::Dislike), 1);
    }

    #[test]
    fn switching_moves_both_counters() {
        let (change, delta) = transition(Some(Vote::Dislike), Vote::Like);
        assert_eq!(change, ReactionChange::Switch);
        assert_eq!(delta.counter_deltas(Vote::Like), (1, -1));
        assert_eq!(delta.popularity(Vote::Like), 2);

        let (_, delta) = transition(Some(Vote::Like), Vote::Dislike);
        assert_eq!(delta.counter_deltas(Vote::Dislike), (-1, 1));
        assert_eq!(delta.popularity(Vote::Dislike), -2);
    }

    #[test]
    fn popularity_stays_within_two() {
        for current in [None, Some(Vote::Like), Some(Vote::Dislike)] {
            for requested in [Vote::Like, Vote::Dislike] {
                let (_, delta) = transition(current, requested);
                assert!(delta.popularity(requested).abs() <= 2);
            }
        }
    }

    #[test]
    fn only_zero_and_one_are_votes() {
        assert_eq!(Vote::from_value(1).unwrap(), Vote::Like);
        assert_eq!(Vote::from_value(0).unwrap(), Vote::Dislike);
        assert!(matches!(Vote::from_value(2), Err(ReactionError::InvalidVote)));
        assert!(matches!(Vote::from_value(-1), Err(ReactionError::InvalidVote)));
    }

    #[test]
    fn errors_carry_stable_codes() {
        let error = AppError::from(ReactionError::SelfReaction);
        assert_eq!(error.status(), StatusCode::FORBIDDEN);
        assert_eq!(error.code(), "FI028");

        let error = AppError::from(ReactionError::InvalidVote);
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.code(), "FI027");
    }
}
