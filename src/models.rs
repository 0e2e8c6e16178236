use chrono::NaiveDateTime;
use diesel::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::schema::*;

pub const ROLE_ADMIN: &str = "admin";

/// Mime type handled by the remote renderer instead of a plain blob copy.
pub const RENDERABLE_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = countries)]
pub struct Country {
    pub id: i32,
    pub name: String,
    pub download_coefficient: Decimal,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = countries)]
pub struct NewCountry {
    pub id: i32,
    pub name: String,
    pub download_coefficient: Decimal,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = centers)]
pub struct Center {
    pub id: i32,
    pub name: String,
    pub country_id: i32,
    pub city_id: Option<i32>,
    pub university_id: Option<i32>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = centers)]
pub struct NewCenter {
    pub id: i32,
    pub name: String,
    pub country_id: i32,
    pub city_id: Option<i32>,
    pub university_id: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub nickname: String,
    pub role: String,
    pub country_id: Option<i32>,
    pub money: Decimal,
    pub accumulated: Decimal,
    pub premium_downloads: i32,
    pub captcha_counter: i32,
    pub popularity: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Combined wealth used by the payout tiers.
    pub fn wealth(&self) -> Decimal {
        self.money + self.accumulated
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub nickname: String,
    pub role: String,
    pub country_id: Option<i32>,
    pub money: Decimal,
    pub accumulated: Decimal,
    pub premium_downloads: i32,
    pub captcha_counter: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable)]
#[diesel(table_name = user_bans)]
#[diesel(primary_key(user_id))]
pub struct UserBan {
    pub user_id: Uuid,
    pub download_ban: bool,
    pub upload_ban: bool,
    pub global_ban: bool,
}

/// A user together with their ban flags.
#[derive(Debug, Clone)]
pub struct Account {
    pub user: User,
    pub ban: Option<UserBan>,
}

impl Account {
    pub fn is_globally_banned(&self) -> bool {
        self.ban.as_ref().is_some_and(|ban| ban.global_ban)
    }

    pub fn is_download_banned(&self) -> bool {
        self.ban.as_ref().is_some_and(|ban| ban.download_ban)
    }

    /// Download-banned accounts are still served, but nothing is recorded for them.
    pub fn records_usage(&self) -> bool {
        !self.is_globally_banned() && !self.is_download_banned()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = student_studies)]
pub struct NewStudentStudy {
    pub id: Uuid,
    pub user_id: Uuid,
    pub center_id: i32,
    pub is_default: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = uploads)]
pub struct Upload {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub title: String,
    pub deleted: bool,
    pub deleted_reason: Option<i16>,
    pub deleted_comments: Option<String>,
    pub deleted_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = uploads)]
pub struct NewUpload {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub title: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = discussions)]
pub struct NewDiscussion {
    pub id: Uuid,
    pub upload_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(Upload))]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub upload_id: Uuid,
    pub center_id: i32,
    pub name: String,
    pub directory: String,
    pub filename: String,
    pub extension: String,
    pub content_type: String,
    pub pages: i32,
    pub monetizable: bool,
    pub corrupt: i32,
    pub stored: bool,
    pub deleted: bool,
    pub deleted_reason: Option<i16>,
    pub deleted_comments: Option<String>,
    pub deleted_at: Option<NaiveDateTime>,
    pub views: i32,
    pub downloads: i32,
    pub premium_downloads: i32,
    pub previews: i32,
    pub likes: i32,
    pub dislikes: i32,
    pub shares: i32,
    pub money: Decimal,
    pub paid_downloads: i32,
    pub uploaded_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Document {
    pub fn is_renderable(&self) -> bool {
        self.content_type == RENDERABLE_CONTENT_TYPE
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == Some(user_id)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub upload_id: Uuid,
    pub center_id: i32,
    pub name: String,
    pub directory: String,
    pub filename: String,
    pub extension: String,
    pub content_type: String,
    pub pages: i32,
    pub monetizable: bool,
    pub corrupt: i32,
    pub downloads: i32,
}

/// A live document joined with the geography of its center.
#[derive(Debug, Clone)]
pub struct LocatedDocument {
    pub document: Document,
    pub center: Center,
}

#[derive(Debug, Clone, Queryable)]
pub struct AccessRecord {
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub upload_id: Uuid,
    pub downloads: i32,
    pub premium_downloads: i32,
    pub last_access_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = access_events)]
pub struct NewAccessEvent {
    pub user_id: Option<Uuid>,
    pub document_id: Uuid,
    pub kind: String,
}

#[derive(Debug, Clone, Queryable)]
pub struct Payout {
    pub id: i64,
    pub owner_id: Uuid,
    pub document_id: Uuid,
    pub accessor_id: Uuid,
    pub upload_id: Uuid,
    pub nominal: Decimal,
    pub earned: Decimal,
    pub verified: bool,
    pub kind: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = payouts)]
pub struct NewPayout {
    pub owner_id: Uuid,
    pub document_id: Uuid,
    pub accessor_id: Uuid,
    pub upload_id: Uuid,
    pub nominal: Decimal,
    pub earned: Decimal,
    pub verified: bool,
    pub kind: String,
}

#[derive(Debug, Clone, Queryable)]
pub struct Reaction {
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub vote: i16,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = reactions)]
pub struct NewReaction {
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub vote: i16,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = popularity_events)]
pub struct NewPopularityEvent {
    pub actor_id: Option<Uuid>,
    pub recipient_id: Uuid,
    pub kind: String,
    pub document_id: Uuid,
    pub delta: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = shares)]
pub struct NewShare {
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub via: String,
    pub recipient: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = share_blocks)]
pub struct NewShareBlock {
    pub id: Uuid,
    pub user_id: Uuid,
    pub blocked: Option<String>,
    pub block_all: bool,
}
