use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::models::Center;
use crate::storage::{BlobLocation, ObjectStorage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoostPeriod {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoostKind {
    Add,
    Product,
    Percentage,
}

/// A time-boxed, geographically scoped adjustment of standard payouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionalBoost {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, deserialize_with = "instant")]
    pub init_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "instant")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub country_id: Option<i32>,
    #[serde(default)]
    pub city_id: Option<i32>,
    #[serde(default)]
    pub university_id: Option<i32>,
    #[serde(default)]
    pub center_id: Option<i32>,
    #[serde(default)]
    pub period: Option<BoostPeriod>,
    #[serde(default, rename = "type")]
    pub kind: Option<BoostKind>,
    #[serde(default)]
    pub value: Decimal,
    #[serde(default)]
    pub limit: Option<Decimal>,
}

impl PromotionalBoost {
    /// Both window bounds are exclusive; a missing bound is open.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && self.init_date.map_or(true, |start| now > start)
            && self.end_date.map_or(true, |end| now < end)
    }

    pub fn covers(&self, center: &Center) -> bool {
        self.country_id == Some(center.country_id)
            || (self.city_id.is_some() && self.city_id == center.city_id)
            || (self.university_id.is_some() && self.university_id == center.university_id)
            || self.center_id == Some(center.id)
    }

    /// Raw value scaled by elapsed periods, then clamped toward the limit.
    pub fn effective_value(&self, now: DateTime<Utc>) -> Decimal {
        let mut value = self.value;
        if let (Some(period), Some(start)) = (self.period, self.init_date) {
            value *= Decimal::from(elapsed_periods(period, start, now));
        }
        if let Some(limit) = self.limit {
            if value < Decimal::ZERO {
                value = value.max(limit);
            } else if value > Decimal::ZERO {
                value = value.min(limit);
            }
        }
        value
    }

    pub fn apply(&self, amount: Decimal, now: DateTime<Utc>) -> Decimal {
        let value = self.effective_value(now);
        match self.kind {
            Some(BoostKind::Add) => amount + value,
            Some(BoostKind::Product) if value <= Decimal::ZERO => amount,
            Some(BoostKind::Product) => amount * value,
            Some(BoostKind::Percentage) => amount * (Decimal::ONE + value),
            None => amount,
        }
    }
}

/// Applies every active boost covering `center`, in list order.
pub fn apply_boosts(
    amount: Decimal,
    boosts: &[PromotionalBoost],
    center: &Center,
    now: DateTime<Utc>,
) -> Decimal {
    boosts
        .iter()
        .filter(|boost| boost.is_active_at(now) && boost.covers(center))
        .fold(amount, |amount, boost| boost.apply(amount, now))
}

/// Whole periods elapsed from `start` to `now`, truncated like a calendar
/// difference; negative when `now` precedes `start`.
pub fn elapsed_periods(period: BoostPeriod, start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    match period {
        BoostPeriod::Daily => (now - start).num_days(),
        BoostPeriod::Weekly => (now - start).num_weeks(),
        BoostPeriod::Monthly => elapsed_months(start, now),
        BoostPeriod::Yearly => elapsed_months(start, now) / 12,
    }
}

fn elapsed_months(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    if now < start {
        return -elapsed_months(now, start);
    }
    let mut months = i64::from(now.year() - start.year()) * 12 + i64::from(now.month())
        - i64::from(start.month());
    let within_month =
        |at: &DateTime<Utc>| (at.day(), at.num_seconds_from_midnight(), at.nanosecond());
    if within_month(&now) < within_month(&start) {
        months -= 1;
    }
    months
}

/// Reads the boost list from storage. A missing or unreadable list means no
/// boosts are in effect.
pub async fn load_boosts(
    storage: &dyn ObjectStorage,
    location: &BlobLocation,
) -> Vec<PromotionalBoost> {
    let bytes = match storage.exists(location).await {
        Ok(true) => storage.get_object(location).await,
        Ok(false) => {
            debug!(%location, "no promotional boosts configured");
            return Vec::new();
        }
        Err(err) => Err(err),
    };

    match bytes.map(|bytes| serde_json::from_slice::<Vec<PromotionalBoost>>(&bytes)) {
        Ok(Ok(boosts)) => boosts,
        Ok(Err(err)) => {
            warn!(%location, error = %err, "ignoring unreadable promotional boosts");
            Vec::new()
        }
        Err(err) => {
            warn!(%location, error = ?err, "failed to load promotional boosts");
            Vec::new()
        }
    }
}

fn instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_instant(text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date `{text}`"))),
    }
}

fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}
