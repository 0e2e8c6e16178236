use std::fs;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::access::boost::{apply_boosts, PromotionalBoost};
use crate::access::AccessMode;
use crate::models::{AccessRecord, Country, LocatedDocument, NewPayout, User};
use crate::schema::{countries, documents, payouts, student_studies, user_bans, users};

/// 0.01
pub const BASE_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
/// 0.0025
pub const STEP: Decimal = Decimal::from_parts(25, 0, 0, false, 4);
/// 0.10, applied after boosts and before the country coefficient.
pub const MAX_STANDARD_AMOUNT: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

const DEFAULT_PREMIUM_AMOUNT: Decimal = Decimal::from_parts(5, 0, 0, false, 2);
const WEALTH_TIERS: usize = 8;

/// Deployment-specific payout thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSchedule {
    pub premium_amount: Decimal,
    /// T1: downloads at or below this earn the second download step.
    pub downloads_tier_1: i32,
    /// T2: downloads at or below this earn the first download step.
    pub downloads_tier_2: i32,
    pub page_threshold: i32,
    /// U8 down to U1, strictly descending.
    pub wealth_ladder: [Decimal; WEALTH_TIERS],
}

impl Default for PaymentSchedule {
    fn default() -> Self {
        Self {
            premium_amount: DEFAULT_PREMIUM_AMOUNT,
            downloads_tier_1: 10,
            downloads_tier_2: 50,
            page_threshold: 20,
            wealth_ladder: [100, 50, 25, 15, 10, 5, 2, 1].map(Decimal::from),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleFile {
    premium_amount: Option<Decimal>,
    max_file_downloads1: i32,
    max_file_downloads2: i32,
    min_file_pages: i32,
    max_user_money1: Decimal,
    max_user_money2: Decimal,
    max_user_money3: Decimal,
    max_user_money4: Decimal,
    max_user_money5: Decimal,
    max_user_money6: Decimal,
    max_user_money7: Decimal,
    max_user_money8: Decimal,
}

impl TryFrom<ScheduleFile> for PaymentSchedule {
    type Error = anyhow::Error;

    fn try_from(file: ScheduleFile) -> Result<Self> {
        let schedule = Self {
            premium_amount: file.premium_amount.unwrap_or(DEFAULT_PREMIUM_AMOUNT),
            downloads_tier_1: file.max_file_downloads1,
            downloads_tier_2: file.max_file_downloads2,
            page_threshold: file.min_file_pages,
            wealth_ladder: [
                file.max_user_money8,
                file.max_user_money7,
                file.max_user_money6,
                file.max_user_money5,
                file.max_user_money4,
                file.max_user_money3,
                file.max_user_money2,
                file.max_user_money1,
            ],
        };
        schedule.validate()?;
        Ok(schedule)
    }
}

impl PaymentSchedule {
    /// Reads the schedule from `path`, or returns the built-in defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read payment schedule {path}"))?;
        Self::from_json(&raw).with_context(|| format!("invalid payment schedule {path}"))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: ScheduleFile = serde_json::from_str(raw)?;
        Self::try_from(file)
    }

    fn validate(&self) -> Result<()> {
        if self.downloads_tier_1 >= self.downloads_tier_2 {
            bail!(
                "maxFileDownloads1 ({}) must be below maxFileDownloads2 ({})",
                self.downloads_tier_1,
                self.downloads_tier_2
            );
        }
        if self.wealth_ladder.windows(2).any(|pair| pair[0] <= pair[1]) {
            bail!("maxUserMoney8..maxUserMoney1 must be strictly descending");
        }
        if self.premium_amount < Decimal::ZERO {
            bail!("premiumAmount must not be negative");
        }
        Ok(())
    }

    /// Tiered standard amount before boosts and cap. Each group climbs one
    /// step per satisfied rung and stops at the first rung that fails.
    pub fn standard_amount(&self, downloads: i32, pages: i32, owner_wealth: Decimal) -> Decimal {
        let amount = climb(
            BASE_AMOUNT,
            [self.downloads_tier_2, self.downloads_tier_1].map(|limit| downloads <= limit),
        );
        let amount = climb(amount, [pages > self.page_threshold]);
        climb(
            amount,
            self.wealth_ladder.iter().map(|limit| owner_wealth <= *limit),
        )
    }
}

fn climb(amount: Decimal, rungs: impl IntoIterator<Item = bool>) -> Decimal {
    rungs
        .into_iter()
        .take_while(|holds| *holds)
        .fold(amount, |amount, _| amount + STEP)
}

/// Everything the calculator needs besides the ledger.
pub struct PayoutContext<'a> {
    pub schedule: &'a PaymentSchedule,
    pub boosts: &'a [PromotionalBoost],
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutQuote {
    /// Amount before the country coefficient.
    pub nominal: Decimal,
    pub settled: Decimal,
}

impl PayoutContext<'_> {
    pub fn quote(
        &self,
        located: &LocatedDocument,
        owner_wealth: Decimal,
        coefficient: Decimal,
        premium: bool,
    ) -> PayoutQuote {
        let nominal = if premium {
            self.schedule.premium_amount
        } else {
            let document = &located.document;
            let tiered =
                self.schedule
                    .standard_amount(document.downloads, document.pages, owner_wealth);
            apply_boosts(tiered, self.boosts, &located.center, self.now).min(MAX_STANDARD_AMOUNT)
        };
        PayoutQuote {
            nominal,
            settled: nominal * coefficient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayoutResult {
    pub paid: bool,
    pub amount: Decimal,
}

impl PayoutResult {
    fn unpaid() -> Self {
        Self {
            paid: false,
            amount: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ineligible {
    NotMonetizable,
    OwnAccess,
    RepeatAccess,
    OwnerMissing,
    OwnerBanned,
    OwnerWithoutStudies,
    OwnerWithoutCountry,
}

struct Payee {
    owner: User,
    country: Country,
}

/// Settles the owner's share of one access. Runs inside the access
/// transaction after the usage ledger has recorded the access; `record` is
/// the accessor's row as the ledger left it.
pub fn compute_payout(
    conn: &mut PgConnection,
    context: &PayoutContext<'_>,
    accessor_id: Uuid,
    located: &LocatedDocument,
    record: Option<&AccessRecord>,
    mode: AccessMode,
    premium: bool,
) -> QueryResult<PayoutResult> {
    let document = &located.document;
    let payee = match check_eligibility(conn, accessor_id, located, record, premium)? {
        Ok(payee) => payee,
        Err(reason) => {
            debug!(document_id = %document.id, %accessor_id, ?reason, "no payout");
            return Ok(PayoutResult::unpaid());
        }
    };

    let quote = context.quote(
        located,
        payee.owner.wealth(),
        payee.country.download_coefficient,
        premium,
    );
    let now = Utc::now().naive_utc();

    diesel::update(users::table.find(payee.owner.id))
        .set((
            users::money.eq(users::money + quote.settled),
            users::updated_at.eq(now),
        ))
        .execute(conn)?;

    diesel::insert_into(payouts::table)
        .values(&NewPayout {
            owner_id: payee.owner.id,
            document_id: document.id,
            accessor_id,
            upload_id: document.upload_id,
            nominal: quote.nominal,
            earned: quote.settled,
            verified: premium,
            kind: mode.payout_kind(premium).to_string(),
        })
        .execute(conn)?;

    diesel::update(documents::table.find(document.id))
        .set((
            documents::money.eq(documents::money + quote.settled),
            documents::paid_downloads.eq(documents::paid_downloads + 1),
        ))
        .execute(conn)?;

    info!(
        document_id = %document.id,
        owner_id = %payee.owner.id,
        nominal = %quote.nominal,
        settled = %quote.settled,
        "payout settled"
    );
    Ok(PayoutResult {
        paid: true,
        amount: quote.settled,
    })
}

/// Only the first access of its kind pays. The record already counts the
/// access being settled.
fn is_repeat_access(record: Option<&AccessRecord>, premium: bool) -> bool {
    record.is_some_and(|record| {
        let accesses = if premium {
            record.premium_downloads
        } else {
            record.downloads
        };
        accesses > 1
    })
}

fn check_eligibility(
    conn: &mut PgConnection,
    accessor_id: Uuid,
    located: &LocatedDocument,
    record: Option<&AccessRecord>,
    premium: bool,
) -> QueryResult<Result<Payee, Ineligible>> {
    let document = &located.document;
    if !document.monetizable {
        return Ok(Err(Ineligible::NotMonetizable));
    }
    let owner_id = match document.owner_id {
        Some(owner_id) if owner_id != accessor_id => owner_id,
        _ => return Ok(Err(Ineligible::OwnAccess)),
    };

    if is_repeat_access(record, premium) {
        return Ok(Err(Ineligible::RepeatAccess));
    }

    let Some(owner) = users::table.find(owner_id).first::<User>(conn).optional()? else {
        return Ok(Err(Ineligible::OwnerMissing));
    };

    let globally_banned = user_bans::table
        .find(owner_id)
        .select(user_bans::global_ban)
        .first::<bool>(conn)
        .optional()?
        .unwrap_or(false);
    if globally_banned {
        return Ok(Err(Ineligible::OwnerBanned));
    }

    let studies: i64 = student_studies::table
        .filter(student_studies::user_id.eq(owner_id))
        .count()
        .get_result(conn)?;
    if studies == 0 {
        return Ok(Err(Ineligible::OwnerWithoutStudies));
    }

    let country = match owner.country_id {
        Some(country_id) => countries::table
            .find(country_id)
            .first::<Country>(conn)
            .optional()?,
        None => None,
    };
    let Some(country) = country else {
        return Ok(Err(Ineligible::OwnerWithoutCountry));
    };

    Ok(Ok(Payee { owner, country }))
}
