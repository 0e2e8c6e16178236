use diesel::prelude::*;
use rand::Rng;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::access::{AccessError, AccessMode};
use crate::captcha::CaptchaVerifier;
use crate::models::{Account, User, UserBan};
use crate::schema::{user_bans, users};

pub const CAPTCHA_RESET_MIN: i32 = 10;
pub const CAPTCHA_RESET_MAX: i32 = 20;

/// Who is asking for a document.
#[derive(Debug, Clone)]
pub enum Requester {
    Anonymous,
    /// Authenticated principal without a user row.
    Unregistered(Uuid),
    Known(Account),
}

impl Requester {
    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::Known(account) => Some(account),
            _ => None,
        }
    }
}

/// Loads the requester and locks their user row until the surrounding
/// transaction ends.
pub fn load_requester_for_update(
    conn: &mut PgConnection,
    user_id: Option<Uuid>,
) -> QueryResult<Requester> {
    let Some(user_id) = user_id else {
        return Ok(Requester::Anonymous);
    };

    let user = users::table
        .find(user_id)
        .for_update()
        .first::<User>(conn)
        .optional()?;
    let Some(user) = user else {
        return Ok(Requester::Unregistered(user_id));
    };

    let ban = user_bans::table
        .find(user_id)
        .first::<UserBan>(conn)
        .optional()?;
    Ok(Requester::Known(Account { user, ban }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    /// A captcha was solved and the requester's counter must be reset.
    AllowWithCaptchaReset(i32),
}

pub struct AntiFraudGate<'a> {
    verifier: &'a dyn CaptchaVerifier,
    secrets: &'a [String],
}

impl<'a> AntiFraudGate<'a> {
    pub fn new(verifier: &'a dyn CaptchaVerifier, secrets: &'a [String]) -> Self {
        Self { verifier, secrets }
    }

    pub async fn authorize(
        &self,
        requester: &Requester,
        mode: AccessMode,
        premium: bool,
        captcha_token: Option<&str>,
        client_ip: Option<&str>,
    ) -> Result<GateDecision, AccessError> {
        match mode {
            AccessMode::Preview => return Ok(GateDecision::Allow),
            AccessMode::Print => {
                return match requester {
                    Requester::Anonymous => Ok(GateDecision::Allow),
                    Requester::Unregistered(_) => Err(AccessError::Banned),
                    Requester::Known(account) if account.is_globally_banned() => {
                        Err(AccessError::Banned)
                    }
                    Requester::Known(_) => Ok(GateDecision::Allow),
                };
            }
            AccessMode::View | AccessMode::Download => {}
        }

        let account = match requester {
            Requester::Anonymous => return Err(AccessError::Banned),
            Requester::Unregistered(_) => return Err(AccessError::UnknownUser),
            Requester::Known(account) => account,
        };
        if account.is_globally_banned() {
            return Err(AccessError::Banned);
        }
        if premium && account.user.premium_downloads <= 0 {
            return Err(AccessError::InsufficientBalance);
        }
        if account.user.captcha_counter > 0 {
            return Ok(GateDecision::Allow);
        }

        let token = captcha_token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AccessError::CaptchaRequired)?;

        if self.verify(token, client_ip).await {
            let counter = rand::thread_rng().gen_range(CAPTCHA_RESET_MIN..=CAPTCHA_RESET_MAX);
            debug!(user_id = %account.user.id, counter, "captcha solved");
            Ok(GateDecision::AllowWithCaptchaReset(counter))
        } else {
            Err(AccessError::CaptchaFailed)
        }
    }

    /// Tries each configured secret in order; a transport failure only rules
    /// out the secret it happened on.
    async fn verify(&self, token: &str, client_ip: Option<&str>) -> bool {
        for (index, secret) in self.secrets.iter().enumerate() {
            match self.verifier.verify(secret, token, client_ip).await {
                Ok(true) => return true,
                Ok(false) => debug!(secret_index = index, "captcha rejected"),
                Err(err) => warn!(secret_index = index, error = ?err, "captcha verification error"),
            }
        }
        false
    }
}

/// Writes the effect of a gate decision. Must run inside the access transaction.
pub fn apply_decision(
    conn: &mut PgConnection,
    user_id: Uuid,
    decision: GateDecision,
) -> QueryResult<()> {
    if let GateDecision::AllowWithCaptchaReset(counter) = decision {
        diesel::update(users::table.find(user_id))
            .set(users::captcha_counter.eq(counter))
            .execute(conn)?;
    }
    Ok(())
}
