use async_trait::async_trait;
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::error::{PitchError, PitchResult};
use crate::infrastructure::db::pool::DbPool;
use crate::middleware::role::Role;

/// Active subscription as far as pitch length is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub plan: String,
    pub pitch_duration_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlement {
    pub role: Option<Role>,
    pub subscription: Option<Subscription>,
}

/// Looks up the role and active subscription of a user.
#[async_trait]
pub trait EntitlementSource: Send + Sync {
    async fn lookup(&self, owner_id: Uuid) -> PitchResult<Entitlement>;
}

/// Maximum pitch length per role and subscription.
#[derive(Debug, Clone, Copy)]
pub struct EntitlementPolicy {
    pub free_seconds: u32,
    pub privileged_seconds: u32,
}

impl EntitlementPolicy {
    pub fn max_duration(&self, entitlement: &Entitlement) -> PitchResult<u32> {
        match entitlement.role {
            Some(Role::Admin) => Ok(self.privileged_seconds),
            Some(Role::Candidate) => Ok(entitlement
                .subscription
                .as_ref()
                .map(|s| s.pitch_duration_seconds)
                .unwrap_or(self.free_seconds)),
            _ => Err(PitchError::Forbidden(
                "only candidates can publish an elevator pitch".to_string(),
            )),
        }
    }

    /// Checks a probed duration against the allowance, returning the allowance.
    pub fn validate(&self, entitlement: &Entitlement, duration_seconds: f64) -> PitchResult<u32> {
        let allowed = self.max_duration(entitlement)?;

        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            return Err(PitchError::Validation(
                "could not determine the video duration".to_string(),
            ));
        }

        if duration_seconds > allowed as f64 {
            let hint = if entitlement.subscription.is_none() {
                " Upgrade your plan for longer pitches."
            } else {
                ""
            };
            return Err(PitchError::PaymentRequired(format!(
                "Video is {:.0} seconds long but your plan allows up to {} seconds.{}",
                duration_seconds.ceil(),
                allowed,
                hint
            )));
        }

        Ok(allowed)
    }
}

#[derive(Debug, FromRow)]
struct EntitlementRow {
    role: String,
    plan: Option<String>,
    pitch_duration_seconds: Option<i32>,
}

/// Reads the account service's `users` and `subscriptions` tables.
#[derive(Clone)]
pub struct PgEntitlementSource {
    pool: DbPool,
}

impl PgEntitlementSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementSource for PgEntitlementSource {
    async fn lookup(&self, owner_id: Uuid) -> PitchResult<Entitlement> {
        let row = sqlx::query_as::<_, EntitlementRow>(
            r#"
            SELECT u.role::text AS role, s.plan, s.pitch_duration_seconds
            FROM users u
            LEFT JOIN subscriptions s
                ON s.user_id = u.id
               AND s.status = 'active'
               AND (s.expires_at IS NULL OR s.expires_at > NOW())
            WHERE u.id = $1
            ORDER BY s.pitch_duration_seconds DESC NULLS LAST
            LIMIT 1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| PitchError::NotFound("user not found".to_string()))?;

        let subscription = match (row.plan, row.pitch_duration_seconds) {
            (Some(plan), Some(seconds)) if seconds > 0 => Some(Subscription {
                plan,
                pitch_duration_seconds: seconds as u32,
            }),
            _ => None,
        };

        Ok(Entitlement {
            role: Role::parse(&row.role),
            subscription,
        })
    }
}
