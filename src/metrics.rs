//! The dashboard's metric queries. Each issues exactly one query through the
//! storage gateway and maps the rows to a typed result; an empty row set
//! always yields zero-valued output.

use crate::db::{StorageGateway, SqlValue};
use crate::errors::AppResult;
use crate::filters::{Bindings, Predicate};
use crate::models::{
    FreeTrialBucket, MonthlySignups, PlanShare, PlatformStats, ProviderShare, RecentSignup, ReferralCredits,
    StatusCount, Summary,
};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};

pub const DEFAULT_RECENT_SIGNUPS: usize = 10;
const ACTIVE_WINDOW_DAYS: u64 = 30;

pub const GOOGLE_LABEL: &str = "Google";
pub const LOCAL_LABEL: &str = "Local / Email";
pub const CLAIMED_LABEL: &str = "Claimed";
pub const NOT_CLAIMED_LABEL: &str = "Not Claimed";

/// Reference instants shared by every query of one dashboard request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeAnchors {
    pub active_since: DateTime<Utc>,
    pub month_start: DateTime<Utc>,
    pub last_month_start: DateTime<Utc>,
}

impl TimeAnchors {
    pub fn at(now: DateTime<Utc>) -> Self {
        let month_start = first_of_month(now.date_naive());
        let last_month_start = first_of_month(month_start.date_naive() - Days::new(1));
        Self {
            active_since: now - Days::new(ACTIVE_WINDOW_DAYS),
            month_start,
            last_month_start,
        }
    }
}

fn first_of_month(date: NaiveDate) -> DateTime<Utc> {
    let first = date - Days::new(u64::from(date.day0()));
    first.and_time(NaiveTime::MIN).and_utc()
}

/// `Math.round` semantics: halves round towards positive infinity.
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

pub fn round1(value: f64) -> f64 {
    round_half_up(value * 10.0) / 10.0
}

pub fn round2(value: f64) -> f64 {
    round_half_up(value * 100.0) / 100.0
}

/// Share of `total` as a percentage with one decimal.
pub fn percent_one_decimal(part: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_half_up(part as f64 / total as f64 * 1000.0) / 10.0
}

/// Share of `total` as a whole percentage.
pub fn percent_whole(part: i64, total: i64) -> i64 {
    if total == 0 {
        return 0;
    }
    round_half_up(part as f64 / total as f64 * 100.0) as i64
}

pub fn growth_percent(this_month: i64, last_month: i64) -> f64 {
    if last_month > 0 {
        round_half_up((this_month - last_month) as f64 / last_month as f64 * 1000.0) / 10.0
    } else if this_month > 0 {
        100.0
    } else {
        0.0
    }
}

pub async fn summary<G: StorageGateway>(gateway: &G, predicate: &Predicate, anchors: &TimeAnchors) -> AppResult<Summary> {
    let mut bindings = predicate.bindings();
    let active_since = bindings.bind(anchors.active_since);
    let month_start = bindings.bind(anchors.month_start);
    let last_month_start = bindings.bind(anchors.last_month_start);

    let sql = format!(
        "SELECT
           COUNT(*) AS total_users,
           COUNT(*) FILTER (WHERE u.plan = 'pro') AS pro_users,
           COUNT(*) FILTER (WHERE u.plan = 'free') AS free_users,
           COUNT(*) FILTER (WHERE u.last_login_at >= {active_since} OR EXISTS (
             SELECT 1 FROM scans s WHERE s.user_id = u.id AND s.created_at >= {active_since}
           )) AS active_users,
           COUNT(*) FILTER (WHERE u.created_at >= {month_start}) AS signups_this_month,
           COUNT(*) FILTER (WHERE u.created_at >= {last_month_start} AND u.created_at < {month_start}) AS signups_last_month
         FROM users u{filter}",
        filter = predicate.where_clause(),
    );

    let rows = gateway.execute(&sql, bindings.params()).await?;
    let Some(row) = rows.first() else {
        return Ok(Summary::default());
    };

    let total_users = row.get_i64("total_users")?;
    let pro_users = row.get_i64("pro_users")?;
    let free_users = row.get_i64("free_users")?;
    let active_users = row.get_i64("active_users")?;
    let signups_this_month = row.get_i64("signups_this_month")?;
    let signups_last_month = row.get_i64("signups_last_month")?;

    Ok(Summary {
        total_users,
        pro_users,
        free_users,
        active_users,
        signups_this_month,
        signups_last_month,
        signup_growth_percent: growth_percent(signups_this_month, signups_last_month),
        pro_percent: percent_one_decimal(pro_users, total_users),
        free_percent: percent_one_decimal(free_users, total_users),
        active_rate_percent: percent_one_decimal(active_users, total_users),
    })
}

pub async fn signups_over_time<G: StorageGateway>(gateway: &G, predicate: &Predicate) -> AppResult<Vec<MonthlySignups>> {
    let sql = format!(
        "SELECT strftime('%Y-%m-01T00:00:00.000Z', u.created_at) AS month, COUNT(*) AS count
         FROM users u{filter}
         GROUP BY month
         HAVING month IS NOT NULL
         ORDER BY month",
        filter = predicate.where_clause(),
    );

    gateway
        .execute(&sql, predicate.params())
        .await?
        .iter()
        .map(|row| {
            Ok(MonthlySignups {
                month: row.get_string("month")?,
                count: row.get_i64("count")?,
            })
        })
        .collect()
}

pub async fn plan_distribution<G: StorageGateway>(gateway: &G, predicate: &Predicate) -> AppResult<Vec<PlanShare>> {
    let sql = format!(
        "SELECT u.plan AS plan, COUNT(*) AS count
         FROM users u{filter}
         GROUP BY u.plan
         ORDER BY count DESC, plan",
        filter = predicate.where_clause(),
    );

    let counts = gateway
        .execute(&sql, predicate.params())
        .await?
        .iter()
        .map(|row| Ok((row.get_string("plan")?, row.get_i64("count")?)))
        .collect::<AppResult<Vec<_>>>()?;
    let total: i64 = counts.iter().map(|(_, count)| count).sum();

    Ok(counts
        .into_iter()
        .map(|(plan, count)| PlanShare {
            plan,
            count,
            percent: percent_one_decimal(count, total),
        })
        .collect())
}

/// Providers fold into two buckets: `google` and everything else.
pub async fn signup_provider<G: StorageGateway>(gateway: &G, predicate: &Predicate) -> AppResult<Vec<ProviderShare>> {
    let sql = format!(
        "SELECT u.provider AS provider, COUNT(*) AS count
         FROM users u{filter}
         GROUP BY u.provider",
        filter = predicate.where_clause(),
    );

    let mut google = 0;
    let mut local = 0;
    for row in gateway.execute(&sql, predicate.params()).await? {
        let count = row.get_i64("count")?;
        match row.get_opt_string("provider")?.as_deref() {
            Some("google") => google += count,
            _ => local += count,
        }
    }
    let total = google + local;

    let mut buckets: Vec<ProviderShare> = [(GOOGLE_LABEL, google), (LOCAL_LABEL, local)]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(label, count)| ProviderShare {
            provider: label.to_string(),
            count,
            percent: percent_whole(count, total),
        })
        .collect();
    buckets.sort_by(|left, right| right.count.cmp(&left.count));
    Ok(buckets)
}

pub async fn free_trial_stats<G: StorageGateway>(gateway: &G, predicate: &Predicate) -> AppResult<Vec<FreeTrialBucket>> {
    let sql = format!(
        "SELECT
           COUNT(*) FILTER (WHERE u.free_trial_claimed = 1) AS claimed,
           COUNT(*) FILTER (WHERE u.free_trial_claimed = 0) AS not_claimed
         FROM users u{filter}",
        filter = predicate.where_clause(),
    );

    let rows = gateway.execute(&sql, predicate.params()).await?;
    let (claimed, not_claimed) = match rows.first() {
        Some(row) => (row.get_i64("claimed")?, row.get_i64("not_claimed")?),
        None => (0, 0),
    };
    let total = claimed + not_claimed;

    Ok(vec![
        FreeTrialBucket {
            label: CLAIMED_LABEL.to_string(),
            count: claimed,
            percent: percent_whole(claimed, total),
        },
        FreeTrialBucket {
            label: NOT_CLAIMED_LABEL.to_string(),
            count: not_claimed,
            percent: percent_whole(not_claimed, total),
        },
    ])
}

pub async fn subscription_status<G: StorageGateway>(gateway: &G, predicate: &Predicate) -> AppResult<Vec<StatusCount>> {
    let sql = format!(
        "SELECT u.subscription_status AS status, COUNT(*) AS count
         FROM users u{filter}
         GROUP BY u.subscription_status
         ORDER BY count DESC, status",
        filter = predicate.where_clause(),
    );

    gateway
        .execute(&sql, predicate.params())
        .await?
        .iter()
        .map(|row| {
            Ok(StatusCount {
                status: row.get_string("status")?,
                count: row.get_i64("count")?,
            })
        })
        .collect()
}

pub async fn recent_signups<G: StorageGateway>(
    gateway: &G,
    predicate: &Predicate,
    limit: usize,
) -> AppResult<Vec<RecentSignup>> {
    let mut bindings = predicate.bindings();
    let limit = bindings.bind(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

    let sql = format!(
        "SELECT u.id AS id, u.name AS name, u.email AS email, u.created_at AS created_at, u.plan AS plan
         FROM users u{filter}
         ORDER BY u.created_at DESC, u.id
         LIMIT {limit}",
        filter = predicate.where_clause(),
    );

    gateway
        .execute(&sql, bindings.params())
        .await?
        .iter()
        .map(|row| {
            let name = row
                .get_opt_string("name")?
                .filter(|name| !name.is_empty())
                .map_or_else(|| row.get_string("email"), Ok)?;
            Ok(RecentSignup {
                id: row.get_string("id")?,
                name,
                date: row.get_string("created_at")?,
                plan: row.get_string("plan")?,
            })
        })
        .collect()
}

pub async fn referral_credits<G: StorageGateway>(gateway: &G, predicate: &Predicate) -> AppResult<ReferralCredits> {
    let sql = format!(
        "SELECT
           COUNT(*) FILTER (WHERE u.referral_code IS NOT NULL AND u.referral_code != '') AS users_with_referral_code,
           COUNT(*) FILTER (WHERE u.referral_reward_granted_at IS NOT NULL) AS referral_rewards_granted,
           COALESCE(AVG(u.credits), 0) AS avg_credits
         FROM users u{filter}",
        filter = predicate.where_clause(),
    );

    let rows = gateway.execute(&sql, predicate.params()).await?;
    let Some(row) = rows.first() else {
        return Ok(ReferralCredits::default());
    };

    Ok(ReferralCredits {
        users_with_referral_code: row.get_i64("users_with_referral_code")?,
        referral_rewards_granted: row.get_i64("referral_rewards_granted")?,
        avg_credits_per_user: round2(row.get_f64("avg_credits")?),
    })
}

/// Platform-wide counters; the dashboard filter does not apply.
pub async fn platform_stats<G: StorageGateway>(gateway: &G, anchors: &TimeAnchors) -> AppResult<PlatformStats> {
    let mut bindings = Bindings::default();
    let active_since = bindings.bind(anchors.active_since);

    let sql = format!(
        "SELECT
           (SELECT COUNT(*) FROM scans) AS total_scans,
           (SELECT COUNT(*) FROM scans WHERE created_at >= {active_since}) AS scans_last_30_days,
           (SELECT COUNT(*) FROM users) AS total_users,
           (SELECT COUNT(*) FROM spam_domains) AS spam_domains,
           (SELECT COUNT(*) FROM trusted_domains) AS trusted_domains"
    );

    let rows = gateway.execute(&sql, bindings.params()).await?;
    let Some(row) = rows.first() else {
        return Ok(PlatformStats::default());
    };

    let total_scans = row.get_i64("total_scans")?;
    let total_users = row.get_i64("total_users")?;
    let avg_scans_per_user = if total_users > 0 {
        round1(total_scans as f64 / total_users as f64)
    } else {
        0.0
    };

    Ok(PlatformStats {
        total_scans,
        scans_last_30_days: row.get_i64("scans_last_30_days")?,
        avg_scans_per_user,
        spam_domains_blocked: row.get_i64("spam_domains")?,
        trusted_domains: row.get_i64("trusted_domains")?,
    })
}
