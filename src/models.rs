use crate::errors::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Filter value meaning "no constraint on this field".
pub const ALL_SENTINEL: &str = "all";

/// Query parameters as received at the HTTP boundary.
///
/// `status` is accepted for compatibility with existing clients but does not
/// map to any filter condition; `subscription` is the parameter that filters
/// on subscription status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub plan: Option<String>,
    pub provider: Option<String>,
    pub status: Option<String>,
    pub subscription: Option<String>,
}

/// Normalized dashboard filter. `None` means the field is unconstrained.
/// Time bounds are inclusive instants in UTC.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub plan: Option<String>,
    pub provider: Option<String>,
    pub subscription_status: Option<String>,
}

impl Filter {
    /// Fails when `from` or `to` is set but is not a recognizable instant.
    pub fn from_query(query: &DashboardQuery) -> AppResult<Self> {
        Ok(Self {
            from: time_bound("from", query.from.as_deref())?,
            to: time_bound("to", query.to.as_deref())?,
            plan: constraint(query.plan.as_deref()),
            provider: constraint(query.provider.as_deref()),
            subscription_status: constraint(query.subscription.as_deref()),
        })
    }

    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }
}

fn constraint(raw: Option<&str>) -> Option<String> {
    match raw {
        None | Some("") | Some(ALL_SENTINEL) => None,
        Some(value) => Some(value.to_string()),
    }
}

fn time_bound(field: &str, raw: Option<&str>) -> AppResult<Option<DateTime<Utc>>> {
    constraint(raw)
        .map(|value| {
            parse_instant(&value).ok_or_else(|| AppError::Query(format!("invalid `{field}` bound: {value}")))
        })
        .transpose()
}

/// RFC 3339 with any offset, a date-time without offset (read as UTC), or a
/// bare date (UTC midnight).
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(at.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_users: i64,
    pub pro_users: i64,
    pub free_users: i64,
    pub active_users: i64,
    pub signups_this_month: i64,
    pub signups_last_month: i64,
    pub signup_growth_percent: f64,
    pub pro_percent: f64,
    pub free_percent: f64,
    pub active_rate_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySignups {
    /// Start of the calendar month, `YYYY-MM-01T00:00:00.000Z`.
    pub month: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanShare {
    pub plan: String,
    pub count: i64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderShare {
    pub provider: String,
    pub count: i64,
    pub percent: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeTrialBucket {
    pub label: String,
    pub count: i64,
    pub percent: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentSignup {
    pub id: String,
    /// Display name, or the email when the user has no name.
    pub name: String,
    pub date: String,
    pub plan: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCredits {
    pub users_with_referral_code: i64,
    pub referral_rewards_granted: i64,
    pub avg_credits_per_user: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_scans: i64,
    pub scans_last_30_days: i64,
    pub avg_scans_per_user: f64,
    pub spam_domains_blocked: i64,
    pub trusted_domains: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardPayload {
    pub summary: Summary,
    pub signups_over_time: Vec<MonthlySignups>,
    pub plan_distribution: Vec<PlanShare>,
    pub signup_provider: Vec<ProviderShare>,
    pub free_trial: Vec<FreeTrialBucket>,
    pub subscription_status: Vec<StatusCount>,
    pub recent_signups: Vec<RecentSignup>,
    pub referral_credits: ReferralCredits,
    pub platform_stats: PlatformStats,
    pub last_synced: String,
}

#[cfg(test)]
mod tests {
    use super::{parse_instant, DashboardQuery, Filter, PlatformStats};
    use crate::errors::AppError;
    use chrono::{TimeZone, Utc};

    #[test]
    fn absent_empty_and_all_are_unconstrained() {
        for raw in [None, Some(""), Some("all")] {
            let query = DashboardQuery {
                from: raw.map(ToString::to_string),
                to: raw.map(ToString::to_string),
                plan: raw.map(ToString::to_string),
                provider: raw.map(ToString::to_string),
                status: None,
                subscription: raw.map(ToString::to_string),
            };
            assert!(Filter::from_query(&query).expect("filter").is_unconstrained(), "{raw:?}");
        }
    }

    #[test]
    fn status_parameter_is_not_a_filter() {
        let query = DashboardQuery {
            status: Some("active".to_string()),
            ..DashboardQuery::default()
        };
        assert!(Filter::from_query(&query).expect("filter").is_unconstrained());

        let query = DashboardQuery {
            subscription: Some("active".to_string()),
            ..DashboardQuery::default()
        };
        assert_eq!(
            Filter::from_query(&query).expect("filter").subscription_status.as_deref(),
            Some("active")
        );
    }

    #[test]
    fn time_bounds_normalize_to_utc_instants() {
        let midnight = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_instant("2026-03-01"), Some(midnight));
        assert_eq!(parse_instant("2026-03-01T00:00:00Z"), Some(midnight));
        assert_eq!(parse_instant("2026-03-01T00:00:00.000Z"), Some(midnight));
        assert_eq!(parse_instant("2026-03-01T05:00:00+05:00"), Some(midnight));
        assert_eq!(parse_instant("2026-03-01T00:00:00"), Some(midnight));
        assert_eq!(
            parse_instant("2026-03-01T00:00:00.250").map(|at| at.timestamp_millis()),
            Some(midnight.timestamp_millis() + 250)
        );
        assert_eq!(parse_instant("next tuesday"), None);

        let query = DashboardQuery {
            from: Some("2026-03-01T10:00:00+05:00".to_string()),
            to: Some("all".to_string()),
            ..DashboardQuery::default()
        };
        let filter = Filter::from_query(&query).expect("filter");
        assert_eq!(filter.from, Some(Utc.with_ymd_and_hms(2026, 3, 1, 5, 0, 0).unwrap()));
        assert_eq!(filter.to, None);
    }

    #[test]
    fn unparseable_time_bound_is_rejected() {
        let query = DashboardQuery {
            to: Some("yesterday".to_string()),
            ..DashboardQuery::default()
        };
        match Filter::from_query(&query) {
            Err(AppError::Query(message)) => assert!(message.contains("`to`"), "{message}"),
            other => panic!("expected a query error, got {other:?}"),
        }
    }

    #[test]
    fn platform_stats_serialize_with_wire_names() {
        let json = serde_json::to_value(PlatformStats::default()).expect("serialize");
        assert!(json.get("scansLast30Days").is_some());
        assert!(json.get("spamDomainsBlocked").is_some());
        assert!(json.get("avgScansPerUser").is_some());
    }
}
