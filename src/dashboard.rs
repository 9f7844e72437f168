use crate::db::{storage_timestamp, StorageGateway};
use crate::errors::{AppError, AppResult};
use crate::filters::compile;
use crate::metrics::{self, TimeAnchors, DEFAULT_RECENT_SIGNUPS};
use crate::models::{DashboardPayload, Filter};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Instant;

/// Runs the metric battery for a filter and merges the results.
///
/// The nine queries are independent and read without a shared snapshot, so
/// under concurrent writes they may reflect slightly different instants.
#[derive(Debug, Clone)]
pub struct Dashboard<G> {
    gateway: G,
    recent_limit: usize,
}

impl<G: StorageGateway> Dashboard<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            recent_limit: DEFAULT_RECENT_SIGNUPS,
        }
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    pub async fn get_dashboard(&self, filter: &Filter) -> AppResult<DashboardPayload> {
        self.get_dashboard_at(filter, Utc::now()).await
    }

    /// Like [`Self::get_dashboard`], with the relative windows ("last 30
    /// days", "this month") anchored at `now`. `lastSynced` is always the
    /// wall clock at assembly.
    ///
    /// All queries run concurrently in one join. The first failure ends the
    /// join and drops the queries still in flight; nothing partial is
    /// returned.
    pub async fn get_dashboard_at(&self, filter: &Filter, now: DateTime<Utc>) -> AppResult<DashboardPayload> {
        let started = Instant::now();
        let predicate = compile(filter);
        let anchors = TimeAnchors::at(now);
        let gateway = &self.gateway;

        tracing::debug!(conditions = predicate.len(), "building dashboard");

        let (
            summary,
            signups_over_time,
            plan_distribution,
            signup_provider,
            free_trial,
            subscription_status,
            recent_signups,
            referral_credits,
            platform_stats,
        ) = tokio::try_join!(
            tagged("summary", metrics::summary(gateway, &predicate, &anchors)),
            tagged("signupsOverTime", metrics::signups_over_time(gateway, &predicate)),
            tagged("planDistribution", metrics::plan_distribution(gateway, &predicate)),
            tagged("signupProvider", metrics::signup_provider(gateway, &predicate)),
            tagged("freeTrial", metrics::free_trial_stats(gateway, &predicate)),
            tagged("subscriptionStatus", metrics::subscription_status(gateway, &predicate)),
            tagged(
                "recentSignups",
                metrics::recent_signups(gateway, &predicate, self.recent_limit)
            ),
            tagged("referralCredits", metrics::referral_credits(gateway, &predicate)),
            tagged("platformStats", metrics::platform_stats(gateway, &anchors)),
        )?;

        let last_synced = storage_timestamp(Utc::now());
        tracing::info!(
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            total_users = summary.total_users,
            "dashboard assembled"
        );

        Ok(DashboardPayload {
            summary,
            signups_over_time,
            plan_distribution,
            signup_provider,
            free_trial,
            subscription_status,
            recent_signups,
            referral_credits,
            platform_stats,
            last_synced,
        })
    }
}

async fn tagged<T>(metric: &'static str, query: impl Future<Output = AppResult<T>>) -> AppResult<T> {
    query.await.map_err(|error| AppError::aggregation(metric, error))
}
