use super::{storage_timestamp, Database};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tempfile::TempDir;
use uuid::Uuid;

pub struct UserSeed {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub plan: String,
    pub provider: String,
    pub subscription_status: String,
    pub free_trial_claimed: bool,
    pub referral_code: Option<String>,
    pub referral_reward_granted_at: Option<DateTime<Utc>>,
    pub credits: Option<f64>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserSeed {
    pub fn new(id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            name: Some(format!("User {id}")),
            email: format!("{id}@example.com"),
            created_at,
            plan: "free".to_string(),
            provider: "local".to_string(),
            subscription_status: "inactive".to_string(),
            free_trial_claimed: false,
            referral_code: None,
            referral_reward_granted_at: None,
            credits: None,
            last_login_at: None,
        }
    }

    pub fn plan(mut self, plan: &str) -> Self {
        self.plan = plan.to_string();
        self
    }

    pub fn provider(mut self, provider: &str) -> Self {
        self.provider = provider.to_string();
        self
    }

    pub fn subscription(mut self, status: &str) -> Self {
        self.subscription_status = status.to_string();
        self
    }

    pub fn name(mut self, name: Option<&str>) -> Self {
        self.name = name.map(ToString::to_string);
        self
    }

    pub fn trial_claimed(mut self) -> Self {
        self.free_trial_claimed = true;
        self
    }

    pub fn referral(mut self, code: &str, rewarded_at: Option<DateTime<Utc>>) -> Self {
        self.referral_code = Some(code.to_string());
        self.referral_reward_granted_at = rewarded_at;
        self
    }

    pub fn credits(mut self, credits: f64) -> Self {
        self.credits = Some(credits);
        self
    }

    pub fn last_login(mut self, at: DateTime<Utc>) -> Self {
        self.last_login_at = Some(at);
        self
    }
}

/// Opens a fresh database in a temp dir plus a direct connection for seeding.
pub fn fixture_db(pool_size: usize) -> (TempDir, Database, Connection) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dashboard.sqlite");
    let db = Database::new(&path, pool_size).expect("db");
    let conn = Connection::open(&path).expect("seed connection");
    (dir, db, conn)
}

pub fn insert_user(conn: &Connection, user: &UserSeed) {
    conn.execute(
        "INSERT INTO users (
           id, name, email, created_at, plan, provider, subscription_status, free_trial_claimed,
           referral_code, referral_reward_granted_at, credits, last_login_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            user.id,
            user.name,
            user.email,
            storage_timestamp(user.created_at),
            user.plan,
            user.provider,
            user.subscription_status,
            user.free_trial_claimed,
            user.referral_code,
            user.referral_reward_granted_at.map(storage_timestamp),
            user.credits,
            user.last_login_at.map(storage_timestamp),
        ],
    )
    .expect("insert user");
}

pub fn insert_scan(conn: &Connection, user_id: &str, at: DateTime<Utc>) {
    conn.execute(
        "INSERT INTO scans (id, user_id, created_at) VALUES (?1, ?2, ?3)",
        params![Uuid::new_v4().to_string(), user_id, storage_timestamp(at)],
    )
    .expect("insert scan");
}

pub fn insert_spam_domain(conn: &Connection, domain: &str) {
    conn.execute(
        "INSERT INTO spam_domains (domain, created_at) VALUES (?1, ?2)",
        params![domain, storage_timestamp(Utc::now())],
    )
    .expect("insert spam domain");
}

pub fn insert_trusted_domain(conn: &Connection, domain: &str) {
    conn.execute(
        "INSERT INTO trusted_domains (domain, created_at) VALUES (?1, ?2)",
        params![domain, storage_timestamp(Utc::now())],
    )
    .expect("insert trusted domain");
}
