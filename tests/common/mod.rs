#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use growth_dashboard_lib::db::{storage_timestamp, Database};
use rusqlite::{params, Connection};
use tempfile::TempDir;
use uuid::Uuid;

pub struct Store {
    pub dir: TempDir,
    pub db: Database,
    pub conn: Connection,
}

pub fn store(pool_size: usize) -> Store {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dashboard.sqlite");
    let db = Database::new(&path, pool_size).expect("db");
    let conn = Connection::open(&path).expect("seed connection");
    Store { dir, db, conn }
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

impl Store {
    pub fn user(&self, id: &str, plan: &str, provider: &str, created_at: DateTime<Utc>) {
        self.conn
            .execute(
                "INSERT INTO users (id, name, email, created_at, plan, provider, subscription_status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active')",
                params![
                    id,
                    format!("User {id}"),
                    format!("{id}@example.com"),
                    storage_timestamp(created_at),
                    plan,
                    provider
                ],
            )
            .expect("insert user");
    }

    pub fn scan(&self, user_id: &str, at: DateTime<Utc>) {
        self.conn
            .execute(
                "INSERT INTO scans (id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![Uuid::new_v4().to_string(), user_id, storage_timestamp(at)],
            )
            .expect("insert scan");
    }

    pub fn domains(&self, spam: &[&str], trusted: &[&str]) {
        let now = storage_timestamp(Utc::now());
        for domain in spam {
            self.conn
                .execute(
                    "INSERT INTO spam_domains (domain, created_at) VALUES (?1, ?2)",
                    params![domain, now],
                )
                .expect("insert spam domain");
        }
        for domain in trusted {
            self.conn
                .execute(
                    "INSERT INTO trusted_domains (domain, created_at) VALUES (?1, ?2)",
                    params![domain, now],
                )
                .expect("insert trusted domain");
        }
    }

    /// Free users on local sign-in with scans spread over the last 60 days.
    pub fn seed_free_population(&self) {
        for n in 0..6 {
            let id = format!("free-{n}");
            self.user(&id, "free", "local", days_ago(40 + n));
            self.scan(&id, days_ago(n * 10 + 5));
        }
        self.domains(&["spam.example", "phish.example", "scam.example"], &["example.org"]);
    }
}
