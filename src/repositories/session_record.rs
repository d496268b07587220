use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use deadpool_postgres::Pool;
use tokio::sync::Mutex;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    crypto::aes::SymmetricKey,
    error::{AppError, Result},
    models::session_record::SessionRecord,
};

/// Insert-once store of first-login records, keyed by subject id.
pub trait SessionRecordStore: Send + Sync {
    /// Records that `subject_id` completed the provider handshake.
    ///
    /// Returns `true` when a record was written and `false` when one already
    /// existed. An existing record is never an error and is left untouched.
    fn record_first_login(
        &self,
        subject_id: &str,
        provider_session_secret: &str,
        key: &SymmetricKey,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Finds the record for `subject_id`, if any.
    fn find_by_subject(&self, subject_id: &str) -> impl Future<Output = Result<Option<SessionRecord>>> + Send;
}

/// A helper function to map a `tokio_postgres::Row` to a `SessionRecord`.
fn row_to_record(row: &Row) -> Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        openid: row.try_get("openid").map_err(|_| AppError::MissingData("openid".to_string()))?,
        session_key: row.try_get("session_key").map_err(|_| AppError::MissingData("session_key".to_string()))?,
        secret_key: row.try_get("secret_key").map_err(|_| AppError::MissingData("secret_key".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
    })
}

/// Postgres-backed session record store. Uniqueness of `openid` is enforced
/// by the table, so racing first logins produce one row.
#[derive(Clone)]
pub struct PgSessionRecordStore {
    pool: Pool,
}

impl PgSessionRecordStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

impl SessionRecordStore for PgSessionRecordStore {
    async fn record_first_login(
        &self,
        subject_id: &str,
        provider_session_secret: &str,
        key: &SymmetricKey,
    ) -> Result<bool> {
        let client = self.pool.get().await?;
        let inserted = client
            .execute(
                r#"
                INSERT INTO session_records (id, openid, session_key, secret_key, created_at)
                VALUES ($1, $2, $3, $4, NOW())
                ON CONFLICT (openid) DO NOTHING
                "#,
                &[&Uuid::new_v4(), &subject_id, &provider_session_secret, &key.to_base64()],
            )
            .await?;

        Ok(inserted == 1)
    }

    async fn find_by_subject(&self, subject_id: &str) -> Result<Option<SessionRecord>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, openid, session_key, secret_key, created_at
                FROM session_records
                WHERE openid = $1
                "#,
                &[&subject_id],
            )
            .await?;
        row.map(|r| row_to_record(&r)).transpose()
    }
}

/// In-process session record store.
#[derive(Clone, Default)]
pub struct MemorySessionRecordStore {
    records: Arc<Mutex<HashMap<String, SessionRecord>>>,
}

impl MemorySessionRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

impl SessionRecordStore for MemorySessionRecordStore {
    async fn record_first_login(
        &self,
        subject_id: &str,
        provider_session_secret: &str,
        key: &SymmetricKey,
    ) -> Result<bool> {
        let mut records = self.records.lock().await;
        if records.contains_key(subject_id) {
            return Ok(false);
        }

        records.insert(
            subject_id.to_string(),
            SessionRecord {
                id: Uuid::new_v4(),
                openid: subject_id.to_string(),
                session_key: provider_session_secret.to_string(),
                secret_key: key.to_base64(),
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn find_by_subject(&self, subject_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.records.lock().await.get(subject_id).cloned())
    }
}

/// The session record store selected at startup.
#[derive(Clone)]
pub enum RecordBackend {
    Postgres(PgSessionRecordStore),
    Memory(MemorySessionRecordStore),
}

impl SessionRecordStore for RecordBackend {
    async fn record_first_login(
        &self,
        subject_id: &str,
        provider_session_secret: &str,
        key: &SymmetricKey,
    ) -> Result<bool> {
        match self {
            RecordBackend::Postgres(store) => {
                store.record_first_login(subject_id, provider_session_secret, key).await
            }
            RecordBackend::Memory(store) => {
                store.record_first_login(subject_id, provider_session_secret, key).await
            }
        }
    }

    async fn find_by_subject(&self, subject_id: &str) -> Result<Option<SessionRecord>> {
        match self {
            RecordBackend::Postgres(store) => store.find_by_subject(subject_id).await,
            RecordBackend::Memory(store) => store.find_by_subject(subject_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aes::generate_key;

    #[tokio::test]
    async fn second_first_login_is_a_no_op() {
        let store = MemorySessionRecordStore::new();
        let key = generate_key();

        assert!(store.record_first_login("owx_abc123", "secret-1", &key).await.unwrap());
        assert!(!store.record_first_login("owx_abc123", "secret-2", &generate_key()).await.unwrap());

        assert_eq!(store.len().await, 1);
        let record = store.find_by_subject("owx_abc123").await.unwrap().unwrap();
        assert_eq!(record.session_key, "secret-1");
        assert_eq!(SymmetricKey::from_base64(&record.secret_key), Some(key));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_first_logins_leave_one_record() {
        let store = RecordBackend::Memory(MemorySessionRecordStore::new());
        let key = generate_key();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    store
                        .record_first_login("owx_race", &format!("secret-{}", i), &key)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut written = 0;
        for handle in handles {
            if handle.await.unwrap() {
                written += 1;
            }
        }

        assert_eq!(written, 1);
        assert!(store.find_by_subject("owx_race").await.unwrap().is_some());
    }

    #[test]
    fn debug_redacts_secrets() {
        let record = SessionRecord {
            id: Uuid::nil(),
            openid: "owx_abc123".to_string(),
            session_key: "provider-secret".to_string(),
            secret_key: "key-text".to_string(),
            created_at: Utc::now(),
        };
        let printed = format!("{:?}", record);

        assert!(printed.contains("owx_abc123"));
        assert!(!printed.contains("provider-secret"));
        assert!(!printed.contains("key-text"));
    }
}
