use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use deadpool_postgres::Pool;
use tokio::sync::{Mutex, RwLock};

use crate::crypto::aes::{self, SymmetricKey};
use crate::crypto::token::IdentityError;

/// Source of the single process-wide token key.
///
/// Implementations guarantee that once a key has been returned, every later
/// call returns the same key, including across concurrent first callers.
pub trait KeyProvider: Send + Sync {
    /// Returns the current key, creating and persisting it on first use.
    fn get_or_create_key(&self) -> impl Future<Output = Result<SymmetricKey, IdentityError>> + Send;
}

impl<T: KeyProvider> KeyProvider for Arc<T> {
    fn get_or_create_key(&self) -> impl Future<Output = Result<SymmetricKey, IdentityError>> + Send {
        (**self).get_or_create_key()
    }
}

fn unavailable(e: impl std::fmt::Display) -> IdentityError {
    IdentityError::KeyUnavailable(e.to_string())
}

/// Postgres-backed key store.
///
/// The `secret_keys` table admits a single row (`id = 1`), so concurrent
/// bootstrap inserts resolve to one winner and every loser re-reads it.
#[derive(Clone)]
pub struct PgKeyStore {
    pool: Pool,
    cache: Arc<RwLock<Option<SymmetricKey>>>,
}

impl PgKeyStore {
    /// Creates a new `PgKeyStore` over the given pool.
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    async fn load(&self) -> Result<SymmetricKey, IdentityError> {
        let client = self.pool.get().await.map_err(unavailable)?;

        if let Some(key) = fetch_key(&client).await? {
            tracing::debug!("✅ Token key {} loaded from database", key.fingerprint());
            return Ok(key);
        }

        tracing::warn!("⚠️  No token key found, creating...");

        let candidate = aes::generate_key();
        let inserted = client
            .execute(
                r#"
                INSERT INTO secret_keys (id, key_material, created_at)
                VALUES (1, $1, NOW())
                ON CONFLICT (id) DO NOTHING
                "#,
                &[&candidate.as_bytes().as_slice()],
            )
            .await
            .map_err(unavailable)?;

        if inserted == 1 {
            tracing::info!("✅ Token key {} created", candidate.fingerprint());
            return Ok(candidate);
        }

        let winner = fetch_key(&client)
            .await?
            .ok_or_else(|| unavailable("token key missing after concurrent insert"))?;
        tracing::info!("✅ Token key {} created by a concurrent request", winner.fingerprint());
        Ok(winner)
    }
}

async fn fetch_key(client: &deadpool_postgres::Client) -> Result<Option<SymmetricKey>, IdentityError> {
    let row = client
        .query_opt("SELECT key_material FROM secret_keys WHERE id = 1", &[])
        .await
        .map_err(unavailable)?;

    match row {
        Some(r) => {
            let material: Vec<u8> = r.try_get("key_material").map_err(unavailable)?;
            SymmetricKey::from_slice(&material)
                .map(Some)
                .ok_or_else(|| unavailable("stored token key has an invalid length"))
        }
        None => Ok(None),
    }
}

impl KeyProvider for PgKeyStore {
    async fn get_or_create_key(&self) -> Result<SymmetricKey, IdentityError> {
        if let Some(key) = self.cache.read().await.as_ref() {
            return Ok(key.clone());
        }

        let key = self.load().await?;
        *self.cache.write().await = Some(key.clone());
        Ok(key)
    }
}

/// In-process key store with the same create-once semantics, for tests and
/// single-process development runs.
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    slot: Arc<Mutex<Option<SymmetricKey>>>,
    lookups: Arc<AtomicUsize>,
}

impl MemoryKeyStore {
    /// Creates an empty store; the key is minted on first lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `key`.
    pub fn with_key(key: SymmetricKey) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(key))),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Swaps in a different key, simulating loss of the original.
    pub async fn replace(&self, key: SymmetricKey) {
        *self.slot.lock().await = Some(key);
    }

    /// The key currently held, without creating one.
    pub async fn current(&self) -> Option<SymmetricKey> {
        self.slot.lock().await.clone()
    }

    /// Number of `get_or_create_key` calls served.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl KeyProvider for MemoryKeyStore {
    async fn get_or_create_key(&self) -> Result<SymmetricKey, IdentityError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let mut slot = self.slot.lock().await;
        let key = slot.get_or_insert_with(|| {
            let key = aes::generate_key();
            tracing::info!("✅ Token key {} created in memory", key.fingerprint());
            key
        });
        Ok(key.clone())
    }
}

/// A fixed key.
#[derive(Clone)]
pub struct StaticKeyProvider {
    key: SymmetricKey,
}

impl StaticKeyProvider {
    pub fn new(key: SymmetricKey) -> Self {
        Self { key }
    }
}

impl KeyProvider for StaticKeyProvider {
    async fn get_or_create_key(&self) -> Result<SymmetricKey, IdentityError> {
        Ok(self.key.clone())
    }
}

/// The key store selected at startup.
#[derive(Clone)]
pub enum KeyBackend {
    Postgres(PgKeyStore),
    Memory(MemoryKeyStore),
}

impl KeyProvider for KeyBackend {
    async fn get_or_create_key(&self) -> Result<SymmetricKey, IdentityError> {
        match self {
            KeyBackend::Postgres(store) => store.get_or_create_key().await,
            KeyBackend::Memory(store) => store.get_or_create_key().await,
        }
    }
}
