use crate::{
    crypto::{
        key_store::{KeyBackend, KeyProvider},
        token::TokenCodec,
    },
    error::{AppError, Result},
    repositories::session_record::{RecordBackend, SessionRecordStore},
};

/// The identity service wired with the backends chosen at startup.
pub type AppIdentity = IdentityService<KeyBackend, RecordBackend>;

/// Issues tokens for provider-verified subjects and resolves presented tokens.
pub struct IdentityService<K, R> {
    codec: TokenCodec<K>,
    records: R,
}

impl<K: KeyProvider, R: SessionRecordStore> IdentityService<K, R> {
    /// Creates a new `IdentityService`.
    pub fn new(codec: TokenCodec<K>, records: R) -> Self {
        Self { codec, records }
    }

    pub fn codec(&self) -> &TokenCodec<K> {
        &self.codec
    }

    pub fn records(&self) -> &R {
        &self.records
    }

    /// Issues a token for a subject the provider has just confirmed, and
    /// records the first login of that subject.
    ///
    /// # Arguments
    ///
    /// * `subject_id` - The provider-issued subject id (openid).
    /// * `provider_session_secret` - The session key returned by the provider.
    ///
    /// # Returns
    ///
    /// A `Result` containing the token. Fails with `AppError::Authentication`
    /// when the record could not be written, since the identity linkage was
    /// not durably stored.
    pub async fn issue_token(&self, subject_id: &str, provider_session_secret: &str) -> Result<String> {
        let (token, key) = self.codec.encode_with_key(subject_id).await?;

        match self
            .records
            .record_first_login(subject_id, provider_session_secret, &key)
            .await
        {
            Ok(true) => tracing::info!("✅ First login recorded for {}", subject_id),
            Ok(false) => tracing::debug!("Session record already present for {}", subject_id),
            Err(e) => {
                tracing::error!("❌ Failed to record first login for {}: {}", subject_id, e);
                return Err(AppError::Authentication(
                    "identity could not be recorded".to_string(),
                ));
            }
        }

        Ok(token)
    }

    /// Resolves a client-presented token to its subject id.
    ///
    /// Every error means the caller is unauthenticated; the variant is kept
    /// for logging and mapped to a uniform response by `AppError`.
    pub async fn resolve_token(&self, token: &str) -> Result<String> {
        let subject_id = self.codec.decode(token).await?;
        tracing::debug!("✅ Token resolved to {}", subject_id);
        Ok(subject_id)
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use super::*;
    use crate::crypto::aes::{generate_key, SymmetricKey};
    use crate::crypto::key_store::{MemoryKeyStore, StaticKeyProvider};
    use crate::crypto::token::IdentityError;
    use crate::models::session_record::SessionRecord;
    use crate::repositories::session_record::MemorySessionRecordStore;

    struct BrokenRecordStore;

    impl SessionRecordStore for BrokenRecordStore {
        fn record_first_login(
            &self,
            _subject_id: &str,
            _provider_session_secret: &str,
            _key: &SymmetricKey,
        ) -> impl Future<Output = Result<bool>> + Send {
            async { Err(AppError::Internal("disk full".to_string())) }
        }

        fn find_by_subject(&self, _subject_id: &str) -> impl Future<Output = Result<Option<SessionRecord>>> + Send {
            async { Ok(None) }
        }
    }

    #[tokio::test]
    async fn issue_records_once_and_resolves() {
        let records = MemorySessionRecordStore::new();
        let service = IdentityService::new(TokenCodec::new(MemoryKeyStore::new()), records.clone());

        let first = service.issue_token("owx_abc123", "session-1").await.unwrap();
        let second = service.issue_token("owx_abc123", "session-2").await.unwrap();

        assert_eq!(service.resolve_token(&first).await.unwrap(), "owx_abc123");
        assert_eq!(service.resolve_token(&second).await.unwrap(), "owx_abc123");
        assert_eq!(records.len().await, 1);

        let record = records.find_by_subject("owx_abc123").await.unwrap().unwrap();
        assert_eq!(record.session_key, "session-1");
        let key = service.codec().keys().get_or_create_key().await.unwrap();
        assert_eq!(SymmetricKey::from_base64(&record.secret_key), Some(key));
    }

    #[tokio::test]
    async fn record_failure_surfaces_as_authentication_failure() {
        let service = IdentityService::new(TokenCodec::new(StaticKeyProvider::new(generate_key())), BrokenRecordStore);

        let err = service.issue_token("owx_abc123", "session-1").await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn empty_subject_writes_nothing() {
        let records = MemorySessionRecordStore::new();
        let service = IdentityService::new(TokenCodec::new(MemoryKeyStore::new()), records.clone());

        let err = service.issue_token("", "session-1").await.unwrap_err();
        assert!(matches!(err, AppError::Identity(IdentityError::EmptySubject)));
        assert!(records.is_empty().await);
    }

    #[tokio::test]
    async fn foreign_tokens_do_not_resolve() {
        let service = IdentityService::new(
            TokenCodec::new(StaticKeyProvider::new(generate_key())),
            MemorySessionRecordStore::new(),
        );
        let other = TokenCodec::new(StaticKeyProvider::new(generate_key()));
        let token = other.encode("owx_abc123").await.unwrap();

        let err = service.resolve_token(&token).await.unwrap_err();
        assert!(matches!(err, AppError::Identity(IdentityError::AuthenticationFailed)));
    }
}
