mod keyring;

pub use keyring::{KeyInfo, KeyRing};

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use models::{ClientRole, Id};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::RwLock;

/// Verification window granted to a retired signing key during rotation.
const ROTATION_GRACE_MINUTES: i64 = 7 * 24 * 60;

const SYMMETRIC_KEY_BYTES: usize = 32;
const API_CREDENTIAL_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("signing key {0} is not loaded")]
    KeyNotFound(Id),
    #[error("active signing key has expired")]
    ActiveKeyExpired,
    #[error("token is missing its key id header")]
    MissingKeyId,
    #[error("api key signature does not verify")]
    BadSignature,
    #[error("api key not found")]
    ApiKeyNotFound,
    #[error("malformed api key credential")]
    MalformedCredential,
    #[error("user {0:?} is already registered")]
    UserExists(String),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub user_id: Id,
    pub role: ClientRole,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub audience: String,
    pub access_token_hours: i64,
}

/// A freshly minted API key: the plaintext handed to the user once, and the
/// ledger row id it was stored under.
#[derive(Debug)]
pub struct MintedApiKey {
    pub plaintext: String,
    pub api_key_id: Id,
}

#[derive(Debug)]
pub struct RegisteredUser {
    pub user_id: Id,
    pub email: String,
    pub api_key: MintedApiKey,
}

/// TokenManager owns the signing-key cache. Initialization is explicit and
/// rotation takes the write lock, so no other code path ever mutates key
/// material.
pub struct TokenManager {
    ring: RwLock<KeyRing>,
    config: TokenConfig,
}

impl TokenManager {
    /// Load the key cache from the ledger, creating and activating an
    /// initial key when none exists yet.
    pub async fn init(pool: &sqlx::PgPool, config: TokenConfig) -> Result<Self, Error> {
        let mut txn = pool.begin().await?;

        let active = match ledger_sql::encryption_keys::fetch_active(&mut txn).await? {
            Some(row) => row,
            None => {
                let material = generate_key_material();
                let id = ledger_sql::encryption_keys::insert_active(&mut txn, &material).await?;
                tracing::info!(key_id = id, "created initial signing key");
                ledger_sql::encryption_keys::fetch_active(&mut txn)
                    .await?
                    .ok_or(Error::KeyNotFound(id))?
            }
        };
        let others = ledger_sql::encryption_keys::fetch_verifiable(&mut txn).await?;
        txn.commit().await?;

        let ring = KeyRing::new(active, others);
        Ok(Self {
            ring: RwLock::new(ring),
            config,
        })
    }

    pub fn from_ring(ring: KeyRing, config: TokenConfig) -> Self {
        Self {
            ring: RwLock::new(ring),
            config,
        }
    }

    /// Issue an access token signed by the active key, with the key id in
    /// the `kid` header so verification can outlive a rotation.
    pub async fn create_access_token(
        &self,
        user_id: Id,
        email: &str,
        role: ClientRole,
    ) -> Result<String, Error> {
        let ring = self.ring.read().await;
        let (active_id, active) = ring.active()?;

        let now = Utc::now();
        let claims = TokenClaims {
            sub: email.to_string(),
            user_id,
            role,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.config.access_token_hours)).timestamp(),
        };

        let mut header = Header::new(jsonwebtoken::Algorithm::HS256);
        header.kid = Some(active_id.to_string());

        Ok(jsonwebtoken::encode(
            &header,
            &claims,
            &EncodingKey::from_secret(&active.material),
        )?)
    }

    /// Verify a token against whichever loaded key signed it.
    pub async fn verify_access_token(&self, token: &str) -> Result<TokenClaims, Error> {
        let header = jsonwebtoken::decode_header(token)?;
        let key_id: Id = header
            .kid
            .as_deref()
            .and_then(|kid| kid.parse().ok())
            .ok_or(Error::MissingKeyId)?;

        let ring = self.ring.read().await;
        let key = ring.get(key_id).ok_or(Error::KeyNotFound(key_id))?;

        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        let data = jsonwebtoken::decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(&key.material),
            &validation,
        )?;
        Ok(data.claims)
    }

    /// Register a user (admin action): insert the row and mint their first
    /// API key in one transaction. The key plaintext is returned exactly
    /// once.
    pub async fn register_user(
        &self,
        pool: &sqlx::PgPool,
        email: &str,
        role: ClientRole,
    ) -> Result<RegisteredUser, Error> {
        let ring = self.ring.read().await;
        let (active_id, active) = ring.active()?;

        let mut credential = vec![0u8; API_CREDENTIAL_BYTES];
        rand::thread_rng().fill_bytes(&mut credential);
        let signature = sign_credential(&active.material, &credential);

        let mut txn = pool.begin().await?;
        if ledger_sql::users::fetch_by_email(&mut txn, email)
            .await?
            .is_some()
        {
            return Err(Error::UserExists(email.to_string()));
        }
        let user_id = ledger_sql::users::insert(&mut txn, email, role).await?;
        let api_key_id =
            ledger_sql::api_keys::insert(&mut txn, user_id, active_id, &credential, &signature)
                .await?;
        txn.commit().await?;

        tracing::info!(user_id, "registered user");
        Ok(RegisteredUser {
            user_id,
            email: email.to_string(),
            api_key: MintedApiKey {
                plaintext: base64::encode_config(credential, base64::URL_SAFE_NO_PAD),
                api_key_id,
            },
        })
    }

    /// Revoke one of a user's API keys. Signatures under it stop resolving
    /// immediately; the signing key itself is untouched.
    pub async fn revoke_api_key(
        &self,
        pool: &sqlx::PgPool,
        user_id: Id,
        api_key_id: Id,
    ) -> Result<(), Error> {
        let mut conn = pool.acquire().await?;
        let deleted = ledger_sql::api_keys::delete(&mut conn, user_id, api_key_id).await?;
        if deleted == 0 {
            return Err(Error::ApiKeyNotFound);
        }

        tracing::info!(user_id, api_key_id, "revoked api key");
        Ok(())
    }

    /// Mint an API key for a user: a random credential, signed under the
    /// active key, persisted, and returned as url-safe base64 exactly once.
    pub async fn mint_api_key(
        &self,
        pool: &sqlx::PgPool,
        user_id: Id,
    ) -> Result<MintedApiKey, Error> {
        let ring = self.ring.read().await;
        let (active_id, active) = ring.active()?;

        let mut credential = vec![0u8; API_CREDENTIAL_BYTES];
        rand::thread_rng().fill_bytes(&mut credential);
        let signature = sign_credential(&active.material, &credential);

        let mut txn = pool.begin().await?;
        let api_key_id =
            ledger_sql::api_keys::insert(&mut txn, user_id, active_id, &credential, &signature)
                .await?;
        txn.commit().await?;

        Ok(MintedApiKey {
            plaintext: base64::encode_config(credential, base64::URL_SAFE_NO_PAD),
            api_key_id,
        })
    }

    /// Verify a presented API key and resolve it to its owning user.
    pub async fn verify_api_key(
        &self,
        pool: &sqlx::PgPool,
        plaintext: &str,
    ) -> Result<ledger_sql::api_keys::VerifiedApiKey, Error> {
        let credential = base64::decode_config(plaintext, base64::URL_SAFE_NO_PAD)
            .map_err(|_| Error::MalformedCredential)?;

        let mut conn = pool.acquire().await?;
        let row = ledger_sql::api_keys::fetch_by_credential(&mut conn, &credential)
            .await?
            .ok_or(Error::BadSignature)?;

        let ring = self.ring.read().await;
        let key = ring.get(row.key_id).ok_or(Error::KeyNotFound(row.key_id))?;

        let mut mac = Hmac::<Sha256>::new_from_slice(&key.material)
            .map_err(|_| Error::KeyNotFound(row.key_id))?;
        mac.update(&row.key_credential);
        mac.verify_slice(&row.key_signature)
            .map_err(|_| Error::BadSignature)?;

        Ok(row)
    }

    /// Rotate the signing key: persist new material, retire the old key with
    /// a verification grace window, and swap the cache atomically.
    pub async fn rotate(&self, pool: &sqlx::PgPool) -> Result<Id, Error> {
        let mut ring = self.ring.write().await;

        let material = generate_key_material();
        let mut txn = pool.begin().await?;
        let new_id =
            ledger_sql::encryption_keys::rotate(&mut txn, &material, ROTATION_GRACE_MINUTES)
                .await?;
        let active = ledger_sql::encryption_keys::fetch_active(&mut txn)
            .await?
            .ok_or(Error::KeyNotFound(new_id))?;
        let others = ledger_sql::encryption_keys::fetch_verifiable(&mut txn).await?;
        txn.commit().await?;

        *ring = KeyRing::new(active, others);
        tracing::info!(key_id = new_id, "rotated signing key");
        Ok(new_id)
    }
}

pub(crate) fn sign_credential(key: &[u8], credential: &[u8]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts keys of any length");
    mac.update(credential);
    mac.finalize().into_bytes().to_vec()
}

fn generate_key_material() -> Vec<u8> {
    let mut material = vec![0u8; SYMMETRIC_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut material);
    material
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_ring() -> KeyRing {
        KeyRing::for_tests(7, b"a-test-signing-key-of-32-bytes!!".to_vec())
    }

    fn test_config() -> TokenConfig {
        TokenConfig {
            issuer: "corpora".to_string(),
            audience: "corpora-api".to_string(),
            access_token_hours: 2,
        }
    }

    #[tokio::test]
    async fn access_token_round_trip() {
        let manager = TokenManager::from_ring(test_ring(), test_config());

        let token = manager
            .create_access_token(42, "jo@example.com", ClientRole::User)
            .await
            .unwrap();
        let claims = manager.verify_access_token(&token).await.unwrap();

        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.sub, "jo@example.com");
        assert_eq!(claims.role, ClientRole::User);
        assert_eq!(claims.iss, "corpora");
    }

    #[tokio::test]
    async fn verification_rejects_a_foreign_issuer() {
        let manager = TokenManager::from_ring(test_ring(), test_config());
        let token = manager
            .create_access_token(1, "a@example.com", ClientRole::Admin)
            .await
            .unwrap();

        let other = TokenManager::from_ring(
            test_ring(),
            TokenConfig {
                issuer: "someone-else".to_string(),
                ..test_config()
            },
        );
        assert!(other.verify_access_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn verification_requires_a_known_key_id() {
        let manager = TokenManager::from_ring(test_ring(), test_config());
        let token = manager
            .create_access_token(1, "a@example.com", ClientRole::User)
            .await
            .unwrap();

        let other = TokenManager::from_ring(
            KeyRing::for_tests(99, b"a-different-signing-key-32-bytes".to_vec()),
            test_config(),
        );
        match other.verify_access_token(&token).await {
            Err(Error::KeyNotFound(7)) => (),
            other => panic!("expected KeyNotFound(7), got {other:?}"),
        }
    }

    #[test]
    fn credential_signatures_verify_only_under_the_signing_key() {
        let credential = b"credential-bytes";
        let signature = sign_credential(b"key-one", credential);

        let mut mac = Hmac::<Sha256>::new_from_slice(b"key-one").unwrap();
        mac.update(credential);
        assert!(mac.verify_slice(&signature).is_ok());

        let mut mac = Hmac::<Sha256>::new_from_slice(b"key-two").unwrap();
        mac.update(credential);
        assert!(mac.verify_slice(&signature).is_err());
    }
}
