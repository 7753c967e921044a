//! Accounts, roles and bearer tokens.
//!
//! - Passwords are hashed with Argon2id (PHC strings stored in `users`).
//! - Registration is two explicit steps: [`create_user`] inserts the
//!   account, [`provision_role`] writes its role record. [`register`] runs
//!   both.
//! - Tokens are HS256 JWTs. Access tokens authorize API calls; refresh
//!   tokens can only be traded for a new access token.
//! - Admin checks read the role from the store on every request, so a role
//!   change takes effect without reissuing tokens.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::config::AuthConfig;
use crate::models::{Role, User};
use crate::store::Store;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication credentials were not provided")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Forbidden")]
    Forbidden,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

// ============ Passwords ============

/// Hash a password with Argon2id, returning the PHC string.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))
}

/// Check a password against a stored PHC hash.
pub fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("invalid password hash format: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

// ============ Accounts ============

/// Insert a new account with a hashed password. No role is provisioned.
pub async fn create_user(store: &dyn Store, username: &str, password: &str) -> anyhow::Result<User> {
    let username = username.trim();
    if username.is_empty() {
        anyhow::bail!("username must not be empty");
    }
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    let hash = hash_password(password)?;
    store.create_user(username, &hash).await
}

/// Write the account's role record.
pub async fn provision_role(store: &dyn Store, user: &User, role: Role) -> anyhow::Result<()> {
    store.set_role(user.id, role).await
}

/// Create an account and provision its role.
pub async fn register(
    store: &dyn Store,
    username: &str,
    password: &str,
    role: Role,
) -> anyhow::Result<User> {
    let user = create_user(store, username, password).await?;
    provision_role(store, &user, role).await?;
    Ok(user)
}

/// Change the role of an existing account by username.
pub async fn set_role(store: &dyn Store, username: &str, role: Role) -> anyhow::Result<User> {
    let user = store
        .find_user(username)
        .await?
        .ok_or_else(|| anyhow::anyhow!("user not found: {}", username))?;
    provision_role(store, &user, role).await?;
    Ok(user)
}

/// The account's role; accounts without a role record are students.
pub async fn role_of(store: &dyn Store, user_id: i64) -> anyhow::Result<Role> {
    Ok(store.get_role(user_id).await?.unwrap_or_default())
}

/// Verify credentials and return the account.
pub async fn authenticate(store: &dyn Store, username: &str, password: &str) -> Result<User, AuthError> {
    let user = store
        .find_user(username.trim())
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if verify_password(password, &user.password_hash)? {
        Ok(user)
    } else {
        Err(AuthError::InvalidCredentials)
    }
}

// ============ Tokens ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub username: String,
    pub kind: TokenKind,
    pub iat: u64,
    pub exp: u64,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AuthError> {
        self.sub
            .parse()
            .map_err(|_| AuthError::InvalidToken("malformed subject".into()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Issues and validates signed tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl TokenIssuer {
    pub fn new(secret: &str, access_ttl_secs: u64, refresh_ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        let secret = config.resolve_secret()?;
        Ok(Self::new(
            &secret,
            config.access_ttl_secs,
            config.refresh_ttl_secs,
        ))
    }

    pub fn issue(&self, user: &User, kind: TokenKind) -> Result<String, AuthError> {
        let now = unix_now()?;
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        };
        self.encode_claims(&Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            kind,
            iat: now,
            exp: now + ttl,
        })
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access: self.issue(user, TokenKind::Access)?,
            refresh: self.issue(user, TokenKind::Refresh)?,
        })
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("failed to sign token: {e}")))
    }

    /// Validate signature, expiry and kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if data.claims.kind != expected {
            return Err(AuthError::InvalidToken("wrong token type".into()));
        }
        Ok(data.claims)
    }

    /// Trade a valid refresh token for a new access token.
    pub async fn refresh(&self, store: &dyn Store, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self.verify(refresh_token, TokenKind::Refresh)?;
        let user = store
            .find_user_by_id(claims.user_id()?)
            .await?
            .ok_or_else(|| AuthError::InvalidToken("user no longer exists".into()))?;
        self.issue(&user, TokenKind::Access)
    }
}

fn unix_now() -> Result<u64, AuthError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("system time error: {e}")))
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve an `Authorization` header to an admin account.
///
/// Missing or invalid credentials yield [`AuthError::MissingToken`] /
/// [`AuthError::InvalidToken`] (401); a valid non-admin yields
/// [`AuthError::Forbidden`] (403).
pub async fn require_admin(
    store: &dyn Store,
    issuer: &TokenIssuer,
    authorization: Option<&str>,
) -> Result<User, AuthError> {
    let token = bearer_token(authorization).ok_or(AuthError::MissingToken)?;
    let claims = issuer.verify(token, TokenKind::Access)?;
    let user = store
        .find_user_by_id(claims.user_id()?)
        .await?
        .ok_or_else(|| AuthError::InvalidToken("user no longer exists".into()))?;
    if role_of(store, user.id).await? != Role::Admin {
        return Err(AuthError::Forbidden);
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret-with-enough-length-1234", 3600, 86400)
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct-horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct-horse", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
        assert!(verify_password("x", "not-a-hash").is_err());
    }

    #[tokio::test]
    async fn test_register_provisions_role_explicitly() {
        let store = InMemoryStore::new();
        let bare = create_user(&store, "plain", "pw").await.unwrap();
        assert_eq!(store.get_role(bare.id).await.unwrap(), None);
        assert_eq!(role_of(&store, bare.id).await.unwrap(), Role::Student);

        let staff = register(&store, "clerk", "pw", Role::Staff).await.unwrap();
        assert_eq!(store.get_role(staff.id).await.unwrap(), Some(Role::Staff));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let store = InMemoryStore::new();
        register(&store, "admin", "s3cret", Role::Admin).await.unwrap();

        assert!(authenticate(&store, "admin", "s3cret").await.is_ok());
        assert!(matches!(
            authenticate(&store, "admin", "nope").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            authenticate(&store, "ghost", "s3cret").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_require_admin_statuses() {
        let store = InMemoryStore::new();
        let admin = register(&store, "admin", "pw", Role::Admin).await.unwrap();
        let student = register(&store, "student", "pw", Role::Student).await.unwrap();
        let issuer = issuer();

        let admin_header = format!("Bearer {}", issuer.issue(&admin, TokenKind::Access).unwrap());
        let student_header = format!("Bearer {}", issuer.issue(&student, TokenKind::Access).unwrap());
        let refresh_header = format!("Bearer {}", issuer.issue(&admin, TokenKind::Refresh).unwrap());

        assert!(require_admin(&store, &issuer, Some(&admin_header)).await.is_ok());
        assert!(matches!(
            require_admin(&store, &issuer, None).await,
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            require_admin(&store, &issuer, Some("Bearer garbage")).await,
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            require_admin(&store, &issuer, Some(&refresh_header)).await,
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            require_admin(&store, &issuer, Some(&student_header)).await,
            Err(AuthError::Forbidden)
        ));

        // promotion takes effect without a new token
        set_role(&store, "student", Role::Admin).await.unwrap();
        assert!(require_admin(&store, &issuer, Some(&student_header)).await.is_ok());
    }

    #[tokio::test]
    async fn test_token_from_other_secret_rejected() {
        let store = InMemoryStore::new();
        let admin = register(&store, "admin", "pw", Role::Admin).await.unwrap();
        let other = TokenIssuer::new("a-completely-different-secret-9876", 3600, 86400);
        let header = format!("Bearer {}", other.issue(&admin, TokenKind::Access).unwrap());
        assert!(matches!(
            require_admin(&store, &issuer(), Some(&header)).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = issuer();
        let token = issuer
            .encode_claims(&Claims {
                sub: "1".into(),
                username: "admin".into(),
                kind: TokenKind::Access,
                iat: 1_000,
                exp: 2_000,
            })
            .unwrap();
        assert!(matches!(
            issuer.verify(&token, TokenKind::Access),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_issues_access_token() {
        let store = InMemoryStore::new();
        let user = register(&store, "admin", "pw", Role::Admin).await.unwrap();
        let issuer = issuer();
        let pair = issuer.issue_pair(&user).unwrap();

        let access = issuer.refresh(&store, &pair.refresh).await.unwrap();
        let claims = issuer.verify(&access, TokenKind::Access).unwrap();
        assert_eq!(claims.username, "admin");

        // an access token cannot be used to refresh
        assert!(issuer.refresh(&store, &pair.access).await.is_err());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(None), None);
    }
}
