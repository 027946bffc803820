use axum::async_trait;
use axum::extract::{FromRequest, RequestParts};
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, Json, TypedHeader};
use chrono::{DateTime, Duration, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand::{thread_rng, Rng};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{AdminAccount, AdminSession};
use crate::store::Backend;
use crate::{proceeds, AppState, Error, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    Success,
    SessionExpired,
    InvalidSession,
}

pub fn hash_password(password: &str) -> Result<String, Error> {
    Ok(Pbkdf2
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

fn verify_password(password: &str, stored: &str) -> Result<bool, Error> {
    let hash = PasswordHash::new(stored)?;
    Ok(Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok())
}

fn new_session_id() -> String {
    let ssid_bytes: [u8; 32] = thread_rng().gen();

    let mut hasher: Sha256 = Digest::new();
    hasher.update(&ssid_bytes);
    hex::encode(hasher.finalize())
}

/// Creates the configured admin account unless one with that email exists.
pub async fn seed_admin(store: &dyn Backend, email: &str, password: &str) -> Result<bool, Error> {
    if store.find_admin(email).await?.is_some() {
        return Ok(false);
    }
    store
        .insert_admin(&AdminAccount {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            created_at: Utc::now(),
        })
        .await?;
    log::info!("Seeded admin account `{}`", email);
    Ok(true)
}

pub async fn ensure_authenticated(
    session_id: Option<&str>,
    store: &dyn Backend,
) -> Result<AuthResult, Error> {
    let ssid = match session_id {
        Some(ssid) if !ssid.is_empty() => ssid,
        _ => return Ok(AuthResult::InvalidSession),
    };

    match store.find_admin_session(ssid).await? {
        Some(session) if Utc::now() > session.expires_at => {
            store.drop_admin_session(ssid).await?;
            Ok(AuthResult::SessionExpired)
        }
        Some(_) => Ok(AuthResult::Success),
        None => Ok(AuthResult::InvalidSession),
    }
}

/// Extractor that admits only requests carrying a live admin session as a
/// bearer token.
#[derive(Debug, Clone)]
pub struct AdminGuard {
    pub ssid: String,
}

#[async_trait]
impl<B> FromRequest<B> for AdminGuard
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Extension(state) = Extension::<AppState>::from_request(req)
            .await
            .map_err(|_| Error::InternalError {
                kind: "StateError",
                message: "Application state is not installed".to_string(),
            })?;
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request(req)
                .await
                .map_err(|_| Error::InvalidSession {
                    message: "Missing `Authorization: Bearer` session".to_string(),
                })?;

        let ssid = bearer.token().to_string();
        match ensure_authenticated(Some(&ssid), state.store.as_ref()).await? {
            AuthResult::Success => Ok(AdminGuard { ssid }),
            AuthResult::SessionExpired => Err(Error::InvalidSession {
                message: "Session expired, log in again".to_string(),
            }),
            AuthResult::InvalidSession => Err(Error::InvalidSession {
                message: "Unknown session".to_string(),
            }),
        }
    }
}

pub async fn login_admin(
    Extension(state): Extension<AppState>,
    Json(login): Json<LoginAdmin>,
) -> Payload<LoggedInAdmin> {
    if login.email.is_empty() || login.password.is_empty() {
        return Err(Error::MissingCredentials {
            message: "`email` and `password` are required".to_string(),
        });
    }

    let admin = match state.store.find_admin(&login.email).await? {
        Some(admin) if verify_password(&login.password, &admin.password_hash)? => admin,
        _ => {
            log::info!("Rejected login for `{}`", login.email);
            return Err(Error::AuthenticationFailure {
                message: "This portal is only for admin".to_string(),
            });
        }
    };

    if let Some(existing) = state.store.admin_session_for(admin.id).await? {
        if existing.expires_at > Utc::now() {
            // already authenticated
            return proceeds(LoggedInAdmin {
                session_id: existing.ssid,
                admin_id: existing.belongs_to,
                expires_at: existing.expires_at,
            });
        }
        state.store.drop_admin_session(&existing.ssid).await?;
    }

    let session = AdminSession {
        ssid: new_session_id(),
        belongs_to: admin.id,
        expires_at: Utc::now() + Duration::hours(state.config.session_ttl_hours),
    };
    state.store.insert_admin_session(&session).await?;
    log::info!("Admin `{}` logged in", admin.email);

    proceeds(LoggedInAdmin {
        session_id: session.ssid,
        admin_id: session.belongs_to,
        expires_at: session.expires_at,
    })
}

pub async fn logout_admin(
    admin: AdminGuard,
    Extension(state): Extension<AppState>,
) -> Payload<SessionDropped> {
    let dropped = state.store.drop_admin_session(&admin.ssid).await?;
    proceeds(SessionDropped {
        drop_success: dropped,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDropped {
    pub drop_success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedInAdmin {
    pub session_id: String,
    pub admin_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginAdmin {
    pub email: String,
    pub password: String,
}
