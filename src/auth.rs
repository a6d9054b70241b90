//! Identity and account plumbing: the authentication collaborator is an
//! external trait, the engine only sees opaque user ids. Role checks
//! are explicit: admin operations call `require_admin` themselves
//! instead of trusting the caller.

use chrono::{DateTime, Utc};

use crate::error::{PoolError, Result};
use crate::model::{Role, User};
use crate::store::PoolStore;

/// External authentication provider: hands out the opaque id of the
/// currently signed-in user, if any.
pub trait IdentityProvider {
    fn current_identity(&self) -> Option<String>;
}

/// Loads the user and verifies the admin role. Returns the record so
/// callers don't re-fetch it.
pub fn require_admin(store: &dyn PoolStore, user_id: &str) -> Result<User> {
    let user = store
        .user_by_id(user_id)?
        .ok_or_else(|| PoolError::UserNotFound(user_id.to_string()))?;
    if !user.is_admin() {
        return Err(PoolError::Forbidden(user_id.to_string()));
    }
    Ok(user)
}

/// First-authentication auto-provisioning: returns the existing profile
/// untouched, or creates a fresh one with zero points, an empty bonus
/// map and the `user` role.
pub fn ensure_profile(
    store: &dyn PoolStore,
    user_id: &str,
    email: &str,
    now: DateTime<Utc>,
) -> Result<User> {
    if let Some(existing) = store.user_by_id(user_id)? {
        return Ok(existing);
    }

    let username = default_username(user_id, email);
    let user = User {
        id: user_id.to_string(),
        username: username.clone(),
        email: email.to_string(),
        avatar_url: String::new(),
        favorite_team: None,
        pix_key: None,
        role: Role::User,
        total_points: 0,
        bonus_usage: Default::default(),
        created_at: now,
    };
    store.upsert_user(&user)?;
    Ok(user)
}

/// Email local-part, or `user_` + a uid prefix when there is no email.
pub fn default_username(user_id: &str, email: &str) -> String {
    let local = email.split('@').next().unwrap_or("").trim();
    if !local.is_empty() {
        return local.to_string();
    }
    let prefix: String = user_id.chars().take(6).collect();
    format!("user_{prefix}")
}

#[derive(Debug, Clone)]
pub struct Signup {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub avatar_url: String,
    pub favorite_team: Option<String>,
}

/// Explicit signup. Usernames are unique case-insensitively.
pub fn signup(store: &dyn PoolStore, req: &Signup, now: DateTime<Utc>) -> Result<User> {
    if store.user_by_username_ci(&req.username)?.is_some() {
        return Err(PoolError::UsernameTaken(req.username.clone()));
    }

    let user = User {
        id: req.user_id.clone(),
        username: req.username.clone(),
        email: req.email.clone(),
        avatar_url: req.avatar_url.clone(),
        favorite_team: req.favorite_team.clone(),
        pix_key: None,
        role: Role::User,
        total_points: 0,
        bonus_usage: Default::default(),
        created_at: now,
    };
    store.upsert_user(&user)?;
    Ok(user)
}

/// Fields a user may change about themselves. Role, total points and
/// the bonus map are deliberately absent.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub favorite_team: Option<Option<String>>,
    pub pix_key: Option<Option<String>>,
}

pub fn update_profile(
    store: &dyn PoolStore,
    user_id: &str,
    update: &ProfileUpdate,
) -> Result<User> {
    let mut user = store
        .user_by_id(user_id)?
        .ok_or_else(|| PoolError::UserNotFound(user_id.to_string()))?;

    if let Some(username) = &update.username {
        if !username.eq_ignore_ascii_case(&user.username) {
            if let Some(other) = store.user_by_username_ci(username)? {
                if other.id != user.id {
                    return Err(PoolError::UsernameTaken(username.clone()));
                }
            }
        }
        user.username = username.clone();
    }
    if let Some(avatar_url) = &update.avatar_url {
        user.avatar_url = avatar_url.clone();
    }
    if let Some(favorite_team) = &update.favorite_team {
        user.favorite_team = favorite_team.clone();
    }
    if let Some(pix_key) = &update.pix_key {
        user.pix_key = pix_key.clone();
    }

    store.upsert_user(&user)?;
    Ok(user)
}
