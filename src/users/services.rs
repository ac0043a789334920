use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::users::password::{hash_password, verify_against_dummy, verify_password};
use crate::users::repo::UserRepository;
use crate::users::repo_types::{NewUser, ProfileUpdate, User};

/// Account lifecycle and credential checks on top of a [`UserRepository`].
#[derive(Clone)]
pub struct AccountStore {
    users: Arc<dyn UserRepository>,
}

fn required(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Trims a supplied value and rejects it when nothing is left.
fn present(field: &str, value: Option<String>) -> AppResult<Option<String>> {
    match value {
        Some(v) => {
            required(field, &v)?;
            Ok(Some(v.trim().to_string()))
        }
        None => Ok(None),
    }
}

async fn hash_off_thread(plain: String) -> AppResult<String> {
    let hash = tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .context("hashing task panicked")?
        .context("hash password")?;
    Ok(hash)
}

impl AccountStore {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    pub async fn create(&self, username: &str, password: String, email: Option<String>) -> AppResult<User> {
        required("username", username)?;
        required("password", &password)?;
        let email = present("email", email)?;

        let password_hash = hash_off_thread(password).await?;
        let user = self
            .users
            .insert(NewUser {
                username: username.trim().to_string(),
                email,
                password_hash,
            })
            .await?;

        info!(user_id = user.id, username = %user.username, "user created");
        Ok(user)
    }

    /// Unknown usernames and wrong passwords both come back as `false`.
    pub async fn verify_credentials(&self, username: &str, password: String) -> AppResult<bool> {
        required("username", username)?;
        required("password", &password)?;

        let user = self.users.find_by_username(username.trim()).await?;
        let verified = tokio::task::spawn_blocking(move || match user {
            Some(user) => verify_password(&password, &user.password_hash),
            None => Ok(verify_against_dummy(&password)),
        })
        .await
        .context("verify task panicked")?
        .context("stored password hash is unreadable")?;

        if verified {
            debug!(username = %username.trim(), "credentials verified");
        } else {
            warn!(username = %username.trim(), "credentials rejected");
        }
        Ok(verified)
    }

    pub async fn list_all(&self) -> AppResult<Vec<User>> {
        Ok(self.users.list().await?)
    }

    pub async fn update_profile(&self, id: i64, update: ProfileUpdate) -> AppResult<User> {
        let update = ProfileUpdate {
            username: present("username", update.username)?,
            email: present("email", update.email)?,
        };

        let updated = if update.is_empty() {
            self.users.find_by_id(id).await?
        } else {
            self.users.update_profile(id, update).await?
        };
        let user = updated.ok_or_else(|| AppError::user_not_found(id))?;

        info!(user_id = user.id, "profile updated");
        Ok(user)
    }

    pub async fn update_password(&self, id: i64, new_password: String) -> AppResult<User> {
        required("password", &new_password)?;
        if self.users.find_by_id(id).await?.is_none() {
            return Err(AppError::user_not_found(id));
        }

        let password_hash = hash_off_thread(new_password).await?;
        let user = self
            .users
            .update_password_hash(id, &password_hash)
            .await?
            .ok_or_else(|| AppError::user_not_found(id))?;

        info!(user_id = user.id, "password updated");
        Ok(user)
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        if !self.users.delete(id).await? {
            return Err(AppError::user_not_found(id));
        }
        info!(user_id = id, "user deleted");
        Ok(())
    }
}
