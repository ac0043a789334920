use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::users::repo::{StoreError, UserRepository};
use crate::users::repo_types::{NewUser, ProfileUpdate, User};

#[derive(Default)]
struct Table {
    last_id: i64,
    rows: BTreeMap<i64, User>,
}

impl Table {
    /// Field that would collide with another row, ignoring row `except`.
    fn conflict(&self, username: Option<&str>, email: Option<&str>, except: Option<i64>) -> Option<&'static str> {
        let others = self.rows.values().filter(|u| Some(u.id) != except);
        for u in others {
            if username.is_some_and(|n| n == u.username) {
                return Some("username");
            }
            if email.is_some() && email == u.email.as_deref() {
                return Some("email");
            }
        }
        None
    }
}

/// Process-local user table. Each write holds the lock for its whole
/// check-and-write, which gives the same guarantees as the table constraints.
#[derive(Default)]
pub struct InMemoryUserRepository {
    table: RwLock<Table>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        let mut table = self.table.write().await;
        if let Some(field) = table.conflict(Some(&new.username), new.email.as_deref(), None) {
            return Err(StoreError::Duplicate { field });
        }
        table.last_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: table.last_id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let table = self.table.read().await;
        Ok(table.rows.values().find(|u| u.username == username).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.table.read().await.rows.values().cloned().collect())
    }

    async fn update_profile(&self, id: i64, update: ProfileUpdate) -> Result<Option<User>, StoreError> {
        let mut table = self.table.write().await;
        if !table.rows.contains_key(&id) {
            return Ok(None);
        }
        if let Some(field) = table.conflict(update.username.as_deref(), update.email.as_deref(), Some(id)) {
            return Err(StoreError::Duplicate { field });
        }
        let Some(user) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        update.apply(user);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<Option<User>, StoreError> {
        let mut table = self.table.write().await;
        Ok(table.rows.get_mut(&id).map(|user| {
            user.password_hash = password_hash.to_string();
            user.updated_at = OffsetDateTime::now_utc();
            user.clone()
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.table.write().await.rows.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: Option<&str>) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.map(Into::into),
            password_hash: "$argon2id$stub".into(),
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_username_and_email() {
        let repo = InMemoryUserRepository::new();
        repo.insert(new_user("ada", Some("ada@example.com"))).await.unwrap();

        let err = repo.insert(new_user("ada", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "username" }));

        let err = repo
            .insert(new_user("grace", Some("ada@example.com")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "email" }));

        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn users_without_email_do_not_collide() {
        let repo = InMemoryUserRepository::new();
        repo.insert(new_user("ada", None)).await.unwrap();
        repo.insert(new_user("grace", None)).await.unwrap();
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let repo = InMemoryUserRepository::new();
        let first = repo.insert(new_user("ada", None)).await.unwrap();
        assert!(repo.delete(first.id).await.unwrap());
        let second = repo.insert(new_user("ada", None)).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn update_profile_checks_other_rows_only() {
        let repo = InMemoryUserRepository::new();
        let ada = repo.insert(new_user("ada", Some("ada@example.com"))).await.unwrap();
        repo.insert(new_user("grace", None)).await.unwrap();

        // re-submitting your own values is not a conflict
        let same = ProfileUpdate {
            username: Some("ada".into()),
            email: Some("ada@example.com".into()),
        };
        assert!(repo.update_profile(ada.id, same).await.unwrap().is_some());

        let clash = ProfileUpdate {
            username: Some("grace".into()),
            email: None,
        };
        let err = repo.update_profile(ada.id, clash).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "username" }));
    }

    #[tokio::test]
    async fn missing_ids_report_none() {
        let repo = InMemoryUserRepository::new();
        assert!(repo.find_by_id(7).await.unwrap().is_none());
        assert!(repo
            .update_profile(7, ProfileUpdate::default())
            .await
            .unwrap()
            .is_none());
        assert!(repo.update_password_hash(7, "x").await.unwrap().is_none());
        assert!(!repo.delete(7).await.unwrap());
    }
}
