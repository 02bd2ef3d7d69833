//! Persistence contract for user stores.

use std::ops::ControlFlow;

use async_trait::async_trait;

use crate::AuthError;

use super::UserRecord;

/// Callback handed each row by [`UserStore::list_users`].
///
/// Returning [`ControlFlow::Break`] stops the iteration early.
pub type UserVisitor<'a> = &'a mut (dyn FnMut(UserRecord) -> ControlFlow<()> + Send);

/// Durable storage of user records.
///
/// Implementations only move data; live accounting and policy belong to
/// [`StoreAuth`](super::StoreAuth), which wraps a `UserStore`. Writes must be
/// durable once they return.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Insert or overwrite every column of `record`.
    ///
    /// Fails with [`AuthError::InvalidInput`] if the hash is empty.
    async fn save_user(&self, record: &UserRecord) -> Result<(), AuthError>;

    /// Point lookup; [`AuthError::NotFound`] if the hash is absent.
    async fn load_user(&self, hash: &str) -> Result<UserRecord, AuthError>;

    /// Delete a user. Deleting an absent hash succeeds.
    async fn delete_user(&self, hash: &str) -> Result<(), AuthError>;

    /// Visit every stored user in unspecified order.
    async fn list_users(&self, visit: UserVisitor<'_>) -> Result<(), AuthError>;

    /// Overwrite only the counters of an existing user.
    ///
    /// Fails with [`AuthError::NotFound`] if the hash is absent; no row is
    /// created.
    async fn update_user_traffic(&self, hash: &str, sent: u64, recv: u64)
    -> Result<(), AuthError>;

    /// Release the engine handle. Later calls fail with [`AuthError::Closed`].
    async fn close(&self) -> Result<(), AuthError>;

    /// Collect every stored user.
    async fn collect_users(&self) -> Result<Vec<UserRecord>, AuthError> {
        let mut users = Vec::new();
        self.list_users(&mut |record| {
            users.push(record);
            ControlFlow::Continue(())
        })
        .await?;
        Ok(users)
    }
}
