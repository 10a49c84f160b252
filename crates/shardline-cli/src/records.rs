//! Synthetic user records for load runs

use serde::Serialize;
use shardline_core::CompositeKey;

use crate::error::{CliError, Result};

/// Row of the `t_user` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl UserRecord {
    /// `User<id>` with a matching example.com address
    pub fn synthetic(id: i64) -> Self {
        Self {
            id,
            username: format!("User{}", id),
            email: format!("user{}@example.com", id),
        }
    }

    /// Placement key: id followed by username
    ///
    /// The id digits appear twice in the key text and `User` has an odd
    /// code-unit sum, so the hash is always odd. With an even shard count
    /// every synthetic user lands on an odd shard.
    pub fn shard_key(&self) -> CompositeKey {
        CompositeKey::builder()
            .part(self.id.to_string())
            .part(self.username.clone())
            .build()
    }
}

/// `count` users with ids `0..count`
///
/// Ids are `BIGINT`, so `count` may not exceed `i64::MAX`.
pub fn generate_users(count: u64) -> Result<impl Iterator<Item = UserRecord>> {
    let count = i64::try_from(count).map_err(|_| {
        CliError::config(format!("--records {} exceeds the largest user id {}", count, i64::MAX))
    })?;
    Ok((0..count).map(UserRecord::synthetic))
}
