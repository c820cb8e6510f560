// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Android keeps each user's app uids in a block of this size.
pub const PER_USER_RANGE: u32 = 100_000;

/// Identifies an Android user profile (`0` is the system/owner user)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserHandle(pub i32);

impl UserHandle {
    pub const SYSTEM: UserHandle = UserHandle(0);

    /// Used for areas that are not specific to a single user
    pub const ALL: UserHandle = UserHandle(-1);

    pub fn id(self) -> i32 {
        self.0
    }

    /// Derive the owning user from a process uid
    pub fn from_uid(uid: u32) -> Self {
        Self((uid / PER_USER_RANGE) as i32)
    }
}

impl std::fmt::Display for UserHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_is_derived_from_uid_block() {
        assert_eq!(UserHandle::from_uid(10_123), UserHandle(0));
        assert_eq!(UserHandle::from_uid(1_010_123), UserHandle(10));
    }
}
