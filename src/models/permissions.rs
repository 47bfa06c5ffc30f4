//! Who may manage global assets.
//!
//! The library doesn't know about groups or staff flags. Whoever embeds it
//! answers that question through [`GlobalPermissions`].

use crate::models::{asset::AssetKind, user::UserId};

pub trait GlobalPermissions: Send + Sync {
    /// Whether `user` may create, edit or delete global assets of `kind`.
    fn can_manage_global(&self, user: UserId, kind: AssetKind) -> bool;
}

impl<F> GlobalPermissions for F
where
    F: Fn(UserId, AssetKind) -> bool + Send + Sync,
{
    fn can_manage_global(&self, user: UserId, kind: AssetKind) -> bool {
        self(user, kind)
    }
}

/// Nobody manages global assets.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoGlobalPermissions;

impl GlobalPermissions for NoGlobalPermissions {
    fn can_manage_global(&self, _user: UserId, _kind: AssetKind) -> bool {
        false
    }
}

/// A fixed list of users who manage every kind.
#[derive(Clone, Debug, Default)]
pub struct GlobalManagers(pub Vec<UserId>);

impl GlobalPermissions for GlobalManagers {
    fn can_manage_global(&self, user: UserId, _kind: AssetKind) -> bool {
        self.0.contains(&user)
    }
}
