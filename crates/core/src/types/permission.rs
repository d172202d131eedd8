//! Admin permission flags.
//!
//! Admins carry five independent stored flags. Authorization never reads a
//! flag directly: it asks [`AdminPermissions::allows`], which folds in the
//! super-admin rule (`manage_admins` grants everything) so that, for example,
//! effective delete permission is `delete_users OR manage_admins`.

use serde::{Deserialize, Serialize};

/// A single capability an admin can be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// List learners and toggle their active flag.
    ManageUsers,
    /// Permanently delete learner accounts.
    DeleteUsers,
    /// Manage curricula owned by learners.
    ManageCurricula,
    /// View platform statistics.
    ViewAnalytics,
    /// Super-admin: manage other admins, implies every other permission.
    ManageAdmins,
}

impl Permission {
    /// Every permission, in display order.
    pub const ALL: [Self; 5] = [
        Self::ManageUsers,
        Self::DeleteUsers,
        Self::ManageCurricula,
        Self::ViewAnalytics,
        Self::ManageAdmins,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ManageUsers => "manage_users",
            Self::DeleteUsers => "delete_users",
            Self::ManageCurricula => "manage_curricula",
            Self::ViewAnalytics => "view_analytics",
            Self::ManageAdmins => "manage_admins",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("invalid permission: {s}"))
    }
}

/// The stored permission flags of an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct AdminPermissions {
    pub manage_users: bool,
    pub delete_users: bool,
    pub manage_curricula: bool,
    pub view_analytics: bool,
    pub manage_admins: bool,
}

impl Default for AdminPermissions {
    /// Defaults for a newly created, non-super admin: everything except
    /// deleting learners and managing other admins.
    fn default() -> Self {
        Self {
            manage_users: true,
            delete_users: false,
            manage_curricula: true,
            view_analytics: true,
            manage_admins: false,
        }
    }
}

impl AdminPermissions {
    /// Flags for a super-admin. `delete_users` is stored explicitly as well.
    #[must_use]
    pub const fn super_admin() -> Self {
        Self {
            manage_users: true,
            delete_users: true,
            manage_curricula: true,
            view_analytics: true,
            manage_admins: true,
        }
    }

    /// The raw stored flag, without the super-admin rule.
    #[must_use]
    pub const fn stored(&self, permission: Permission) -> bool {
        match permission {
            Permission::ManageUsers => self.manage_users,
            Permission::DeleteUsers => self.delete_users,
            Permission::ManageCurricula => self.manage_curricula,
            Permission::ViewAnalytics => self.view_analytics,
            Permission::ManageAdmins => self.manage_admins,
        }
    }

    /// Whether the admin effectively holds `permission`.
    #[must_use]
    pub const fn allows(&self, permission: Permission) -> bool {
        self.manage_admins || self.stored(permission)
    }

    /// All effectively held permissions.
    #[must_use]
    pub fn effective(&self) -> Vec<Permission> {
        Permission::ALL
            .into_iter()
            .filter(|p| self.allows(*p))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_manage_admins_implies_delete_without_storing_it() {
        let perms = AdminPermissions {
            manage_admins: true,
            delete_users: false,
            ..AdminPermissions::default()
        };
        assert!(!perms.stored(Permission::DeleteUsers));
        assert!(perms.allows(Permission::DeleteUsers));
    }

    #[test]
    fn test_default_admin_cannot_delete() {
        let perms = AdminPermissions::default();
        assert!(!perms.allows(Permission::DeleteUsers));
        assert!(!perms.allows(Permission::ManageAdmins));
        assert!(perms.allows(Permission::ManageUsers));
    }

    #[test]
    fn test_delete_flag_alone_grants_delete() {
        let perms = AdminPermissions {
            delete_users: true,
            ..AdminPermissions::default()
        };
        assert!(perms.allows(Permission::DeleteUsers));
        assert!(!perms.allows(Permission::ManageAdmins));
    }

    #[test]
    fn test_super_admin_has_everything() {
        assert_eq!(
            AdminPermissions::super_admin().effective(),
            Permission::ALL.to_vec()
        );
    }

    #[test]
    fn test_permission_from_str() {
        assert_eq!(
            "delete_users".parse::<Permission>().unwrap(),
            Permission::DeleteUsers
        );
        assert!("root".parse::<Permission>().is_err());
    }
}
