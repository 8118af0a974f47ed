//! User, role and actor models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roles recognised by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Manager,
    StoreStaff,
    KitchenStaff,
    Coordinator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Manager => "Manager",
            Role::StoreStaff => "StoreStaff",
            Role::KitchenStaff => "KitchenStaff",
            Role::Coordinator => "Coordinator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Admin" => Some(Role::Admin),
            "Manager" => Some(Role::Manager),
            "StoreStaff" => Some(Role::StoreStaff),
            "KitchenStaff" => Some(Role::KitchenStaff),
            "Coordinator" => Some(Role::Coordinator),
            _ => None,
        }
    }

    /// Admin and Manager run the central kitchen side of a transfer
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller of an operation: who they are, their role and store affiliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    pub store_id: Option<Uuid>,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role, store_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            role,
            store_id,
        }
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    /// Whether this actor belongs to the given store
    pub fn works_at(&self, store_id: Uuid) -> bool {
        self.store_id == Some(store_id)
    }
}

/// User fields shown as the creator of a transfer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: Uuid,
    pub full_name: String,
    pub username: String,
}
