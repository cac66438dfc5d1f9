//! Role-based approval eligibility.
//!
//! The ledger core never consults this module. Callers authorise an approver
//! here first and only then record the approval on the transaction.

use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Approve,
    Audit,
    Admin,
}

/// A named role. Lower `level` means more authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub level: u8,
    pub description: String,
    pub permissions: BTreeMap<String, Vec<Permission>>,
}

impl Role {
    pub fn new(name: &str, level: u8, description: &str, grants: &[(&str, &[Permission])]) -> Self {
        Role {
            name: name.to_string(),
            level,
            description: description.to_string(),
            permissions: grants
                .iter()
                .map(|(module, perms)| (module.to_string(), perms.to_vec()))
                .collect(),
        }
    }

    pub fn has_permission(&self, module: &str, permission: Permission) -> bool {
        self.permissions
            .get(module)
            .is_some_and(|perms| perms.contains(&permission))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSummary {
    pub name: String,
    pub level: u8,
    pub description: String,
}

/// Role table as recorded in the enriched genesis block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesDocument {
    pub roles: Vec<RoleSummary>,
    /// module -> role -> permissions
    pub permissions: BTreeMap<String, BTreeMap<String, Vec<Permission>>>,
}

#[derive(Debug, Clone)]
pub struct RoleManager {
    roles: BTreeMap<String, Role>,
    wallet_roles: HashMap<String, String>,
}

impl Default for RoleManager {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_wallet(wallet: &str) -> String {
    wallet.trim().to_ascii_lowercase()
}

impl RoleManager {
    /// Manager seeded with the default organisation roles.
    pub fn new() -> Self {
        use Permission::*;

        let defaults = vec![
            Role::new("CEO", 1, "Chief Executive Officer", &[
                ("accounting", &[Read, Write, Approve, Audit]),
                ("hr", &[Read, Approve, Audit]),
                ("sales", &[Read, Approve, Audit]),
                ("procurement", &[Read, Approve, Audit]),
                ("audit", &[Read, Audit]),
                ("system", &[Admin]),
            ]),
            Role::new("CFO", 2, "Chief Financial Officer", &[
                ("accounting", &[Read, Write, Approve, Audit]),
                ("hr", &[Read, Audit]),
                ("sales", &[Read, Approve, Audit]),
                ("procurement", &[Read, Approve, Audit]),
                ("audit", &[Read, Audit]),
            ]),
            Role::new("Chief Accountant", 3, "Chief Accountant", &[
                ("accounting", &[Read, Write, Approve]),
                ("audit", &[Read, Audit]),
            ]),
            Role::new("Accountant", 4, "Accountant", &[("accounting", &[Read, Write])]),
            Role::new("Data Entry", 5, "Data Entry Clerk", &[("accounting", &[Write])]),
            Role::new("HR Manager", 3, "Human Resources Manager", &[("hr", &[Read, Write, Approve])]),
            Role::new("HR Officer", 4, "Human Resources Officer", &[("hr", &[Read, Write])]),
            Role::new("Sales Manager", 3, "Sales Manager", &[("sales", &[Read, Write, Approve])]),
            Role::new("Sales Representative", 4, "Sales Representative", &[("sales", &[Read, Write])]),
            Role::new("Procurement Manager", 3, "Procurement Manager", &[
                ("procurement", &[Read, Write, Approve]),
            ]),
            Role::new("Procurement Officer", 4, "Procurement Officer", &[
                ("procurement", &[Read, Write]),
            ]),
        ];

        RoleManager {
            roles: defaults.into_iter().map(|r| (r.name.clone(), r)).collect(),
            wallet_roles: HashMap::new(),
        }
    }

    pub fn add_role(&mut self, role: Role) {
        self.roles.insert(role.name.clone(), role);
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn assign_role(&mut self, wallet: &str, role_name: &str) -> Result<()> {
        if !self.roles.contains_key(role_name) {
            return Err(ChainError::NotFound(format!("Unknown role '{}'", role_name)));
        }
        self.wallet_roles.insert(normalize_wallet(wallet), role_name.to_string());
        Ok(())
    }

    pub fn revoke_role(&mut self, wallet: &str) -> Option<String> {
        self.wallet_roles.remove(&normalize_wallet(wallet))
    }

    pub fn role_of(&self, wallet: &str) -> Option<&Role> {
        self.wallet_roles
            .get(&normalize_wallet(wallet))
            .and_then(|name| self.roles.get(name))
    }

    pub fn has_permission(&self, wallet: &str, module: &str, permission: Permission) -> bool {
        self.role_of(wallet)
            .is_some_and(|role| role.has_permission(module, permission))
    }

    pub fn authority_level(&self, wallet: &str) -> Option<u8> {
        self.role_of(wallet).map(|role| role.level)
    }

    /// Check that `wallet` holds `claimed_role`, that the role may approve in
    /// `module`, and that it is one of `allowed_roles` (empty = any approver).
    pub fn authorize_approval(
        &self,
        wallet: &str,
        claimed_role: &str,
        module: &str,
        allowed_roles: &[String],
    ) -> Result<()> {
        let role = self.role_of(wallet).ok_or_else(|| {
            ChainError::Validation(format!("Wallet {} has no assigned role", wallet))
        })?;

        if role.name != claimed_role {
            return Err(ChainError::Validation(format!(
                "Wallet {} holds role '{}', not '{}'",
                wallet, role.name, claimed_role
            )));
        }
        if !role.has_permission(module, Permission::Approve) {
            return Err(ChainError::Validation(format!(
                "Role '{}' cannot approve in module '{}'",
                role.name, module
            )));
        }
        if !allowed_roles.is_empty() && !allowed_roles.iter().any(|r| r == &role.name) {
            return Err(ChainError::Validation(format!(
                "Role '{}' is not among the allowed approvers: {}",
                role.name,
                allowed_roles.join(", ")
            )));
        }
        Ok(())
    }

    pub fn roles_document(&self) -> RolesDocument {
        let roles = self
            .roles
            .values()
            .map(|r| RoleSummary {
                name: r.name.clone(),
                level: r.level,
                description: r.description.clone(),
            })
            .collect();

        let mut permissions: BTreeMap<String, BTreeMap<String, Vec<Permission>>> = BTreeMap::new();
        for role in self.roles.values() {
            for (module, perms) in &role.permissions {
                permissions
                    .entry(module.clone())
                    .or_default()
                    .insert(role.name.clone(), perms.clone());
            }
        }

        RolesDocument { roles, permissions }
    }
}
