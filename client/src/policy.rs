use shared::{Role, UserAccount};

/// Privileged operations gated on account role rather than scattered
/// password prompts: user management and truncating the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageUsers,
    ClearActivityLog,
}

/// Whether `account` may exercise `capability`. Only admin accounts
/// hold privileged capabilities; an absent role reads as member.
pub fn allows(account: &UserAccount, capability: Capability) -> bool {
    match capability {
        Capability::ManageUsers | Capability::ClearActivityLog => {
            account.role == Some(Role::Admin)
        }
    }
}
