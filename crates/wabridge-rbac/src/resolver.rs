use wabridge_core::{Label, Role};
use wabridge_store::Store;

use crate::error::Result;
use crate::types::AllowedSessions;

/// Resolve a member's role, defaulting to [`Role::Member`] when no row exists
/// — an account's creator is expected to be granted `Administrator` out of
/// band, not implicitly by being first to message.
pub fn role_for(store: &Store, account_id: &str, uid: &str) -> Result<Role> {
    Ok(store
        .member_role(account_id, uid)?
        .and_then(|r| r.parse().ok())
        .unwrap_or_default())
}

/// Resolve the full `{role, sessions}` view for one member.
///
/// Administrators see every session label in the account, computed live from
/// the sessions table rather than an `acl` row, so a newly-created session
/// becomes visible without any ACL bookkeeping; everyone else sees exactly
/// their `acl/{uid}.sessions` list.
pub fn resolve_allowed(store: &Store, account_id: &str, uid: &str) -> Result<AllowedSessions> {
    let role = role_for(store, account_id, uid)?;
    let sessions: Vec<Label> = match role {
        Role::Administrator => store
            .list_sessions(account_id)?
            .into_iter()
            .map(|s| s.label)
            .collect(),
        Role::Member => store.acl_labels(account_id, uid)?,
    };
    Ok(AllowedSessions { role, sessions })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_sees_only_acl_labels() {
        let store = Store::open_in_memory().unwrap();
        store.ensure_account("acct1", None).unwrap();
        store.set_member_role("acct1", "u1", "member").unwrap();
        store
            .set_acl_labels("acct1", "u1", &["sales".to_string()])
            .unwrap();
        store.get_or_create_session("acct1", "sales").unwrap();
        store.get_or_create_session("acct1", "support").unwrap();

        let resolved = resolve_allowed(&store, "acct1", "u1").unwrap();
        assert_eq!(resolved.role, Role::Member);
        assert_eq!(resolved.sessions, vec!["sales".to_string()]);
    }

    #[test]
    fn admin_sees_every_session_label() {
        let store = Store::open_in_memory().unwrap();
        store.ensure_account("acct1", None).unwrap();
        store.set_member_role("acct1", "root", "administrator").unwrap();
        store.get_or_create_session("acct1", "sales").unwrap();
        store.get_or_create_session("acct1", "support").unwrap();

        let resolved = resolve_allowed(&store, "acct1", "root").unwrap();
        assert_eq!(resolved.role, Role::Administrator);
        assert_eq!(resolved.sessions.len(), 2);
    }

    #[test]
    fn unknown_member_defaults_to_empty_access() {
        let store = Store::open_in_memory().unwrap();
        store.ensure_account("acct1", None).unwrap();
        let resolved = resolve_allowed(&store, "acct1", "ghost").unwrap();
        assert_eq!(resolved.role, Role::Member);
        assert!(resolved.sessions.is_empty());
    }
}
