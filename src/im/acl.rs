//! Access-control engine: a pure function over the ACL entry list.

use crate::core::CLUSTER_ACCESS_CONTROL;
use crate::session::AuthMode;

/// ACL privilege levels, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Privilege {
    /// Read attributes and subscribe.
    View = 1,
    /// View, granted through a proxy.
    ProxyView = 2,
    /// Write attributes and invoke commands.
    Operate = 3,
    /// Operate plus cluster configuration.
    Manage = 4,
    /// Everything, including ACL administration.
    Administer = 5,
}

/// Optional target restriction of an ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AclTarget {
    /// Restrict to one endpoint, or any.
    pub endpoint: Option<u16>,
    /// Restrict to one cluster, or any.
    pub cluster: Option<u32>,
}

impl AclTarget {
    fn matches(&self, endpoint: u16, cluster: u32) -> bool {
        self.endpoint.is_none_or(|e| e == endpoint)
            && self.cluster.is_none_or(|c| c == cluster)
    }
}

/// One access-control entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    /// Privilege granted.
    pub privilege: Privilege,
    /// Auth mode the session must have.
    pub auth_mode: AuthMode,
    /// Allowed subject node ids; `None` grants to any subject.
    pub subjects: Option<Vec<u64>>,
    /// Allowed targets; `None` grants on any endpoint and cluster.
    pub targets: Option<Vec<AclTarget>>,
    /// Fabric the entry belongs to.
    pub fabric_index: u8,
}

/// Who is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessContext {
    /// Session auth mode.
    pub auth_mode: AuthMode,
    /// Peer operational node id (zero on PASE).
    pub peer_node_id: u64,
    /// Session fabric index (zero on PASE).
    pub fabric_index: u8,
}

/// Operations the Interaction Model gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Read or subscribe.
    Read,
    /// Attribute write.
    Write,
    /// Command invoke.
    Invoke,
}

/// Privilege an operation on `cluster` requires.
///
/// Writes to the Access Control cluster itself are administration.
pub fn required_privilege(operation: Operation, cluster: u32) -> Privilege {
    match operation {
        Operation::Read => Privilege::View,
        Operation::Write if cluster == CLUSTER_ACCESS_CONTROL => Privilege::Administer,
        Operation::Write | Operation::Invoke => Privilege::Operate,
    }
}

/// Whether `ctx` may perform an operation requiring `required` at
/// (`endpoint`, `cluster`).
///
/// PASE sessions carry implicit Administer privilege; everything else needs
/// a matching entry.
pub fn check_access(
    entries: &[AclEntry],
    ctx: &AccessContext,
    endpoint: u16,
    cluster: u32,
    required: Privilege,
) -> bool {
    if ctx.auth_mode == AuthMode::Pase {
        return true;
    }
    entries.iter().any(|entry| {
        entry.fabric_index == ctx.fabric_index
            && entry.auth_mode == ctx.auth_mode
            && entry.privilege >= required
            && entry
                .subjects
                .as_ref()
                .is_none_or(|subjects| subjects.contains(&ctx.peer_node_id))
            && entry
                .targets
                .as_ref()
                .is_none_or(|targets| targets.iter().any(|t| t.matches(endpoint, cluster)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: u64 = 0xAA;

    fn case_ctx() -> AccessContext {
        AccessContext { auth_mode: AuthMode::Case, peer_node_id: PEER, fabric_index: 1 }
    }

    fn admin_entry() -> AclEntry {
        AclEntry {
            privilege: Privilege::Administer,
            auth_mode: AuthMode::Case,
            subjects: Some(vec![PEER]),
            targets: None,
            fabric_index: 1,
        }
    }

    #[test]
    fn empty_acl_denies_case() {
        assert!(!check_access(&[], &case_ctx(), 1, 0x0006, Privilege::View));
    }

    #[test]
    fn pase_bypasses_acl() {
        let pase = AccessContext { auth_mode: AuthMode::Pase, peer_node_id: 0, fabric_index: 0 };
        assert!(check_access(&[], &pase, 0, CLUSTER_ACCESS_CONTROL, Privilege::Administer));
    }

    #[test]
    fn admin_entry_grants_everything() {
        let entries = [admin_entry()];
        let ctx = case_ctx();
        assert!(check_access(&entries, &ctx, 1, 0x0006, Privilege::View));
        assert!(check_access(&entries, &ctx, 1, 0x0006, Privilege::Operate));
        assert!(check_access(&entries, &ctx, 0, CLUSTER_ACCESS_CONTROL, Privilege::Administer));
    }

    #[test]
    fn view_entry_permits_reads_but_not_invokes() {
        let entries = [AclEntry { privilege: Privilege::View, ..admin_entry() }];
        let ctx = case_ctx();
        assert!(check_access(&entries, &ctx, 1, 0x0006, Privilege::View));
        assert!(!check_access(&entries, &ctx, 1, 0x0006, Privilege::Operate));
    }

    #[test]
    fn subject_and_fabric_must_match() {
        let ctx = case_ctx();
        let wrong_subject = AclEntry { subjects: Some(vec![0xBB]), ..admin_entry() };
        assert!(!check_access(&[wrong_subject], &ctx, 1, 0x0006, Privilege::View));

        let wrong_fabric = AclEntry { fabric_index: 2, ..admin_entry() };
        assert!(!check_access(&[wrong_fabric], &ctx, 1, 0x0006, Privilege::View));

        let any_subject = AclEntry { subjects: None, ..admin_entry() };
        assert!(check_access(&[any_subject], &ctx, 1, 0x0006, Privilege::View));
    }

    #[test]
    fn targets_scope_the_grant() {
        let ctx = case_ctx();
        let scoped = AclEntry {
            targets: Some(vec![AclTarget { endpoint: Some(1), cluster: Some(0x0006) }]),
            ..admin_entry()
        };
        assert!(check_access(&[scoped.clone()], &ctx, 1, 0x0006, Privilege::View));
        assert!(!check_access(&[scoped.clone()], &ctx, 2, 0x0006, Privilege::View));
        assert!(!check_access(&[scoped], &ctx, 1, 0x001D, Privilege::View));

        let endpoint_only = AclEntry {
            targets: Some(vec![AclTarget { endpoint: Some(1), cluster: None }]),
            ..admin_entry()
        };
        assert!(check_access(&[endpoint_only.clone()], &ctx, 1, 0x001D, Privilege::View));
        assert!(!check_access(&[endpoint_only], &ctx, 0, 0x001D, Privilege::View));
    }

    #[test]
    fn write_to_acl_cluster_requires_administer() {
        assert_eq!(
            required_privilege(Operation::Write, CLUSTER_ACCESS_CONTROL),
            Privilege::Administer
        );
        assert_eq!(required_privilege(Operation::Write, 0x0006), Privilege::Operate);
        assert_eq!(required_privilege(Operation::Read, CLUSTER_ACCESS_CONTROL), Privilege::View);
    }
}
