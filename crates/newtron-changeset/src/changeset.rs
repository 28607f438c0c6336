//! The ChangeSet type and its lifecycle.

use chrono::{DateTime, Utc};
use newtron_client::{SonicClient, VerificationResult};
use newtron_configdb::{Change, ChangeKind, FieldValues};
use std::fmt::Write as _;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{ChangeError, ChangeResult};

/// An ordered sequence of CONFIG_DB mutations against one device.
///
/// Ordering is significant: creates come before references to them,
/// deletes of children before their parents. Apply writes in
/// declaration order; rollback inverts in reverse.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    device: String,
    operation: String,
    created_at: DateTime<Utc>,
    changes: Vec<Change>,
    /// 0 before apply; after apply, the number of entries definitely
    /// written (all of them on success).
    applied_count: usize,
    verification: Option<VerificationResult>,
}

impl ChangeSet {
    /// An empty set labeled with the device and the operation that
    /// produced it (e.g. "apply-service customer-l3").
    pub fn new(device: impl Into<String>, operation: impl Into<String>) -> Self {
        ChangeSet {
            device: device.into(),
            operation: operation.into(),
            created_at: Utc::now(),
            changes: Vec::new(),
            applied_count: 0,
            verification: None,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn applied_count(&self) -> usize {
        self.applied_count
    }

    pub fn verification(&self) -> Option<&VerificationResult> {
        self.verification.as_ref()
    }

    /// Appends a change.
    pub fn add(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Appends an ADD of a new row.
    pub fn add_create(
        &mut self,
        table: impl Into<String>,
        key: impl Into<String>,
        new_fields: FieldValues,
    ) {
        self.add(Change::add(table, key, new_fields));
    }

    /// Appends a MODIFY replacing a row.
    pub fn add_modify(
        &mut self,
        table: impl Into<String>,
        key: impl Into<String>,
        old_fields: FieldValues,
        new_fields: FieldValues,
    ) {
        self.add(Change::modify(table, key, old_fields, new_fields));
    }

    /// Appends a DELETE of an existing row.
    pub fn add_delete(
        &mut self,
        table: impl Into<String>,
        key: impl Into<String>,
        old_fields: FieldValues,
    ) {
        self.add(Change::delete(table, key, old_fields));
    }

    /// Renders a deterministic, human-readable preview grouped by
    /// change. Stable across runs for identical sets.
    pub fn preview(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "== {} on {} ({} changes) ==",
            self.operation,
            self.device,
            self.changes.len()
        );
        for (i, change) in self.changes.iter().enumerate() {
            let _ = writeln!(
                out,
                "[{:>3}] {:<6} {}|{}",
                i + 1,
                change.kind.as_str(),
                change.table,
                change.key
            );
            match change.kind {
                ChangeKind::Add => {
                    if let Some(fields) = &change.new_fields {
                        for (field, value) in fields {
                            let _ = writeln!(out, "        {} = {}", field, value);
                        }
                    }
                }
                ChangeKind::Modify => {
                    if let Some(fields) = &change.old_fields {
                        for (field, value) in fields {
                            let _ = writeln!(out, "      - {} = {}", field, value);
                        }
                    }
                    if let Some(fields) = &change.new_fields {
                        for (field, value) in fields {
                            let _ = writeln!(out, "      + {} = {}", field, value);
                        }
                    }
                }
                ChangeKind::Delete => {
                    if let Some(fields) = &change.old_fields {
                        for (field, value) in fields {
                            let _ = writeln!(out, "      - {} = {}", field, value);
                        }
                    }
                }
            }
        }
        out
    }

    /// Writes all changes through the client in declaration order.
    ///
    /// On success, applied_count equals the set length. On failure, the
    /// error reports how many entries were definitely written,
    /// applied_count records that number, and the caller decides
    /// whether to roll back.
    #[instrument(skip(self, client, token), fields(device = %self.device, operation = %self.operation))]
    pub async fn apply(
        &mut self,
        client: &dyn SonicClient,
        token: &CancellationToken,
    ) -> ChangeResult<usize> {
        if self.changes.is_empty() {
            debug!("Empty change set, nothing to apply");
            return Ok(0);
        }

        match client.apply_changes(token, &self.changes).await {
            Ok(applied) => {
                self.applied_count = applied;
                info!(applied, "Applied change set");
                Ok(applied)
            }
            Err(err) => {
                self.applied_count = err.applied;
                warn!(
                    applied = err.applied,
                    total = err.total,
                    "Change set apply failed partway"
                );
                Err(ChangeError::PartialApply {
                    applied: err.applied,
                    total: err.total,
                    source: err.source,
                })
            }
        }
    }

    /// Re-reads the affected rows and compares them with the expected
    /// post-state. Read-only; records the result on the set.
    pub async fn verify(
        &mut self,
        client: &dyn SonicClient,
        token: &CancellationToken,
    ) -> ChangeResult<&VerificationResult> {
        let result = client.verify_changes(token, &self.changes).await?;
        if result.passed() {
            debug!(device = %self.device, checks = result.checks.len(), "Verification passed");
        } else {
            warn!(
                device = %self.device,
                failures = result.failure_count(),
                "Verification found mismatches"
            );
        }
        Ok(self.verification.insert(result))
    }

    /// Applies the inverse of every applied change, last first.
    ///
    /// Best-effort: every inverse is attempted even after failures, and
    /// the failures come back joined so the operator sees the complete
    /// picture. The caller must re-verify after rollback.
    #[instrument(skip(self, client, token), fields(device = %self.device, operation = %self.operation))]
    pub async fn rollback(
        &mut self,
        client: &dyn SonicClient,
        token: &CancellationToken,
    ) -> ChangeResult<()> {
        if self.applied_count == 0 {
            return Err(ChangeError::NothingApplied);
        }

        let mut errors = Vec::new();
        for change in self.changes[..self.applied_count].iter().rev() {
            let inverse = change.inverse();
            debug!(change = %inverse, "Rolling back");
            if let Err(err) = client.apply_changes(token, &[inverse]).await {
                errors.push(format!("{}|{}: {}", change.table, change.key, err.source));
            }
        }

        if errors.is_empty() {
            info!(rolled_back = self.applied_count, "Rollback complete");
            self.applied_count = 0;
            Ok(())
        } else {
            warn!(failures = errors.len(), "Rollback incomplete");
            Err(ChangeError::RollbackFailed { errors })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newtron_client::mock::MockSonicClient;
    use newtron_configdb::fields;
    use pretty_assertions::assert_eq;

    fn three_adds() -> ChangeSet {
        let mut cs = ChangeSet::new("leaf1", "test");
        cs.add_create("VLAN", "Vlan100", fields! {"vlanid" => "100"});
        cs.add_create("VLAN_MEMBER", "Vlan100|Ethernet0", fields! {"tagging_mode" => "untagged"});
        cs.add_create("SUPPRESS_VLAN_NEIGH", "Vlan100", fields! {"suppress" => "on"});
        cs
    }

    #[tokio::test]
    async fn test_apply_success_sets_applied_count() {
        let client = MockSonicClient::new();
        client.connect().await.unwrap();
        let token = CancellationToken::new();

        let mut cs = three_adds();
        assert_eq!(cs.applied_count(), 0);
        let applied = cs.apply(client.as_ref(), &token).await.unwrap();
        assert_eq!(applied, 3);
        assert_eq!(cs.applied_count(), 3);
    }

    #[tokio::test]
    async fn test_apply_empty_set() {
        let client = MockSonicClient::new();
        client.connect().await.unwrap();
        let token = CancellationToken::new();

        let mut cs = ChangeSet::new("leaf1", "noop");
        assert_eq!(cs.apply(client.as_ref(), &token).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_verify_after_apply() {
        let client = MockSonicClient::new();
        client.connect().await.unwrap();
        let token = CancellationToken::new();

        let mut cs = three_adds();
        cs.apply(client.as_ref(), &token).await.unwrap();
        let result = cs.verify(client.as_ref(), &token).await.unwrap();
        assert!(result.passed());
    }

    #[tokio::test]
    async fn test_partial_apply_then_rollback_restores_state() {
        let client = MockSonicClient::new();
        client.connect().await.unwrap();
        let token = CancellationToken::new();
        let before = client.db();

        client.fail_apply_at(2);
        let mut cs = three_adds();
        let err = cs.apply(client.as_ref(), &token).await.unwrap_err();
        assert!(matches!(
            err,
            ChangeError::PartialApply { applied: 2, total: 3, .. }
        ));
        assert_eq!(cs.applied_count(), 2);

        client.clear_failures();
        cs.rollback(client.as_ref(), &token).await.unwrap();
        assert_eq!(cs.applied_count(), 0);
        assert_eq!(client.db(), before);
    }

    #[tokio::test]
    async fn test_rollback_reverses_order() {
        let client = MockSonicClient::new();
        client.connect().await.unwrap();
        let token = CancellationToken::new();

        let mut cs = three_adds();
        cs.apply(client.as_ref(), &token).await.unwrap();
        cs.rollback(client.as_ref(), &token).await.unwrap();

        // one apply_changes(3) for the apply, then one apply_changes(1)
        // per inverse
        let calls = client.calls();
        let applies: Vec<&String> = calls.iter().filter(|c| c.starts_with("apply")).collect();
        assert_eq!(applies.len(), 4);
        assert!(client.db().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_without_apply_is_refused() {
        let client = MockSonicClient::new();
        client.connect().await.unwrap();
        let token = CancellationToken::new();

        let mut cs = three_adds();
        let err = cs.rollback(client.as_ref(), &token).await.unwrap_err();
        assert!(matches!(err, ChangeError::NothingApplied));
    }

    #[test]
    fn test_preview_is_deterministic_and_grouped() {
        let mut cs = ChangeSet::new("leaf1", "apply-service customer-l2");
        cs.add_create("VLAN", "Vlan100", fields! {"vlanid" => "100"});
        cs.add_modify(
            "ACL_TABLE",
            "customer-l2-in",
            fields! {"ports" => "Ethernet0"},
            fields! {"ports" => "Ethernet0,Ethernet4"},
        );
        cs.add_delete("VLAN_MEMBER", "Vlan100|Ethernet0", fields! {"tagging_mode" => "untagged"});

        let preview = cs.preview();
        assert_eq!(preview, cs.preview());
        assert!(preview.starts_with("== apply-service customer-l2 on leaf1 (3 changes) =="));
        assert!(preview.contains("[  1] ADD    VLAN|Vlan100"));
        assert!(preview.contains("        vlanid = 100"));
        assert!(preview.contains("      - ports = Ethernet0\n      + ports = Ethernet0,Ethernet4"));
        assert!(preview.contains("[  3] DELETE VLAN_MEMBER|Vlan100|Ethernet0"));
    }
}
