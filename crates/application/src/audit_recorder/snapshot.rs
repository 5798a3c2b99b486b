use scribe_domain::{EntityState, PendingChange};

/// Pending changes of one commit attempt, split by identifier availability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSnapshot {
    identifier_known: Vec<PendingChange>,
    identifier_pending: Vec<PendingChange>,
}

impl ChangeSnapshot {
    /// Partitions tracked entries into modified/deleted and added changes.
    ///
    /// Entries without a pending write are dropped. Tracking order is preserved within each set.
    #[must_use]
    pub fn collect(changes: impl IntoIterator<Item = PendingChange>) -> Self {
        let mut snapshot = Self::default();
        for change in changes {
            match change.state {
                EntityState::Modified | EntityState::Deleted => {
                    snapshot.identifier_known.push(change);
                }
                EntityState::Added => snapshot.identifier_pending.push(change),
                EntityState::Unchanged | EntityState::Detached => {}
            }
        }
        snapshot
    }

    /// Returns changes whose identifier is available before commit.
    #[must_use]
    pub fn identifier_known(&self) -> &[PendingChange] {
        &self.identifier_known
    }

    /// Returns added changes whose identifier is assigned by the commit.
    #[must_use]
    pub fn identifier_pending(&self) -> &[PendingChange] {
        &self.identifier_pending
    }

    /// Returns whether the attempt has nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identifier_known.is_empty() && self.identifier_pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use scribe_domain::{EntityState, EntryHandle, FieldValues, PendingChange};

    use super::ChangeSnapshot;

    fn change(handle: u64, state: EntityState) -> PendingChange {
        PendingChange {
            handle: EntryHandle::new(handle),
            entity_type_name: "customer".to_owned(),
            key_field_name: "id".to_owned(),
            state,
            prior_values: Some(FieldValues::new()),
            current_values: Some(FieldValues::new()),
        }
    }

    #[test]
    fn partitions_by_identifier_availability() {
        let snapshot = ChangeSnapshot::collect(vec![
            change(1, EntityState::Added),
            change(2, EntityState::Modified),
            change(3, EntityState::Unchanged),
            change(4, EntityState::Deleted),
            change(5, EntityState::Added),
        ]);

        let known: Vec<u64> = snapshot
            .identifier_known()
            .iter()
            .map(|change| change.handle.value())
            .collect();
        let pending: Vec<u64> = snapshot
            .identifier_pending()
            .iter()
            .map(|change| change.handle.value())
            .collect();

        assert_eq!(known, vec![2, 4]);
        assert_eq!(pending, vec![1, 5]);
    }

    #[test]
    fn unchanged_entries_leave_snapshot_empty() {
        let snapshot = ChangeSnapshot::collect(vec![
            change(1, EntityState::Unchanged),
            change(2, EntityState::Detached),
        ]);
        assert!(snapshot.is_empty());
    }
}
