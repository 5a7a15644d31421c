use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    /// The article existed before and something about it changed.
    Unspecified,
}

/// What a sync changed, for whoever shows the mirror to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Set when observers must drop everything they cached (full rebuilds).
    pub invalidate_all: bool,
    /// Changed articles keyed by remote article id.
    pub changed: BTreeMap<i64, ChangeKind>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a change. An article added earlier in the same run stays `Added`.
    pub fn record(&mut self, remote_id: i64, kind: ChangeKind) {
        self.changed
            .entry(remote_id)
            .and_modify(|existing| {
                if *existing != ChangeKind::Added {
                    *existing = kind;
                }
            })
            .or_insert(kind);
    }

    pub fn kind_of(&self, remote_id: i64) -> Option<ChangeKind> {
        self.changed.get(&remote_id).copied()
    }

    pub fn is_empty(&self) -> bool {
        !self.invalidate_all && self.changed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_wins_over_later_update() {
        let mut changes = ChangeSet::new();
        changes.record(1, ChangeKind::Added);
        changes.record(1, ChangeKind::Unspecified);
        changes.record(2, ChangeKind::Unspecified);

        assert_eq!(changes.kind_of(1), Some(ChangeKind::Added));
        assert_eq!(changes.kind_of(2), Some(ChangeKind::Unspecified));
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn invalidation_alone_is_not_empty() {
        let changes = ChangeSet {
            invalidate_all: true,
            ..ChangeSet::default()
        };
        assert!(!changes.is_empty());
        assert!(ChangeSet::new().is_empty());
    }
}
