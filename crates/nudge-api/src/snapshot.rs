use anyhow::anyhow;
use nudge_core::task::Task;
use tracing::debug;

/// Lifecycle of one optimistic mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Pending,
    Committed,
    RolledBack,
}

/// In-memory task snapshot that mutations are applied to optimistically.
///
/// The discipline: apply the change locally, issue the request, then either
/// commit (and replace the snapshot wholesale from a fresh fetch) or roll
/// back to the exact pre-mutation contents. Nothing between apply and
/// commit/rollback is ever half-updated; conflicting edits from elsewhere
/// are resolved by the next full reload, last reload wins.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    tasks: Vec<Task>,
}

impl Snapshot {
    #[must_use]
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Replaces the snapshot from a fresh server fetch.
    pub fn reload(&mut self, tasks: Vec<Task>) {
        debug!(count = tasks.len(), "snapshot reloaded");
        self.tasks = tasks;
    }
}

/// Explicit per-mutation state machine:
/// `Idle -> Pending -> {Committed | RolledBack}`.
#[derive(Debug)]
pub struct Mutation {
    state: MutationState,
    pre_image: Option<Vec<Task>>,
}

impl Default for Mutation {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutation {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: MutationState::Idle,
            pre_image: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> MutationState {
        self.state
    }

    /// Applies the mutation to the snapshot and saves the pre-image for a
    /// possible rollback.
    pub fn apply<F>(&mut self, snapshot: &mut Snapshot, mutate: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Vec<Task>),
    {
        if self.state != MutationState::Idle {
            return Err(anyhow!(
                "mutation already applied (state: {:?})",
                self.state
            ));
        }

        self.pre_image = Some(snapshot.tasks.clone());
        mutate(&mut snapshot.tasks);
        self.state = MutationState::Pending;
        debug!("optimistic mutation applied");
        Ok(())
    }

    /// Confirms the mutation; the pre-image is dropped. The caller is
    /// expected to follow up with a full snapshot reload.
    pub fn commit(&mut self) -> anyhow::Result<()> {
        if self.state != MutationState::Pending {
            return Err(anyhow!(
                "cannot commit mutation in state {:?}",
                self.state
            ));
        }
        self.pre_image = None;
        self.state = MutationState::Committed;
        debug!("optimistic mutation committed");
        Ok(())
    }

    /// Restores the snapshot to its exact pre-mutation contents.
    pub fn roll_back(&mut self, snapshot: &mut Snapshot) -> anyhow::Result<()> {
        if self.state != MutationState::Pending {
            return Err(anyhow!(
                "cannot roll back mutation in state {:?}",
                self.state
            ));
        }
        let pre_image = self
            .pre_image
            .take()
            .ok_or_else(|| anyhow!("pending mutation lost its pre-image"))?;
        snapshot.tasks = pre_image;
        self.state = MutationState::RolledBack;
        debug!("optimistic mutation rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use nudge_core::task::Task;

    use super::{Mutation, MutationState, Snapshot};

    fn three_tasks() -> Vec<Task> {
        vec![
            Task::new(1, "one"),
            Task::new(2, "two"),
            Task::new(3, "three"),
        ]
    }

    #[test]
    fn failed_complete_leaves_all_three_tasks() {
        let mut snapshot = Snapshot::new(three_tasks());
        let mut mutation = Mutation::new();

        mutation
            .apply(&mut snapshot, |tasks| tasks.retain(|t| t.id != 2))
            .expect("apply");
        assert_eq!(snapshot.tasks().len(), 2);

        // Simulated request failure.
        mutation.roll_back(&mut snapshot).expect("roll back");
        assert_eq!(snapshot.tasks().len(), 3);
        let ids: Vec<i64> = snapshot.tasks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(mutation.state(), MutationState::RolledBack);
    }

    #[test]
    fn committed_mutation_keeps_the_applied_change() {
        let mut snapshot = Snapshot::new(three_tasks());
        let mut mutation = Mutation::new();

        mutation
            .apply(&mut snapshot, |tasks| tasks.retain(|t| t.id != 2))
            .expect("apply");
        mutation.commit().expect("commit");

        assert_eq!(mutation.state(), MutationState::Committed);
        assert_eq!(snapshot.tasks().len(), 2);
    }

    #[test]
    fn transitions_out_of_order_are_rejected() {
        let mut snapshot = Snapshot::new(three_tasks());
        let mut mutation = Mutation::new();

        assert!(mutation.commit().is_err());
        assert!(mutation.roll_back(&mut snapshot).is_err());

        mutation.apply(&mut snapshot, |_| {}).expect("apply");
        assert!(mutation.apply(&mut snapshot, |_| {}).is_err());

        mutation.commit().expect("commit");
        assert!(mutation.roll_back(&mut snapshot).is_err());
        assert!(mutation.commit().is_err());
    }

    #[test]
    fn reload_replaces_wholesale() {
        let mut snapshot = Snapshot::new(three_tasks());
        snapshot.reload(vec![Task::new(9, "fresh")]);
        assert_eq!(snapshot.tasks().len(), 1);
        assert_eq!(snapshot.tasks()[0].id, 9);
    }
}
