//! Per-username generation progress derived from identity snapshots.
//!
//! Aggregates are always recomputed from a full snapshot, so change notifications and polls can
//! arrive in any order, be duplicated or go missing without corrupting the result.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use likeness_core::models::{GenerationState, Identity, IdentitySource, IdentityStatus};
use likeness_db::IdentityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupState {
    Idle,
    Generating,
    Settled,
}

/// Progress of the most relevant batch for one username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupProgress {
    pub username: String,
    pub state: GroupState,
    pub src: Option<IdentitySource>,
    pub generation_id: Option<Uuid>,
    pub expected: usize,
    pub total: usize,
    pub completed: usize,
    /// Completed records with a URL to show.
    pub visible_completed: usize,
    pub failed: usize,
}

/// The batch to report for a group: the in-flight one if any, otherwise the newest.
fn current_batch(rows: &[&Identity]) -> Option<Uuid> {
    rows.iter()
        .filter(|r| r.is_in_flight())
        .filter_map(|r| r.gen_id)
        .next()
        .or_else(|| {
            rows.iter()
                .filter(|r| r.gen_id.is_some())
                .max_by_key(|r| r.created_at)
                .and_then(|r| r.gen_id)
        })
}

fn group_progress(username: &str, rows: &[&Identity]) -> GroupProgress {
    let Some(generation_id) = current_batch(rows) else {
        return GroupProgress {
            username: username.to_string(),
            state: GroupState::Idle,
            src: None,
            generation_id: None,
            expected: 0,
            total: 0,
            completed: 0,
            visible_completed: 0,
            failed: 0,
        };
    };

    let batch: Vec<&&Identity> = rows
        .iter()
        .filter(|r| r.gen_id == Some(generation_id))
        .collect();
    let src = batch.first().map(|r| r.src);
    let total = batch.len();
    let expected = src
        .and_then(|s| s.expected_batch_size())
        .unwrap_or(total);
    let completed = batch
        .iter()
        .filter(|r| r.status == IdentityStatus::Completed)
        .count();
    let visible_completed = batch.iter().filter(|r| r.is_visible_complete()).count();
    let failed = batch
        .iter()
        .filter(|r| r.status == IdentityStatus::Failed)
        .count();

    let all_closed = batch.iter().all(|r| {
        r.gen_st == Some(GenerationState::Done) || r.status == IdentityStatus::Failed
    });
    let settled = all_closed || (expected > 0 && visible_completed >= expected);
    let state = if settled {
        GroupState::Settled
    } else if batch.iter().any(|r| r.is_in_flight()) {
        GroupState::Generating
    } else {
        GroupState::Idle
    };

    GroupProgress {
        username: username.to_string(),
        state,
        src,
        generation_id: Some(generation_id),
        expected,
        total,
        completed,
        visible_completed,
        failed,
    }
}

/// Groups a full snapshot by username. Rows without a username are not reported.
pub fn reconcile(rows: &[Identity]) -> Vec<GroupProgress> {
    let mut groups: BTreeMap<&str, Vec<&Identity>> = BTreeMap::new();
    for row in rows {
        if let Some(username) = row.instagram_username.as_deref() {
            groups.entry(username).or_default().push(row);
        }
    }
    groups
        .into_iter()
        .map(|(username, rows)| group_progress(username, &rows))
        .collect()
}

/// Background task keeping [`GroupProgress`] snapshots current.
pub struct ProgressReconciler {
    identities: Arc<dyn IdentityStore>,
    poll_interval: Duration,
    tx: watch::Sender<Vec<GroupProgress>>,
}

impl ProgressReconciler {
    pub fn new(identities: Arc<dyn IdentityStore>, poll_interval: Duration) -> Self {
        let (tx, _) = watch::channel(Vec::new());
        Self {
            identities,
            poll_interval,
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<GroupProgress>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Vec<GroupProgress> {
        self.tx.borrow().clone()
    }

    fn any_generating(&self) -> bool {
        self.tx
            .borrow()
            .iter()
            .any(|g| g.state == GroupState::Generating)
    }

    /// Re-reads every identity and publishes the recomputed groups.
    pub async fn refresh(&self) -> anyhow::Result<()> {
        let rows = self.identities.list(None).await?;
        let groups = reconcile(&rows);

        {
            let previous = self.tx.borrow();
            for group in &groups {
                let before = previous
                    .iter()
                    .find(|g| g.username == group.username)
                    .map(|g| g.state);
                if before != Some(group.state) {
                    tracing::info!(
                        username = %group.username,
                        from = ?before,
                        to = ?group.state,
                        completed = group.completed,
                        failed = group.failed,
                        expected = group.expected,
                        "Progress state changed"
                    );
                }
            }
        }

        self.tx.send_replace(groups);
        Ok(())
    }

    async fn refresh_logged(&self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "Progress refresh failed");
        }
    }

    /// Starts the loop: one refresh at startup, one per change signal, and a poll every
    /// `poll_interval` while any group is generating.
    pub fn spawn(self: Arc<Self>, changes: mpsc::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut changes = Some(changes);
            let mut poll = tokio::time::interval(self.poll_interval);
            poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            self.refresh_logged().await;

            loop {
                let polling = self.any_generating() || changes.is_none();
                tokio::select! {
                    signal = async {
                        match changes.as_mut() {
                            Some(rx) => rx.recv().await,
                            None => std::future::pending().await,
                        }
                    } => {
                        match signal {
                            Some(()) => self.refresh_logged().await,
                            None => {
                                tracing::warn!("Identity change feed closed, polling only");
                                changes = None;
                            }
                        }
                    }
                    _ = poll.tick(), if polling => {
                        self.refresh_logged().await;
                    }
                }
            }
        })
    }
}
