//! Stages 5 and 6: fold the extractor's queues into the final result maps.

use crate::model::{EmailAssociation, GroupKey, Role};
use crate::progress::{PipelineProgress, Stage};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

pub type EmailSet = HashSet<String>;
pub type GroupedEmails = HashMap<GroupKey, Role>;

pub fn insert_email(set: &mut EmailSet, email: String) {
    set.insert(email);
}

pub fn merge_association(grouped: &mut GroupedEmails, association: EmailAssociation) {
    let key = GroupKey {
        email: association.email,
        repo: association.repo,
    };
    grouped
        .entry(key)
        .and_modify(|role| *role |= association.role)
        .or_insert(association.role);
}

/// Drains `emails` until every producer is gone, then resolves the returned receiver.
pub fn spawn_deduplicator(
    mut emails: mpsc::Receiver<String>,
    progress: Arc<PipelineProgress>,
) -> oneshot::Receiver<EmailSet> {
    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(async move {
        let counters = progress.stage(Stage::Dedup);
        let mut set = EmailSet::new();
        let mut processed = 0u64;
        while let Some(email) = emails.recv().await {
            insert_email(&mut set, email);
            counters.complete();
            processed += 1;
        }
        info!(
            stage = Stage::Dedup.label(),
            processed,
            unique = set.len(),
            "completed"
        );
        let _ = done_tx.send(set);
    });
    done_rx
}

pub fn spawn_grouper(
    mut associations: mpsc::Receiver<EmailAssociation>,
    progress: Arc<PipelineProgress>,
) -> oneshot::Receiver<GroupedEmails> {
    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(async move {
        let counters = progress.stage(Stage::Group);
        let mut grouped = GroupedEmails::new();
        let mut processed = 0u64;
        while let Some(association) = associations.recv().await {
            merge_association(&mut grouped, association);
            counters.complete();
            processed += 1;
        }
        info!(
            stage = Stage::Group.label(),
            processed,
            pairs = grouped.len(),
            "completed"
        );
        let _ = done_tx.send(grouped);
    });
    done_rx
}
