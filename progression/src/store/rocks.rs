//! RocksDB-backed [`ProgressStore`]
//!
//! Values are stored as JSON. Every read-modify-write runs inside an
//! optimistic transaction: the keys involved are read with
//! `get_for_update_cf`, and a commit that loses a race fails with `Busy` and
//! is retried from the top, so the status check is re-evaluated against the
//! winner's write.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, ErrorKind, IteratorMode,
    OptimisticTransactionDB, Options, Transaction,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::schema::{self, keys, ALL_CFS};
use super::{apply_status, ProgressStore, StoreError, StoreResult, Transition};
use crate::catalog::NodeId;
use crate::evaluator::EvaluationResult;
use crate::model::{
    ConversationTurn, Deliverable, DeliverableStatus, FormSubmission, NewDeliverable, NodeKey,
    NodeProgressRecord, NodeStatus, ProjectProgressState,
};

const MAX_TXN_ATTEMPTS: usize = 16;

type Txn<'a> = Transaction<'a, OptimisticTransactionDB>;

/// Shared reference to RocksStore
pub type SharedRocksStore = Arc<RocksStore>;

/// Persistent progress store
pub struct RocksStore {
    db: RwLock<OptimisticTransactionDB>,
    path: PathBuf,
}

fn cf<'a>(db: &'a OptimisticTransactionDB, name: &str) -> StoreResult<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| StoreError::ColumnFamilyNotFound(name.to_string()))
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
}

fn txn_get<T: DeserializeOwned>(
    txn: &Txn<'_>,
    cf: &ColumnFamily,
    key: &str,
) -> StoreResult<Option<T>> {
    match txn.get_for_update_cf(cf, key.as_bytes(), true)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

fn txn_put<T: Serialize>(txn: &Txn<'_>, cf: &ColumnFamily, key: &str, value: &T) -> StoreResult<()> {
    txn.put_cf(cf, key.as_bytes(), encode(value)?)?;
    Ok(())
}

/// Reserve the next `count` sequence numbers for a project.
fn reserve_seq(db: &OptimisticTransactionDB, txn: &Txn<'_>, project_id: &str, count: u64) -> StoreResult<u64> {
    let meta = cf(db, schema::CF_META)?;
    let key = keys::seq(project_id);
    let current: u64 = txn_get(txn, meta, &key)?.unwrap_or(0);
    txn_put(txn, meta, &key, &(current + count))?;
    Ok(current + 1)
}

fn is_conflict(error: &rocksdb::Error) -> bool {
    matches!(error.kind(), ErrorKind::Busy | ErrorKind::TryAgain)
}

impl RocksStore {
    /// Open or create a store at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = OptimisticTransactionDB::open_cf_descriptors(&opts, &path, cf_descriptors)?;

        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedRocksStore {
        Arc::new(self)
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    // =========================================================================
    // Generic operations
    // =========================================================================

    /// Run `op` in an optimistic transaction, retrying on commit conflicts.
    fn with_txn<T>(
        &self,
        mut op: impl FnMut(&OptimisticTransactionDB, &Txn<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let txn = db.transaction();
            let value = op(&db, &txn)?;
            match txn.commit() {
                Ok(()) => return Ok(value),
                Err(e) if is_conflict(&e) => {
                    debug!(attempt, "Transaction conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::WriteFailed(
            "transaction conflict retries exhausted".to_string(),
        ))
    }

    /// Get a value from a column family
    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> StoreResult<Option<T>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = cf(&db, cf_name)?;
        match db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store a value in a column family
    fn put<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> StoreResult<()> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = cf(&db, cf_name)?;
        db.put_cf(cf, key.as_bytes(), encode(value)?)?;
        Ok(())
    }

    /// Every value whose key starts with `prefix`, in key order
    fn scan<T: DeserializeOwned>(&self, cf_name: &str, prefix: &str) -> StoreResult<Vec<(String, T)>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = cf(&db, cf_name)?;
        let iter = db.iterator_cf(cf, IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        let mut values = Vec::new();
        for result in iter {
            let (key, value) = result?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            values.push((key, decode(&value)?));
        }
        Ok(values)
    }

    fn project_deliverables(&self, project_id: &str) -> StoreResult<Vec<(String, Deliverable)>> {
        Ok(self
            .scan::<Deliverable>(schema::CF_DELIVERABLES, &keys::deliverable_prefix(project_id))?
            .into_iter()
            .filter(|(_, d)| d.project_id == project_id)
            .collect())
    }
}

#[async_trait]
impl ProgressStore for RocksStore {
    async fn create_project(
        &self,
        state: ProjectProgressState,
        first: NodeProgressRecord,
    ) -> StoreResult<bool> {
        self.with_txn(|db, txn| {
            let projects = cf(db, schema::CF_PROJECTS)?;
            let project_key = keys::project(&state.project_id);
            if txn_get::<ProjectProgressState>(txn, projects, &project_key)?.is_some() {
                return Ok(false);
            }
            txn_put(txn, projects, &project_key, &state)?;
            txn_put(
                txn,
                cf(db, schema::CF_NODES)?,
                &keys::node(&first.project_id, first.node),
                &first,
            )?;
            Ok(true)
        })
    }

    async fn get_project(&self, project_id: &str) -> StoreResult<Option<ProjectProgressState>> {
        self.get(schema::CF_PROJECTS, &keys::project(project_id))
    }

    async fn put_project(&self, state: &ProjectProgressState) -> StoreResult<()> {
        self.put(schema::CF_PROJECTS, &keys::project(&state.project_id), state)
    }

    async fn get_node(&self, key: &NodeKey) -> StoreResult<Option<NodeProgressRecord>> {
        self.get(schema::CF_NODES, &keys::node(&key.project_id, key.node))
    }

    async fn list_nodes(&self, project_id: &str) -> StoreResult<Vec<NodeProgressRecord>> {
        Ok(self
            .scan::<NodeProgressRecord>(schema::CF_NODES, &keys::node_prefix(project_id))?
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| r.project_id == project_id)
            .collect())
    }

    async fn activate_node(&self, key: &NodeKey, at: DateTime<Utc>) -> StoreResult<NodeProgressRecord> {
        self.with_txn(|db, txn| {
            let nodes = cf(db, schema::CF_NODES)?;
            let record_key = keys::node(&key.project_id, key.node);
            let record = match txn_get::<NodeProgressRecord>(txn, nodes, &record_key)? {
                Some(mut existing) if existing.status == NodeStatus::NotStarted => {
                    apply_status(&mut existing, NodeStatus::InProgress, at);
                    txn_put(txn, nodes, &record_key, &existing)?;
                    existing
                }
                Some(existing) => existing,
                None => {
                    let record = NodeProgressRecord::started(key, at);
                    txn_put(txn, nodes, &record_key, &record)?;
                    record
                }
            };
            Ok(record)
        })
    }

    async fn transition_node(
        &self,
        key: &NodeKey,
        from: &[NodeStatus],
        to: NodeStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Transition> {
        self.with_txn(|db, txn| {
            let nodes = cf(db, schema::CF_NODES)?;
            let record_key = keys::node(&key.project_id, key.node);
            let Some(mut record) = txn_get::<NodeProgressRecord>(txn, nodes, &record_key)? else {
                return Ok(Transition::Conflict(None));
            };
            if !from.contains(&record.status) {
                return Ok(Transition::Conflict(Some(record)));
            }
            apply_status(&mut record, to, at);
            txn_put(txn, nodes, &record_key, &record)?;
            Ok(Transition::Applied(record))
        })
    }

    async fn set_hint_level(&self, key: &NodeKey, expected: u32, level: u32) -> StoreResult<bool> {
        self.with_txn(|db, txn| {
            let nodes = cf(db, schema::CF_NODES)?;
            let record_key = keys::node(&key.project_id, key.node);
            match txn_get::<NodeProgressRecord>(txn, nodes, &record_key)? {
                Some(mut record) if record.hint_level == expected => {
                    record.hint_level = level;
                    txn_put(txn, nodes, &record_key, &record)?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    async fn append_turns(&self, turns: Vec<ConversationTurn>) -> StoreResult<Vec<ConversationTurn>> {
        self.with_txn(|db, txn| {
            let turns_cf = cf(db, schema::CF_TURNS)?;
            let mut stored = Vec::with_capacity(turns.len());
            for turn in &turns {
                let mut turn = turn.clone();
                turn.seq = reserve_seq(db, txn, &turn.project_id, 1)?;
                txn_put(txn, turns_cf, &keys::turn(&turn.project_id, turn.seq), &turn)?;
                stored.push(turn);
            }
            Ok(stored)
        })
    }

    async fn list_turns(&self, project_id: &str, node: NodeId) -> StoreResult<Vec<ConversationTurn>> {
        Ok(self
            .list_project_turns(project_id)
            .await?
            .into_iter()
            .filter(|t| t.node == Some(node))
            .collect())
    }

    async fn list_project_turns(&self, project_id: &str) -> StoreResult<Vec<ConversationTurn>> {
        Ok(self
            .scan::<ConversationTurn>(schema::CF_TURNS, &keys::turn_prefix(project_id))?
            .into_iter()
            .map(|(_, t)| t)
            .filter(|t| t.project_id == project_id)
            .collect())
    }

    async fn insert_submission(&self, submission: &FormSubmission) -> StoreResult<()> {
        self.with_txn(|db, txn| {
            let seq = reserve_seq(db, txn, &submission.project_id, 1)?;
            txn_put(
                txn,
                cf(db, schema::CF_SUBMISSIONS)?,
                &keys::submission(&submission.project_id, seq),
                submission,
            )
        })
    }

    async fn attach_evaluation(
        &self,
        project_id: &str,
        submission_id: Uuid,
        evaluation: &EvaluationResult,
    ) -> StoreResult<()> {
        let (key, _) = self
            .scan::<FormSubmission>(schema::CF_SUBMISSIONS, &keys::submission_prefix(project_id))?
            .into_iter()
            .find(|(_, s)| s.id == submission_id)
            .ok_or_else(|| StoreError::NotFound(format!("submission {}", submission_id)))?;

        self.with_txn(|db, txn| {
            let submissions = cf(db, schema::CF_SUBMISSIONS)?;
            let mut submission: FormSubmission = txn_get(txn, submissions, &key)?
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;
            submission.evaluation = Some(evaluation.clone());
            txn_put(txn, submissions, &key, &submission)
        })
    }

    async fn latest_submission(&self, key: &NodeKey) -> StoreResult<Option<FormSubmission>> {
        Ok(self
            .list_submissions(&key.project_id)
            .await?
            .into_iter()
            .rev()
            .find(|s| s.node == key.node))
    }

    async fn list_submissions(&self, project_id: &str) -> StoreResult<Vec<FormSubmission>> {
        Ok(self
            .scan::<FormSubmission>(schema::CF_SUBMISSIONS, &keys::submission_prefix(project_id))?
            .into_iter()
            .map(|(_, s)| s)
            .filter(|s| s.project_id == project_id)
            .collect())
    }

    async fn insert_deliverable(&self, deliverable: NewDeliverable) -> StoreResult<Deliverable> {
        // The per-project counter is read for update so concurrent inserts
        // on one project conflict and retry with a fresh version scan.
        self.with_txn(|db, txn| {
            reserve_seq(db, txn, &deliverable.project_id, 1)?;
            let dlv = cf(db, schema::CF_DELIVERABLES)?;
            let prefix = keys::deliverable_prefix(&deliverable.project_id);
            let mut max_version = 0;
            for result in txn.iterator_cf(dlv, IteratorMode::From(prefix.as_bytes(), Direction::Forward)) {
                let (k, v) = result?;
                if !k.starts_with(prefix.as_bytes()) {
                    break;
                }
                let existing: Deliverable = decode(&v)?;
                if existing.project_id == deliverable.project_id && existing.node == deliverable.node {
                    max_version = max_version.max(existing.version);
                }
            }
            let stored = deliverable.clone().into_deliverable(max_version + 1, Utc::now());
            txn_put(
                txn,
                dlv,
                &keys::deliverable(&stored.project_id, stored.node, stored.version),
                &stored,
            )?;
            Ok(stored)
        })
    }

    async fn list_deliverables(&self, project_id: &str) -> StoreResult<Vec<Deliverable>> {
        Ok(self
            .project_deliverables(project_id)?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }

    async fn get_deliverable(&self, project_id: &str, id: Uuid) -> StoreResult<Option<Deliverable>> {
        Ok(self
            .project_deliverables(project_id)?
            .into_iter()
            .map(|(_, d)| d)
            .find(|d| d.id == id))
    }

    async fn set_deliverable_status(
        &self,
        project_id: &str,
        id: Uuid,
        status: DeliverableStatus,
    ) -> StoreResult<Option<Deliverable>> {
        let Some((key, _)) = self
            .project_deliverables(project_id)?
            .into_iter()
            .find(|(_, d)| d.id == id)
        else {
            return Ok(None);
        };

        self.with_txn(|db, txn| {
            let dlv = cf(db, schema::CF_DELIVERABLES)?;
            let Some(mut deliverable) = txn_get::<Deliverable>(txn, dlv, &key)? else {
                return Ok(None);
            };
            deliverable.status = status;
            deliverable.updated_at = Utc::now();
            txn_put(txn, dlv, &key, &deliverable)?;
            Ok(Some(deliverable))
        })
    }
}
