use std::collections::{BTreeMap, HashMap};

use agentmesh_core::{MeshError, MeshResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::DecisionOutcome;

/// Visibility of a shared-data entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Other participants may only read the entry.
    #[default]
    ReadOnly,
    /// Any participant may overwrite the entry.
    ReadWrite,
}

/// A versioned document in the shared workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document name, unique within the session.
    pub name: String,
    /// Current content.
    pub content: serde_json::Value,
    /// Monotonic version, starting at 1.
    pub version: u64,
    /// Participant who wrote the current content.
    pub last_modified_by: Uuid,
    /// When the current version was written.
    pub updated_at: DateTime<Utc>,
}

/// A key/value entry shared between participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedEntry {
    /// Entry key.
    pub key: String,
    /// Entry value.
    pub value: serde_json::Value,
    /// Visibility tag.
    pub access: AccessLevel,
    /// Participant who shared it.
    pub shared_by: Uuid,
    /// When it was shared.
    pub shared_at: DateTime<Utc>,
}

/// One entry in the append-only decision ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Unique identifier.
    pub id: Uuid,
    /// What was decided.
    pub description: String,
    /// The options on the ballot.
    pub options: Vec<String>,
    /// Who proposed it.
    pub proposer: Uuid,
    /// The cast votes, in submission order.
    pub votes: Vec<(Uuid, String)>,
    /// The computed outcome.
    pub outcome: DecisionOutcome,
    /// When the decision was made.
    pub decided_at: DateTime<Utc>,
}

/// Serializable snapshot of a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceView {
    /// Documents by name.
    pub documents: BTreeMap<String, Document>,
    /// Shared entries by key.
    pub shared_data: BTreeMap<String, SharedEntry>,
    /// The decision ledger, oldest first.
    pub decisions: Vec<DecisionRecord>,
}

/// Per-session mutable shared state.
///
/// Document writes are optimistic-concurrency-controlled: an update must
/// carry the version it read, and a stale version is a `Conflict`. There is
/// no cross-document locking.
#[derive(Debug, Default)]
pub struct Workspace {
    documents: HashMap<String, Document>,
    shared: HashMap<String, SharedEntry>,
    decisions: Vec<DecisionRecord>,
}

impl Workspace {
    /// Create an empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document at version 1. `Conflict` if the name is taken.
    pub fn add_document(
        &mut self,
        name: impl Into<String>,
        content: serde_json::Value,
        author: Uuid,
        now: DateTime<Utc>,
    ) -> MeshResult<u64> {
        let name = name.into();
        if self.documents.contains_key(&name) {
            return Err(MeshError::Conflict(format!(
                "document '{name}' already exists"
            )));
        }
        self.documents.insert(
            name.clone(),
            Document {
                name,
                content,
                version: 1,
                last_modified_by: author,
                updated_at: now,
            },
        );
        Ok(1)
    }

    /// Replace a document's content, supplying the version that was read.
    /// Returns the new version; a stale `expected_version` is a `Conflict`.
    pub fn update_document(
        &mut self,
        name: &str,
        content: serde_json::Value,
        expected_version: u64,
        author: Uuid,
        now: DateTime<Utc>,
    ) -> MeshResult<u64> {
        let doc = self
            .documents
            .get_mut(name)
            .ok_or_else(|| MeshError::NotFound(format!("document '{name}'")))?;
        if doc.version != expected_version {
            return Err(MeshError::Conflict(format!(
                "document '{name}' is at version {}, update was based on {expected_version}",
                doc.version
            )));
        }
        doc.content = content;
        doc.version += 1;
        doc.last_modified_by = author;
        doc.updated_at = now;
        Ok(doc.version)
    }

    /// Look up a document.
    pub fn document(&self, name: &str) -> MeshResult<&Document> {
        self.documents
            .get(name)
            .ok_or_else(|| MeshError::NotFound(format!("document '{name}'")))
    }

    /// Publish a shared-data entry, overwriting any previous value under the
    /// same key.
    pub fn share(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
        access: AccessLevel,
        shared_by: Uuid,
        now: DateTime<Utc>,
    ) {
        let key = key.into();
        self.shared.insert(
            key.clone(),
            SharedEntry {
                key,
                value,
                access,
                shared_by,
                shared_at: now,
            },
        );
    }

    /// Look up a shared entry.
    pub fn shared(&self, key: &str) -> MeshResult<&SharedEntry> {
        self.shared
            .get(key)
            .ok_or_else(|| MeshError::NotFound(format!("shared entry '{key}'")))
    }

    /// Append to the decision ledger.
    pub fn record_decision(&mut self, record: DecisionRecord) {
        self.decisions.push(record);
    }

    /// The decision ledger, oldest first.
    pub fn decisions(&self) -> &[DecisionRecord] {
        &self.decisions
    }

    /// Snapshot the workspace into a serializable view.
    pub fn snapshot(&self) -> WorkspaceView {
        WorkspaceView {
            documents: self
                .documents
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            shared_data: self
                .shared
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            decisions: self.decisions.clone(),
        }
    }
}
