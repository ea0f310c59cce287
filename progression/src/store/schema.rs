//! Column family definitions for the RocksDB progress store
//!
//! Keys are ASCII and zero-padded so lexicographic order matches curriculum
//! order (nodes) and creation order (turns, submissions).

/// Column family for project state
pub const CF_PROJECTS: &str = "projects";

/// Column family for per-Node records
pub const CF_NODES: &str = "nodes";

/// Column family for conversation turns
pub const CF_TURNS: &str = "turns";

/// Column family for form submissions
pub const CF_SUBMISSIONS: &str = "submissions";

/// Column family for deliverables
pub const CF_DELIVERABLES: &str = "deliverables";

/// Column family for counters
pub const CF_META: &str = "meta";

/// All column family names
pub const ALL_CFS: &[&str] = &[
    CF_PROJECTS,
    CF_NODES,
    CF_TURNS,
    CF_SUBMISSIONS,
    CF_DELIVERABLES,
    CF_META,
];

/// Key builders for compound keys
pub mod keys {
    use crate::catalog::NodeId;

    fn node_part(node: NodeId) -> String {
        format!("{:04}.{:04}", node.step, node.ordinal)
    }

    /// Project state key
    pub fn project(project_id: &str) -> String {
        format!("proj:{}", project_id)
    }

    /// Prefix of every Node record in a project
    pub fn node_prefix(project_id: &str) -> String {
        format!("node:{}:", project_id)
    }

    /// Node record key
    pub fn node(project_id: &str, node: NodeId) -> String {
        format!("{}{}", node_prefix(project_id), node_part(node))
    }

    /// Prefix of every turn in a project
    pub fn turn_prefix(project_id: &str) -> String {
        format!("turn:{}:", project_id)
    }

    /// Turn key, ordered by sequence number
    pub fn turn(project_id: &str, seq: u64) -> String {
        format!("{}{:020}", turn_prefix(project_id), seq)
    }

    /// Prefix of every submission in a project
    pub fn submission_prefix(project_id: &str) -> String {
        format!("sub:{}:", project_id)
    }

    /// Submission key, ordered by sequence number
    pub fn submission(project_id: &str, seq: u64) -> String {
        format!("{}{:020}", submission_prefix(project_id), seq)
    }

    /// Prefix of every deliverable in a project
    pub fn deliverable_prefix(project_id: &str) -> String {
        format!("dlv:{}:", project_id)
    }

    /// Deliverable key, ordered by Node then version
    pub fn deliverable(project_id: &str, node: NodeId, version: u32) -> String {
        format!("{}{}:{:06}", deliverable_prefix(project_id), node_part(node), version)
    }

    /// Per-project sequence counter
    pub fn seq(project_id: &str) -> String {
        format!("seq:{}", project_id)
    }

}
