use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Citation, GraphContext, RetrievedChunk};

/// Nodes of the comparison workflow, executed in this order. Each completed
/// node checkpoints the whole state; re-invocation with the same thread id
/// resumes from the first node not yet completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareNode {
    Retrieve,
    ExpandGraph,
    Compare,
    Generate,
}

impl CompareNode {
    pub const ORDER: [CompareNode; 4] = [
        Self::Retrieve,
        Self::ExpandGraph,
        Self::Compare,
        Self::Generate,
    ];

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Retrieve => Some(Self::ExpandGraph),
            Self::ExpandGraph => Some(Self::Compare),
            Self::Compare => Some(Self::Generate),
            Self::Generate => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompareStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonState {
    pub query: String,
    pub tenant_key: String,
    pub document_ids: Vec<Uuid>,
    #[serde(default)]
    pub retrieved_chunks: HashMap<Uuid, Vec<RetrievedChunk>>,
    #[serde(default)]
    pub graph_context: HashMap<Uuid, Vec<GraphContext>>,
    #[serde(default)]
    pub similarities: Vec<String>,
    #[serde(default)]
    pub differences: Vec<String>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub status: CompareStatus,
    /// Last node that ran to completion; `None` before the first checkpoint.
    #[serde(default)]
    pub completed_node: Option<CompareNode>,
}

impl ComparisonState {
    pub fn new(query: String, tenant_key: String, document_ids: Vec<Uuid>) -> Self {
        Self {
            query,
            tenant_key,
            document_ids,
            retrieved_chunks: HashMap::new(),
            graph_context: HashMap::new(),
            similarities: Vec::new(),
            differences: Vec::new(),
            insights: Vec::new(),
            response: String::new(),
            citations: Vec::new(),
            status: CompareStatus::Running,
            completed_node: None,
        }
    }

    /// The node to run next, given what has already been checkpointed.
    pub fn resume_from(&self) -> Option<CompareNode> {
        match self.completed_node {
            None => Some(CompareNode::Retrieve),
            Some(node) => node.next(),
        }
    }
}

/// Thread keys embed the tenant key so two tenants can never collide on the
/// same session id.
pub fn compare_thread_id(tenant_key: &str, session_id: &str) -> String {
    format!("{tenant_key}:doc_compare:{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_order_is_linear() {
        assert_eq!(CompareNode::Retrieve.next(), Some(CompareNode::ExpandGraph));
        assert_eq!(CompareNode::ExpandGraph.next(), Some(CompareNode::Compare));
        assert_eq!(CompareNode::Compare.next(), Some(CompareNode::Generate));
        assert_eq!(CompareNode::Generate.next(), None);
    }

    #[test]
    fn fresh_state_resumes_at_retrieve() {
        let state = ComparisonState::new("q".into(), "t".into(), vec![]);
        assert_eq!(state.resume_from(), Some(CompareNode::Retrieve));
    }

    #[test]
    fn resume_skips_completed_nodes() {
        let mut state = ComparisonState::new("q".into(), "t".into(), vec![]);
        state.completed_node = Some(CompareNode::ExpandGraph);
        assert_eq!(state.resume_from(), Some(CompareNode::Compare));

        state.completed_node = Some(CompareNode::Generate);
        assert_eq!(state.resume_from(), None);
    }

    #[test]
    fn thread_ids_are_tenant_scoped() {
        let a = compare_thread_id("tenant-a", "s1");
        let b = compare_thread_id("tenant-b", "s1");
        assert_ne!(a, b);
        assert_eq!(a, "tenant-a:doc_compare:s1");
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state =
            ComparisonState::new("compare these".into(), "t".into(), vec![Uuid::new_v4()]);
        state.similarities.push("both mention Q3".into());
        state.completed_node = Some(CompareNode::Compare);

        let json = serde_json::to_string(&state).unwrap();
        let back: ComparisonState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.similarities, state.similarities);
        assert_eq!(back.completed_node, Some(CompareNode::Compare));
        assert_eq!(back.resume_from(), Some(CompareNode::Generate));
    }
}
