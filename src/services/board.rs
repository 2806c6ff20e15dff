//! Graph Document boundary.
//!
//! The board itself (rendering, persistence, drag/drop) lives outside this
//! crate. The orchestrator only sees the trait below. `InMemoryBoard` is the
//! reference implementation used by the driver binary and the tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::kernel::error::BoardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub Uuid);

impl EdgeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Note,
    Idea,
    Task,
    Phase,
    Research,
}

/// Everything needed to create a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub title: String,
    pub content: String,
    pub kind: NodeKind,
    pub position: Position,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub title: String,
    pub content: String,
    pub kind: NodeKind,
    pub position: Position,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeAttrs {
    pub label: Option<String>,
    pub animated: bool,
}

impl EdgeAttrs {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            animated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub attrs: EdgeAttrs,
}

/// Immutable copy of the whole graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl GraphState {
    pub fn degree(&self, id: NodeId) -> usize {
        self.edges
            .iter()
            .filter(|e| e.source == id || e.target == id)
            .count()
    }
}

/// The external node/edge store.
///
/// Each call is assumed to be individually atomic and safe to call
/// concurrently. The orchestrator adds no locking of its own.
#[async_trait]
pub trait GraphDocument: Send + Sync {
    async fn add_node(&self, spec: NodeSpec) -> Result<NodeId, BoardError>;
    async fn add_edge(&self, source: NodeId, target: NodeId, attrs: EdgeAttrs) -> Result<EdgeId, BoardError>;
    async fn list_nodes(&self) -> Result<Vec<Node>, BoardError>;
    async fn snapshot(&self) -> Result<GraphState, BoardError>;
    /// Used by rollback only. Removing a node also drops its edges.
    async fn remove_node(&self, id: NodeId) -> Result<(), BoardError>;
    async fn remove_edge(&self, id: EdgeId) -> Result<(), BoardError>;
}

#[derive(Debug, Default)]
struct BoardInner {
    // BTreeMap keeps listing order stable across calls.
    nodes: BTreeMap<u64, Node>,
    edges: BTreeMap<u64, Edge>,
    next_seq: u64,
}

/// Reference in-memory Graph Document.
#[derive(Debug, Default)]
pub struct InMemoryBoard {
    inner: Mutex<BoardInner>,
}

impl InMemoryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a board with plain notes laid out on a grid.
    pub fn with_nodes(count: usize) -> Self {
        let board = Self::new();
        {
            let mut inner = board.inner.lock();
            for i in 0..count {
                let node = Node {
                    id: NodeId::new(),
                    title: format!("Note {}", i + 1),
                    content: String::new(),
                    kind: NodeKind::Note,
                    position: Position::new(100.0 + (i % 6) as f32 * 260.0, 100.0 + (i / 6) as f32 * 180.0),
                    tags: Vec::new(),
                };
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.nodes.insert(seq, node);
            }
        }
        board
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.lock().edges.len()
    }

    pub fn state(&self) -> GraphState {
        let inner = self.inner.lock();
        GraphState {
            nodes: inner.nodes.values().cloned().collect(),
            edges: inner.edges.values().cloned().collect(),
        }
    }
}

#[async_trait]
impl GraphDocument for InMemoryBoard {
    async fn add_node(&self, spec: NodeSpec) -> Result<NodeId, BoardError> {
        if spec.title.trim().is_empty() {
            return Err(BoardError::Rejected("node title must not be empty".into()));
        }
        let id = NodeId::new();
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.nodes.insert(
            seq,
            Node {
                id,
                title: spec.title,
                content: spec.content,
                kind: spec.kind,
                position: spec.position,
                tags: spec.tags,
            },
        );
        Ok(id)
    }

    async fn add_edge(&self, source: NodeId, target: NodeId, attrs: EdgeAttrs) -> Result<EdgeId, BoardError> {
        let mut inner = self.inner.lock();
        for endpoint in [source, target] {
            if !inner.nodes.values().any(|n| n.id == endpoint) {
                return Err(BoardError::NodeNotFound(endpoint));
            }
        }
        let id = EdgeId::new();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.edges.insert(seq, Edge { id, source, target, attrs });
        Ok(id)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, BoardError> {
        Ok(self.inner.lock().nodes.values().cloned().collect())
    }

    async fn snapshot(&self) -> Result<GraphState, BoardError> {
        Ok(self.state())
    }

    async fn remove_node(&self, id: NodeId) -> Result<(), BoardError> {
        let mut inner = self.inner.lock();
        let before = inner.nodes.len();
        inner.nodes.retain(|_, n| n.id != id);
        if inner.nodes.len() == before {
            return Err(BoardError::NodeNotFound(id));
        }
        inner.edges.retain(|_, e| e.source != id && e.target != id);
        Ok(())
    }

    async fn remove_edge(&self, id: EdgeId) -> Result<(), BoardError> {
        let mut inner = self.inner.lock();
        let before = inner.edges.len();
        inner.edges.retain(|_, e| e.id != id);
        if inner.edges.len() == before {
            return Err(BoardError::EdgeNotFound(id));
        }
        Ok(())
    }
}
