use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::services::board::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every kind of work the assistant knows how to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateSingle,
    CreateMultiple,
    CreateSequence,
    CreateHierarchy,
    AnalyzeBoard,
    AnalyzeNode,
    AnalyzeGap,
    OrganizeNodes,
    ConnectNodes,
    ExpandConcept,
    ResearchTopic,
    BrainstormIdeas,
    PlanProject,
    ImproveContent,
    DocumentProcess,
    CustomWorkflow,
}

impl ActionType {
    pub const ALL: [ActionType; 16] = [
        ActionType::CreateSingle,
        ActionType::CreateMultiple,
        ActionType::CreateSequence,
        ActionType::CreateHierarchy,
        ActionType::AnalyzeBoard,
        ActionType::AnalyzeNode,
        ActionType::AnalyzeGap,
        ActionType::OrganizeNodes,
        ActionType::ConnectNodes,
        ActionType::ExpandConcept,
        ActionType::ResearchTopic,
        ActionType::BrainstormIdeas,
        ActionType::PlanProject,
        ActionType::ImproveContent,
        ActionType::DocumentProcess,
        ActionType::CustomWorkflow,
    ];

    /// Stable name shared with the UI layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateSingle => "create_single_node",
            ActionType::CreateMultiple => "create_multiple_nodes",
            ActionType::CreateSequence => "create_sequence",
            ActionType::CreateHierarchy => "create_hierarchy",
            ActionType::AnalyzeBoard => "analyze_board",
            ActionType::AnalyzeNode => "analyze_node",
            ActionType::AnalyzeGap => "analyze_gaps",
            ActionType::OrganizeNodes => "organize_nodes",
            ActionType::ConnectNodes => "connect_nodes",
            ActionType::ExpandConcept => "expand_concept",
            ActionType::ResearchTopic => "research_topic",
            ActionType::BrainstormIdeas => "brainstorm_ideas",
            ActionType::PlanProject => "plan_project",
            ActionType::ImproveContent => "improve_content",
            ActionType::DocumentProcess => "document_process",
            ActionType::CustomWorkflow => "custom_workflow",
        }
    }

    /// Node-scoped actions make no sense without a board.
    pub fn requires_board(&self) -> bool {
        self.as_str().contains("node")
    }

    pub fn requires_document(&self) -> bool {
        self.as_str().contains("document")
    }

    pub fn is_creation(&self) -> bool {
        matches!(
            self,
            ActionType::CreateSingle
                | ActionType::CreateMultiple
                | ActionType::CreateSequence
                | ActionType::CreateHierarchy
        )
    }

    pub fn is_analysis(&self) -> bool {
        matches!(
            self,
            ActionType::AnalyzeBoard | ActionType::AnalyzeNode | ActionType::AnalyzeGap
        )
    }

    pub fn is_organize(&self) -> bool {
        matches!(self, ActionType::OrganizeNodes)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Single,
    Multiple,
    Board,
    Document,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionIntent {
    pub primary_goal: String,
    pub scope: Scope,
    pub urgency: Urgency,
    pub complexity: Complexity,
}

/// Structured parameters pulled out of the request.
/// Known keys are typed; anything else rides in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionParameters {
    pub count: Option<u32>,
    pub topic: Option<String>,
    pub style: Option<String>,
    pub target: Option<String>,
    pub constraints: Vec<String>,
    pub custom_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ActionParameters {
    /// Overlay `other` onto `self`. Values present in `other` win.
    pub fn merged_with(mut self, other: &ActionParameters) -> Self {
        if other.count.is_some() {
            self.count = other.count;
        }
        if other.topic.is_some() {
            self.topic = other.topic.clone();
        }
        if other.style.is_some() {
            self.style = other.style.clone();
        }
        if other.target.is_some() {
            self.target = other.target.clone();
        }
        if !other.constraints.is_empty() {
            self.constraints = other.constraints.clone();
        }
        if other.custom_instructions.is_some() {
            self.custom_instructions = other.custom_instructions.clone();
        }
        for (k, v) in &other.extra {
            self.extra.insert(k.clone(), v.clone());
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardDensity {
    Empty,
    Sparse,
    Moderate,
    Dense,
}

impl BoardDensity {
    pub fn from_node_count(count: usize) -> Self {
        match count {
            0 => BoardDensity::Empty,
            1..=4 => BoardDensity::Sparse,
            5..=10 => BoardDensity::Moderate,
            _ => BoardDensity::Dense,
        }
    }
}

/// Snapshot of board state at classification time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionContext {
    pub has_board: bool,
    pub node_count: usize,
    pub edge_count: usize,
    pub selected_node_ids: Vec<NodeId>,
    pub document: Option<String>,
}

impl Default for ActionContext {
    fn default() -> Self {
        Self::empty_board()
    }
}

impl ActionContext {
    /// No board open at all (chat-only surface).
    pub fn detached() -> Self {
        Self {
            has_board: false,
            node_count: 0,
            edge_count: 0,
            selected_node_ids: Vec::new(),
            document: None,
        }
    }

    pub fn empty_board() -> Self {
        Self {
            has_board: true,
            ..Self::detached()
        }
    }

    pub fn with_board(node_count: usize, edge_count: usize) -> Self {
        Self {
            node_count,
            edge_count,
            ..Self::empty_board()
        }
    }

    pub fn with_selection(mut self, selected: Vec<NodeId>) -> Self {
        self.selected_node_ids = selected;
        self
    }

    pub fn with_document(mut self, name: impl Into<String>) -> Self {
        self.document = Some(name.into());
        self
    }

    pub fn density(&self) -> BoardDensity {
        BoardDensity::from_node_count(self.node_count)
    }

    pub fn has_selection(&self) -> bool {
        !self.selected_node_ids.is_empty()
    }
}

/// One candidate interpretation of user input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedAction {
    pub id: ActionId,
    pub action_type: ActionType,
    pub intent: ActionIntent,
    pub sentiment: Sentiment,
    pub parameters: ActionParameters,
    pub context: ActionContext,
    pub confidence: f32,
    pub dependencies: Vec<ActionId>,
}

impl DetectedAction {
    /// Build an action directly, bypassing detection. Used by callers that
    /// already know what they want and by chained workflows.
    pub fn new(action_type: ActionType, parameters: ActionParameters, confidence: f32) -> Self {
        Self {
            id: ActionId::new(),
            action_type,
            intent: ActionIntent {
                primary_goal: action_type.as_str().replace('_', " "),
                scope: Scope::Single,
                urgency: Urgency::Medium,
                complexity: Complexity::Moderate,
            },
            sentiment: Sentiment::Neutral,
            parameters,
            context: ActionContext::empty_board(),
            confidence: confidence.clamp(0.0, 1.0),
            dependencies: Vec::new(),
        }
    }

    /// Chain: this action must wait for `other`.
    pub fn depends_on(mut self, other: ActionId) -> Self {
        if !self.dependencies.contains(&other) {
            self.dependencies.push(other);
        }
        self
    }
}
