use regex::Regex;
use tracing::warn;

use super::tokenizer::TokenizedText;
use super::types::{ActionParameters, ActionType};

/// Weight of a regex hit. Only the first hit counts.
pub const REGEX_WEIGHT: f32 = 0.4;
/// Weight of full keyword overlap.
pub const KEYWORD_WEIGHT: f32 = 0.6;
/// Patterns at or below this score are not retained.
pub const RETAIN_THRESHOLD: f32 = 0.3;

/// A recognisable way of asking for one action type.
#[derive(Debug, Clone)]
pub struct ActionPattern {
    pub action_type: ActionType,
    pub name: &'static str,
    /// Human description used as the intent's primary goal.
    pub goal: &'static str,
    pub regexes: Vec<Regex>,
    pub keywords: Vec<&'static str>,
    pub defaults: ActionParameters,
    /// Prior used to break ties between equally scored patterns.
    pub base_confidence: f32,
}

impl ActionPattern {
    pub fn new(
        action_type: ActionType,
        name: &'static str,
        goal: &'static str,
        regexes: &[&str],
        keywords: &[&'static str],
        base_confidence: f32,
    ) -> Self {
        let compiled = regexes
            .iter()
            .filter_map(|src| match Regex::new(src) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Dropping invalid regex for pattern {}: {}", name, e);
                    None
                }
            })
            .collect();
        Self {
            action_type,
            name,
            goal,
            regexes: compiled,
            keywords: keywords.to_vec(),
            defaults: ActionParameters::default(),
            base_confidence,
        }
    }

    pub fn with_default_count(mut self, count: u32) -> Self {
        self.defaults.count = Some(count);
        self
    }

    pub fn with_default_style(mut self, style: &str) -> Self {
        self.defaults.style = Some(style.to_string());
        self
    }

    /// Pure scoring: regex hit + weighted keyword overlap, clamped to [0, 1].
    pub fn score(&self, text: &TokenizedText) -> f32 {
        let mut confidence = 0.0;

        if self.regexes.iter().any(|re| re.is_match(&text.normalized)) {
            confidence += REGEX_WEIGHT;
        }

        if !self.keywords.is_empty() {
            let matched = self.keywords.iter().filter(|kw| text.contains_phrase(kw)).count();
            confidence += (matched as f32 / self.keywords.len() as f32) * KEYWORD_WEIGHT;
        }

        confidence.clamp(0.0, 1.0)
    }
}

/// Ordered set of patterns. Registration order is the final tie-breaker.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    patterns: Vec<ActionPattern>,
}

impl PatternRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pattern: ActionPattern) {
        self.patterns.push(pattern);
    }

    pub fn patterns(&self) -> &[ActionPattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn builtin() -> Self {
        use ActionType::*;

        let mut r = Self::empty();

        r.register(
            ActionPattern::new(
                CreateSingle,
                "single_node",
                "Create a single node",
                &[r"\b(create|add|make|generate|write|put)\s+(a|an|one|a single|a new|new)\s+(\w+\s+){0,3}(node|note|card|item|box)\b"],
                &["create", "add", "node", "new"],
                0.8,
            )
            .with_default_count(1),
        );
        r.register(
            ActionPattern::new(
                CreateMultiple,
                "multiple_nodes",
                "Create several nodes",
                &[r"\b(create|add|make|generate|write)\s+(\d+|two|three|four|five|six|seven|eight|nine|ten|several|multiple|some|a few|many)\s+(\w+\s+){0,3}(nodes|notes|cards|items|boxes)\b"],
                &["create", "multiple", "several", "nodes", "add"],
                0.75,
            )
            .with_default_count(3),
        );
        r.register(
            ActionPattern::new(
                CreateSequence,
                "sequence",
                "Lay out a sequence of steps",
                &[r"\b(sequence|step by step|steps|timeline|process flow|series of)\b"],
                &["sequence", "steps", "timeline", "flow", "series", "order"],
                0.7,
            )
            .with_default_count(4),
        );
        r.register(
            ActionPattern::new(
                CreateHierarchy,
                "hierarchy",
                "Build a hierarchy of topics",
                &[r"\b(hierarchy|tree|mind ?map|break ?down|subtopics|taxonomy)\b"],
                &["hierarchy", "tree", "parent", "children", "breakdown", "mindmap"],
                0.7,
            )
            .with_default_count(3),
        );
        r.register(ActionPattern::new(
            AnalyzeBoard,
            "analyze_board",
            "Analyze the board",
            &[r"\b(analy[sz]e|review|summari[sz]e|assess|evaluate|audit)\s+(the\s+|my\s+|this\s+|our\s+)?(board|canvas|graph|everything|whole board)\b"],
            &["analyze", "board", "overview", "summary", "review", "insights"],
            0.75,
        ));
        r.register(ActionPattern::new(
            AnalyzeNode,
            "analyze_node",
            "Analyze the selected node",
            &[r"\b(analy[sz]e|explain|review|evaluate|critique)\s+(this|the selected|selected|that)(\s+(node|note|card|idea))?\b"],
            &["analyze", "node", "selected", "explain", "this"],
            0.75,
        ));
        r.register(ActionPattern::new(
            AnalyzeGap,
            "analyze_gaps",
            "Find gaps in the board",
            &[r"\b(gaps?|missing|what else|blind spots?|overlooked)\b"],
            &["gap", "gaps", "missing", "coverage", "incomplete"],
            0.7,
        ));
        r.register(ActionPattern::new(
            OrganizeNodes,
            "organize",
            "Organize existing nodes",
            &[r"\b(organi[sz]e|arrange|rearrange|tidy( up)?|clean up|cluster|layout)\b"],
            &["organize", "arrange", "nodes", "layout", "structure", "group"],
            0.7,
        ));
        r.register(ActionPattern::new(
            ConnectNodes,
            "connect",
            "Connect related nodes",
            &[r"\b(connect|link|relate|wire up|join)\b"],
            &["connect", "link", "nodes", "relationship", "edges", "between"],
            0.7,
        ));
        r.register(
            ActionPattern::new(
                ExpandConcept,
                "expand",
                "Expand a concept",
                &[r"\b(expand|elaborate|extend|dig deeper|go deeper|flesh out)\b"],
                &["expand", "elaborate", "concept", "deeper", "detail", "idea"],
                0.7,
            )
            .with_default_count(3),
        );
        r.register(
            ActionPattern::new(
                ResearchTopic,
                "research",
                "Research a topic",
                &[r"\b(research|investigate|look up|find out|learn about|study)\b"],
                &["research", "investigate", "topic", "sources", "facts", "study"],
                0.65,
            )
            .with_default_style("detailed"),
        );
        r.register(
            ActionPattern::new(
                BrainstormIdeas,
                "brainstorm",
                "Brainstorm ideas",
                &[r"\b(brainstorm|ideas? for|come up with|ideate|suggestions?)\b"],
                &["brainstorm", "ideas", "creative", "suggestions", "alternatives"],
                0.7,
            )
            .with_default_count(5)
            .with_default_style("creative"),
        );
        r.register(
            ActionPattern::new(
                PlanProject,
                "plan_project",
                "Plan a project",
                &[r"\b(plan|roadmap|project plan|milestones?)\b"],
                &["plan", "project", "roadmap", "milestones", "phases", "launch"],
                0.7,
            )
            .with_default_count(4),
        );
        r.register(ActionPattern::new(
            ImproveContent,
            "improve",
            "Improve existing content",
            &[r"\b(improve|rewrite|refine|polish|enhance|reword)\b"],
            &["improve", "rewrite", "better", "refine", "content", "clarity"],
            0.65,
        ));
        r.register(ActionPattern::new(
            DocumentProcess,
            "document",
            "Process the attached document",
            &[r"\b(document|pdf|attachment|uploaded file)\b"],
            &["document", "pdf", "extract", "summarize", "file", "import"],
            0.65,
        ));
        r.register(ActionPattern::new(
            CustomWorkflow,
            "workflow",
            "Run a custom workflow",
            &[r"\b(workflow|automate|pipeline|custom process)\b"],
            &["workflow", "automate", "pipeline", "custom", "steps"],
            0.5,
        ));

        r
    }
}
