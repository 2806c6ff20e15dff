use std::cmp::Ordering;
use tracing::debug;

use super::extractor::{extract, ExtractedContext};
use super::patterns::{ActionPattern, PatternRegistry, RETAIN_THRESHOLD};
use super::tokenizer::{tokenize, TokenizedText};
use super::types::*;

/// Seeds at most this many candidates from pattern matches.
const MAX_CANDIDATES: usize = 3;
/// Final list is truncated to this many actions.
const MAX_ACTIONS: usize = 5;
const MIN_CONFIDENCE: f32 = 0.2;

const SPARSE_BOARD_NODES: usize = 5;
const DENSE_BOARD_NODES: usize = 10;
const CREATION_BONUS: f32 = 0.2;
const ORGANIZE_BONUS: f32 = 0.2;
const ANALYZE_BONUS: f32 = 0.3;

const POSITIVE_WORDS: &[&str] = &[
    "great", "good", "love", "awesome", "nice", "excellent", "amazing", "thanks", "helpful", "perfect",
];
const NEGATIVE_WORDS: &[&str] = &[
    "bad", "wrong", "hate", "terrible", "broken", "messy", "awful", "confusing", "useless", "annoying",
];

const SCOPE_TABLE: &[(Scope, &[&str])] = &[
    (Scope::Global, &["everything", "entire", "whole board", "all nodes", "globally"]),
    (Scope::Document, &["document", "pdf", "file", "attachment"]),
    (Scope::Board, &["board", "canvas", "graph"]),
    (Scope::Multiple, &["nodes", "several", "multiple", "many", "ideas", "cards"]),
];
const URGENCY_TABLE: &[(Urgency, &[&str])] = &[
    (Urgency::High, &["urgent", "asap", "immediately", "right now", "quickly", "now"]),
    (Urgency::Low, &["later", "eventually", "whenever", "someday", "no rush"]),
];
const COMPLEXITY_TABLE: &[(Complexity, &[&str])] = &[
    (Complexity::Complex, &["detailed", "comprehensive", "complex", "in depth", "thorough", "full"]),
    (Complexity::Simple, &["simple", "quick", "basic", "brief", "short"]),
];

fn first_match<T: Copy>(text: &TokenizedText, table: &[(T, &[&str])]) -> Option<T> {
    table
        .iter()
        .find(|(_, words)| text.contains_any(words))
        .map(|(value, _)| *value)
}

pub fn detect_sentiment(text: &TokenizedText) -> Sentiment {
    let positive = POSITIVE_WORDS.iter().filter(|w| text.contains_phrase(w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| text.contains_phrase(w)).count();
    match positive.cmp(&negative) {
        Ordering::Greater => Sentiment::Positive,
        Ordering::Less => Sentiment::Negative,
        Ordering::Equal => Sentiment::Neutral,
    }
}

pub fn derive_intent(text: &TokenizedText, pattern: &ActionPattern, parameters: &ActionParameters) -> ActionIntent {
    let mut scope = first_match(text, SCOPE_TABLE).unwrap_or(Scope::Single);
    if scope == Scope::Single && parameters.count.is_some_and(|c| c > 1) {
        scope = Scope::Multiple;
    }

    let primary_goal = match &parameters.topic {
        Some(topic) => format!("{}: {}", pattern.goal, topic),
        None => pattern.goal.to_string(),
    };

    ActionIntent {
        primary_goal,
        scope,
        urgency: first_match(text, URGENCY_TABLE).unwrap_or(Urgency::Medium),
        complexity: first_match(text, COMPLEXITY_TABLE).unwrap_or(Complexity::Moderate),
    }
}

/// Context-driven boost applied during ranking.
pub fn relevance_bonus(action_type: ActionType, context: &ActionContext) -> f32 {
    let mut bonus = 0.0;
    if action_type.is_creation() && context.node_count < SPARSE_BOARD_NODES {
        bonus += CREATION_BONUS;
    }
    if action_type.is_organize() && context.node_count > DENSE_BOARD_NODES {
        bonus += ORGANIZE_BONUS;
    }
    if action_type.is_analysis() && context.has_selection() {
        bonus += ANALYZE_BONUS;
    }
    bonus
}

/// Turns free text into ranked, parameterized actions.
///
/// Deterministic: the same text and context always yield the same types in
/// the same order with the same confidences. Never fails; an empty result
/// means the input is conversation, not a command.
pub struct ActionDetector {
    registry: PatternRegistry,
}

impl Default for ActionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionDetector {
    pub fn new() -> Self {
        Self::with_registry(PatternRegistry::builtin())
    }

    pub fn with_registry(registry: PatternRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn detect(&self, text: &str, context: &ActionContext) -> Vec<DetectedAction> {
        let tokens = tokenize(text);
        if tokens.tokens.is_empty() {
            return Vec::new();
        }
        let extracted = extract(&tokens, context);

        let mut scored: Vec<(usize, f32)> = self
            .registry
            .patterns()
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.score(&tokens)))
            .filter(|(_, score)| *score > RETAIN_THRESHOLD)
            .collect();

        let patterns = self.registry.patterns();
        scored.sort_by(|(ia, sa), (ib, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    patterns[*ib]
                        .base_confidence
                        .partial_cmp(&patterns[*ia].base_confidence)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| ia.cmp(ib))
        });
        scored.truncate(MAX_CANDIDATES);

        let sentiment = detect_sentiment(&tokens);
        let candidates: Vec<DetectedAction> = scored
            .into_iter()
            .map(|(i, score)| self.synthesize(&patterns[i], score, &tokens, &extracted, sentiment))
            .collect();

        let ranked = self.validate_and_rank(candidates, context);
        debug!(
            "Detected {} actions: {:?}",
            ranked.len(),
            ranked.iter().map(|a| (a.action_type, a.confidence)).collect::<Vec<_>>()
        );
        ranked
    }

    fn synthesize(
        &self,
        pattern: &ActionPattern,
        confidence: f32,
        tokens: &TokenizedText,
        extracted: &ExtractedContext,
        sentiment: Sentiment,
    ) -> DetectedAction {
        let parameters = pattern.defaults.clone().merged_with(&extracted.parameters);
        let intent = derive_intent(tokens, pattern, &parameters);
        DetectedAction {
            id: ActionId::new(),
            action_type: pattern.action_type,
            intent,
            sentiment,
            parameters,
            context: extracted.context.clone(),
            confidence,
            dependencies: Vec::new(),
        }
    }

    fn validate_and_rank(&self, candidates: Vec<DetectedAction>, context: &ActionContext) -> Vec<DetectedAction> {
        let mut ranked: Vec<DetectedAction> = candidates
            .into_iter()
            .filter(|a| a.confidence >= MIN_CONFIDENCE)
            .filter(|a| context.has_board || !a.action_type.requires_board())
            .filter(|a| context.document.is_some() || !a.action_type.requires_document())
            .map(|mut a| {
                a.confidence = (a.confidence + relevance_bonus(a.action_type, context)).clamp(0.0, 1.0);
                a
            })
            .collect();

        // Stable sort keeps pattern order for equal scores.
        ranked.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));
        ranked.truncate(MAX_ACTIONS);
        ranked
    }
}
