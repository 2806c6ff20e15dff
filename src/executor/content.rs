//! Titles and prose for new nodes.
//!
//! With a gateway configured the text is model-written; without one, or when
//! the gateway fails, deterministic templates are used so execution never
//! depends on the model being reachable.

use std::sync::Arc;
use tracing::warn;

use crate::intent::types::{ActionParameters, ActionType};
use crate::services::llm::{LanguageModelGateway, TokenUsage};

const SYSTEM_PROMPT: &str = "You write short, self-contained notes for a visual thinking board. \
Put a title of at most eight words on the first line, then two to four sentences of content. \
No markdown headings, no preamble.";
const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 200;
const MAX_TITLE_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDraft {
    pub title: String,
    pub content: String,
}

/// What a single node is for, within its action.
#[derive(Debug, Clone)]
pub struct DraftRequest<'a> {
    pub action_type: ActionType,
    pub parameters: &'a ActionParameters,
    /// e.g. "Step 2 of 4" or "Phase: Discovery".
    pub role: String,
    pub index: usize,
    pub request_text: &'a str,
}

impl DraftRequest<'_> {
    fn topic(&self) -> &str {
        self.parameters.topic.as_deref().unwrap_or("new idea")
    }
}

#[derive(Clone, Default)]
pub struct ContentSynthesizer {
    gateway: Option<Arc<dyn LanguageModelGateway>>,
}

impl ContentSynthesizer {
    pub fn templated() -> Self {
        Self { gateway: None }
    }

    pub fn with_gateway(gateway: Arc<dyn LanguageModelGateway>) -> Self {
        Self { gateway: Some(gateway) }
    }

    pub async fn draft(&self, request: &DraftRequest<'_>) -> (NodeDraft, TokenUsage) {
        let Some(gateway) = &self.gateway else {
            return (template_draft(request), TokenUsage::default());
        };

        let prompt = build_prompt(request);
        match gateway.complete(&prompt, SYSTEM_PROMPT, TEMPERATURE, MAX_TOKENS).await {
            Ok(completion) => match parse_completion(&completion.text) {
                Some(draft) => (draft, completion.usage),
                None => {
                    warn!("Gateway returned unusable text for {}; using template", request.action_type);
                    (template_draft(request), completion.usage)
                }
            },
            Err(e) => {
                warn!("Gateway error for {}: {}; using template", request.action_type, e);
                (template_draft(request), TokenUsage::default())
            }
        }
    }
}

fn build_prompt(request: &DraftRequest<'_>) -> String {
    let params = request.parameters;
    let mut prompt = format!(
        "Board request: {}\nTask: {} ({})\nTopic: {}",
        request.request_text,
        request.action_type,
        request.role,
        request.topic()
    );
    if let Some(style) = &params.style {
        prompt.push_str(&format!("\nStyle: {}", style));
    }
    if !params.constraints.is_empty() {
        prompt.push_str(&format!("\nConstraints: {}", params.constraints.join(", ")));
    }
    if let Some(extra) = &params.custom_instructions {
        prompt.push_str(&format!("\nInstructions: {}", extra));
    }
    prompt
}

/// First non-empty line is the title, the rest is content.
pub fn parse_completion(text: &str) -> Option<NodeDraft> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let raw_title = lines.next()?;
    let title = raw_title
        .trim_start_matches('#')
        .trim()
        .trim_start_matches("Title:")
        .trim()
        .trim_matches('"')
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect::<String>();
    if title.is_empty() {
        return None;
    }
    let content = lines.collect::<Vec<_>>().join("\n");
    Some(NodeDraft { title, content })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn template_draft(request: &DraftRequest<'_>) -> NodeDraft {
    let topic = capitalize(request.topic());
    let n = request.index + 1;
    let title = match request.action_type {
        ActionType::CreateSingle => topic.clone(),
        ActionType::CreateSequence => format!("Step {}: {}", n, topic),
        ActionType::CreateHierarchy | ActionType::ExpandConcept => {
            if request.index == 0 && request.role.starts_with("Root") {
                topic.clone()
            } else {
                format!("{} · aspect {}", topic, n)
            }
        }
        ActionType::BrainstormIdeas => format!("Idea {}: {}", n, topic),
        ActionType::PlanProject => format!("{} · {}", request.role.trim_start_matches("Phase: "), topic),
        ActionType::ResearchTopic => format!("Research: {}", topic),
        ActionType::ImproveContent => format!("Revised: {}", topic),
        _ => format!("{} {}", topic, n),
    };

    let mut content = match request.action_type {
        ActionType::ResearchTopic => format!("Key questions, sources and findings about {}.", request.topic()),
        _ => format!("{} for {}.", request.role, request.topic()),
    };
    if let Some(instructions) = &request.parameters.custom_instructions {
        content.push_str(&format!("\n{}", instructions));
    }

    NodeDraft { title, content }
}
