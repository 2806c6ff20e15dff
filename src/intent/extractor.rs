use regex::Regex;
use std::sync::OnceLock;

use super::tokenizer::TokenizedText;
use super::types::{ActionContext, ActionParameters, BoardDensity};

const MAX_COUNT: u32 = 20;
const MAX_TOPIC_WORDS: usize = 6;

const NUMBER_WORDS: &[(&str, u32)] = &[
    ("one", 1), ("two", 2), ("three", 3), ("four", 4), ("five", 5), ("six", 6), ("seven", 7),
    ("eight", 8), ("nine", 9), ("ten", 10), ("eleven", 11), ("twelve", 12), ("fifteen", 15),
    ("twenty", 20), ("couple", 2), ("few", 3), ("several", 4),
];

const STYLE_TABLE: &[(&str, &str)] = &[
    ("bullet", "list"),
    ("bullets", "list"),
    ("list", "list"),
    ("detailed", "detailed"),
    ("in depth", "detailed"),
    ("brief", "concise"),
    ("concise", "concise"),
    ("short", "concise"),
    ("formal", "formal"),
    ("casual", "casual"),
    ("creative", "creative"),
    ("visual", "visual"),
];

// Words that describe the command rather than its subject.
const COMMAND_VOCAB: &[&str] = &[
    "create", "add", "generate", "write", "node", "nodes", "note", "notes", "card", "cards",
    "organize", "arrange", "connect", "link", "analyze", "analyse", "review", "board", "canvas",
    "expand", "research", "brainstorm", "ideas", "plan", "improve", "selected", "multiple",
    "several", "items", "item", "single", "quickly", "urgent", "detailed", "simple", "sequence",
];

const PRONOUN_TOPICS: &[&str] = &["me", "us", "it", "this", "that", "them", "now", "later"];

/// Parameters plus the board snapshot they were extracted against.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedContext {
    pub parameters: ActionParameters,
    pub context: ActionContext,
    pub density: BoardDensity,
}

fn about_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:about|regarding|around|on|for)\s+(.+)$").expect("valid topic regex"))
}

fn creation_topic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(?:create|add|make|generate|write)\s+(?:(?:a|an|one|the|some|a few|several|multiple|\d+|two|three|four|five|six|seven|eight|nine|ten)\s+)?(?:new\s+)?(.+?)\s+(?:node|nodes|note|notes|card|cards|item|items)\b",
        )
        .expect("valid creation regex")
    })
}

fn constraint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(without|avoid|except|only|must)\s+(\w+(?:\s+\w+){0,4})").expect("valid constraint regex")
    })
}

fn clean_topic(raw: &str) -> Option<String> {
    let words: Vec<&str> = raw
        .split_whitespace()
        .filter(|w| !matches!(*w, "please" | "thanks" | "the" | "a" | "an"))
        .take(MAX_TOPIC_WORDS)
        .collect();
    if words.is_empty() {
        return None;
    }
    let topic = words.join(" ");
    if PRONOUN_TOPICS.contains(&topic.as_str()) {
        return None;
    }
    Some(topic)
}

pub fn extract_count(text: &TokenizedText) -> Option<u32> {
    let from_digits = text.entities.numbers.first().copied();
    let from_words = || {
        text.tokens
            .iter()
            .find_map(|t| NUMBER_WORDS.iter().find(|(w, _)| *w == t.as_str()).map(|(_, n)| *n))
    };
    from_digits.or_else(from_words).map(|n| n.clamp(1, MAX_COUNT))
}

pub fn extract_topic(text: &TokenizedText) -> Option<String> {
    if let Some(caps) = about_re().captures(&text.normalized) {
        if let Some(topic) = clean_topic(&caps[1]) {
            return Some(topic);
        }
    }
    if let Some(caps) = creation_topic_re().captures(&text.normalized) {
        if let Some(topic) = clean_topic(&caps[1]) {
            return Some(topic);
        }
    }
    text.keywords
        .iter()
        .find(|k| !COMMAND_VOCAB.contains(&k.as_str()))
        .cloned()
}

pub fn extract_style(text: &TokenizedText) -> Option<String> {
    STYLE_TABLE
        .iter()
        .find(|(word, _)| text.contains_phrase(word))
        .map(|(_, style)| style.to_string())
}

pub fn extract_target(text: &TokenizedText, context: &ActionContext) -> Option<String> {
    let refers_to_selection = text.contains_any(&["selected", "this node", "that node", "this card", "this one"]);
    if refers_to_selection {
        if let Some(first) = context.selected_node_ids.first() {
            return Some(first.to_string());
        }
    }
    text.entities.capitalized.first().cloned()
}

pub fn extract_constraints(text: &TokenizedText) -> Vec<String> {
    constraint_re()
        .captures_iter(&text.normalized)
        .map(|caps| format!("{} {}", &caps[1], &caps[2]))
        .collect()
}

/// Pull structured parameters out of the text and pair them with the board snapshot.
pub fn extract(text: &TokenizedText, context: &ActionContext) -> ExtractedContext {
    let custom_instructions = if text.entities.quoted.is_empty() {
        None
    } else {
        Some(text.entities.quoted.join("; "))
    };

    let parameters = ActionParameters {
        count: extract_count(text),
        topic: extract_topic(text),
        style: extract_style(text),
        target: extract_target(text, context),
        constraints: extract_constraints(text),
        custom_instructions,
        extra: Default::default(),
    };

    ExtractedContext {
        parameters,
        density: context.density(),
        context: context.clone(),
    }
}
