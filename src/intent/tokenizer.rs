use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const MAX_KEYWORDS: usize = 10;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "her", "was", "one",
    "our", "out", "had", "has", "have", "him", "his", "how", "its", "may", "new", "now", "old",
    "see", "two", "who", "did", "get", "let", "put", "say", "she", "too", "use", "with", "this",
    "that", "from", "they", "will", "would", "there", "their", "what", "about", "which", "when",
    "make", "like", "into", "than", "them", "then", "some", "could", "your", "please", "just",
    "want", "need", "also", "these", "those", "been", "were", "here",
];

/// Text after normalization plus what was pulled out of the raw input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedText {
    pub raw: String,
    pub normalized: String,
    pub tokens: Vec<String>,
    pub keywords: Vec<String>,
    pub entities: Entities,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entities {
    pub numbers: Vec<u32>,
    pub quoted: Vec<String>,
    pub capitalized: Vec<String>,
}

impl TokenizedText {
    /// Whole-word (or whole-phrase) containment on the normalized text.
    pub fn contains_phrase(&self, phrase: &str) -> bool {
        let needle = phrase.trim();
        if needle.is_empty() {
            return false;
        }
        let haystack = format!(" {} ", self.normalized);
        haystack.contains(&format!(" {} ", needle))
    }

    pub fn contains_any(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.contains_phrase(p))
    }
}

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""([^"]+)"|(?:^|\s)'([^']+)'(?:\s|$|[.,!?])"#).expect("valid quoted regex")
    })
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,6})\b").expect("valid number regex"))
}

/// Lowercase, drop apostrophes, turn other punctuation into spaces, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '\'' || ch == '\u{2019}' {
            continue;
        }
        if ch.is_alphanumeric() || ch.is_whitespace() {
            out.extend(ch.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn extract_entities(raw: &str) -> Entities {
    let mut entities = Entities::default();

    for caps in number_re().captures_iter(raw) {
        if let Ok(n) = caps[1].parse::<u32>() {
            entities.numbers.push(n);
        }
    }

    for caps in quoted_re().captures_iter(raw) {
        let inner = caps.get(1).or_else(|| caps.get(2));
        if let Some(m) = inner {
            let q = m.as_str().trim();
            if !q.is_empty() {
                entities.quoted.push(q.to_string());
            }
        }
    }

    // First word of the sentence is capitalized by convention, not meaning.
    for (i, word) in raw.split_whitespace().enumerate() {
        let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if i == 0 || cleaned.len() < 2 {
            continue;
        }
        if cleaned.chars().next().is_some_and(|c| c.is_uppercase()) && !entities.capitalized.contains(&cleaned) {
            entities.capitalized.push(cleaned);
        }
    }

    entities
}

pub fn extract_keywords(tokens: &[String]) -> Vec<String> {
    let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    let mut seen: HashSet<String> = HashSet::new();
    tokens
        .iter()
        .filter(|t| t.chars().count() > 2 && !stop.contains(t.as_str()))
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| seen.insert(t.to_string()))
        .take(MAX_KEYWORDS)
        .cloned()
        .collect()
}

pub fn tokenize(text: &str) -> TokenizedText {
    let normalized = normalize(text);
    let tokens: Vec<String> = normalized.split(' ').filter(|t| !t.is_empty()).map(String::from).collect();
    let keywords = extract_keywords(&tokens);
    TokenizedText {
        raw: text.to_string(),
        entities: extract_entities(text),
        normalized,
        tokens,
        keywords,
    }
}
