//! Pending clarifications and the reply matcher.
//!
//! While a clarification is pending, every reply either selects one of the
//! candidates or abandons the clarification. There is no third outcome, so
//! the pipeline always leaves `AwaitingClarification` on the next input.
//!
//! Matching is lexical, tried in order:
//! 1. a 1-based candidate number ("2", "2.", "option 2")
//! 2. an exact, case-insensitive option value or label
//! 3. word overlap: the share of the reply's content words found in a
//!    candidate's label, question and options must reach the threshold;
//!    the best score wins, ties go to the earlier candidate

use serde::Serialize;
use std::collections::HashSet;

use crate::guardrail::{AmbiguityCandidate, AmbiguityKind};

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "but", "by", "can", "could", "do", "does",
    "for", "from", "have", "how", "i", "i'd", "i'm", "in", "is", "it", "its", "just", "like", "me",
    "mean", "meant", "my", "of", "on", "one", "or", "please", "so", "that", "the", "this", "to",
    "want", "was", "we", "what", "which", "with", "would", "you", "your",
];

/// Transient state between an ambiguous input and the reply that resolves it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingClarification {
    pub original_query: String,
    pub reason: AmbiguityKind,
    /// Never empty.
    pub candidates: Vec<AmbiguityCandidate>,
}

/// What a reply to a pending clarification means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarificationReply {
    Selected { candidate: usize, option: Option<usize> },
    Abandoned,
}

impl PendingClarification {
    /// The text shown to the user, also recorded as the assistant turn.
    pub fn prompt_text(&self) -> String {
        let question = self
            .candidates
            .iter()
            .map(|c| c.clarifying_question.trim())
            .find(|q| !q.is_empty())
            .unwrap_or("Could you clarify what you mean?");

        let mut text = format!("{question}\n");
        for (i, candidate) in self.candidates.iter().enumerate() {
            text.push_str(&format!("  {}. {}", i + 1, candidate.interpretation_label));
            if !candidate.option_values.is_empty() {
                text.push_str(&format!(" ({})", candidate.option_values.join(", ")));
            }
            text.push('\n');
        }
        text.truncate(text.trim_end().len());
        text
    }

    /// The original query made explicit with the chosen interpretation.
    pub fn disambiguated_query(&self, candidate: usize, option: Option<usize>) -> String {
        let Some(chosen) = self.candidates.get(candidate) else {
            return self.original_query.clone();
        };
        match option.and_then(|i| chosen.option_values.get(i)) {
            Some(value) => format!(
                "{} ({}: {})",
                self.original_query, chosen.interpretation_label, value
            ),
            None => format!("{} ({})", self.original_query, chosen.interpretation_label),
        }
    }
}

/// Classifies replies against a pending clarification.
#[derive(Debug, Clone, Copy)]
pub struct SelectionMatcher {
    threshold: f32,
}

impl SelectionMatcher {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.clamp(f32::EPSILON, 1.0),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn classify(&self, reply: &str, pending: &PendingClarification) -> ClarificationReply {
        let reply = reply.trim();
        if reply.is_empty() {
            return ClarificationReply::Abandoned;
        }

        if let Some(n) = parse_choice_number(reply) {
            if (1..=pending.candidates.len()).contains(&n) {
                return ClarificationReply::Selected {
                    candidate: n - 1,
                    option: None,
                };
            }
        }

        let normalized = reply.to_lowercase();
        for (ci, candidate) in pending.candidates.iter().enumerate() {
            if let Some(oi) = candidate
                .option_values
                .iter()
                .position(|o| o.trim().to_lowercase() == normalized)
            {
                return ClarificationReply::Selected {
                    candidate: ci,
                    option: Some(oi),
                };
            }
            if candidate.interpretation_label.trim().to_lowercase() == normalized {
                return ClarificationReply::Selected {
                    candidate: ci,
                    option: None,
                };
            }
        }

        let words = content_words(reply);
        if words.is_empty() {
            return ClarificationReply::Abandoned;
        }

        let mut best: Option<(usize, f32)> = None;
        for (ci, candidate) in pending.candidates.iter().enumerate() {
            let vocabulary = candidate_vocabulary(candidate);
            let score = overlap(&words, &vocabulary);
            if score >= self.threshold && best.is_none_or(|(_, s)| score > s) {
                best = Some((ci, score));
            }
        }

        match best {
            Some((ci, _)) => ClarificationReply::Selected {
                candidate: ci,
                option: best_option(&words, &pending.candidates[ci]),
            },
            None => ClarificationReply::Abandoned,
        }
    }
}

fn parse_choice_number(reply: &str) -> Option<usize> {
    let lowered = reply.to_lowercase();
    let stripped = lowered
        .strip_prefix("option")
        .or_else(|| lowered.strip_prefix("number"))
        .unwrap_or(&lowered)
        .trim()
        .trim_end_matches(['.', ')']);
    stripped.parse().ok()
}

fn content_words(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

fn candidate_vocabulary(candidate: &AmbiguityCandidate) -> HashSet<String> {
    let mut text = format!(
        "{} {}",
        candidate.interpretation_label, candidate.clarifying_question
    );
    for option in &candidate.option_values {
        text.push(' ');
        text.push_str(option);
    }
    content_words(&text).into_iter().collect()
}

fn overlap(words: &[String], vocabulary: &HashSet<String>) -> f32 {
    let hits = words.iter().filter(|w| vocabulary.contains(*w)).count();
    hits as f32 / words.len() as f32
}

/// The option sharing the most words with the reply, if any share one.
fn best_option(words: &[String], candidate: &AmbiguityCandidate) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (oi, option) in candidate.option_values.iter().enumerate() {
        let option_words: HashSet<String> = content_words(option).into_iter().collect();
        let hits = words.iter().filter(|w| option_words.contains(*w)).count();
        if hits > 0 && best.is_none_or(|(_, h)| hits > h) {
            best = Some((oi, hits));
        }
    }
    best.map(|(oi, _)| oi)
}
