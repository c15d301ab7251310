use analysis::{ChapterAnalysisDocument, ChapterContext, VocabularyNote};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::fmt::Write;

use crate::session::{ChatTurn, Speaker};

/// Score given to a vocabulary note whose term appears verbatim in the question
const TERM_MATCH_SCORE: usize = 10;
const MIN_QUESTION_WORD_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptLimits {
    pub vocabulary: usize,
    pub history_turns: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            vocabulary: 5,
            history_turns: 10,
        }
    }
}

/// Bounded context handed to the external answer generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptContext {
    pub chapter_id: String,
    pub chapter_title: String,
    pub question: String,
    pub summary: Option<String>,
    pub chapter_context: Option<ChapterContext>,
    pub vocabulary: Vec<VocabularyNote>,
    pub history: Vec<ChatTurn>,
}

pub fn build_companion_prompt(
    doc: &ChapterAnalysisDocument,
    question: &str,
    history: &VecDeque<ChatTurn>,
    limits: PromptLimits,
) -> PromptContext {
    let question = question.trim();

    let vocabulary = doc
        .companion
        .as_ref()
        .map(|c| rank_vocabulary(&c.vocabulary, question, limits.vocabulary))
        .unwrap_or_default();

    let skip = history.len().saturating_sub(limits.history_turns);
    let history = history.iter().skip(skip).cloned().collect();

    PromptContext {
        chapter_id: doc.identity.chapter_id.clone(),
        chapter_title: doc.identity.title.clone(),
        question: question.to_string(),
        summary: doc
            .summary
            .as_ref()
            .map(|s| s.concise.clone())
            .filter(|s| !s.is_empty()),
        chapter_context: doc.companion.as_ref().and_then(|c| c.context.clone()),
        vocabulary,
        history,
    }
}

/// Most relevant notes first. Ties, including notes that match nothing,
/// keep document order.
fn rank_vocabulary(notes: &[VocabularyNote], question: &str, limit: usize) -> Vec<VocabularyNote> {
    let question = question.to_lowercase();
    let words: BTreeSet<&str> = question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_QUESTION_WORD_LEN)
        .collect();

    let mut scored: Vec<(usize, &VocabularyNote)> = notes
        .iter()
        .map(|note| {
            let term = note.term.to_lowercase();
            let definition = note.definition.to_lowercase();

            let mut score = words
                .iter()
                .filter(|w| term.contains(**w) || definition.contains(**w))
                .count();
            if !term.is_empty() && question.contains(&term) {
                score += TERM_MATCH_SCORE;
            }
            (score, note)
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, note)| note.clone()).collect()
}

impl PromptContext {
    /// Plain-text block for the answer generator
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Chapter: {} ({})", self.chapter_title, self.chapter_id);

        if let Some(summary) = &self.summary {
            let _ = writeln!(out, "Summary: {}", summary);
        }
        if let Some(ctx) = &self.chapter_context {
            let _ = writeln!(out, "Setting: {}", ctx.setting);
            let _ = writeln!(out, "Timeline: {}", ctx.timeline_position);
            let _ = writeln!(out, "Importance: {}", ctx.narrative_importance);
        }

        if !self.vocabulary.is_empty() {
            out.push_str("\nVocabulary:\n");
            for note in &self.vocabulary {
                let _ = writeln!(out, "- {}: {}", note.term, note.definition);
            }
        }

        if !self.history.is_empty() {
            out.push_str("\nConversation so far:\n");
            for turn in &self.history {
                let speaker = match turn.speaker {
                    Speaker::User => "Reader",
                    Speaker::Assistant => "Companion",
                };
                let _ = writeln!(out, "{}: {}", speaker, turn.text);
            }
        }

        let _ = write!(out, "\nQuestion: {}", self.question);
        out
    }
}
