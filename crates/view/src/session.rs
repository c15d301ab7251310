use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// Everything one reader has selected, plus their chat with the companion.
/// Owned by a single session and mutated only by that session's events.
#[derive(Debug, Clone, Serialize)]
pub struct SessionViewState {
    pub selected_novel_id: Option<String>,
    pub selected_chapter_id: Option<String>,
    pub selected_character: Option<String>,
    chat_history: VecDeque<ChatTurn>,
    max_history: usize,
    /// Last-known remote reachability
    pub connected: bool,
}

impl SessionViewState {
    pub fn new(max_history: usize) -> Self {
        Self {
            selected_novel_id: None,
            selected_chapter_id: None,
            selected_character: None,
            chat_history: VecDeque::with_capacity(max_history.min(64)),
            max_history,
            connected: false,
        }
    }

    pub fn chat_history(&self) -> &VecDeque<ChatTurn> {
        &self.chat_history
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Bounded FIFO: once full, the oldest turns make room for new ones.
    pub fn append_chat_turn(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.chat_history.push_back(ChatTurn {
            speaker,
            text: text.into(),
        });

        let mut evicted = 0;
        while self.chat_history.len() > self.max_history {
            self.chat_history.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, max_history = self.max_history, "Evicted oldest chat turns");
        }
    }

    pub fn clear_chat(&mut self) {
        self.chat_history.clear();
    }

    /// Switching novels invalidates the chapter and character picked in the old one
    pub fn select_novel(&mut self, novel_id: impl Into<String>) {
        let novel_id = novel_id.into();
        if self.selected_novel_id.as_deref() != Some(novel_id.as_str()) {
            self.selected_chapter_id = None;
            self.selected_character = None;
        }
        self.selected_novel_id = Some(novel_id);
    }

    pub fn select_chapter(&mut self, chapter_id: impl Into<String>) {
        let chapter_id = chapter_id.into();
        if self.selected_chapter_id.as_deref() != Some(chapter_id.as_str()) {
            self.selected_character = None;
        }
        self.selected_chapter_id = Some(chapter_id);
    }

    pub fn select_character(&mut self, name: Option<String>) {
        self.selected_character = name;
    }

    pub fn record_connectivity(&mut self, connected: bool) {
        self.connected = connected;
    }
}
