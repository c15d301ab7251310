use analysis::{
    ChapterAnalysisDocument, ChapterContext, ChapterIdentity, CulturalNote, EmotionSample,
    LiteraryElements, PaceShift, Theme, VocabularyNote,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::character::find_character;
use crate::session::SessionViewState;

/// Which top-level sections the upstream analysis actually produced.
/// A present-but-empty section still reports `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionAvailability {
    pub summary: bool,
    pub sentiment: bool,
    pub themes: bool,
    pub literary_elements: bool,
    pub characters: bool,
    pub companion: bool,
    pub analytics: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryView {
    pub concise: String,
    pub detailed: String,
    pub key_events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArcPoint {
    /// In [0,1]
    pub position: f64,
    pub emotion: String,
    pub magnitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsView {
    pub readability_score: Option<f64>,
    pub vocabulary_level: Option<String>,
    pub structural_complexity: Option<String>,
    pub overall_pace: Option<String>,
    pub pace_shifts: Vec<PaceShift>,
    pub engagement_score: Option<f64>,
    pub hooks: Vec<String>,
}

/// Everything the presentation layer reads for one chapter. No field is
/// ever missing; absent sections come back empty with their flag cleared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterView {
    pub identity: ChapterIdentity,
    pub revision: String,
    pub availability: SectionAvailability,
    pub summary: SummaryView,
    pub overall_tone: Option<String>,
    pub emotional_arc: Vec<ArcPoint>,
    pub character_emotions: BTreeMap<String, Vec<String>>,
    pub themes: Vec<Theme>,
    pub literary_elements: Option<LiteraryElements>,
    pub characters: Vec<String>,
    pub relationship_count: usize,
    pub chapter_context: Option<ChapterContext>,
    pub suggested_questions: Vec<String>,
    pub discussion_points: Vec<String>,
    pub vocabulary: Vec<VocabularyNote>,
    pub cultural_context: Vec<CulturalNote>,
    pub analytics: AnalyticsView,
    pub selected_character: Option<String>,
    pub connected: bool,
}

impl ChapterView {
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }
}

pub fn build_chapter_view(doc: &ChapterAnalysisDocument, state: &SessionViewState) -> ChapterView {
    let availability = SectionAvailability {
        summary: doc.summary.is_some(),
        sentiment: doc.sentiment.is_some(),
        themes: doc.themes.is_some(),
        literary_elements: doc.literary_elements.is_some(),
        characters: doc.character_mapping.is_some(),
        companion: doc.companion.is_some(),
        analytics: doc.analytics.is_some(),
    };

    let summary = doc
        .summary
        .as_ref()
        .map(|s| SummaryView {
            concise: s.concise.clone(),
            detailed: s.detailed.clone(),
            key_events: s.key_events.clone(),
        })
        .unwrap_or_default();

    let mut overall_tone = None;
    let mut emotional_arc = Vec::new();
    let mut character_emotions: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(s) = &doc.sentiment {
        overall_tone = s.overall_tone.clone();
        emotional_arc = resample_arc(&s.emotional_arc);
        for (name, tags) in &s.character_emotions {
            character_emotions.insert(name.clone(), tags.iter().cloned().collect());
        }
    }

    // sort_by is stable: equal relevance keeps document order, and -0.0 ties 0.0
    let mut themes = doc.themes.clone().unwrap_or_default();
    themes.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(Ordering::Equal));

    let (characters, relationship_count): (Vec<String>, usize) = doc
        .character_mapping
        .as_ref()
        .map(|m| (m.characters.iter().map(|c| c.name.clone()).collect(), m.relationships.len()))
        .unwrap_or_default();

    let companion = doc.companion.clone().unwrap_or_default();

    let selected_character = state
        .selected_character
        .as_deref()
        .and_then(|name| find_character(doc, name))
        .map(|c| c.name.clone());

    ChapterView {
        identity: doc.identity.clone(),
        revision: String::new(),
        availability,
        summary,
        overall_tone,
        emotional_arc,
        character_emotions,
        themes,
        literary_elements: doc.literary_elements.clone(),
        characters,
        relationship_count,
        chapter_context: companion.context,
        suggested_questions: companion.suggested_questions,
        discussion_points: companion.discussion_points,
        vocabulary: companion.vocabulary,
        cultural_context: companion.cultural_context,
        analytics: analytics_view(doc),
        selected_character,
        connected: state.connected,
    }
}

/// Place arc samples on [0,1] and order them by position.
///
/// Upstream positions are only trusted when every sample has one and all of
/// them are finite; otherwise the arc falls back to even spacing by index.
fn resample_arc(samples: &[EmotionSample]) -> Vec<ArcPoint> {
    let n = samples.len();
    let reported: Option<Vec<f64>> = samples
        .iter()
        .map(|s| s.position.filter(|p| p.is_finite()))
        .collect();

    let positions: Vec<f64> = match reported {
        Some(raw) if !raw.is_empty() => rescale(&raw),
        _ => (0..n)
            .map(|i| if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 })
            .collect(),
    };

    let mut points: Vec<ArcPoint> = samples
        .iter()
        .zip(positions)
        .map(|(s, position)| ArcPoint {
            position,
            emotion: s.emotion.clone(),
            magnitude: s.magnitude,
        })
        .collect();
    points.sort_by(|a, b| a.position.total_cmp(&b.position));
    points
}

/// Map finite values onto [0,1]. Halving first keeps the span finite even
/// when the inputs sit near opposite ends of the f64 range.
fn rescale(raw: &[f64]) -> Vec<f64> {
    let min = raw.iter().copied().fold(f64::INFINITY, f64::min) / 2.0;
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max) / 2.0;
    let span = max - min;
    raw.iter()
        .map(|p| {
            if span > 0.0 {
                ((p / 2.0 - min) / span).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect()
}

fn analytics_view(doc: &ChapterAnalysisDocument) -> AnalyticsView {
    let Some(analytics) = &doc.analytics else {
        return AnalyticsView::default();
    };

    let mut view = AnalyticsView::default();
    if let Some(c) = &analytics.complexity {
        view.readability_score = c.readability_score;
        view.vocabulary_level = c.vocabulary_level.clone();
        view.structural_complexity = c.structural_complexity.clone();
    }
    if let Some(p) = &analytics.pacing {
        view.overall_pace = p.overall_pace.clone();
        view.pace_shifts = p.shifts.clone();
    }
    if let Some(e) = &analytics.engagement {
        view.engagement_score = e.score;
        view.hooks = e.hooks.clone();
    }
    view
}
