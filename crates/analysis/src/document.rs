use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Canonical record for one analysed chapter.
///
/// Every section is optional: `None` means the upstream analysis never
/// produced it, which is different from a present-but-empty section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterAnalysisDocument {
    pub identity: ChapterIdentity,
    pub summary: Option<Summary>,
    pub sentiment: Option<SentimentAnalysis>,
    pub themes: Option<Vec<Theme>>,
    pub literary_elements: Option<LiteraryElements>,
    pub character_mapping: Option<CharacterMapping>,
    pub companion: Option<InteractiveCompanion>,
    pub analytics: Option<ReadingAnalytics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterIdentity {
    pub novel_id: String,
    pub chapter_id: String,
    pub chapter_number: Option<u32>,
    pub title: String,
    pub novel_title: Option<String>,
    pub word_count: Option<u32>,
    pub reading_time_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub concise: String,
    pub detailed: String,
    pub key_events: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub overall_tone: Option<String>,
    pub emotional_arc: Vec<EmotionSample>,
    /// Character name -> dominant emotion tags
    pub character_emotions: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSample {
    /// Raw position as reported upstream; the view layer places samples on [0,1].
    pub position: Option<f64>,
    pub emotion: String,
    /// Clamped to [0,1].
    pub magnitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    /// Clamped to [0,1].
    pub relevance: f64,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteraryElements {
    pub narrative_voice: Option<String>,
    pub foreshadowing: Option<Vec<LiteraryNote>>,
    pub symbolism: Option<Vec<LiteraryNote>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteraryNote {
    pub quote: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterMapping {
    pub characters: Vec<CharacterProfile>,
    pub relationships: Vec<Relationship>,
}

impl CharacterMapping {
    pub fn character(&self, name: &str) -> Option<&CharacterProfile> {
        self.characters.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    pub role: Option<String>,
    pub description: Option<String>,
    pub first_appearance: Option<String>,
    pub traits: Vec<String>,
    pub development_status: Option<String>,
    pub quotes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub label: String,
    /// Clamped to [-1,1].
    pub sentiment: f64,
    pub significance: String,
    pub dynamics: Option<String>,
    pub interaction_count: Option<u32>,
}

impl Relationship {
    /// The other endpoint of this edge, if `name` participates in it.
    pub fn counterpart(&self, name: &str) -> Option<&str> {
        if self.source == name {
            Some(&self.target)
        } else if self.target == name {
            Some(&self.source)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractiveCompanion {
    pub context: Option<ChapterContext>,
    pub suggested_questions: Vec<String>,
    pub discussion_points: Vec<String>,
    pub vocabulary: Vec<VocabularyNote>,
    pub cultural_context: Vec<CulturalNote>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterContext {
    pub setting: String,
    pub timeline_position: String,
    pub narrative_importance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyNote {
    pub term: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CulturalNote {
    pub reference: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingAnalytics {
    pub complexity: Option<ComplexityMetrics>,
    pub pacing: Option<PacingAnalysis>,
    pub engagement: Option<EngagementFactors>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    /// Clamped to [0,100].
    pub readability_score: Option<f64>,
    pub vocabulary_level: Option<String>,
    pub structural_complexity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacingAnalysis {
    pub overall_pace: Option<String>,
    pub shifts: Vec<PaceShift>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaceShift {
    pub position: String,
    pub change: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementFactors {
    /// Clamped to [0,10].
    pub score: Option<f64>,
    pub hooks: Vec<String>,
}
