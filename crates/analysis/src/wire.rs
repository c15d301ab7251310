//! Payload shapes as the analysis backend and the local JSON files emit them.
//! Every field is lenient; the normalizer turns these into the canonical model.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) if s.trim().is_empty() => Vec::new(),
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    pub fn into_text(self) -> String {
        match self {
            NumberOrText::Number(n) => n.to_string(),
            NumberOrText::Text(s) => s,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawSummary {
    pub concise: Option<String>,
    pub detailed: Option<String>,
    pub key_events: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawSentiment {
    pub overall_tone: Option<String>,
    pub emotional_arc: Vec<RawEmotionSample>,
    pub character_sentiments: BTreeMap<String, OneOrMany>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawEmotionSample {
    pub position: Option<f64>,
    pub emotion: String,
    #[serde(alias = "magnitude")]
    pub intensity: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawTheme {
    #[serde(alias = "name")]
    pub theme: String,
    #[serde(alias = "score")]
    pub relevance: Option<f64>,
    pub evidence: Option<OneOrMany>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawLiteraryElements {
    pub narrative_voice: Option<String>,
    pub foreshadowing: Option<Vec<RawForeshadowing>>,
    pub symbolism: Option<Vec<RawSymbol>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawForeshadowing {
    #[serde(alias = "quote")]
    pub text: String,
    #[serde(alias = "explanation")]
    pub significance: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawSymbol {
    #[serde(alias = "quote")]
    pub symbol: String,
    #[serde(alias = "explanation")]
    pub meaning: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawCharacterMapping {
    pub characters: Vec<RawCharacter>,
    pub relationships: Vec<RawRelationship>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawCharacter {
    pub name: String,
    pub role: Option<String>,
    pub description: Option<String>,
    pub first_appearance: Option<String>,
    #[serde(alias = "traits")]
    pub key_traits: Vec<String>,
    pub development_status: Option<String>,
    pub quotes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawRelationship {
    pub characters: Vec<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    #[serde(alias = "label")]
    pub relationship_type: String,
    pub sentiment: Option<NumberOrText>,
    pub significance: String,
    pub dynamics: Option<String>,
    pub interaction_count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawCompanion {
    pub chapter_context: Option<RawChapterContext>,
    #[serde(alias = "suggested_questions")]
    pub key_questions: Vec<String>,
    pub suggested_discussion_points: Vec<String>,
    pub vocabulary_notes: Vec<RawVocabularyNote>,
    pub cultural_context: Vec<RawCulturalNote>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawChapterContext {
    pub setting: String,
    pub timeline_position: String,
    pub narrative_importance: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawVocabularyNote {
    pub term: String,
    pub definition: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawCulturalNote {
    pub reference: String,
    pub explanation: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawAnalytics {
    pub complexity_metrics: Option<RawComplexity>,
    pub pacing_analysis: Option<RawPacing>,
    pub engagement_factors: Option<RawEngagement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawComplexity {
    pub readability_score: Option<f64>,
    pub vocabulary_level: Option<String>,
    pub structural_complexity: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawPacing {
    pub overall_pace: Option<String>,
    pub significant_shifts: Vec<RawPaceShift>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawPaceShift {
    pub position: Option<NumberOrText>,
    pub change: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawEngagement {
    #[serde(alias = "hooks")]
    pub hook: Option<OneOrMany>,
    pub engagement_score: Option<f64>,
}
