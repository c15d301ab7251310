use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

use crate::document::*;
use crate::score::{self, ENGAGEMENT, MAGNITUDE, READABILITY, RELEVANCE, SENTIMENT};
use crate::wire::*;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("missing required identity field `{0}`")]
    MissingIdentity(&'static str),
}

/// Turn a backend or local-store payload into the canonical document.
///
/// Only the identity is mandatory. Sections are decoded one by one so a
/// section with an unexpected shape is dropped (and logged) instead of
/// failing the whole chapter.
pub fn normalize_document(payload: &Value) -> Result<ChapterAnalysisDocument, NormalizeError> {
    if !payload.is_object() {
        return Err(NormalizeError::NotAnObject);
    }

    // The chapter endpoint wraps the analysis in `analysis_data`
    let body = payload
        .get("analysis_data")
        .filter(|v| v.is_object())
        .unwrap_or(payload);
    let nested = body.get("chapter_analysis").filter(|v| v.is_object());

    let identity = read_identity(
        &[nested.and_then(|n| n.get("metadata")), body.get("metadata"), Some(body), Some(payload)],
        None,
    )?;
    let id = identity.chapter_id.as_str();

    let summary = decode::<RawSummary>(id, "summary", section(nested, body, "summary"))
        .map(summary_from_raw);
    let sentiment = decode::<RawSentiment>(id, "sentiment_analysis", section(nested, body, "sentiment_analysis"))
        .map(sentiment_from_raw);
    let themes = decode::<Vec<RawTheme>>(id, "themes", section(nested, body, "themes"))
        .map(themes_from_raw);
    let literary_elements =
        decode::<RawLiteraryElements>(id, "literary_elements", section(nested, body, "literary_elements"))
            .map(literary_from_raw);
    let character_mapping =
        decode::<RawCharacterMapping>(id, "character_mapping", section(nested, body, "character_mapping"))
            .map(|raw| characters_from_raw(id, raw));
    let companion =
        decode::<RawCompanion>(id, "interactive_companion", section(nested, body, "interactive_companion"))
            .map(companion_from_raw);
    let analytics =
        decode::<RawAnalytics>(id, "reading_analytics", section(nested, body, "reading_analytics"))
            .map(analytics_from_raw);

    Ok(ChapterAnalysisDocument {
        identity,
        summary,
        sentiment,
        themes,
        literary_elements,
        character_mapping,
        companion,
        analytics,
    })
}

/// Identity of a chapter listing entry. Listing entries often omit the
/// novel id, so the caller may supply the one it asked for.
pub fn normalize_identity(
    payload: &Value,
    default_novel_id: Option<&str>,
) -> Result<ChapterIdentity, NormalizeError> {
    if !payload.is_object() {
        return Err(NormalizeError::NotAnObject);
    }
    let body = payload
        .get("analysis_data")
        .filter(|v| v.is_object())
        .unwrap_or(payload);
    let nested = body.get("chapter_analysis").filter(|v| v.is_object());

    read_identity(
        &[nested.and_then(|n| n.get("metadata")), body.get("metadata"), Some(body), Some(payload)],
        default_novel_id,
    )
}

fn read_identity(
    candidates: &[Option<&Value>],
    default_novel_id: Option<&str>,
) -> Result<ChapterIdentity, NormalizeError> {
    let chapter_id = lookup(candidates, &["chapter_id", "id"])
        .and_then(text_of)
        .ok_or(NormalizeError::MissingIdentity("chapter_id"))?;
    let novel_id = lookup(candidates, &["novel_id"])
        .and_then(text_of)
        .or_else(|| default_novel_id.map(str::to_string))
        .ok_or(NormalizeError::MissingIdentity("novel_id"))?;

    let chapter_number = lookup(candidates, &["chapter_number"])
        .and_then(count_of)
        .or_else(|| chapter_id.strip_prefix("ch").and_then(|n| n.parse().ok()));
    let title = lookup(candidates, &["chapter_title", "title"])
        .and_then(text_of)
        .unwrap_or_else(|| format!("Chapter {}", chapter_id));

    Ok(ChapterIdentity {
        novel_title: lookup(candidates, &["novel_title"]).and_then(text_of),
        word_count: candidates.iter().flatten().find_map(|v| v.get("word_count").and_then(count_of)),
        reading_time_minutes: candidates.iter().flatten().find_map(|v| {
            v.get("estimated_reading_time")
                .or_else(|| v.get("reading_time_minutes"))
                .and_then(count_of)
        }),
        novel_id,
        chapter_id,
        chapter_number,
        title,
    })
}

/// First candidate carrying any of `keys` with a usable value.
fn lookup<'a>(candidates: &[Option<&'a Value>], keys: &[&str]) -> Option<&'a Value> {
    candidates.iter().flatten().copied().find_map(|v| {
        keys.iter()
            .filter_map(|k| v.get(*k))
            .find(|field| text_of(field).is_some())
    })
}

/// Non-empty string, or a number rendered as one (ids are sometimes numeric).
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn count_of(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn section<'a>(nested: Option<&'a Value>, body: &'a Value, key: &str) -> Option<&'a Value> {
    nested
        .and_then(|n| n.get(key))
        .or_else(|| body.get(key))
        .filter(|v| !v.is_null())
}

fn decode<T: DeserializeOwned>(chapter_id: &str, name: &str, value: Option<&Value>) -> Option<T> {
    let value = value?;
    match T::deserialize(value) {
        Ok(raw) => Some(raw),
        Err(e) => {
            warn!(chapter_id, section = name, error = %e, "Skipping malformed section");
            None
        }
    }
}

/// Collapse runs of whitespace so "Kim  Dokja " and "Kim Dokja" are one name.
fn clean_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn summary_from_raw(raw: RawSummary) -> Summary {
    Summary {
        concise: raw.concise.unwrap_or_default().trim().to_string(),
        detailed: raw.detailed.unwrap_or_default().trim().to_string(),
        key_events: clean_list(raw.key_events),
    }
}

fn sentiment_from_raw(raw: RawSentiment) -> SentimentAnalysis {
    let emotional_arc = raw
        .emotional_arc
        .into_iter()
        .map(|s| EmotionSample {
            position: s.position.filter(|p| p.is_finite()),
            emotion: s.emotion.trim().to_string(),
            magnitude: MAGNITUDE.clamp(s.intensity.unwrap_or(0.0)),
        })
        .collect();

    let mut character_emotions: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (name, tags) in raw.character_sentiments {
        let name = clean_name(&name);
        if name.is_empty() {
            continue;
        }
        character_emotions
            .entry(name)
            .or_default()
            .extend(clean_list(tags.into_vec()));
    }

    SentimentAnalysis {
        overall_tone: raw.overall_tone.filter(|t| !t.trim().is_empty()),
        emotional_arc,
        character_emotions,
    }
}

fn themes_from_raw(raw: Vec<RawTheme>) -> Vec<Theme> {
    raw.into_iter()
        .filter(|t| !t.theme.trim().is_empty())
        .map(|t| Theme {
            name: t.theme.trim().to_string(),
            relevance: RELEVANCE.clamp(t.relevance.unwrap_or(0.0)),
            evidence: clean_list(t.evidence.map(OneOrMany::into_vec).unwrap_or_default()),
        })
        .collect()
}

fn literary_from_raw(raw: RawLiteraryElements) -> LiteraryElements {
    LiteraryElements {
        narrative_voice: raw.narrative_voice.filter(|v| !v.trim().is_empty()),
        foreshadowing: raw.foreshadowing.map(|items| {
            items
                .into_iter()
                .map(|f| LiteraryNote { quote: f.text, explanation: f.significance })
                .collect()
        }),
        symbolism: raw.symbolism.map(|items| {
            items
                .into_iter()
                .map(|s| LiteraryNote { quote: s.symbol, explanation: s.meaning })
                .collect()
        }),
    }
}

fn characters_from_raw(chapter_id: &str, raw: RawCharacterMapping) -> CharacterMapping {
    let mut seen = HashSet::new();
    let mut characters = Vec::new();

    for c in raw.characters {
        let name = clean_name(&c.name);
        if name.is_empty() || !seen.insert(name.clone()) {
            continue;
        }
        characters.push(CharacterProfile {
            name,
            role: c.role,
            description: c.description,
            first_appearance: c.first_appearance,
            traits: clean_list(c.key_traits),
            development_status: c.development_status,
            quotes: clean_list(c.quotes),
        });
    }

    let mut relationships = Vec::new();
    for r in raw.relationships {
        let endpoints = match (r.characters.as_slice(), &r.source, &r.target) {
            ([a, b, ..], _, _) => Some((a.clone(), b.clone())),
            (_, Some(a), Some(b)) => Some((a.clone(), b.clone())),
            _ => None,
        };
        let Some((source, target)) = endpoints else {
            debug!(chapter_id, relationship = %r.relationship_type, "Dropping relationship without two endpoints");
            continue;
        };

        let sentiment = match r.sentiment {
            Some(NumberOrText::Number(n)) => SENTIMENT.clamp(n),
            Some(NumberOrText::Text(label)) => score::sentiment_from_label(&label),
            None => 0.0,
        };

        relationships.push(Relationship {
            source: clean_name(&source),
            target: clean_name(&target),
            label: r.relationship_type.trim().to_string(),
            sentiment,
            significance: r.significance.trim().to_string(),
            dynamics: r.dynamics,
            interaction_count: r.interaction_count,
        });
    }

    CharacterMapping { characters, relationships }
}

fn companion_from_raw(raw: RawCompanion) -> InteractiveCompanion {
    InteractiveCompanion {
        context: raw.chapter_context.map(|c| ChapterContext {
            setting: c.setting,
            timeline_position: c.timeline_position,
            narrative_importance: c.narrative_importance,
        }),
        suggested_questions: clean_list(raw.key_questions),
        discussion_points: clean_list(raw.suggested_discussion_points),
        vocabulary: raw
            .vocabulary_notes
            .into_iter()
            .filter(|v| !v.term.trim().is_empty())
            .map(|v| VocabularyNote {
                term: v.term.trim().to_string(),
                definition: v.definition.trim().to_string(),
            })
            .collect(),
        cultural_context: raw
            .cultural_context
            .into_iter()
            .map(|c| CulturalNote { reference: c.reference, explanation: c.explanation })
            .collect(),
    }
}

fn analytics_from_raw(raw: RawAnalytics) -> ReadingAnalytics {
    ReadingAnalytics {
        complexity: raw.complexity_metrics.map(|c| ComplexityMetrics {
            readability_score: c.readability_score.map(|s| READABILITY.clamp(s)),
            vocabulary_level: c.vocabulary_level,
            structural_complexity: c.structural_complexity,
        }),
        pacing: raw.pacing_analysis.map(|p| PacingAnalysis {
            overall_pace: p.overall_pace,
            shifts: p
                .significant_shifts
                .into_iter()
                .map(|s| PaceShift {
                    position: s.position.map(NumberOrText::into_text).unwrap_or_default(),
                    change: s.change,
                })
                .collect(),
        }),
        engagement: raw.engagement_factors.map(|e| EngagementFactors {
            score: e.engagement_score.map(|s| ENGAGEMENT.clamp(s)),
            hooks: clean_list(e.hook.map(OneOrMany::into_vec).unwrap_or_default()),
        }),
    }
}
