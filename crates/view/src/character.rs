use analysis::{ChapterAnalysisDocument, CharacterProfile};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    #[error("character `{0}` does not appear in this chapter")]
    CharacterNotFound(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacterView {
    pub chapter_id: String,
    pub profile: CharacterProfile,
    /// Dominant emotions recorded for this character in the chapter
    pub emotions: Vec<String>,
    pub relationships: Vec<RelationshipView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipView {
    pub counterpart: String,
    pub label: String,
    pub sentiment: f64,
    pub significance: String,
    pub dynamics: Option<String>,
    pub interaction_count: Option<u32>,
}

/// Exact name first, then a trimmed case-insensitive match.
pub fn find_character<'a>(doc: &'a ChapterAnalysisDocument, name: &str) -> Option<&'a CharacterProfile> {
    let mapping = doc.character_mapping.as_ref()?;
    mapping.character(name).or_else(|| {
        let wanted = name.trim().to_lowercase();
        mapping
            .characters
            .iter()
            .find(|c| c.name.to_lowercase() == wanted)
    })
}

pub fn build_character_view(
    doc: &ChapterAnalysisDocument,
    character_name: &str,
) -> Result<CharacterView, ViewError> {
    let profile = find_character(doc, character_name)
        .ok_or_else(|| ViewError::CharacterNotFound(character_name.to_string()))?;

    // Each edge is visited once, so a self-relationship appears once too
    let relationships = doc
        .character_mapping
        .iter()
        .flat_map(|m| m.relationships.iter())
        .filter_map(|r| {
            r.counterpart(&profile.name).map(|other| RelationshipView {
                counterpart: other.to_string(),
                label: r.label.clone(),
                sentiment: r.sentiment,
                significance: r.significance.clone(),
                dynamics: r.dynamics.clone(),
                interaction_count: r.interaction_count,
            })
        })
        .collect();

    let emotions = doc
        .sentiment
        .as_ref()
        .and_then(|s| s.character_emotions.get(&profile.name))
        .map(|tags| tags.iter().cloned().collect())
        .unwrap_or_default();

    Ok(CharacterView {
        chapter_id: doc.identity.chapter_id.clone(),
        profile: profile.clone(),
        emotions,
        relationships,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> ChapterAnalysisDocument {
        analysis::normalize_document(&json!({
            "novel_id": "n1",
            "chapter_id": "ch1",
            "sentiment_analysis": {
                "character_sentiments": {"Kim Dokja": ["Calm", "Curious"]}
            },
            "character_mapping": {
                "characters": [
                    {"name": "Kim Dokja", "role": "Protagonist", "key_traits": ["Observant"]},
                    {"name": "Yoo Sangah", "role": "Colleague"},
                    {"name": "Han Myungoh", "role": "Manager"}
                ],
                "relationships": [
                    {"characters": ["Kim Dokja", "Yoo Sangah"], "relationship_type": "Colleague",
                     "sentiment": 0.6, "significance": "Sits next to him"},
                    {"characters": ["Han Myungoh", "Kim Dokja"], "relationship_type": "Boss",
                     "sentiment": "Negative", "significance": "Dismissive manager"},
                    {"characters": ["Yoo Sangah", "Han Myungoh"], "relationship_type": "Coworker"},
                    {"characters": ["Kim Dokja", "Kim Dokja"], "relationship_type": "Inner voice"}
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_edges_from_either_endpoint() {
        let view = build_character_view(&document(), "Kim Dokja").unwrap();
        let edges: Vec<_> = view
            .relationships
            .iter()
            .map(|r| (r.counterpart.as_str(), r.label.as_str()))
            .collect();

        assert_eq!(
            edges,
            vec![("Yoo Sangah", "Colleague"), ("Han Myungoh", "Boss"), ("Kim Dokja", "Inner voice")]
        );
        assert_eq!(view.relationships[1].sentiment, -1.0);
        assert_eq!(view.emotions, vec!["Calm", "Curious"]);
        assert_eq!(view.profile.role.as_deref(), Some("Protagonist"));
    }

    #[test]
    fn test_lookup_tolerates_case_and_padding() {
        let view = build_character_view(&document(), "  yoo sangah ").unwrap();
        assert_eq!(view.profile.name, "Yoo Sangah");
        assert_eq!(view.relationships.len(), 2);
        assert!(view.emotions.is_empty());
    }

    #[test]
    fn test_unknown_character() {
        assert_eq!(
            build_character_view(&document(), "Yoo Joonghyuk"),
            Err(ViewError::CharacterNotFound("Yoo Joonghyuk".to_string()))
        );

        let bare = analysis::normalize_document(&json!({"novel_id": "n1", "chapter_id": "ch2"})).unwrap();
        assert!(build_character_view(&bare, "Kim Dokja").is_err());
    }
}
