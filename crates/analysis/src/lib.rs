pub mod document;
pub mod normalizer;
pub mod score;
pub mod wire;

pub use document::{
    ChapterAnalysisDocument, ChapterContext, ChapterIdentity, CharacterMapping, CharacterProfile,
    ComplexityMetrics, CulturalNote, EmotionSample, EngagementFactors, InteractiveCompanion,
    LiteraryElements, LiteraryNote, PaceShift, PacingAnalysis, ReadingAnalytics, Relationship,
    SentimentAnalysis, Summary, Theme, VocabularyNote,
};
pub use normalizer::{NormalizeError, normalize_document, normalize_identity};
pub use score::ScoreRange;
