pub mod chapter;
pub mod character;
pub mod prompt;
pub mod session;

pub use chapter::{AnalyticsView, ArcPoint, ChapterView, SectionAvailability, SummaryView, build_chapter_view};
pub use character::{CharacterView, RelationshipView, ViewError, build_character_view, find_character};
pub use prompt::{PromptContext, PromptLimits, build_companion_prompt};
pub use session::{ChatTurn, SessionViewState, Speaker};
