pub mod analysis;
pub mod assignment_type;
pub mod lenient;
pub mod loaders;
pub mod metadata;
pub mod result;
pub mod submission;

pub use analysis::{
    Confidence, ContentAnalysis, DiagramQuestion, McqQuestion, Strategy, TextQuestion,
    VisualQuestion,
};
pub use assignment_type::{AssignmentType, OcrVariant};
pub use loaders::{load_manifest, scan_submissions, BatchManifest, SubmissionFile};
pub use metadata::{CornerText, MetadataInfo, MetadataSource, NameInfo, TitleInfo};
pub use result::{
    format_points, Diagnostics, Feedback, GradingResult, LeniencyAdjustment, LeniencyRule,
    OverallFeedback, ProcessingMethod, QuestionFeedback, RenderText, Score, ScorePart,
    StructuredFeedback,
};
pub use submission::{SubmissionInput, SubmissionKind, MIN_IMAGE_BYTES};
