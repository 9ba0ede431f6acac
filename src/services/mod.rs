pub mod content_classifier;
pub mod extraction;
pub mod leniency;
pub mod metadata_extractor;
pub mod prompts;
pub mod report_writer;
pub mod response_normalizer;
pub mod score_validator;
pub mod text_grader;

pub use content_classifier::ContentClassifier;
pub use extraction::{ExtractionService, GradedPart};
pub use leniency::apply_leniency;
pub use metadata_extractor::MetadataExtractor;
pub use report_writer::ReportWriter;
pub use response_normalizer::{normalize, parse_grading_response, GradingResponse};
pub use score_validator::validate_score;
pub use text_grader::{TextGrade, TextGrader};
