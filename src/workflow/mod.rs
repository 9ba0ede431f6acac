pub mod grading_ctx;
pub mod grading_flow;

pub use grading_ctx::GradingCtx;
pub use grading_flow::{feedback_header, format_extracted_text, GradingFlow, GradingRequest};
