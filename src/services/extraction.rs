//! 提取服务 - 业务能力层
//!
//! 只负责单次视觉 / OCR 调用及其响应解析，策略选择和回退由流程层决定

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::clients::{CallKind, ChatBackend, ChatRequest};
use crate::error::{AppResult, ExtractionError, ParseError, ServiceError};
use crate::models::{AssignmentType, ContentAnalysis, Feedback, Score};
use crate::services::prompts::{self, NO_TEXT_MARKER};
use crate::services::response_normalizer::{feedback_text, normalize, GradingResponse};
use crate::services::score_validator::validate_score;
use crate::services::text_grader::enforce_mcq_full_credit;

/// 视觉题为空时的混合评分反馈
pub const NO_VISUAL_ELEMENTS: &str = "No visual elements found";

/// 一次评分的分数和反馈
#[derive(Debug, Clone, PartialEq)]
pub struct GradedPart {
    pub score: Score,
    pub feedback: Feedback,
    /// 选择题满分修正的题目数量
    pub mcq_adjustments: usize,
}

/// 提取服务
///
/// 职责：
/// - OCR 文本提取（识别空结果）
/// - 视觉模型整体评分
/// - 视觉模型只评视觉题
pub struct ExtractionService {
    backend: Arc<dyn ChatBackend>,
}

impl ExtractionService {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// OCR 提取图片中的文本
    pub async fn extract_text(&self, image: Arc<[u8]>, assignment_type: &AssignmentType) -> AppResult<String> {
        let prompt = prompts::ocr_prompt(assignment_type.ocr_variant());
        let raw = self
            .backend
            .complete(ChatRequest::vision(CallKind::OcrExtract, prompt, image))
            .await?;
        let text = raw.trim();
        if is_empty_ocr(text) {
            return Err(ExtractionError::NoText.into());
        }
        debug!("OCR 提取完成: {} 字符", text.chars().count());
        Ok(text.to_string())
    }

    /// 视觉模型直接评分整张图片
    pub async fn grade_with_vision(
        &self,
        image: Arc<[u8]>,
        assignment_type: &AssignmentType,
        rubric: &str,
        analysis: &ContentAnalysis,
    ) -> AppResult<GradedPart> {
        let analysis_json = to_pretty_json(analysis)?;
        let mcq_json = to_pretty_json(&analysis.mcq_questions)?;
        let prompt = prompts::vision_grading_prompt(assignment_type, rubric, &analysis_json, &mcq_json);
        let raw = self
            .backend
            .complete(ChatRequest::vision(CallKind::VisionGrade, prompt, image))
            .await?;

        let map = normalize(&raw)?;
        let mcq_analysis = map.get("mcq_analysis").map(feedback_text);
        match GradingResponse::from_map(map)? {
            GradingResponse::Legacy { score, feedback } => {
                let feedback = match mcq_analysis {
                    Some(mcq) if !mcq.is_empty() => format!("{}\n\n**MCQ Analysis:** {}", feedback, mcq),
                    _ => feedback,
                };
                Ok(GradedPart {
                    score: validate_score(&score)?,
                    feedback: Feedback::Text(feedback),
                    mcq_adjustments: 0,
                })
            }
            GradingResponse::Detailed(mut structured) => {
                let mcq_adjustments = enforce_mcq_full_credit(&mut structured);
                Ok(GradedPart {
                    score: validate_score(&Value::String(structured.total_score.clone()))?,
                    feedback: Feedback::Structured(structured),
                    mcq_adjustments,
                })
            }
        }
    }

    /// 视觉模型只评选择题和图形题
    ///
    /// 没有视觉题时不发起调用
    pub async fn grade_visual_subset(
        &self,
        image: Arc<[u8]>,
        assignment_type: &AssignmentType,
        rubric: &str,
        analysis: &ContentAnalysis,
    ) -> AppResult<GradedPart> {
        if !analysis.has_visual_questions() {
            return Ok(GradedPart {
                score: Score::Numeric(0.0),
                feedback: Feedback::Text(NO_VISUAL_ELEMENTS.to_string()),
                mcq_adjustments: 0,
            });
        }

        let questions_json = to_pretty_json(&analysis.visual_questions())?;
        let prompt = prompts::vision_partial_prompt(assignment_type, rubric, &questions_json);
        let raw = self
            .backend
            .complete(ChatRequest::vision(CallKind::VisionPartial, prompt, image))
            .await?;

        let map = normalize(&raw)?;
        let score = map
            .get("visual_score")
            .or_else(|| map.get("score"))
            .ok_or(ParseError::MissingFields)?;
        let feedback = map
            .get("visual_feedback")
            .or_else(|| map.get("feedback"))
            .map(feedback_text)
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| "No feedback provided for visual elements".to_string());

        Ok(GradedPart {
            score: validate_score(score)?,
            feedback: Feedback::Text(feedback),
            mcq_adjustments: 0,
        })
    }
}

/// OCR 结果为空或是"未识别到文本"标记
pub fn is_empty_ocr(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NO_TEXT_MARKER)
}

fn to_pretty_json<T: serde::Serialize + ?Sized>(value: &T) -> AppResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| {
        warn!("⚠️ 序列化内容分析失败: {}", e);
        ServiceError::InvalidRequest(format!("failed to serialize content analysis: {}", e)).into()
    })
}
