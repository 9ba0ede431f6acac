//! 文本评分服务 - 业务能力层
//!
//! 预处理提交文本 -> 调用评分模型 -> 规范化响应 -> 校验分数 -> 宽松评分（数学类）

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::clients::{CallKind, ChatBackend, ChatRequest};
use crate::config::GradingPolicy;
use crate::error::AppResult;
use crate::models::{
    format_points, AssignmentType, Feedback, LeniencyAdjustment, Score, StructuredFeedback,
};
use crate::services::leniency::apply_leniency;
use crate::services::prompts::{grading_prompt, GRADING_SYSTEM_PROMPT};
use crate::services::response_normalizer::{parse_grading_response, GradingResponse};
use crate::services::score_validator::validate_score;

const MATH_OCR_NOTE: &str = "[CRITICAL GRADING NOTE: This submission was processed through OCR and may have \
significant text recognition errors.
APPLY MAXIMUM LENIENCY:
- If final answers are correct, award 85-100% credit regardless of work clarity
- Common OCR errors: 5↔S, 0↔O, 1↔l↔I, 6↔G, 8↔B, 2↔Z, +↔t, ×↔x
- Assume student showed more work than OCR captured
- Give benefit of doubt when work seems incomplete due to OCR limitations]\n\n";

const GENERAL_OCR_NOTE: &str = "[NOTE: This submission may have been processed through OCR. \
Be tolerant of recognition errors such as garbled characters or missing formatting.]\n\n";

const MATH_LENIENCY_INSTRUCTION: &str = "\n\n[GRADING INSTRUCTION: Apply maximum leniency. If final answers \
are correct, award high scores regardless of work clarity. Assume OCR missed some student work.]\n\n";

/// 候选答案的匹配规则
const ANSWER_PATTERNS: &[&str] = &[
    r"(?i)(?:answer|final|result|solution)\s*[:=]?\s*([^\n]+)",
    r"(?m)^\s*([0-9]+(?:\.[0-9]+)?(?:\s*[a-zA-Z]*)?)\s*$",
    r"(?mi)^\s*([a-d])\s*$",
    r"(?m)^\s*([0-9]+(?:\.[0-9]+)?\s*[+\-*/]?\s*[0-9]*(?:\.[0-9]+)?)\s*$",
    r"\[([^\]]+)\]",
    r"=\s*([0-9]+(?:\.[0-9]+)?)",
];

/// 一次文本评分的结果
#[derive(Debug, Clone)]
pub struct TextGrade {
    pub score: Score,
    pub feedback: Feedback,
    pub leniency: Option<LeniencyAdjustment>,
    /// 选择题满分修正的题目数
    pub mcq_adjustments: usize,
}

/// 文本评分服务
///
/// 职责：
/// - OCR 容错预处理和答案提示
/// - 调用评分模型并解析两种响应格式
/// - 分数校验，数学类作业的宽松评分（每次评分只做一次）
pub struct TextGrader {
    backend: Arc<dyn ChatBackend>,
    policy: GradingPolicy,
}

impl TextGrader {
    pub fn new(backend: Arc<dyn ChatBackend>, policy: GradingPolicy) -> Self {
        Self { backend, policy }
    }

    pub async fn grade(
        &self,
        assignment_type: &AssignmentType,
        submission: &str,
        rubric: &str,
    ) -> AppResult<TextGrade> {
        let math = assignment_type.is_math_like();
        let processed = preprocess_submission(submission, assignment_type);
        let prompt = grading_prompt(assignment_type, &processed, rubric);
        let raw = self
            .backend
            .complete(ChatRequest::text(CallKind::TextGrade { math }, prompt).with_system(GRADING_SYSTEM_PROMPT))
            .await?;

        let (score, mut feedback, mcq_adjustments) = match parse_grading_response(&raw)? {
            GradingResponse::Legacy { score, feedback } => (validate_score(&score)?, Feedback::Text(feedback), 0),
            GradingResponse::Detailed(mut structured) => {
                let adjusted = enforce_mcq_full_credit(&mut structured);
                let score = validate_score(&Value::String(structured.total_score.clone()))?;
                (score, Feedback::Structured(structured), adjusted)
            }
        };

        let (score, leniency) = if math {
            apply_leniency(&score, &self.policy)
        } else {
            (score, None)
        };
        if leniency.is_some() {
            if let Feedback::Structured(structured) = &mut feedback {
                sync_total(structured, &score);
            }
        }

        debug!("文本评分完成: {}", score);
        Ok(TextGrade {
            score,
            feedback,
            leniency,
            mcq_adjustments,
        })
    }
}

/// OCR 容错预处理
///
/// 数学类：前置详细的 OCR 说明，追加候选答案和宽松评分指令
pub fn preprocess_submission(submission: &str, assignment_type: &AssignmentType) -> String {
    if !assignment_type.is_math_like() {
        return format!("{}{}", GENERAL_OCR_NOTE, submission);
    }

    let mut processed = format!("{}{}", MATH_OCR_NOTE, submission);
    let hints = extract_answer_hints(submission);
    if !hints.is_empty() {
        processed.push_str(&format!(
            "\n\n[DETECTED FINAL ANSWERS - PRIORITIZE THESE: {}]\n\n",
            hints.join(", ")
        ));
    }
    processed.push_str(MATH_LENIENCY_INSTRUCTION);
    processed
}

/// 提取候选答案（去重，保持首次出现的顺序）
pub fn extract_answer_hints(submission: &str) -> Vec<String> {
    let mut hints: Vec<String> = Vec::new();
    for pattern in ANSWER_PATTERNS {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        for caps in re.captures_iter(submission) {
            if let Some(m) = caps.get(1) {
                let hint = m.as_str().trim();
                if !hint.is_empty() && !hints.iter().any(|h| h == hint) {
                    hints.push(hint.to_string());
                }
            }
        }
    }
    hints
}

/// 识别单个选项字母（A-H），兼容 "(B)"、"B)"、"b."、"Option B"
pub fn choice_label(raw: &str) -> Option<char> {
    let re = Regex::new(r"(?i)^\s*(?:option\s*)?[\(\[]?\s*([a-h])\s*[\)\]\.:]?\s*$").ok()?;
    let caps = re.captures(raw)?;
    caps.get(1)?.as_str().chars().next().map(|c| c.to_ascii_uppercase())
}

/// 选择题：学生选项与正确选项一致时给满分
///
/// 有题目被修正时按各题分数重新计算总分，返回修正的题目数
pub fn enforce_mcq_full_credit(feedback: &mut StructuredFeedback) -> usize {
    let mut adjusted = 0;
    for q in &mut feedback.questions {
        if q.points_possible <= 0.0 {
            continue;
        }
        let student = q
            .student_selection
            .as_deref()
            .or(q.student_answer.as_deref())
            .and_then(choice_label);
        let correct = q.correct_answer.as_deref().and_then(choice_label);
        if let (Some(student), Some(correct)) = (student, correct) {
            if student == correct && (q.points_earned < q.points_possible || q.is_correct != Some(true)) {
                q.points_earned = q.points_possible;
                q.is_correct = Some(true);
                adjusted += 1;
            }
        }
    }

    if adjusted > 0 {
        let earned: f64 = feedback.questions.iter().map(|q| q.points_earned).sum();
        let possible: f64 = feedback.questions.iter().map(|q| q.points_possible).sum();
        if possible > 0.0 {
            let total = Score::Fraction {
                earned,
                total: possible,
            };
            sync_total(feedback, &total);
        }
        info!("✓ 选择题满分修正: {} 道", adjusted);
    }
    adjusted
}

/// 同步结构化反馈中的总分和百分比
fn sync_total(feedback: &mut StructuredFeedback, score: &Score) {
    feedback.total_score = score.to_string();
    if let Score::Fraction { earned, total } = score {
        feedback.percentage = Some(format!("{}%", format_points((earned / total * 100.0).round())));
    }
}
