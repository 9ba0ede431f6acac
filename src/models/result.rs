//! 评分结果（规范结果）
//!
//! 所有处理路径最终都汇聚成 `GradingResult`：分数总是合法，反馈总是非空

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize, Serializer};

use crate::models::analysis::ContentAnalysis;
use crate::models::lenient;
use crate::models::metadata::{CornerText, NameInfo, TitleInfo};

// ========== 分数 ==========

/// 分数
#[derive(Debug, Clone, PartialEq)]
pub enum Score {
    /// 0..=100 的数值分
    Numeric(f64),
    /// earned/total 形式
    Fraction { earned: f64, total: f64 },
    /// 多个部分分数并列（混合策略、多页文档）
    Composite(Vec<ScorePart>),
    /// 无法得到分数（响应无法解析）
    NotAvailable,
    /// 评分出错
    Error,
}

/// 带标签的部分分数
#[derive(Debug, Clone, PartialEq)]
pub struct ScorePart {
    pub label: String,
    pub score: Score,
}

impl ScorePart {
    pub fn new(label: impl Into<String>, score: Score) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

impl Score {
    /// 分数是否满足取值约束
    pub fn is_valid(&self) -> bool {
        match self {
            Score::Numeric(v) => v.is_finite() && (0.0..=100.0).contains(v),
            Score::Fraction { earned, total } => {
                earned.is_finite() && *total > 0.0 && *earned >= 0.0 && earned <= total
            }
            Score::Composite(parts) => !parts.is_empty() && parts.iter().all(|p| p.score.is_valid()),
            Score::NotAvailable | Score::Error => true,
        }
    }

    /// 是否是降级结果（Error / N/A，或者复合分数中包含）
    pub fn is_degraded(&self) -> bool {
        match self {
            Score::NotAvailable | Score::Error => true,
            Score::Composite(parts) => parts.iter().any(|p| p.score.is_degraded()),
            _ => false,
        }
    }
}

/// 格式化分值：整数不带小数，其余最多两位小数
pub fn format_points(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{:.0}", value)
    } else {
        let s = format!("{:.2}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Score::Numeric(v) => write!(f, "{}", format_points(*v)),
            Score::Fraction { earned, total } => {
                write!(f, "{}/{}", format_points(*earned), format_points(*total))
            }
            Score::Composite(parts) => {
                let joined = parts
                    .iter()
                    .map(|p| format!("{}: {}", p.label, p.score))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{}", joined)
            }
            Score::NotAvailable => write!(f, "N/A"),
            Score::Error => write!(f, "Error"),
        }
    }
}

impl Serialize for Score {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Score::Numeric(v) => serializer.serialize_f64(*v),
            other => serializer.collect_str(other),
        }
    }
}

// ========== 反馈 ==========

/// 可以渲染成纯文本的反馈
pub trait RenderText {
    fn render_as_text(&self) -> String;
}

/// 反馈：纯文本或结构化
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Feedback {
    Text(String),
    Structured(StructuredFeedback),
}

impl RenderText for Feedback {
    fn render_as_text(&self) -> String {
        match self {
            Feedback::Text(text) => text.clone(),
            Feedback::Structured(structured) => structured.render_as_text(),
        }
    }
}

impl Feedback {
    pub fn is_empty(&self) -> bool {
        match self {
            Feedback::Text(text) => text.trim().is_empty(),
            Feedback::Structured(_) => false,
        }
    }
}

/// 详细评分格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredFeedback {
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub total_score: String,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub percentage: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuestionFeedback>,
    #[serde(default)]
    pub overall_feedback: OverallFeedback,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub grading_notes: Option<String>,
}

/// 单题反馈
///
/// 数学格式用 student_answer / correct_answer / is_correct，
/// 普通格式用 student_response / expected_response / is_satisfactory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionFeedback {
    #[serde(default, deserialize_with = "lenient::string_or_number")]
    pub question_number: String,
    #[serde(default, deserialize_with = "lenient::points")]
    pub points_earned: f64,
    #[serde(default, deserialize_with = "lenient::points")]
    pub points_possible: f64,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub question_type: Option<String>,
    #[serde(
        default,
        alias = "student_response",
        deserialize_with = "lenient::opt_string_or_number"
    )]
    pub student_answer: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub student_selection: Option<String>,
    #[serde(
        default,
        alias = "expected_response",
        deserialize_with = "lenient::opt_string_or_number"
    )]
    pub correct_answer: Option<String>,
    #[serde(default, alias = "is_satisfactory", deserialize_with = "lenient::opt_flag")]
    pub is_correct: Option<bool>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub mistakes_identified: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub partial_credit_given_for: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub grading_rationale: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub teacher_comment: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_flag")]
    pub ocr_leniency_applied: Option<bool>,
}

/// 总体反馈
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallFeedback {
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub strengths: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub areas_for_improvement: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub next_steps: Option<String>,
}

impl RenderText for StructuredFeedback {
    fn render_as_text(&self) -> String {
        let mut parts = Vec::new();
        let headline = self.percentage.as_deref().unwrap_or(&self.total_score);
        parts.push(format!("**Overall Score: {}**", headline));

        if !self.questions.is_empty() {
            parts.push("\n**Question-by-Question Analysis:**".to_string());
            for q in &self.questions {
                let number = if q.question_number.is_empty() {
                    "?"
                } else {
                    q.question_number.as_str()
                };
                let mut line = format!(
                    "\nQuestion {}: {}/{} points",
                    number,
                    format_points(q.points_earned),
                    format_points(q.points_possible)
                );
                if !q.mistakes_identified.is_empty() {
                    line.push_str(&format!("\n- Issues: {}", q.mistakes_identified.join(", ")));
                }
                if !q.partial_credit_given_for.is_empty() {
                    line.push_str(&format!(
                        "\n- Credit given for: {}",
                        q.partial_credit_given_for.join(", ")
                    ));
                }
                if let Some(comment) = &q.teacher_comment {
                    line.push_str(&format!("\n- Note: {}", comment));
                }
                parts.push(line);
            }
        }

        let overall = &self.overall_feedback;
        if !overall.strengths.is_empty() {
            parts.push(format!("\n**Strengths:**\n{}", bullets(&overall.strengths)));
        }
        if !overall.areas_for_improvement.is_empty() {
            parts.push(format!(
                "\n**Areas for Improvement:**\n{}",
                bullets(&overall.areas_for_improvement)
            ));
        }
        if let Some(next) = &overall.next_steps {
            parts.push(format!("\n**Next Steps:** {}", next));
        }
        if let Some(notes) = &self.grading_notes {
            parts.push(format!("\n**Grading Notes:** {}", notes));
        }
        parts.join("\n")
    }
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

// ========== 处理方式与诊断 ==========

/// 处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMethod {
    /// 文本提交，直接文本评分
    TextSubmission,
    /// 视觉模型直接评分
    VisionPrimary,
    /// 视觉 + OCR 混合
    Hybrid,
    /// OCR + 文本评分
    OcrPrimary,
    /// 视觉评分失败后回退到 OCR
    FallbackOcr,
    /// 多页文档
    MultiPage,
    /// 无法处理的提交
    Unprocessed,
}

impl ProcessingMethod {
    pub fn label(self) -> &'static str {
        match self {
            ProcessingMethod::TextSubmission => "Text Submission",
            ProcessingMethod::VisionPrimary => "Vision Primary (MCQ-Optimized)",
            ProcessingMethod::Hybrid => "Hybrid: Vision (MCQ-Optimized) + OCR + Text Grading",
            ProcessingMethod::OcrPrimary => "Standard OCR + Text Grading (Text Focus)",
            ProcessingMethod::FallbackOcr => "Fallback: Standard OCR + Text Grading",
            ProcessingMethod::MultiPage => "Multi-page Document",
            ProcessingMethod::Unprocessed => "Could Not Process",
        }
    }
}

impl std::fmt::Display for ProcessingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Serialize for ProcessingMethod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

/// 宽松评分规则
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeniencyRule {
    /// 只做了取整
    Rounded,
    /// 升级为满分
    FullCredit,
    /// 加分
    Bonus,
}

/// 一次宽松评分调整的记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeniencyAdjustment {
    pub original: String,
    pub adjusted: String,
    pub rule: LeniencyRule,
    pub bonus_points: f64,
}

/// 诊断信息（调试、审计用）
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_analysis: Option<ContentAnalysis>,
    pub processing_notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leniency: Option<LeniencyAdjustment>,
    /// 选择题满分修正的题目数量
    pub mcq_adjustments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corner_text: Option<CornerText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
}

impl Diagnostics {
    pub fn note(&mut self, note: impl Into<String>) {
        self.processing_notes.push(note.into());
    }
}

// ========== 规范结果 ==========

/// 评分结果
#[derive(Debug, Clone, Serialize)]
pub struct GradingResult {
    pub score: Score,
    pub feedback: Feedback,
    /// 带页眉的纯文本反馈
    pub formatted_feedback: String,
    pub processing_method: ProcessingMethod,
    pub extracted_text: Option<String>,
    pub student_name_info: Option<NameInfo>,
    pub assignment_title_info: Option<TitleInfo>,
    pub diagnostics: Diagnostics,
    pub graded_at: DateTime<Local>,
}

impl GradingResult {
    pub fn new(score: Score, feedback: Feedback, processing_method: ProcessingMethod) -> Self {
        let formatted_feedback = feedback.render_as_text();
        Self {
            score,
            feedback,
            formatted_feedback,
            processing_method,
            extracted_text: None,
            student_name_info: None,
            assignment_title_info: None,
            diagnostics: Diagnostics::default(),
            graded_at: Local::now(),
        }
    }

    /// 评分出错：分数为 Error，反馈说明原因
    pub fn error(processing_method: ProcessingMethod, kind: &str, message: impl std::fmt::Display) -> Self {
        let feedback = format!(
            "**GRADING ERROR**\n\nWe encountered an issue while processing this submission: {}\n\n\
             Please try submitting again. If the issue persists, try uploading a clearer image \
             or providing more text context.\n\nTechnical Details: {}",
            message, kind
        );
        let mut result = Self::new(Score::Error, Feedback::Text(feedback), processing_method);
        result.diagnostics.error_kind = Some(kind.to_string());
        result
    }

    /// 响应无法解析：分数为 N/A，反馈附带原始响应片段
    pub fn not_available(processing_method: ProcessingMethod, excerpt: &str) -> Self {
        let feedback = format!(
            "**GRADING ERROR**\n\nUnable to parse the grading result. \
             Here is what we could extract:\n\n{}...\n\n\
             Please try submitting again.",
            excerpt
        );
        let mut result = Self::new(Score::NotAvailable, Feedback::Text(feedback), processing_method);
        result.diagnostics.error_kind = Some("ParseFailure".to_string());
        result
    }

    pub fn is_degraded(&self) -> bool {
        self.score.is_degraded()
    }

    /// 重新生成纯文本反馈（反馈或页眉变化后调用）
    pub fn refresh_formatted(&mut self, header: Option<&str>) {
        let body = self.feedback.render_as_text();
        self.formatted_feedback = match header {
            Some(h) => format!("{}\n\n{}", h, body),
            None => body,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_display_and_validity() {
        assert_eq!(Score::Fraction { earned: 9.0, total: 10.0 }.to_string(), "9/10");
        assert_eq!(Score::Fraction { earned: 8.5, total: 10.0 }.to_string(), "8.5/10");
        assert_eq!(Score::Numeric(87.25).to_string(), "87.25");
        assert_eq!(
            Score::Composite(vec![
                ScorePart::new("Visual", Score::Fraction { earned: 4.0, total: 5.0 }),
                ScorePart::new("Text", Score::Numeric(80.0)),
            ])
            .to_string(),
            "Visual: 4/5, Text: 80"
        );
        assert!(!Score::Fraction { earned: 11.0, total: 10.0 }.is_valid());
        assert!(!Score::Numeric(101.0).is_valid());
        assert!(Score::Error.is_valid());
        assert!(!Score::Composite(vec![]).is_valid());
    }

    #[test]
    fn test_score_serialization() {
        assert_eq!(serde_json::to_string(&Score::Numeric(85.0)).unwrap(), "85.0");
        assert_eq!(
            serde_json::to_string(&Score::Fraction { earned: 10.0, total: 10.0 }).unwrap(),
            "\"10/10\""
        );
        assert_eq!(serde_json::to_string(&Score::NotAvailable).unwrap(), "\"N/A\"");
    }

    #[test]
    fn test_structured_feedback_aliases() {
        let feedback: StructuredFeedback = serde_json::from_str(
            r#"{
                "total_score": "7/10",
                "percentage": "70%",
                "questions": [{
                    "question_number": 1,
                    "points_earned": "7",
                    "points_possible": 10,
                    "student_response": "photosynthesis",
                    "expected_response": "photosynthesis",
                    "is_satisfactory": "true",
                    "mistakes_identified": ["missed chlorophyll"]
                }],
                "overall_feedback": {"strengths": ["clear"], "next_steps": "review"}
            }"#,
        )
        .unwrap();
        let q = &feedback.questions[0];
        assert_eq!(q.question_number, "1");
        assert_eq!(q.points_earned, 7.0);
        assert_eq!(q.student_answer.as_deref(), Some("photosynthesis"));
        assert_eq!(q.is_correct, Some(true));

        let text = feedback.render_as_text();
        assert!(text.starts_with("**Overall Score: 70%**"));
        assert!(text.contains("Question 1: 7/10 points"));
        assert!(text.contains("- Issues: missed chlorophyll"));
        assert!(text.contains("**Strengths:**\n- clear"));
        assert!(text.contains("**Next Steps:** review"));
    }

    #[test]
    fn test_error_result_is_never_empty() {
        let result = GradingResult::error(ProcessingMethod::OcrPrimary, "ExternalServiceFailure", "timeout");
        assert_eq!(result.score, Score::Error);
        assert!(!result.feedback.is_empty());
        assert!(result.formatted_feedback.starts_with("**GRADING ERROR**"));
        assert!(result.is_degraded());
    }
}
