//! 图片内容分析结果
//!
//! 每张图片分类一次，只在一次评分调用内有效

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::GradingPolicy;
use crate::models::lenient;

/// 置信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

impl Confidence {
    /// 大小写无关解析，无法识别时为 Low
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => Confidence::High,
            "medium" => Confidence::Medium,
            _ => Confidence::Low,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = lenient::opt_string_or_number(deserializer)?;
        Ok(raw.map(|s| Confidence::parse(&s)).unwrap_or_default())
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 提取策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// 视觉模型直接评分整张图片
    VisionPrimary,
    /// 视觉题走视觉评分，其余走 OCR + 文本评分
    VisionPartial,
    /// OCR 提取后按文本评分
    OcrPrimary,
}

impl Strategy {
    /// 由视觉题占比决定策略
    ///
    /// r > primary 为视觉主导，partial <= r <= primary 为混合，其余为 OCR
    pub fn from_ratio(ratio: f64, policy: &GradingPolicy) -> Self {
        if ratio > policy.vision_primary_threshold {
            Strategy::VisionPrimary
        } else if ratio >= policy.vision_partial_threshold {
            Strategy::VisionPartial
        } else {
            Strategy::OcrPrimary
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Strategy::VisionPrimary => "vision_primary",
            Strategy::VisionPartial => "vision_partial",
            Strategy::OcrPrimary => "ocr_primary",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 选择题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McqQuestion {
    #[serde(rename = "question_id", default, deserialize_with = "lenient::string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "option_labels")]
    pub options: BTreeSet<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub student_answer: Option<String>,
    #[serde(default)]
    pub answer_confidence: Confidence,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub selection_method: Option<String>,
}

/// 图形题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramQuestion {
    #[serde(rename = "question_id", default, deserialize_with = "lenient::string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub location: Option<String>,
}

/// 文本题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextQuestion {
    #[serde(rename = "question_id", default, deserialize_with = "lenient::string_or_number")]
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "lenient::opt_string_or_number")]
    pub question_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub location: Option<String>,
}

/// 需要视觉评分的题目（选择题或图形题）
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum VisualQuestion<'a> {
    Mcq(&'a McqQuestion),
    Diagram(&'a DiagramQuestion),
}

/// 内容分析结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentAnalysis {
    pub strategy: Strategy,
    pub mcq_questions: Vec<McqQuestion>,
    pub diagram_questions: Vec<DiagramQuestion>,
    pub text_questions: Vec<TextQuestion>,
    pub confidence: Confidence,
    /// 视觉题占比，0..=100
    pub visual_percentage: f64,
}

impl ContentAnalysis {
    /// 根据题目构成计算策略
    ///
    /// 有题目时按题目数量计算占比；一道题都没有时才参考模型报告的百分比
    pub fn from_questions(
        mcq_questions: Vec<McqQuestion>,
        diagram_questions: Vec<DiagramQuestion>,
        text_questions: Vec<TextQuestion>,
        confidence: Confidence,
        reported_percentage: f64,
        policy: &GradingPolicy,
    ) -> Self {
        let visual = mcq_questions.len() + diagram_questions.len();
        let total = visual + text_questions.len();
        let ratio = visual_ratio(visual, total, reported_percentage);
        Self {
            strategy: Strategy::from_ratio(ratio, policy),
            mcq_questions,
            diagram_questions,
            text_questions,
            confidence,
            visual_percentage: ratio * 100.0,
        }
    }

    /// 分类失败时的默认结果：OCR 主导，低置信度
    pub fn fallback() -> Self {
        Self {
            strategy: Strategy::OcrPrimary,
            mcq_questions: Vec::new(),
            diagram_questions: Vec::new(),
            text_questions: Vec::new(),
            confidence: Confidence::Low,
            visual_percentage: 0.0,
        }
    }

    pub fn visual_questions(&self) -> Vec<VisualQuestion<'_>> {
        self.mcq_questions
            .iter()
            .map(VisualQuestion::Mcq)
            .chain(self.diagram_questions.iter().map(VisualQuestion::Diagram))
            .collect()
    }

    pub fn has_visual_questions(&self) -> bool {
        !self.mcq_questions.is_empty() || !self.diagram_questions.is_empty()
    }
}

/// 视觉题占比
pub fn visual_ratio(visual: usize, total: usize, reported_percentage: f64) -> f64 {
    if total > 0 {
        visual as f64 / total as f64
    } else if reported_percentage.is_finite() {
        (reported_percentage / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn option_labels<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient::string_list(deserializer)?
        .into_iter()
        .map(|s| s.to_uppercase())
        .collect())
}
