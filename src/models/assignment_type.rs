use phf::phf_set;
use serde::{Deserialize, Serialize};

/// 数学类作业的同义词（小写）
static MATH_LIKE: phf::Set<&'static str> = phf_set! {
    "math",
    "mathematics",
    "calculus",
    "algebra",
    "geometry",
    "statistics",
    "problem set",
};

/// 需要追加选择题评分说明的作业类型
static CHOICE_LIKE: phf::Set<&'static str> = phf_set! {
    "multiple choice",
    "problem set",
};

/// 作业类型标签
///
/// 调用方给出的开放字符串（如 "Essay"、"Math"），
/// 只通过大小写无关的集合匹配区分数学类和普通类
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentType(String);

/// OCR 提示词变体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrVariant {
    /// 通用文档提取
    Document,
    /// 数学 / 选择题，关注答案和选项
    MathOrChoice,
    /// 其他作业
    General,
}

impl AssignmentType {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// 原始标签
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn key(&self) -> String {
        self.0.trim().to_lowercase()
    }

    /// 是否是数学类作业
    pub fn is_math_like(&self) -> bool {
        MATH_LIKE.contains(self.key().as_str())
    }

    /// 是否需要选择题补充说明
    pub fn is_choice_like(&self) -> bool {
        CHOICE_LIKE.contains(self.key().as_str())
    }

    /// 选择 OCR 提示词
    pub fn ocr_variant(&self) -> OcrVariant {
        let key = self.key();
        if key == "document" {
            OcrVariant::Document
        } else if MATH_LIKE.contains(key.as_str()) || CHOICE_LIKE.contains(key.as_str()) {
            OcrVariant::MathOrChoice
        } else {
            OcrVariant::General
        }
    }
}

impl From<&str> for AssignmentType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AssignmentType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for AssignmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
