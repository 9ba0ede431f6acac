use serde::{Deserialize, Serialize};

use crate::models::analysis::Confidence;
use crate::models::lenient;

/// 元数据来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    /// 调用方直接提供
    Caller,
    /// 正则匹配提取文本
    Pattern,
    /// 模型读取文本开头
    TextExtraction,
    /// 模型读取图片四角
    Corner,
    /// 没有找到
    NotFound,
    /// 提取调用失败
    Failed,
}

impl MetadataSource {
    pub fn name(self) -> &'static str {
        match self {
            MetadataSource::Caller => "caller",
            MetadataSource::Pattern => "pattern",
            MetadataSource::TextExtraction => "text extraction",
            MetadataSource::Corner => "corner extraction",
            MetadataSource::NotFound => "not found",
            MetadataSource::Failed => "failed",
        }
    }
}

/// 学生姓名 / 作业标题
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataInfo {
    pub value: Option<String>,
    pub confidence: Confidence,
    pub location: String,
    pub source: MetadataSource,
}

pub type NameInfo = MetadataInfo;
pub type TitleInfo = MetadataInfo;

impl MetadataInfo {
    /// 调用方提供的值，置信度最高
    pub fn provided(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            confidence: Confidence::High,
            location: "provided by caller".to_string(),
            source: MetadataSource::Caller,
        }
    }

    pub fn found(
        value: impl Into<String>,
        confidence: Confidence,
        location: impl Into<String>,
        source: MetadataSource,
    ) -> Self {
        Self {
            value: Some(value.into()),
            confidence,
            location: location.into(),
            source,
        }
    }

    pub fn not_found(location: impl Into<String>) -> Self {
        Self {
            value: None,
            confidence: Confidence::Low,
            location: location.into(),
            source: MetadataSource::NotFound,
        }
    }

    /// 提取调用失败
    pub fn error() -> Self {
        Self {
            value: None,
            confidence: Confidence::Low,
            location: "error".to_string(),
            source: MetadataSource::Failed,
        }
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| !v.trim().is_empty())
    }

    pub fn is_found(&self) -> bool {
        self.value().is_some()
    }
}

/// 四角文本
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CornerText {
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub top_left: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub top_right: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub bottom_left: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub bottom_right: Option<String>,
}

impl CornerText {
    /// 按姓名最常出现的位置排序：右上、左上、左下、右下
    pub fn in_search_order(&self) -> [(&'static str, Option<&str>); 4] {
        [
            ("top right corner", self.top_right.as_deref()),
            ("top left corner", self.top_left.as_deref()),
            ("bottom left corner", self.bottom_left.as_deref()),
            ("bottom right corner", self.bottom_right.as_deref()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.in_search_order().iter().all(|(_, v)| v.is_none())
    }
}
