//! 元数据提取服务 - 业务能力层
//!
//! 学生姓名按顺序查找：文本标签匹配 -> 模型读取文本开头 -> 模型读取图片四角。
//! 标题只有前两步。提取失败不影响评分。

use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::clients::{CallKind, ChatBackend, ChatRequest};
use crate::error::{AppResult, ParseError};
use crate::models::lenient::value_to_text;
use crate::models::{Confidence, CornerText, MetadataInfo, MetadataSource, NameInfo, TitleInfo};
use crate::services::prompts::{assignment_title_prompt, student_name_prompt, CORNER_PROMPT};
use crate::services::response_normalizer::normalize;

/// 姓名标签，按优先级排列
const NAME_PATTERNS: &[(&str, &str)] = &[
    (r"(?i)\*\*STUDENT:\s*([^\*\n]+)\*\*", "bold STUDENT marker"),
    (r"(?i)\bName:\s*([^\n]+)", "labeled 'Name:' field"),
    (r"(?i)\bStudent:\s*([^\n]+)", "labeled 'Student:' field"),
    (r"(?i)\bBy:\s*([^\n]+)", "labeled 'By:' field"),
];

/// 标题标签，按优先级排列
const TITLE_PATTERNS: &[(&str, &str)] = &[
    (r"(?i)\*\*ASSIGNMENT:\s*([^\*\n]+)\*\*", "bold ASSIGNMENT marker"),
    (r"(?i)\bAssignment:\s*([^\n]+)", "labeled 'Assignment:' field"),
    (r"(?i)\bTitle:\s*([^\n]+)", "labeled 'Title:' field"),
    (r"(?i)\bTopic:\s*([^\n]+)", "labeled 'Topic:' field"),
    (r"(?i)\bSubject:\s*([^\n]+)", "labeled 'Subject:' field"),
    (r"(?i)\bChapter:\s*([^\n]+)", "labeled 'Chapter:' field"),
    (r"(?i)\bUnit:\s*([^\n]+)", "labeled 'Unit:' field"),
    (r"(?i)\b((?:Homework|Quiz)\s*#\s*\d+)", "numbered homework/quiz heading"),
];

/// 四角文本作为无标签姓名的上限
const CORNER_MAX_WORDS: usize = 4;
const CORNER_MAX_CHARS: usize = 30;

/// 元数据提取服务
pub struct MetadataExtractor {
    backend: Arc<dyn ChatBackend>,
}

impl MetadataExtractor {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// 姓名：标签匹配 -> 模型读文本 -> 图片四角；`image` 为 None 时没有四角查找
    pub async fn extract_name(&self, text: &str, image: Option<Arc<[u8]>>) -> (NameInfo, Option<CornerText>) {
        if let Some(info) = match_patterns(text, NAME_PATTERNS) {
            return (info, None);
        }

        let from_text = if text.trim().is_empty() {
            MetadataInfo::not_found("no extracted text")
        } else {
            match self
                .ask_field(CallKind::NameExtract, student_name_prompt(text), "student_name")
                .await
            {
                Ok(info) => info,
                Err(e) => {
                    warn!("⚠️ 姓名提取失败: {}", e);
                    MetadataInfo::error()
                }
            }
        };
        if from_text.is_found() {
            return (from_text, None);
        }

        let Some(image) = image else {
            return (from_text, None);
        };
        match self.read_corners(image).await {
            Ok(corners) => {
                let info = name_from_corners(&corners).unwrap_or(from_text);
                (info, Some(corners))
            }
            Err(e) => {
                warn!("⚠️ 四角文本提取失败: {}", e);
                (MetadataInfo::error(), None)
            }
        }
    }

    pub async fn extract_title(&self, text: &str) -> TitleInfo {
        if let Some(info) = match_patterns(text, TITLE_PATTERNS) {
            return info;
        }
        if text.trim().is_empty() {
            return MetadataInfo::not_found("no extracted text");
        }
        match self
            .ask_field(CallKind::TitleExtract, assignment_title_prompt(text), "assignment_title")
            .await
        {
            Ok(info) => info,
            Err(e) => {
                warn!("⚠️ 标题提取失败: {}", e);
                MetadataInfo::error()
            }
        }
    }

    async fn ask_field(&self, kind: CallKind, prompt: String, field: &str) -> AppResult<MetadataInfo> {
        let raw = self.backend.complete(ChatRequest::text(kind, prompt)).await?;
        let map = normalize(&raw)?;
        Ok(info_from_reply(&map, field))
    }

    async fn read_corners(&self, image: Arc<[u8]>) -> AppResult<CornerText> {
        let raw = self
            .backend
            .complete(ChatRequest::vision(CallKind::CornerExtract, CORNER_PROMPT, image))
            .await?;
        let map = normalize(&raw)?;
        let corners = serde_json::from_value(Value::Object(map)).map_err(|e| ParseError::UnexpectedShape {
            reason: e.to_string(),
        })?;
        Ok(corners)
    }
}

/// 按顺序匹配标签，跳过 "[Name not detected]" 这类占位符
pub fn match_patterns(text: &str, patterns: &[(&str, &str)]) -> Option<MetadataInfo> {
    for (pattern, location) in patterns {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        for caps in re.captures_iter(text) {
            let Some(m) = caps.get(1) else {
                continue;
            };
            let value = m.as_str().trim_matches(|c: char| c == '*' || c.is_whitespace());
            if value.is_empty() || value.starts_with('[') {
                continue;
            }
            return Some(MetadataInfo::found(
                value,
                Confidence::High,
                *location,
                MetadataSource::Pattern,
            ));
        }
    }
    None
}

fn info_from_reply(map: &Map<String, Value>, field: &str) -> MetadataInfo {
    let confidence = map
        .get("confidence")
        .and_then(Value::as_str)
        .map(Confidence::parse)
        .unwrap_or_default();
    let location = map
        .get("location")
        .and_then(value_to_text)
        .unwrap_or_else(|| "text extraction".to_string());
    match map.get(field).and_then(value_to_text) {
        Some(value) => MetadataInfo::found(value, confidence, location, MetadataSource::TextExtraction),
        None => MetadataInfo::not_found(location),
    }
}

/// 在四角文本中找姓名：带 Name/Student 标签的，或足够短的无标签文本
pub fn name_from_corners(corners: &CornerText) -> Option<NameInfo> {
    for (location, value) in corners.in_search_order() {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };

        if let Some((label, rest)) = value.split_once(':') {
            let label = label.to_lowercase();
            let rest = rest.trim();
            if (label.contains("name") || label.contains("student")) && !rest.is_empty() {
                return Some(MetadataInfo::found(
                    rest,
                    Confidence::Medium,
                    format!("{} (labeled)", location),
                    MetadataSource::Corner,
                ));
            }
            continue;
        }

        let short = value.split_whitespace().count() <= CORNER_MAX_WORDS && value.chars().count() < CORNER_MAX_CHARS;
        if short && value.chars().any(char::is_alphabetic) {
            return Some(MetadataInfo::found(
                value,
                Confidence::Low,
                format!("{} (unlabeled)", location),
                MetadataSource::Corner,
            ));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 按调用类型返回固定回复，并记录调用顺序
    struct ByKind {
        name: AppResult<String>,
        title: String,
        corner: String,
        calls: Mutex<Vec<CallKind>>,
    }

    #[async_trait]
    impl ChatBackend for ByKind {
        async fn complete(&self, request: ChatRequest) -> AppResult<String> {
            self.calls.lock().unwrap().push(request.kind);
            match request.kind {
                CallKind::NameExtract => match &self.name {
                    Ok(s) => Ok(s.clone()),
                    Err(_) => Err(ParseError::MissingFields.into()),
                },
                CallKind::TitleExtract => Ok(self.title.clone()),
                _ => Ok(self.corner.clone()),
            }
        }
    }

    fn backend(name: AppResult<String>, corner: &str) -> Arc<ByKind> {
        Arc::new(ByKind {
            name,
            title: r#"{"assignment_title": null, "confidence": "low", "location": "none"}"#.to_string(),
            corner: corner.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_name_patterns_in_order() {
        let info = match_patterns("**STUDENT: JANE DOE**\nName: Someone", NAME_PATTERNS).unwrap();
        assert_eq!(info.value(), Some("JANE DOE"));
        assert_eq!(info.source, MetadataSource::Pattern);

        let info = match_patterns("Homework\nBy: Alex Kim\n", NAME_PATTERNS).unwrap();
        assert_eq!(info.value(), Some("Alex Kim"));

        assert!(match_patterns("**STUDENT: [Name not detected]**", NAME_PATTERNS).is_none());
    }

    #[test]
    fn test_title_patterns() {
        let info = match_patterns("Chapter: Photosynthesis\n", TITLE_PATTERNS).unwrap();
        assert_eq!(info.value(), Some("Photosynthesis"));
        let info = match_patterns("Quiz #3 answers", TITLE_PATTERNS).unwrap();
        assert_eq!(info.value(), Some("Quiz #3"));
    }

    #[test]
    fn test_corner_candidates() {
        let corners = CornerText {
            top_left: Some("Jordan Lee".to_string()),
            top_right: Some("Period 3: Biology".to_string()),
            bottom_left: None,
            bottom_right: Some("Page 1".to_string()),
        };
        // 右上带标签但不是姓名，继续查左上
        let info = name_from_corners(&corners).unwrap();
        assert_eq!(info.value(), Some("Jordan Lee"));
        assert_eq!(info.location, "top left corner (unlabeled)");

        let labeled = CornerText {
            top_right: Some("Student: Priya Patel".to_string()),
            ..Default::default()
        };
        let info = name_from_corners(&labeled).unwrap();
        assert_eq!(info.value(), Some("Priya Patel"));
        assert_eq!(info.confidence, Confidence::Medium);

        let too_long = CornerText {
            top_left: Some("This sentence is clearly not a student name".to_string()),
            ..Default::default()
        };
        assert!(name_from_corners(&too_long).is_none());
    }

    #[tokio::test]
    async fn test_pattern_beats_corner() {
        let backend = backend(Ok("{}".to_string()), r#"{"top_right": "John Smith"}"#);
        let extractor = MetadataExtractor::new(backend.clone());
        let (name, corners) = extractor
            .extract_name("Name: Jane Doe\n1. x = 4", Some(vec![0u8; 10].into()))
            .await;
        assert_eq!(name.value(), Some("Jane Doe"));
        assert!(corners.is_none());
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corner_used_after_text_extraction_finds_nothing() {
        let backend = backend(
            Ok(r#"{"student_name": null, "confidence": "low", "location": "not found"}"#.to_string()),
            r#"{"top_left": null, "top_right": "John Smith", "bottom_left": null, "bottom_right": null}"#,
        );
        let extractor = MetadataExtractor::new(backend.clone());
        let (name, corners) = extractor
            .extract_name("1. x = 4", Some(vec![0u8; 10].into()))
            .await;
        let title = extractor.extract_title("1. x = 4").await;
        assert_eq!(name.value(), Some("John Smith"));
        assert_eq!(name.source, MetadataSource::Corner);
        assert!(corners.is_some());
        assert!(!title.is_found());
        assert_eq!(
            *backend.calls.lock().unwrap(),
            vec![CallKind::NameExtract, CallKind::CornerExtract, CallKind::TitleExtract]
        );
    }

    #[tokio::test]
    async fn test_call_failure_is_not_fatal() {
        let backend = backend(Err(ParseError::MissingFields.into()), "not json at all");
        let extractor = MetadataExtractor::new(backend);
        let (name, _) = extractor
            .extract_name("plain essay text", Some(vec![0u8; 10].into()))
            .await;
        assert_eq!(name, MetadataInfo::error());
        assert_eq!(name.location, "error");
    }
}
