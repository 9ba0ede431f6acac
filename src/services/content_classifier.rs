//! 内容分类服务 - 业务能力层
//!
//! 一次视觉调用扫描图片中的题目类型，再用固定阈值映射到提取策略。
//! 模型自己给出的 strategy 字段不采信，策略只由题目构成决定。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::clients::{CallKind, ChatBackend, ChatRequest};
use crate::config::GradingPolicy;
use crate::error::{AppResult, ParseError};
use crate::models::lenient;
use crate::models::{Confidence, ContentAnalysis, DiagramQuestion, McqQuestion, TextQuestion};
use crate::services::prompts::CONTENT_SCAN_PROMPT;
use crate::services::response_normalizer::normalize;

/// 模型返回的扫描结果
#[derive(Debug, Default, Deserialize)]
struct ContentScan {
    #[serde(default)]
    mcq_questions: Vec<McqQuestion>,
    #[serde(default)]
    diagram_questions: Vec<DiagramQuestion>,
    #[serde(default)]
    text_questions: Vec<TextQuestion>,
    #[serde(default)]
    confidence: Confidence,
    #[serde(default, deserialize_with = "lenient::points")]
    visual_percentage: f64,
}

/// 内容分类服务
///
/// 职责：
/// - 构建分类提示词并调用视觉模型
/// - 把扫描结果确定性地映射到策略
/// - 任何失败都回退到 OCR 主导、低置信度，不阻塞评分
pub struct ContentClassifier {
    backend: Arc<dyn ChatBackend>,
    policy: GradingPolicy,
}

impl ContentClassifier {
    pub fn new(backend: Arc<dyn ChatBackend>, policy: GradingPolicy) -> Self {
        Self { backend, policy }
    }

    /// 分类图片内容，失败时返回默认结果
    pub async fn classify(&self, image: Arc<[u8]>) -> ContentAnalysis {
        match self.try_classify(image).await {
            Ok(analysis) => {
                debug!(
                    "内容分类完成: {} (视觉题占比 {:.0}%, 选择题 {} 道)",
                    analysis.strategy,
                    analysis.visual_percentage,
                    analysis.mcq_questions.len()
                );
                analysis
            }
            Err(e) => {
                warn!("⚠️ 内容分类失败，使用 OCR 策略: {}", e);
                ContentAnalysis::fallback()
            }
        }
    }

    async fn try_classify(&self, image: Arc<[u8]>) -> AppResult<ContentAnalysis> {
        let raw = self
            .backend
            .complete(ChatRequest::vision(CallKind::Classify, CONTENT_SCAN_PROMPT, image))
            .await?;
        let map = normalize(&raw)?;
        Ok(analysis_from_scan(map, &self.policy)?)
    }
}

/// 扫描结果 -> 内容分析
pub fn analysis_from_scan(map: Map<String, Value>, policy: &GradingPolicy) -> Result<ContentAnalysis, ParseError> {
    let scan: ContentScan = serde_json::from_value(Value::Object(map)).map_err(|e| ParseError::UnexpectedShape {
        reason: e.to_string(),
    })?;
    Ok(ContentAnalysis::from_questions(
        scan.mcq_questions,
        scan.diagram_questions,
        scan.text_questions,
        scan.confidence,
        scan.visual_percentage,
        policy,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Strategy;
    use async_trait::async_trait;

    struct Scripted(AppResult<String>);

    #[async_trait]
    impl ChatBackend for Scripted {
        async fn complete(&self, _request: ChatRequest) -> AppResult<String> {
            match &self.0 {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(ParseError::MissingFields.into()),
            }
        }
    }

    fn classifier(reply: AppResult<String>) -> ContentClassifier {
        ContentClassifier::new(Arc::new(Scripted(reply)), GradingPolicy::default())
    }

    #[tokio::test]
    async fn test_model_strategy_field_is_ignored() {
        let reply = r#"```json
        {"strategy": "vision_primary",
         "mcq_questions": [{"question_id": "Q1", "student_answer": "B", "options": ["A","B"]}],
         "text_questions": [{"question_id": "Q2"}, {"question_id": "Q3"}, {"question_id": "Q4"}, {"question_id": "Q5"}, {"question_id": "Q6"}],
         "confidence": "high", "visual_percentage": 90}
        ```"#;
        let analysis = classifier(Ok(reply.to_string())).classify(vec![0u8; 10].into()).await;
        // 1/6 < 0.2
        assert_eq!(analysis.strategy, Strategy::OcrPrimary);
        assert_eq!(analysis.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn test_failure_defaults_to_ocr_low() {
        let analysis = classifier(Err(ParseError::MissingFields.into()))
            .classify(vec![0u8; 10].into())
            .await;
        assert_eq!(analysis, ContentAnalysis::fallback());

        let analysis = classifier(Ok("I cannot see the image".to_string()))
            .classify(vec![0u8; 10].into())
            .await;
        assert_eq!(analysis.strategy, Strategy::OcrPrimary);
        assert_eq!(analysis.confidence, Confidence::Low);
    }

    #[test]
    fn test_scan_shape_errors() {
        let map = normalize(r#"{"mcq_questions": 5}"#).unwrap();
        assert!(analysis_from_scan(map, &GradingPolicy::default()).is_err());
    }
}
