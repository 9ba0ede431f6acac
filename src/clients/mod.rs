//! 外部 AI 调用边界
//!
//! 视觉、OCR、评分、元数据提取都走同一个请求/响应契约：
//! 提示词 + 可选图片 -> 原始文本。上层只依赖 `ChatBackend`，
//! 测试时可以换成脚本化的实现。

pub mod guarded;
pub mod llm_client;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppResult;

pub use guarded::GuardedBackend;
pub use llm_client::LlmClient;

/// 模型角色，决定使用哪个模型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// 视觉 / OCR 模型
    Vision,
    /// 文本评分模型
    Grading,
    /// 姓名、标题提取模型
    Metadata,
}

/// 调用类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// 内容分类
    Classify,
    /// OCR 文本提取
    OcrExtract,
    /// 视觉模型整体评分
    VisionGrade,
    /// 视觉模型只评视觉题
    VisionPartial,
    /// 四角文本提取
    CornerExtract,
    /// 文本评分
    TextGrade { math: bool },
    /// 姓名提取
    NameExtract,
    /// 标题提取
    TitleExtract,
}

impl CallKind {
    pub fn role(self) -> ModelRole {
        match self {
            CallKind::Classify
            | CallKind::OcrExtract
            | CallKind::VisionGrade
            | CallKind::VisionPartial
            | CallKind::CornerExtract => ModelRole::Vision,
            CallKind::TextGrade { .. } => ModelRole::Grading,
            CallKind::NameExtract | CallKind::TitleExtract => ModelRole::Metadata,
        }
    }

    pub fn temperature(self) -> f32 {
        match self {
            CallKind::VisionGrade | CallKind::VisionPartial => 0.3,
            CallKind::TextGrade { math: false } => 0.3,
            _ => 0.1,
        }
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            CallKind::Classify => 1500,
            CallKind::OcrExtract => 2500,
            CallKind::VisionGrade => 2000,
            CallKind::VisionPartial => 1500,
            CallKind::CornerExtract => 500,
            CallKind::TextGrade { math: true } => 5000,
            CallKind::TextGrade { math: false } => 4000,
            CallKind::NameExtract | CallKind::TitleExtract => 200,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CallKind::Classify => "classify",
            CallKind::OcrExtract => "ocr",
            CallKind::VisionGrade => "vision_grade",
            CallKind::VisionPartial => "vision_partial",
            CallKind::CornerExtract => "corner",
            CallKind::TextGrade { .. } => "text_grade",
            CallKind::NameExtract => "name",
            CallKind::TitleExtract => "title",
        }
    }
}

/// 一次外部调用
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub kind: CallKind,
    pub system: Option<String>,
    pub prompt: String,
    /// 原始图片字节
    pub images: Vec<Arc<[u8]>>,
}

impl ChatRequest {
    pub fn text(kind: CallKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            system: None,
            prompt: prompt.into(),
            images: Vec::new(),
        }
    }

    pub fn vision(kind: CallKind, prompt: impl Into<String>, image: Arc<[u8]>) -> Self {
        Self {
            kind,
            system: None,
            prompt: prompt.into(),
            images: vec![image],
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// 外部 AI 能力
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 发送请求，返回模型的原始文本
    async fn complete(&self, request: ChatRequest) -> AppResult<String>;
}

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for Arc<T> {
    async fn complete(&self, request: ChatRequest) -> AppResult<String> {
        (**self).complete(request).await
    }
}
