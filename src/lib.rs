//! # Assignment Grader
//!
//! 一个用 AI 批改学生作业的 Rust 应用程序：文本、图片、多页文档统一输出评分结果
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 外部调用层（Clients）
//! - `clients/` - 唯一和 AI 服务打交道的地方
//! - `ChatBackend` - 提示词 + 可选图片 -> 原始文本
//! - `LlmClient` - OpenAI 兼容实现，`GuardedBackend` - 超时 + 有限重试
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个服务只做一件事
//! - `ContentClassifier` - 内容分类与策略选择
//! - `ExtractionService` - OCR / 视觉评分
//! - `TextGrader` - 文本评分（含数学宽松评分）
//! - `MetadataExtractor` - 学生姓名和作业标题
//! - `response_normalizer` / `score_validator` - 响应规范化与分数校验
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一份提交"的完整评分流程
//! - `GradingCtx` - 上下文封装（提交标签 + 页码）
//! - `GradingFlow` - 流程编排（分类 -> 提取 -> 评分 -> 回退 -> 元数据）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量评分，管理并发和输出
//! - `orchestrator/submission_processor` - 单个提交处理器
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{CallKind, ChatBackend, ChatRequest, GuardedBackend, LlmClient};
pub use config::{Config, GradingPolicy};
pub use error::{AppError, AppResult};
pub use models::{
    AssignmentType, Feedback, GradingResult, ProcessingMethod, Score, SubmissionInput,
};
pub use orchestrator::{process_submission, App, SubmissionReport, SubmissionStatus};
pub use workflow::{GradingCtx, GradingFlow, GradingRequest};
