//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量评分和调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量作业评分器
//! - 管理应用生命周期（初始化、运行）
//! - 读取批改清单，扫描作业目录
//! - 控制并发数量（Semaphore）
//! - 写运行日志和结果文件，输出全局统计
//!
//! ### `submission_processor` - 单个提交处理器
//! - 把文件和清单信息组装成评分请求
//! - 调用 `GradingFlow`，把结果整理成处理记录
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<SubmissionFile>)
//!     ↓
//! submission_processor (处理单个 SubmissionFile)
//!     ↓
//! workflow::GradingFlow (评分一份提交)
//!     ↓
//! services (能力层：分类 / 提取 / 评分 / 元数据)
//!     ↓
//! clients (外部 AI 调用：ChatBackend)
//! ```

pub mod batch_processor;
pub mod submission_processor;

// 重新导出主要类型
pub use batch_processor::App;
pub use submission_processor::{process_submission, SubmissionReport, SubmissionStatus};
