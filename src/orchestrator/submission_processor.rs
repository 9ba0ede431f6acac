//! 单个提交处理器 - 编排层
//!
//! ## 职责
//!
//! 把目录中的一个文件变成一次评分请求，交给 `GradingFlow`，
//! 再把结果整理成可以写入结果文件的记录。
//!
//! 清单中的学生姓名和作业标题作为调用方提供的值传入，优先于提取结果。

use serde::Serialize;
use tracing::{error, info};

use crate::models::{BatchManifest, GradingResult, SubmissionFile};
use crate::workflow::{GradingFlow, GradingRequest};

/// 提交处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// 正常评分
    Graded,
    /// 评分结果为 Error / N/A
    Degraded,
    /// 输入校验失败，没有进入评分流程
    Rejected,
}

/// 一份提交的处理记录
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReport {
    pub submission: String,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GradingResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmissionReport {
    pub fn label(&self) -> &str {
        &self.submission
    }
}

/// 处理单个提交
///
/// # 参数
/// - `flow`: 评分流程（所有提交共享，只读）
/// - `file`: 扫描得到的提交
/// - `manifest`: 批改清单
/// - `index`: 提交序号（用于日志）
pub async fn process_submission(
    flow: &GradingFlow,
    file: SubmissionFile,
    manifest: &BatchManifest,
    index: usize,
) -> SubmissionReport {
    let label = file
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.name.clone());
    info!("[提交 {}] 🗂️ #{} 进入评分", label, index);

    let mut request = GradingRequest::new(manifest.assignment_type.as_str(), file.input, manifest.rubric())
        .with_label(label.clone());
    if let Some(name) = manifest.student_name(&file.name) {
        request = request.with_student_name(name);
    }
    if let Some(title) = manifest.assignment_title.as_deref() {
        request = request.with_assignment_title(title);
    }

    match flow.grade(request).await {
        Ok(result) => {
            let status = if result.is_degraded() {
                SubmissionStatus::Degraded
            } else {
                SubmissionStatus::Graded
            };
            SubmissionReport {
                submission: label,
                status,
                result: Some(result),
                error: None,
            }
        }
        Err(e) => {
            error!("[提交 {}] ❌ 提交被拒绝: {}", label, e);
            SubmissionReport {
                submission: label,
                status: SubmissionStatus::Rejected,
                result: None,
                error: Some(e.to_string()),
            }
        }
    }
}
