//! 运行日志写入服务 - 业务能力层
//!
//! 只负责"追加一行评分记录"能力，不关心流程

use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

use crate::models::GradingResult;
use crate::utils::logging::truncate_text;

/// 运行日志写入服务
///
/// 职责：
/// - 每个提交写一行：时间、提交名、处理方式、分数、姓名
/// - 降级结果附带错误类别
pub struct ReportWriter {
    log_file_path: String,
}

impl ReportWriter {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            log_file_path: path.into(),
        }
    }

    /// 追加一条评分记录
    pub fn write(&self, label: &str, result: &GradingResult) -> Result<()> {
        let line = format_line(label, result);
        debug!("写入运行日志: {}", line.trim_end());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// 追加一条被拒绝的提交（输入校验失败）
    pub fn write_rejected(&self, label: &str, reason: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)?;
        writeln!(
            file,
            "[{}] {} | 已拒绝 | {}",
            chrono::Local::now().format("%H:%M:%S"),
            label,
            reason
        )?;
        Ok(())
    }
}

fn format_line(label: &str, result: &GradingResult) -> String {
    let name = result
        .student_name_info
        .as_ref()
        .and_then(|info| info.value())
        .unwrap_or("-");
    let mut line = format!(
        "[{}] {} | {} | 分数: {} | 姓名: {}",
        result.graded_at.format("%H:%M:%S"),
        label,
        result.processing_method,
        truncate_text(&result.score.to_string(), 80),
        name
    );
    if let Some(kind) = &result.diagnostics.error_kind {
        line.push_str(&format!(" | 错误: {}", kind));
    }
    line.push('\n');
    line
}
