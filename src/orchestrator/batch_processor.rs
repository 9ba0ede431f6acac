//! 批量作业评分器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量提交的评分和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：创建运行日志、构建 AI 客户端和评分流程
//! 2. **批量加载**：读取批改清单，扫描作业目录中的所有提交
//! 3. **并发控制**：使用 Semaphore 限制并发数量
//! 4. **分批处理**：将提交分批次处理，每批完成后再开始下一批
//! 5. **结果输出**：运行日志逐行追加，全部结果写入 JSON 文件
//! 6. **全局统计**：正常评分 / 降级 / 拒绝

use crate::clients::{ChatBackend, GuardedBackend, LlmClient};
use crate::config::Config;
use crate::models::{load_manifest, scan_submissions, BatchManifest, SubmissionFile};
use crate::orchestrator::submission_processor::{
    process_submission, SubmissionReport, SubmissionStatus,
};
use crate::services::ReportWriter;
use crate::utils::logging::{
    init_log_file, log_batch_complete, log_batch_start, log_startup, log_submissions_loaded,
    print_final_stats,
};
use crate::workflow::GradingFlow;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    flow: Arc<GradingFlow>,
    writer: ReportWriter,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        log_startup(&config.assignment_folder, config.max_concurrent_submissions);

        let backend: Arc<dyn ChatBackend> =
            Arc::new(GuardedBackend::new(LlmClient::new(&config), &config));
        Ok(Self::with_backend(config, backend))
    }

    /// 使用指定的 AI 后端创建应用（测试时注入脚本化后端）
    pub fn with_backend(config: Config, backend: Arc<dyn ChatBackend>) -> Self {
        let flow = Arc::new(GradingFlow::new(backend, &config));
        let writer = ReportWriter::new(config.output_log_file.clone());
        Self {
            config,
            flow,
            writer,
        }
    }

    /// 运行应用主逻辑，返回所有提交的处理记录
    pub async fn run(&self) -> Result<Vec<SubmissionReport>> {
        let folder = Path::new(&self.config.assignment_folder);

        info!("\n📁 正在读取批改清单...");
        let manifest = Arc::new(load_manifest(folder, &self.config.manifest_file).await?);

        let mut skip = vec![self.config.manifest_file.as_str()];
        if let Some(rubric_file) = manifest.rubric_file.as_deref() {
            skip.push(rubric_file);
        }
        // 不要把上次运行的输出当成提交
        for output in [&self.config.output_log_file, &self.config.results_file] {
            if let Some(name) = Path::new(output).file_name().and_then(|n| n.to_str()) {
                skip.push(name);
            }
        }
        let submissions = scan_submissions(folder, &skip).await?;

        if submissions.is_empty() {
            warn!("⚠️ 没有找到待评分的提交，程序结束");
            return Ok(Vec::new());
        }

        log_submissions_loaded(submissions.len(), self.config.max_concurrent_submissions);

        let reports = self.process_all(submissions, manifest).await?;
        self.write_results(&reports)?;

        let count = |status: SubmissionStatus| reports.iter().filter(|r| r.status == status).count();
        print_final_stats(
            count(SubmissionStatus::Graded),
            count(SubmissionStatus::Degraded),
            count(SubmissionStatus::Rejected),
            &self.config.output_log_file,
            &self.config.results_file,
        );

        Ok(reports)
    }

    /// 分批处理所有提交，结果顺序与扫描顺序一致
    async fn process_all(
        &self,
        submissions: Vec<SubmissionFile>,
        manifest: Arc<BatchManifest>,
    ) -> Result<Vec<SubmissionReport>> {
        let batch_size = self.config.max_concurrent_submissions.max(1);
        let semaphore = Arc::new(Semaphore::new(batch_size));
        let total = submissions.len();
        let total_batches = total.div_ceil(batch_size);
        let mut reports = Vec::with_capacity(total);

        let mut pending = submissions.into_iter().enumerate().peekable();
        let mut batch_num = 0;
        while pending.peek().is_some() {
            batch_num += 1;
            let batch: Vec<(usize, SubmissionFile)> = pending.by_ref().take(batch_size).collect();
            let start = batch.first().map(|(i, _)| i + 1).unwrap_or_default();
            let end = batch.last().map(|(i, _)| i + 1).unwrap_or_default();
            log_batch_start(batch_num, total_batches, start, end, total);

            let batch_reports = self
                .process_batch(batch, manifest.clone(), semaphore.clone())
                .await?;

            let graded = batch_reports
                .iter()
                .filter(|r| r.status == SubmissionStatus::Graded)
                .count();
            log_batch_complete(batch_num, graded, batch_reports.len());
            reports.extend(batch_reports);
        }

        Ok(reports)
    }

    /// 处理单个批次
    async fn process_batch(
        &self,
        batch: Vec<(usize, SubmissionFile)>,
        manifest: Arc<BatchManifest>,
        semaphore: Arc<Semaphore>,
    ) -> Result<Vec<SubmissionReport>> {
        let mut handles = Vec::new();

        // 为本批创建并发任务
        for (idx, file) in batch {
            let index = idx + 1;
            let label = file.name.clone();
            let permit = semaphore.clone().acquire_owned().await?;
            let flow = self.flow.clone();
            let manifest = manifest.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                process_submission(&flow, file, &manifest, index).await
            });
            handles.push((label, handle));
        }

        // 等待本批所有任务完成
        let mut reports = Vec::with_capacity(handles.len());
        for (label, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => {
                    error!("[提交 {}] 任务执行失败: {}", label, e);
                    SubmissionReport {
                        submission: label,
                        status: SubmissionStatus::Rejected,
                        result: None,
                        error: Some(format!("task failed: {}", e)),
                    }
                }
            };
            self.record(&report);
            reports.push(report);
        }

        Ok(reports)
    }

    /// 运行日志写一行，写失败只记录警告
    fn record(&self, report: &SubmissionReport) {
        let written = match (&report.result, &report.error) {
            (Some(result), _) => self.writer.write(report.label(), result),
            (None, Some(reason)) => self.writer.write_rejected(report.label(), reason),
            (None, None) => Ok(()),
        };
        if let Err(e) = written {
            warn!("⚠️ 写入运行日志失败: {}", e);
        }
    }

    fn write_results(&self, reports: &[SubmissionReport]) -> Result<()> {
        let json = serde_json::to_string_pretty(reports).context("序列化评分结果失败")?;
        std::fs::write(&self.config.results_file, json)
            .with_context(|| format!("写入结果文件失败: {}", self.config.results_file))?;
        info!("💾 已写入 {} 条评分结果", reports.len());
        Ok(())
    }
}
