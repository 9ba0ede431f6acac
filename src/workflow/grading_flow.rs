//! 评分流程 - 流程层
//!
//! 核心职责：定义"一份提交"的完整评分流程
//!
//! 流程顺序：
//! 1. 输入校验（唯一会返回 Err 的地方）
//! 2. 文本：直接文本评分
//!    图片：内容分类 -> 视觉主导 / 混合 / OCR 主导，视觉失败回退到 OCR
//!    PDF：逐页走图片流程，按页码顺序合并
//! 3. 元数据（调用方提供的优先）-> 反馈页眉

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::clients::ChatBackend;
use crate::config::Config;
use crate::error::{AppError, AppResult, ExtractionError, InputError, ParseError};
use crate::models::{
    AssignmentType, ContentAnalysis, Feedback, GradingResult, MetadataInfo, NameInfo,
    ProcessingMethod, RenderText, Score, ScorePart, Strategy, SubmissionInput, TitleInfo,
};
use crate::services::{
    ContentClassifier, ExtractionService, GradedPart, MetadataExtractor, TextGrade, TextGrader,
};
use crate::workflow::grading_ctx::GradingCtx;

/// 页眉分隔线长度
const HEADER_RULE_WITH_NAME: usize = 60;
const HEADER_RULE_SHORT: usize = 30;
const EXTRACTED_TEXT_RULE: usize = 50;

const NO_TEXT_MESSAGE: &str = "Could not extract any text from the image. \
Please make sure the image is clear and contains readable text.";

/// 一次评分请求
#[derive(Debug, Clone)]
pub struct GradingRequest {
    pub assignment_type: AssignmentType,
    pub submission: SubmissionInput,
    pub rubric: String,
    /// 调用方提供的姓名 / 标题，优先于提取结果
    pub student_name: Option<String>,
    pub assignment_title: Option<String>,
    /// 日志标签
    pub label: String,
}

impl GradingRequest {
    pub fn new(
        assignment_type: impl Into<AssignmentType>,
        submission: SubmissionInput,
        rubric: impl Into<String>,
    ) -> Self {
        Self {
            assignment_type: assignment_type.into(),
            submission,
            rubric: rubric.into(),
            student_name: None,
            assignment_title: None,
            label: "submission".to_string(),
        }
    }

    pub fn with_student_name(mut self, name: impl Into<String>) -> Self {
        self.student_name = Some(name.into());
        self
    }

    pub fn with_assignment_title(mut self, title: impl Into<String>) -> Self {
        self.assignment_title = Some(title.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// 单条流水线的产出
struct Pipeline {
    result: GradingResult,
    /// 提取的全文（多页时按页拼接）
    text: Option<String>,
    /// 元数据来源：第一页的文本和图片
    metadata_text: Option<String>,
    metadata_image: Option<Arc<[u8]>>,
}

impl Pipeline {
    fn bare(result: GradingResult) -> Self {
        Self {
            result,
            text: None,
            metadata_text: None,
            metadata_image: None,
        }
    }
}

/// 评分流程
///
/// - 编排完整的评分流程
/// - 决定何时用视觉、何时回退到 OCR
/// - 每个请求独立执行，不持有请求之间共享的可变状态
/// - 只依赖业务能力（services）
pub struct GradingFlow {
    classifier: ContentClassifier,
    extraction: ExtractionService,
    text_grader: TextGrader,
    metadata: MetadataExtractor,
    max_concurrent_pages: usize,
    enable_metadata_extraction: bool,
}

impl GradingFlow {
    pub fn new(backend: Arc<dyn ChatBackend>, config: &Config) -> Self {
        Self {
            classifier: ContentClassifier::new(backend.clone(), config.policy.clone()),
            extraction: ExtractionService::new(backend.clone()),
            text_grader: TextGrader::new(backend.clone(), config.policy.clone()),
            metadata: MetadataExtractor::new(backend),
            max_concurrent_pages: config.max_concurrent_pages.max(1),
            enable_metadata_extraction: config.enable_metadata_extraction,
        }
    }

    /// 评分一份提交
    ///
    /// 只有输入校验失败时返回 Err，其余失败都变成降级的 `GradingResult`
    pub async fn grade(&self, request: GradingRequest) -> AppResult<GradingResult> {
        request.submission.validate()?;
        if request.rubric.trim().is_empty() {
            return Err(InputError::MissingField { field: "rubric" }.into());
        }

        let kind = request.submission.kind();
        let ctx = GradingCtx::new(request.label.clone(), kind, request.assignment_type.clone());
        info!("{} 📝 开始评分 ({}, {})", ctx, kind.name(), request.assignment_type);

        let pipeline = match &request.submission {
            SubmissionInput::Text { content } => {
                let result = self
                    .grade_text(&ctx, content, &request.rubric, ProcessingMethod::TextSubmission)
                    .await;
                Pipeline {
                    result,
                    text: None,
                    metadata_text: Some(content.clone()),
                    metadata_image: None,
                }
            }
            SubmissionInput::Image { bytes } => {
                self.grade_image(&ctx, Arc::from(bytes.as_slice()), &request.rubric)
                    .await
            }
            SubmissionInput::Pdf { page_images, .. } => {
                self.grade_pages(&ctx, page_images, &request.rubric).await
            }
        };

        let result = self.finish(&ctx, &request, pipeline).await;
        info!(
            "{} ✓ 评分完成: {} ({})",
            ctx, result.score, result.processing_method
        );
        Ok(result)
    }

    // ========== 文本 ==========

    async fn grade_text(
        &self,
        ctx: &GradingCtx,
        text: &str,
        rubric: &str,
        method: ProcessingMethod,
    ) -> GradingResult {
        match self.text_grader.grade(&ctx.assignment_type, text, rubric).await {
            Ok(grade) => from_text_grade(grade, method),
            Err(e) => {
                warn!("{} ⚠️ 文本评分失败: {}", ctx, e);
                failure_result(method, &e)
            }
        }
    }

    // ========== 图片 ==========

    async fn grade_image(&self, ctx: &GradingCtx, image: Arc<[u8]>, rubric: &str) -> Pipeline {
        let analysis = self.classifier.classify(image.clone()).await;
        info!(
            "{} 🔎 内容分类: {} (视觉题 {:.0}%, 置信度 {})",
            ctx,
            analysis.strategy,
            analysis.visual_percentage,
            analysis.confidence.name()
        );

        let mut pipeline = match analysis.strategy {
            Strategy::VisionPrimary => {
                match self
                    .extraction
                    .grade_with_vision(image.clone(), &ctx.assignment_type, rubric, &analysis)
                    .await
                {
                    Ok(part) => {
                        let mut result =
                            GradingResult::new(part.score, part.feedback, ProcessingMethod::VisionPrimary);
                        result.diagnostics.mcq_adjustments = part.mcq_adjustments;
                        Pipeline {
                            result,
                            text: None,
                            metadata_text: None,
                            metadata_image: Some(image.clone()),
                        }
                    }
                    Err(e) => {
                        warn!("{} ⚠️ 视觉评分失败，回退到 OCR: {}", ctx, e);
                        let reason = ExtractionError::VisionFailed { reason: e.to_string() };
                        let method = ProcessingMethod::FallbackOcr;
                        self.grade_via_ocr(ctx, image.clone(), rubric, method, Some(reason.to_string()))
                            .await
                    }
                }
            }
            Strategy::VisionPartial => self.grade_hybrid(ctx, image.clone(), rubric, &analysis).await,
            Strategy::OcrPrimary => {
                self.grade_via_ocr(ctx, image.clone(), rubric, ProcessingMethod::OcrPrimary, None)
                    .await
            }
        };

        pipeline.result.diagnostics.content_analysis = Some(analysis);
        pipeline
    }

    /// OCR 提取 -> 文本评分
    async fn grade_via_ocr(
        &self,
        ctx: &GradingCtx,
        image: Arc<[u8]>,
        rubric: &str,
        method: ProcessingMethod,
        fallback_reason: Option<String>,
    ) -> Pipeline {
        let text = match self.extraction.extract_text(image.clone(), &ctx.assignment_type).await {
            Ok(text) => text,
            Err(e) => {
                warn!("{} ❌ OCR 提取失败: {}", ctx, e);
                let mut result = unprocessed(&e);
                result.diagnostics.fallback_reason = fallback_reason;
                return Pipeline::bare(result);
            }
        };
        info!("{} ✓ OCR 提取 {} 字符", ctx, text.chars().count());

        let mut result = self.grade_text(ctx, &text, rubric, method).await;
        result.diagnostics.fallback_reason = fallback_reason;
        Pipeline {
            result,
            text: Some(text.clone()),
            metadata_text: Some(text),
            metadata_image: Some(image),
        }
    }

    /// 视觉评选择题/图形题，同时 OCR 评文本题
    ///
    /// 每个分支只执行一次，失败的分支不会重新走 OCR
    async fn grade_hybrid(
        &self,
        ctx: &GradingCtx,
        image: Arc<[u8]>,
        rubric: &str,
        analysis: &ContentAnalysis,
    ) -> Pipeline {
        let at = &ctx.assignment_type;
        let (visual, text) = tokio::join!(
            self.extraction.grade_visual_subset(image.clone(), at, rubric, analysis),
            self.ocr_and_grade(image.clone(), at, rubric)
        );

        let (text, grade) = match text {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{} ❌ OCR 提取失败: {}", ctx, e);
                return Pipeline::bare(unprocessed(&e));
            }
        };

        let result = match (visual, grade) {
            (Ok(visual), Ok(grade)) => combine_hybrid(visual, grade),
            (Err(e), Ok(grade)) => {
                warn!("{} ⚠️ 视觉部分评分失败，只用文本结果: {}", ctx, e);
                let mut result = from_text_grade(grade, ProcessingMethod::FallbackOcr);
                result.diagnostics.fallback_reason =
                    Some(ExtractionError::VisionFailed { reason: e.to_string() }.to_string());
                result
            }
            (Ok(visual), Err(e)) => {
                warn!("{} ⚠️ 混合评分的文本部分失败，保留视觉结果: {}", ctx, e);
                combine_hybrid_without_text(visual, &e)
            }
            (Err(visual_err), Err(e)) => {
                warn!("{} ❌ 混合评分两部分都失败: 视觉 {} / 文本 {}", ctx, visual_err, e);
                failure_result(ProcessingMethod::Hybrid, &e)
            }
        };

        Pipeline {
            result,
            text: Some(text.clone()),
            metadata_text: Some(text),
            metadata_image: Some(image),
        }
    }

    /// OCR 失败返回 Err；文本评分的结果原样交给调用方
    async fn ocr_and_grade(
        &self,
        image: Arc<[u8]>,
        assignment_type: &AssignmentType,
        rubric: &str,
    ) -> AppResult<(String, AppResult<TextGrade>)> {
        let text = self.extraction.extract_text(image, assignment_type).await?;
        let grade = self.text_grader.grade(assignment_type, &text, rubric).await;
        Ok((text, grade))
    }

    // ========== 多页文档 ==========

    async fn grade_pages(&self, ctx: &GradingCtx, pages: &[Vec<u8>], rubric: &str) -> Pipeline {
        if pages.is_empty() {
            let e = AppError::from(ExtractionError::Unrenderable {
                reason: "PDF has no rendered page images".to_string(),
            });
            warn!("{} ❌ {}", ctx, e);
            return Pipeline::bare(unprocessed(&e));
        }

        let images: Vec<Arc<[u8]>> = pages.iter().map(|p| Arc::from(p.as_slice())).collect();
        if images.len() == 1 {
            return self.grade_image(ctx, images[0].clone(), rubric).await;
        }

        info!("{} 📄 共 {} 页，并发 {}", ctx, images.len(), self.max_concurrent_pages);
        // buffered 保证结果顺序与页码一致
        let outcomes: Vec<Pipeline> = stream::iter(images.into_iter().enumerate())
            .map(|(i, image)| {
                let page_ctx = ctx.for_page(i + 1);
                async move { self.grade_image(&page_ctx, image, rubric).await }
            })
            .buffered(self.max_concurrent_pages)
            .collect()
            .await;

        combine_pages(outcomes)
    }

    // ========== 元数据与页眉 ==========

    async fn finish(&self, ctx: &GradingCtx, request: &GradingRequest, pipeline: Pipeline) -> GradingResult {
        let Pipeline {
            mut result,
            text,
            metadata_text,
            metadata_image,
        } = pipeline;

        let provided_name = request.student_name.as_deref().filter(|s| !s.trim().is_empty());
        let provided_title = request.assignment_title.as_deref().filter(|s| !s.trim().is_empty());

        // 没有评分结果时不做额外的提取调用
        let graded = !matches!(result.score, Score::Error | Score::NotAvailable);
        let extract = graded && self.enable_metadata_extraction;

        let mut name = provided_name.map(MetadataInfo::provided);
        let mut title = provided_title.map(MetadataInfo::provided);
        if extract && (name.is_none() || title.is_none()) {
            let source = metadata_text.as_deref().unwrap_or("");
            if name.is_none() {
                let (found, corners) = self.metadata.extract_name(source, metadata_image.clone()).await;
                result.diagnostics.corner_text = corners;
                name = Some(found);
            }
            if title.is_none() {
                title = Some(self.metadata.extract_title(source).await);
            }
        }
        if let Some(info) = &name {
            result.diagnostics.note(metadata_note("student name", info));
        }
        if let Some(info) = &title {
            result.diagnostics.note(metadata_note("assignment title", info));
        }

        let name_value = name.as_ref().and_then(NameInfo::value).map(str::to_string);
        let title_value = title.as_ref().and_then(TitleInfo::value).map(str::to_string);
        if let Some(text) = text {
            result.extracted_text = Some(format_extracted_text(
                &text,
                name_value.as_deref(),
                title_value.as_deref(),
            ));
        }
        result.student_name_info = name;
        result.assignment_title_info = title;

        if graded {
            let header = feedback_header(name_value.as_deref(), title_value.as_deref());
            match &mut result.feedback {
                Feedback::Text(text) => {
                    *text = format!("{}\n\n{}", header, text);
                    result.refresh_formatted(None);
                }
                Feedback::Structured(_) => result.refresh_formatted(Some(&header)),
            }
        }

        if let Some(kind) = &result.diagnostics.error_kind {
            warn!("{} ⚠️ 降级结果: {}", ctx, kind);
        }
        result
    }
}

// ========== 结果构造 ==========

fn from_text_grade(grade: TextGrade, method: ProcessingMethod) -> GradingResult {
    let mut result = GradingResult::new(grade.score, grade.feedback, method);
    result.diagnostics.leniency = grade.leniency;
    result.diagnostics.mcq_adjustments = grade.mcq_adjustments;
    result
}

fn combine_hybrid(visual: GradedPart, text: TextGrade) -> GradingResult {
    let score = Score::Composite(vec![
        ScorePart::new("Visual", visual.score),
        ScorePart::new("Text", text.score),
    ]);
    let feedback = format!(
        "**MCQ/Visual Elements:** {}\n\n**Text Elements:** {}",
        visual.feedback.render_as_text(),
        text.feedback.render_as_text()
    );
    let mut result = GradingResult::new(score, Feedback::Text(feedback), ProcessingMethod::Hybrid);
    result.diagnostics.leniency = text.leniency;
    result.diagnostics.mcq_adjustments = visual.mcq_adjustments + text.mcq_adjustments;
    result
}

/// 文本部分失败：视觉分数保留，文本部分记为 Error
fn combine_hybrid_without_text(visual: GradedPart, e: &AppError) -> GradingResult {
    let score = Score::Composite(vec![
        ScorePart::new("Visual", visual.score),
        ScorePart::new("Text", Score::Error),
    ]);
    let feedback = format!(
        "**MCQ/Visual Elements:** {}\n\n**Text Elements:** Could not grade the text portion: {}",
        visual.feedback.render_as_text(),
        e
    );
    let mut result = GradingResult::new(score, Feedback::Text(feedback), ProcessingMethod::Hybrid);
    result.diagnostics.mcq_adjustments = visual.mcq_adjustments;
    result.diagnostics.error_kind = Some(e.kind().to_string());
    result
}

/// 多页合并：分数和反馈按页码顺序排列，元数据取第一页
fn combine_pages(pages: Vec<Pipeline>) -> Pipeline {
    let page_count = pages.len();
    let mut parts = Vec::with_capacity(page_count);
    let mut sections = Vec::with_capacity(page_count);
    let mut texts = Vec::new();
    let mut notes = Vec::new();
    let mut mcq_adjustments = 0;
    let mut metadata_text = None;
    let mut metadata_image = None;

    for (i, page) in pages.into_iter().enumerate() {
        let number = i + 1;
        parts.push(ScorePart::new(format!("Page {}", number), page.result.score.clone()));
        sections.push(format!("**Page {}:**\n{}", number, page.result.feedback.render_as_text()));
        notes.push(format!("page {}: {}", number, page.result.processing_method));
        mcq_adjustments += page.result.diagnostics.mcq_adjustments;
        if let Some(text) = &page.text {
            texts.push(format!("--- Page {} ---\n{}", number, text));
        }
        if i == 0 {
            metadata_text = page.metadata_text;
            metadata_image = page.metadata_image;
        }
    }

    let mut result = GradingResult::new(
        Score::Composite(parts),
        Feedback::Text(sections.join("\n\n")),
        ProcessingMethod::MultiPage,
    );
    result.diagnostics.page_count = Some(page_count);
    result.diagnostics.mcq_adjustments = mcq_adjustments;
    result.diagnostics.processing_notes = notes;

    Pipeline {
        result,
        text: (!texts.is_empty()).then(|| texts.join("\n\n")),
        metadata_text,
        metadata_image,
    }
}

/// 错误 -> 降级结果：解析失败给 N/A，其余给 Error
fn failure_result(method: ProcessingMethod, e: &AppError) -> GradingResult {
    match e {
        AppError::Parse(ParseError::NotJson { excerpt }) => GradingResult::not_available(method, excerpt),
        AppError::Parse(other) => GradingResult::not_available(method, &other.to_string()),
        _ => GradingResult::error(method, e.kind(), e),
    }
}

/// 无法处理的提交
fn unprocessed(e: &AppError) -> GradingResult {
    match e {
        AppError::Extraction(ExtractionError::NoText) => {
            GradingResult::error(ProcessingMethod::Unprocessed, e.kind(), NO_TEXT_MESSAGE)
        }
        _ => GradingResult::error(ProcessingMethod::Unprocessed, e.kind(), e),
    }
}

fn metadata_note(field: &str, info: &MetadataInfo) -> String {
    format!(
        "{}: {} via {} ({}, {} confidence)",
        field,
        info.value().unwrap_or("not found"),
        info.source.name(),
        info.location,
        info.confidence.name()
    )
}

/// 反馈页眉
pub fn feedback_header(student_name: Option<&str>, assignment_title: Option<&str>) -> String {
    match (student_name, assignment_title) {
        (Some(name), title) => {
            let mut header = format!("**STUDENT: {}**", name.to_uppercase());
            if let Some(title) = title {
                header.push_str(&format!("\n**ASSIGNMENT: {}**", title));
            }
            header.push('\n');
            header.push_str(&"=".repeat(HEADER_RULE_WITH_NAME));
            header
        }
        (None, Some(title)) => format!("**ASSIGNMENT: {}**\n{}", title, "=".repeat(HEADER_RULE_SHORT)),
        (None, None) => format!("**GRADING REPORT**\n{}", "=".repeat(HEADER_RULE_SHORT)),
    }
}

/// 带姓名和标题的提取文本
pub fn format_extracted_text(text: &str, student_name: Option<&str>, assignment_title: Option<&str>) -> String {
    format!(
        "**STUDENT: {}**\n**ASSIGNMENT: {}**\n\n{}\n\n{}",
        student_name.unwrap_or("[Name not detected]"),
        assignment_title.unwrap_or("[Title not detected]"),
        "=".repeat(EXTRACTED_TEXT_RULE),
        text
    )
}
