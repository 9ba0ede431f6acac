use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::fs;

use crate::error::{AppError, AppResult, FileError, InputError};
use crate::models::submission::{SubmissionInput, SubmissionKind};

/// 批改清单（作业目录下的 TOML 文件）
///
/// ```toml
/// assignment_type = "Math"
/// rubric = "2x+5=13, x=4 (10 pts)"
/// # 或者 rubric_file = "rubric.txt"
/// assignment_title = "Homework 3"
///
/// [students]
/// alice_scan = "Alice Chen"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct BatchManifest {
    pub assignment_type: String,
    #[serde(default)]
    pub rubric: Option<String>,
    #[serde(default)]
    pub rubric_file: Option<String>,
    #[serde(default)]
    pub assignment_title: Option<String>,
    /// 文件名（不含扩展名）-> 学生姓名
    #[serde(default)]
    pub students: BTreeMap<String, String>,
}

impl BatchManifest {
    /// 评分标准文本（加载后保证存在）
    pub fn rubric(&self) -> &str {
        self.rubric.as_deref().unwrap_or_default()
    }

    pub fn student_name(&self, stem: &str) -> Option<&str> {
        self.students.get(stem).map(String::as_str)
    }
}

/// 目录中的一份待批改提交
#[derive(Debug, Clone)]
pub struct SubmissionFile {
    /// 文件名（不含扩展名）或子目录名
    pub name: String,
    pub path: PathBuf,
    pub input: SubmissionInput,
}

/// 加载批改清单，rubric_file 会被读入 rubric
pub async fn load_manifest(folder: &Path, manifest_file: &str) -> AppResult<BatchManifest> {
    let path = folder.join(manifest_file);
    let content = fs::read_to_string(&path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    let mut manifest: BatchManifest =
        toml::from_str(&content).map_err(|e| FileError::TomlParseFailed {
            path: path.display().to_string(),
            source: e,
        })?;

    if manifest.rubric.as_deref().map_or(true, |r| r.trim().is_empty()) {
        let rubric_file = manifest
            .rubric_file
            .clone()
            .ok_or(InputError::MissingField { field: "rubric" })?;
        let rubric_path = folder.join(&rubric_file);
        let rubric = fs::read_to_string(&rubric_path)
            .await
            .map_err(|e| AppError::file_read_failed(rubric_path.display().to_string(), e))?;
        if rubric.trim().is_empty() {
            return Err(InputError::MissingField { field: "rubric" }.into());
        }
        manifest.rubric = Some(rubric);
    }

    if manifest.assignment_type.trim().is_empty() {
        return Err(InputError::MissingField {
            field: "assignment_type",
        }
        .into());
    }

    tracing::info!(
        "✓ 已加载批改清单: {} (类型: {}, 学生映射 {} 条)",
        path.display(),
        manifest.assignment_type,
        manifest.students.len()
    );
    Ok(manifest)
}

/// 扫描作业目录，按名称排序返回所有可识别的提交
///
/// 子目录视为多页文档，其中的图片按文件名排序作为页面
pub async fn scan_submissions(folder: &Path, skip: &[&str]) -> AppResult<Vec<SubmissionFile>> {
    if !folder.is_dir() {
        return Err(FileError::DirectoryNotFound {
            path: folder.display().to_string(),
        }
        .into());
    }

    let mut entries = fs::read_dir(folder)
        .await
        .map_err(|e| AppError::file_read_failed(folder.display().to_string(), e))?;

    let mut submissions = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::file_read_failed(folder.display().to_string(), e))?
    {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().to_string();
        if file_name.starts_with('.') || skip.contains(&file_name.as_str()) {
            continue;
        }

        if path.is_dir() {
            match load_page_directory(&path).await {
                Ok(Some(input)) => submissions.push(SubmissionFile {
                    name: file_name,
                    path,
                    input,
                }),
                Ok(None) => tracing::debug!("跳过没有图片的目录: {}", path.display()),
                Err(e) => tracing::warn!("⚠️ 读取目录失败 {}: {}", path.display(), e),
            }
            continue;
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.clone());
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("⚠️ 读取文件失败 {}: {}", path.display(), e);
                continue;
            }
        };
        match SubmissionInput::from_file(&file_name, bytes) {
            Some(input) => submissions.push(SubmissionFile {
                name: stem,
                path,
                input,
            }),
            None => tracing::debug!("跳过不支持的文件: {}", file_name),
        }
    }

    submissions.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(submissions)
}

/// 读取子目录中的图片作为多页文档
async fn load_page_directory(dir: &Path) -> AppResult<Option<SubmissionInput>> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| AppError::file_read_failed(dir.display().to_string(), e))?;

    let mut pages = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::file_read_failed(dir.display().to_string(), e))?
    {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(SubmissionKind::from_extension)
            == Some(SubmissionKind::Image);
        if is_image {
            pages.push(path);
        }
    }

    if pages.is_empty() {
        return Ok(None);
    }
    pages.sort();

    let mut page_images = Vec::with_capacity(pages.len());
    for page in &pages {
        let bytes = fs::read(page)
            .await
            .map_err(|e| AppError::file_read_failed(page.display().to_string(), e))?;
        page_images.push(bytes);
    }
    Ok(Some(SubmissionInput::pages(page_images)))
}
