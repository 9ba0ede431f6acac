use crate::error::{AppResult, InputError};

/// 图片数据的最小字节数，小于该值视为损坏的上传
pub const MIN_IMAGE_BYTES: usize = 100;

/// 一次评分请求的提交内容
///
/// 由上传层解码后构造，评分结束即丢弃
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionInput {
    /// 纯文本
    Text { content: String },
    /// 单张图片
    Image { bytes: Vec<u8> },
    /// PDF，页面图像按文档顺序排列（可能为空）
    Pdf {
        bytes: Vec<u8>,
        page_images: Vec<Vec<u8>>,
    },
}

/// 提交类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    Text,
    Image,
    Pdf,
}

impl SubmissionKind {
    /// 根据文件扩展名判断类型
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "md" => Some(Self::Text),
            "jpg" | "jpeg" | "png" | "bmp" | "tiff" | "tif" | "gif" | "webp" => Some(Self::Image),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Pdf => "pdf",
        }
    }
}

impl SubmissionInput {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        Self::Image { bytes }
    }

    /// 多页文档：每一页是一张图片
    pub fn pages(page_images: Vec<Vec<u8>>) -> Self {
        Self::Pdf {
            bytes: Vec::new(),
            page_images,
        }
    }

    /// 根据文件名扩展名构造提交，无法识别的类型返回 None
    pub fn from_file(file_name: &str, bytes: Vec<u8>) -> Option<Self> {
        let ext = std::path::Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())?;
        match SubmissionKind::from_extension(ext)? {
            SubmissionKind::Text => Some(Self::text(String::from_utf8_lossy(&bytes).into_owned())),
            SubmissionKind::Image => Some(Self::image(bytes)),
            SubmissionKind::Pdf => Some(Self::Pdf {
                bytes,
                page_images: Vec::new(),
            }),
        }
    }

    pub fn kind(&self) -> SubmissionKind {
        match self {
            Self::Text { .. } => SubmissionKind::Text,
            Self::Image { .. } => SubmissionKind::Image,
            Self::Pdf { .. } => SubmissionKind::Pdf,
        }
    }

    /// 进入管道前的输入校验
    pub fn validate(&self) -> AppResult<()> {
        match self {
            Self::Text { content } => {
                if content.trim().is_empty() {
                    return Err(InputError::MissingField { field: "submission" }.into());
                }
            }
            Self::Image { bytes } => check_image("image", bytes)?,
            Self::Pdf { bytes, page_images } => {
                if bytes.is_empty() && page_images.is_empty() {
                    return Err(InputError::MissingField { field: "submission" }.into());
                }
                for page in page_images {
                    check_image("page image", page)?;
                }
            }
        }
        Ok(())
    }
}

fn check_image(what: &'static str, bytes: &[u8]) -> AppResult<()> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(InputError::PayloadTooSmall {
            what,
            size: bytes.len(),
            min: MIN_IMAGE_BYTES,
        }
        .into());
    }
    Ok(())
}
