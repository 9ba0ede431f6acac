use thiserror::Error;

/// 应用程序错误类型
///
/// 对应评分管道的错误分类：只有 `Input` 会直接返回给调用方，
/// 其余错误都会在出现的那一层被转换成降级但合法的评分结果。
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入校验错误（进入管道之前拒绝）
    #[error("输入错误: {0}")]
    Input(#[from] InputError),
    /// AI 响应解析错误
    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),
    /// 分数格式错误
    #[error("分数错误: {0}")]
    Score(#[from] ScoreError),
    /// OCR / 视觉提取错误
    #[error("提取错误: {0}")]
    Extraction(#[from] ExtractionError),
    /// 外部服务错误（网络、超时、鉴权）
    #[error("外部服务错误: {0}")]
    Service(#[from] ServiceError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
}

/// 输入校验错误
#[derive(Debug, Error)]
pub enum InputError {
    /// 缺少必填字段
    #[error("缺少必填字段: {field}")]
    MissingField { field: &'static str },
    /// 解码后的数据为空或过小
    #[error("{what} 数据过小 ({size} 字节，至少需要 {min} 字节)")]
    PayloadTooSmall {
        what: &'static str,
        size: usize,
        min: usize,
    },
}

/// AI 响应解析错误
#[derive(Debug, Error)]
pub enum ParseError {
    /// 修复之后仍然找不到 JSON 对象
    #[error("无法解析评分结果，原始响应: {excerpt}")]
    NotJson { excerpt: String },
    /// JSON 中缺少评分字段
    #[error("响应缺少必要字段 (需要 'total_score' 或 'score'/'feedback')")]
    MissingFields,
    /// 字段存在但结构不符合预期
    #[error("响应结构不符合预期: {reason}")]
    UnexpectedShape { reason: String },
}

/// 分数格式错误
#[derive(Debug, Error)]
pub enum ScoreError {
    /// 分数格式或范围不合法
    #[error("分数格式无效 '{value}': {reason}")]
    InvalidScoreFormat { value: String, reason: &'static str },
}

/// OCR / 视觉提取错误
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// OCR 没有识别到任何文本
    #[error("图片中没有识别到文本")]
    NoText,
    /// 视觉策略调用失败，需要回退
    #[error("视觉评分失败: {reason}")]
    VisionFailed { reason: String },
    /// 无法渲染的文档（例如没有页面图像的 PDF）
    #[error("无法处理的文档: {reason}")]
    Unrenderable { reason: String },
}

/// 外部服务错误
#[derive(Debug, Error)]
pub enum ServiceError {
    /// 请求失败
    #[error("调用失败 (模型: {model}): {source}")]
    RequestFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 请求超时
    #[error("调用超时 ({call}, {timeout_secs} 秒)")]
    Timeout { call: String, timeout_secs: u64 },
    /// 返回内容为空
    #[error("返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 请求构建失败
    #[error("请求构建失败: {0}")]
    InvalidRequest(String),
}

impl ServiceError {
    /// 是否值得重试（网络抖动、超时）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::RequestFailed { .. } | ServiceError::Timeout { .. }
        )
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置项取值非法
    #[error("配置项 {name} 取值非法 ({value}): {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 目录不存在
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建外部调用失败错误
    pub fn request_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Service(ServiceError::RequestFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建分数格式错误
    pub fn invalid_score(value: impl Into<String>, reason: &'static str) -> Self {
        AppError::Score(ScoreError::InvalidScoreFormat {
            value: value.into(),
            reason,
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建配置取值错误
    pub fn invalid_config(name: &'static str, value: impl ToString, reason: &'static str) -> Self {
        AppError::Config(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason,
        })
    }

    /// 是否是可重试的外部服务错误
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Service(e) => e.is_transient(),
            _ => false,
        }
    }

    /// 错误类别名称，写入诊断信息
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Input(_) => "InvalidInput",
            AppError::Parse(_) => "ParseFailure",
            AppError::Score(_) => "InvalidScoreFormat",
            AppError::Extraction(_) => "ExtractionFailure",
            AppError::Service(_) => "ExternalServiceFailure",
            AppError::Config(_) => "ConfigError",
            AppError::File(_) => "FileError",
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
