use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// 评分策略参数
///
/// 阈值都是经验值，保留为可配置常量
#[derive(Clone, Debug, PartialEq)]
pub struct GradingPolicy {
    /// 视觉题占比超过该值时整体走视觉评分
    pub vision_primary_threshold: f64,
    /// 视觉题占比不低于该值时走混合评分
    pub vision_partial_threshold: f64,
    /// 数学题：得分不低于总分的该比例时直接给满分
    pub leniency_full_credit_ratio: f64,
    /// 数学题：得分不低于总分的该比例时加分
    pub leniency_bonus_ratio: f64,
    /// 数学题：最多加几分
    pub leniency_max_bonus: f64,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            vision_primary_threshold: 0.5,
            vision_partial_threshold: 0.2,
            leniency_full_credit_ratio: 0.85,
            leniency_bonus_ratio: 0.75,
            leniency_max_bonus: 2.0,
        }
    }
}

/// 程序配置
///
/// 进程启动时构建一次，之后以引用传给各个组件
#[derive(Clone, Debug)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    /// 视觉 / OCR 模型
    pub vision_model_name: String,
    /// 文本评分模型
    pub grading_model_name: String,
    /// 姓名、标题提取模型
    pub metadata_model_name: String,
    // --- 调用控制 ---
    /// 单次外部调用超时（秒）
    pub request_timeout_secs: u64,
    /// 瞬时错误的最大重试次数
    pub max_retries: u32,
    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,
    /// 多页文档同时处理的页数
    pub max_concurrent_pages: usize,
    /// 是否提取学生姓名和作业标题
    pub enable_metadata_extraction: bool,
    // --- 批量处理 ---
    /// 同时批改的提交数量
    pub max_concurrent_submissions: usize,
    /// 待批改作业目录
    pub assignment_folder: String,
    /// 批改清单文件名（位于作业目录下）
    pub manifest_file: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 批改结果 JSON 文件
    pub results_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 评分策略
    pub policy: GradingPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            vision_model_name: "gpt-4o".to_string(),
            grading_model_name: "gpt-4o".to_string(),
            metadata_model_name: "gpt-4o-mini".to_string(),
            request_timeout_secs: 30,
            max_retries: 1,
            retry_delay_ms: 500,
            max_concurrent_pages: 4,
            enable_metadata_extraction: true,
            max_concurrent_submissions: 4,
            assignment_folder: "assignment".to_string(),
            manifest_file: "grading.toml".to_string(),
            output_log_file: "grading_log.txt".to_string(),
            results_file: "grading_results.json".to_string(),
            verbose_logging: false,
            policy: GradingPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        let policy = GradingPolicy {
            vision_primary_threshold: env_or("VISION_PRIMARY_THRESHOLD", default.policy.vision_primary_threshold),
            vision_partial_threshold: env_or("VISION_PARTIAL_THRESHOLD", default.policy.vision_partial_threshold),
            leniency_full_credit_ratio: env_or("LENIENCY_FULL_CREDIT_RATIO", default.policy.leniency_full_credit_ratio),
            leniency_bonus_ratio: env_or("LENIENCY_BONUS_RATIO", default.policy.leniency_bonus_ratio),
            leniency_max_bonus: env_or("LENIENCY_MAX_BONUS", default.policy.leniency_max_bonus),
        };
        Self {
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            vision_model_name: std::env::var("VISION_MODEL_NAME").unwrap_or(default.vision_model_name),
            grading_model_name: std::env::var("GRADING_MODEL_NAME").unwrap_or(default.grading_model_name),
            metadata_model_name: std::env::var("METADATA_MODEL_NAME").unwrap_or(default.metadata_model_name),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", default.request_timeout_secs),
            max_retries: env_or("MAX_RETRIES", default.max_retries),
            retry_delay_ms: env_or("RETRY_DELAY_MS", default.retry_delay_ms),
            max_concurrent_pages: env_or("MAX_CONCURRENT_PAGES", default.max_concurrent_pages),
            enable_metadata_extraction: env_or("ENABLE_METADATA_EXTRACTION", default.enable_metadata_extraction),
            max_concurrent_submissions: env_or("MAX_CONCURRENT_SUBMISSIONS", default.max_concurrent_submissions),
            assignment_folder: std::env::var("ASSIGNMENT_FOLDER").unwrap_or(default.assignment_folder),
            manifest_file: std::env::var("MANIFEST_FILE").unwrap_or(default.manifest_file),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            results_file: std::env::var("RESULTS_FILE").unwrap_or(default.results_file),
            verbose_logging: env_or("VERBOSE_LOGGING", default.verbose_logging),
            policy,
        }
    }

    /// 校验配置取值
    pub fn validate(&self) -> AppResult<()> {
        let p = &self.policy;
        for (name, value) in [
            ("VISION_PRIMARY_THRESHOLD", p.vision_primary_threshold),
            ("VISION_PARTIAL_THRESHOLD", p.vision_partial_threshold),
            ("LENIENCY_FULL_CREDIT_RATIO", p.leniency_full_credit_ratio),
            ("LENIENCY_BONUS_RATIO", p.leniency_bonus_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::invalid_config(name, value, "必须在 [0, 1] 之间"));
            }
        }
        if p.vision_partial_threshold > p.vision_primary_threshold {
            return Err(AppError::invalid_config(
                "VISION_PARTIAL_THRESHOLD",
                p.vision_partial_threshold,
                "不能大于 VISION_PRIMARY_THRESHOLD",
            ));
        }
        if p.leniency_bonus_ratio > p.leniency_full_credit_ratio {
            return Err(AppError::invalid_config(
                "LENIENCY_BONUS_RATIO",
                p.leniency_bonus_ratio,
                "不能大于 LENIENCY_FULL_CREDIT_RATIO",
            ));
        }
        if p.leniency_max_bonus < 0.0 {
            return Err(AppError::invalid_config("LENIENCY_MAX_BONUS", p.leniency_max_bonus, "不能为负数"));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::invalid_config("REQUEST_TIMEOUT_SECS", 0, "必须大于 0"));
        }
        if self.max_concurrent_submissions == 0 {
            return Err(AppError::invalid_config("MAX_CONCURRENT_SUBMISSIONS", 0, "至少为 1"));
        }
        if self.max_concurrent_pages == 0 {
            return Err(AppError::invalid_config("MAX_CONCURRENT_PAGES", 0, "至少为 1"));
        }
        Ok(())
    }

    /// 外部调用超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.policy.vision_primary_threshold, 0.5);
        assert_eq!(config.policy.leniency_bonus_ratio, 0.75);
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.policy.vision_partial_threshold = 0.6;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.policy.leniency_bonus_ratio = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = Config::default();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_concurrent_pages = 0;
        assert!(config.validate().is_err());
    }
}
