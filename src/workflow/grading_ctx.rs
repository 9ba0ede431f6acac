//! 评分上下文
//!
//! 封装"我正在评哪一份提交"这一信息

use std::fmt::Display;

use crate::models::{AssignmentType, SubmissionKind};

/// 评分上下文
///
/// 每个请求独占一份，只用于日志
#[derive(Debug, Clone)]
pub struct GradingCtx {
    /// 提交标签（文件名或调用方给的编号）
    pub label: String,

    /// 提交类型
    pub kind: SubmissionKind,

    /// 作业类型
    pub assignment_type: AssignmentType,

    /// 多页文档中的页码（从1开始）
    pub page: Option<usize>,
}

impl GradingCtx {
    pub fn new(label: impl Into<String>, kind: SubmissionKind, assignment_type: AssignmentType) -> Self {
        Self {
            label: label.into(),
            kind,
            assignment_type,
            page: None,
        }
    }

    /// 派生出某一页的上下文
    pub fn for_page(&self, page: usize) -> Self {
        Self {
            kind: SubmissionKind::Image,
            page: Some(page),
            ..self.clone()
        }
    }
}

impl Display for GradingCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.page {
            Some(page) => write!(f, "[提交 {} 第{}页]", self.label, page),
            None => write!(f, "[提交 {}]", self.label),
        }
    }
}
