//! 脚本化的 AI 后端，按调用类型返回预设回复

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assignment_grader::error::ServiceError;
use assignment_grader::{AppResult, ChatBackend, ChatRequest, Config};
use async_trait::async_trait;

/// 一次调用的回复
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(String),
    /// 非瞬时错误
    Fail,
    /// 永不返回，用来测试超时
    Hang,
    Delayed(Duration, String),
}

impl Reply {
    pub fn ok(text: impl Into<String>) -> Self {
        Reply::Ok(text.into())
    }
}

type Responder = Arc<dyn Fn(&ChatRequest) -> Reply + Send + Sync>;

/// 按调用类型（`CallKind::name()`）排队的回复
///
/// 队列只剩一条时一直重复这一条；没有脚本的调用类型返回错误
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    responders: HashMap<&'static str, Responder>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            responders: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, kind: &'static str, reply: Reply) -> Self {
        self.scripts
            .get_mut()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn respond_with(
        mut self,
        kind: &'static str,
        f: impl Fn(&ChatRequest) -> Reply + Send + Sync + 'static,
    ) -> Self {
        self.responders.insert(kind, Arc::new(f));
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.calls().iter().filter(|k| **k == kind).count()
    }

    fn next_reply(&self, request: &ChatRequest) -> Option<Reply> {
        let kind = request.kind.name();
        if let Some(f) = self.responders.get(kind) {
            return Some(f(request));
        }
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(kind)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, request: ChatRequest) -> AppResult<String> {
        self.calls.lock().unwrap().push(request.kind.name());
        match self.next_reply(&request) {
            Some(Reply::Ok(text)) => Ok(text),
            Some(Reply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ServiceError::EmptyContent {
                    model: "scripted".to_string(),
                }
                .into())
            }
            Some(Reply::Fail) => Err(ServiceError::EmptyContent {
                model: "scripted".to_string(),
            }
            .into()),
            None => Err(ServiceError::InvalidRequest(format!(
                "no scripted reply for {}",
                request.kind.name()
            ))
            .into()),
        }
    }
}

/// 测试用配置：不提取元数据，除非测试显式打开
pub fn test_config() -> Config {
    Config {
        enable_metadata_extraction: false,
        max_retries: 0,
        retry_delay_ms: 0,
        ..Config::default()
    }
}

/// 足够大的假图片
pub fn image(marker: u8) -> Vec<u8> {
    vec![marker; 256]
}

/// 分类回复：`mcq` 道选择题，`text` 道文本题
pub fn scan_reply(mcq: usize, text: usize) -> String {
    let mcq_questions: Vec<String> = (1..=mcq)
        .map(|i| {
            format!(
                r#"{{"question_id": "Q{i}", "options": ["A", "B", "C", "D"], "student_answer": "B", "answer_confidence": "high"}}"#
            )
        })
        .collect();
    let text_questions: Vec<String> = (1..=text)
        .map(|i| format!(r#"{{"question_id": "T{i}", "type": "short_answer"}}"#))
        .collect();
    format!(
        "```json\n{{\"mcq_questions\": [{}], \"diagram_questions\": [], \"text_questions\": [{}], \"confidence\": \"high\"}}\n```",
        mcq_questions.join(", "),
        text_questions.join(", ")
    )
}
