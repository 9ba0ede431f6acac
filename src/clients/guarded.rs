use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::clients::{ChatBackend, ChatRequest};
use crate::config::Config;
use crate::error::{AppResult, ServiceError};

/// 统一的超时 + 有限重试
///
/// 每次外部调用都有超时；只有瞬时错误（请求失败、超时）才会重试
pub struct GuardedBackend<B> {
    inner: B,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl<B: ChatBackend> GuardedBackend<B> {
    pub fn new(inner: B, config: &Config) -> Self {
        Self {
            inner,
            timeout: config.request_timeout(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    pub fn with_limits(inner: B, timeout: Duration, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            inner,
            timeout,
            max_retries,
            retry_delay,
        }
    }
}

#[async_trait]
impl<B: ChatBackend> ChatBackend for GuardedBackend<B> {
    async fn complete(&self, request: ChatRequest) -> AppResult<String> {
        let call = request.kind.name();
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }

            let outcome = match tokio::time::timeout(self.timeout, self.inner.complete(request.clone())).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ServiceError::Timeout {
                    call: call.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
                .into()),
            };

            match outcome {
                Ok(content) => return Ok(content),
                Err(e) if e.is_transient() => {
                    warn!(
                        "⚠️ 外部调用失败 ({}, 第 {}/{} 次): {}",
                        call,
                        attempt + 1,
                        self.max_retries + 1,
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ServiceError::Timeout {
                call: call.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
            .into()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::CallKind;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        calls: AtomicUsize,
        fail_first: usize,
        delay: Duration,
    }

    #[async_trait]
    impl ChatBackend for Flaky {
        async fn complete(&self, _request: ChatRequest) -> AppResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if n < self.fail_first {
                Err(AppError::request_failed(
                    "test-model",
                    std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
                ))
            } else {
                Ok("ok".to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let backend = GuardedBackend::with_limits(
            Flaky {
                calls: AtomicUsize::new(0),
                fail_first: 1,
                delay: Duration::ZERO,
            },
            Duration::from_secs(1),
            1,
            Duration::from_millis(1),
        );
        let reply = backend
            .complete(ChatRequest::text(CallKind::NameExtract, "x"))
            .await
            .unwrap();
        assert_eq!(reply, "ok");
        assert_eq!(backend.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_becomes_service_error() {
        let backend = GuardedBackend::with_limits(
            Flaky {
                calls: AtomicUsize::new(0),
                fail_first: 0,
                delay: Duration::from_millis(200),
            },
            Duration::from_millis(20),
            0,
            Duration::ZERO,
        );
        let err = backend
            .complete(ChatRequest::text(CallKind::OcrExtract, "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ExternalServiceFailure");
        assert!(err.is_transient());
    }
}
