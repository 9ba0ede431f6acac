//! LLM API 客户端
//!
//! OpenAI 兼容接口（async-openai），图片以 base64 data URL 发送

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

use crate::clients::{ChatBackend, ChatRequest, ModelRole};
use crate::config::Config;
use crate::error::{AppError, AppResult, ServiceError};

/// LLM 客户端
///
/// 职责：
/// - 按调用类型选择模型和生成参数
/// - 组装文本 + 图片消息
/// - 不做超时和重试（由 `GuardedBackend` 负责）
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    vision_model: String,
    grading_model: String,
    metadata_model: String,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            vision_model: config.vision_model_name.clone(),
            grading_model: config.grading_model_name.clone(),
            metadata_model: config.metadata_model_name.clone(),
        }
    }

    fn model_for(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Vision => &self.vision_model,
            ModelRole::Grading => &self.grading_model,
            ModelRole::Metadata => &self.metadata_model,
        }
    }

    fn build_messages(&self, request: &ChatRequest) -> AppResult<Vec<ChatCompletionRequestMessage>> {
        let mut messages = Vec::new();

        if let Some(system) = &request.system {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(system.as_str())
                .build()
                .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let built = if request.images.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt.as_str())
                .build()
        } else {
            let mut parts = vec![ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: request.prompt.clone(),
                },
            )];
            for image in &request.images {
                parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: data_url(image),
                            detail: Some(ImageDetail::Auto),
                        },
                    },
                ));
            }
            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(parts))
                .build()
        };
        let user_msg = built.map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;

        messages.push(ChatCompletionRequestMessage::User(user_msg));
        Ok(messages)
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn complete(&self, request: ChatRequest) -> AppResult<String> {
        let kind = request.kind;
        let model = self.model_for(kind.role()).to_string();
        debug!(
            "调用 LLM API: {} (模型: {}, 提示词 {} 字符, 图片 {} 张)",
            kind.name(),
            model,
            request.prompt.len(),
            request.images.len()
        );

        let messages = self.build_messages(&request)?;
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(model.as_str())
            .messages(messages)
            .temperature(kind.temperature())
            .max_tokens(kind.max_tokens())
            .build()
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            warn!("LLM API 调用失败 ({}): {}", kind.name(), e);
            AppError::request_failed(model.as_str(), e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::EmptyContent {
                model: model.clone(),
            })?;

        debug!("LLM API 调用成功: {} ({} 字符)", kind.name(), content.len());
        Ok(content)
    }
}

/// 图片字节 -> data URL
fn data_url(bytes: &[u8]) -> String {
    format!("data:{};base64,{}", sniff_mime(bytes), STANDARD.encode(bytes))
}

/// 根据文件头判断图片类型，无法识别时按 JPEG 处理
fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else if bytes.starts_with(b"BM") {
        "image/bmp"
    } else {
        "image/jpeg"
    }
}
