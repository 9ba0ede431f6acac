//! 响应规范化服务 - 业务能力层
//!
//! 把模型返回的原始文本解析成 JSON 对象，分层修复：
//! 严格解析 -> 转义修复 -> 宽松键值扫描。纯函数，没有副作用。

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ParseError;
use crate::models::lenient::value_to_text;
use crate::models::StructuredFeedback;
use crate::services::prompts::head_chars;

/// 宽松扫描时 feedback 缺失的占位文本
pub const FEEDBACK_PLACEHOLDER: &str = "Error parsing the grading response. Please try again.";

/// 解析失败时保留的原始内容长度
const EXCERPT_CHARS: usize = 500;

/// 评分响应：旧格式或详细格式
#[derive(Debug, Clone, PartialEq)]
pub enum GradingResponse {
    /// {score, feedback}
    Legacy { score: Value, feedback: String },
    /// {total_score, questions, ...}
    Detailed(StructuredFeedback),
}

/// 去掉 ```json / ``` 代码块标记
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let body = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```JSON") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// 修复非法转义
///
/// 合法转义（\" \\ \/ \b \f \n \r \t \uXXXX）原样保留，其余反斜杠变成 \\；
/// 字符串内部的原始换行、制表符转成转义形式
pub fn repair_escapes(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 16);
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => match chars.get(i + 1) {
                Some(&next) if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => {
                    out.push(c);
                    out.push(next);
                    i += 2;
                    continue;
                }
                Some('u')
                    if chars.len() >= i + 6
                        && chars[i + 2..i + 6].iter().all(|h| h.is_ascii_hexdigit()) =>
                {
                    out.extend(&chars[i..i + 6]);
                    i += 6;
                    continue;
                }
                _ => out.push_str("\\\\"),
            },
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '\n' if in_string => out.push_str("\\n"),
            '\r' if in_string => out.push_str("\\r"),
            '\t' if in_string => out.push_str("\\t"),
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

/// 宽松扫描：第一个 { 到最后一个 } 之间按逗号、冒号切分
///
/// 找不到大括号时返回 None
pub fn permissive_scan(content: &str) -> Option<Map<String, Value>> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    let inner = if end > start { &content[start + 1..end] } else { "" };

    let mut map = Map::new();
    for pair in inner.split(',') {
        if let Some((key, value)) = pair.split_once(':') {
            let key = trim_token(key);
            if !key.is_empty() {
                map.insert(key, Value::String(trim_token(value)));
            }
        }
    }
    Some(map)
}

fn trim_token(token: &str) -> String {
    token
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

fn parse_object(content: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// 把原始响应解析成 JSON 对象
pub fn normalize(raw: &str) -> Result<Map<String, Value>, ParseError> {
    let content = strip_fences(raw);
    if let Some(map) = parse_object(content) {
        return Ok(map);
    }

    let repaired = repair_escapes(content);
    if let Some(map) = parse_object(&repaired) {
        debug!("转义修复后解析成功");
        return Ok(map);
    }

    // JSON 前后夹杂说明文字
    if let (Some(start), Some(end)) = (repaired.find('{'), repaired.rfind('}')) {
        if start < end {
            if let Some(map) = parse_object(&repaired[start..=end]) {
                debug!("截取大括号之间的内容后解析成功");
                return Ok(map);
            }
        }
    }

    match permissive_scan(content) {
        Some(mut map) => {
            debug!("使用宽松扫描构建结果 ({} 个字段)", map.len());
            if !map.contains_key("score") && !map.contains_key("total_score") {
                map.insert("score".to_string(), Value::String("N/A".to_string()));
            }
            if !map.contains_key("feedback") {
                map.insert("feedback".to_string(), Value::String(FEEDBACK_PLACEHOLDER.to_string()));
            }
            Ok(map)
        }
        None => Err(ParseError::NotJson {
            excerpt: head_chars(raw, EXCERPT_CHARS).to_string(),
        }),
    }
}

impl GradingResponse {
    /// 按 total_score / score 字段区分格式
    pub fn from_map(map: Map<String, Value>) -> Result<Self, ParseError> {
        if let Some(total) = map.get("total_score").cloned() {
            return match serde_json::from_value::<StructuredFeedback>(Value::Object(map.clone())) {
                Ok(structured) => Ok(GradingResponse::Detailed(structured)),
                Err(e) => {
                    debug!("详细格式字段不完整 ({})，按旧格式处理", e);
                    let feedback = map
                        .get("feedback")
                        .and_then(value_to_text)
                        .unwrap_or_else(|| Value::Object(map.clone()).to_string());
                    Ok(GradingResponse::Legacy {
                        score: total,
                        feedback,
                    })
                }
            };
        }

        match (map.get("score"), map.get("feedback")) {
            (Some(score), Some(feedback)) => Ok(GradingResponse::Legacy {
                score: score.clone(),
                feedback: feedback_text(feedback),
            }),
            _ => Err(ParseError::MissingFields),
        }
    }
}

/// feedback 可能是字符串，也可能是嵌套对象
pub fn feedback_text(value: &Value) -> String {
    match value {
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => value_to_text(other).unwrap_or_default(),
    }
}

/// 解析评分响应
pub fn parse_grading_response(raw: &str) -> Result<GradingResponse, ParseError> {
    GradingResponse::from_map(normalize(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fence_stripping_matches_unfenced() {
        let fenced = normalize("```json\n{\"score\":5,\"feedback\":\"ok\"}\n```").unwrap();
        let plain = normalize("{\"score\":5,\"feedback\":\"ok\"}").unwrap();
        assert_eq!(fenced, plain);
        assert_eq!(fenced["score"], json!(5));
        assert_eq!(fenced["feedback"], json!("ok"));
    }

    #[test]
    fn test_no_braces_is_parse_failure_with_excerpt() {
        match normalize("not json at all") {
            Err(ParseError::NotJson { excerpt }) => assert_eq!(excerpt, "not json at all"),
            other => panic!("unexpected: {other:?}"),
        }

        let long = "x".repeat(800);
        match normalize(&long) {
            Err(ParseError::NotJson { excerpt }) => assert_eq!(excerpt.len(), 500),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_permissive_scan_for_unquoted_pairs() {
        let map = normalize("{score: 5, feedback: ok}").unwrap();
        assert_eq!(map["score"], json!("5"));
        assert_eq!(map["feedback"], json!("ok"));
    }

    #[test]
    fn test_permissive_defaults() {
        let map = normalize("{garbage without pairs}").unwrap();
        assert_eq!(map["score"], json!("N/A"));
        assert_eq!(map["feedback"], json!(FEEDBACK_PLACEHOLDER));
    }

    #[test]
    fn test_escape_repair_for_latex() {
        let raw = r#"{"score": "8/10", "feedback": "Use \sqrt{x} and \(a\)"}"#;
        let map = normalize(raw).unwrap();
        assert_eq!(map["feedback"], json!(r"Use \sqrt{x} and \(a\)"));
        assert_eq!(map["score"], json!("8/10"));
    }

    #[test]
    fn test_escape_repair_keeps_valid_escapes() {
        let repaired = repair_escapes(r#"{"a": "line\nnext \"q\" é \d"}"#);
        assert_eq!(repaired, r#"{"a": "line\nnext \"q\" é \\d"}"#);
        let repaired = repair_escapes("{\"a\": \"two\nlines\"}");
        assert_eq!(repaired, "{\"a\": \"two\\nlines\"}");
    }

    #[test]
    fn test_json_wrapped_in_prose() {
        let map = normalize("Here is the grade:\n{\"score\": 90, \"feedback\": \"good\"}\nThanks").unwrap();
        assert_eq!(map["score"], json!(90));
    }

    #[test]
    fn test_grading_response_discrimination() {
        let legacy = parse_grading_response(r#"{"score": "7/10", "feedback": "fine"}"#).unwrap();
        assert_eq!(
            legacy,
            GradingResponse::Legacy {
                score: json!("7/10"),
                feedback: "fine".to_string()
            }
        );

        let detailed = parse_grading_response(
            r#"{"total_score": "9/10", "percentage": "90%", "questions": [], "overall_feedback": {}}"#,
        )
        .unwrap();
        match detailed {
            GradingResponse::Detailed(s) => assert_eq!(s.total_score, "9/10"),
            other => panic!("unexpected: {other:?}"),
        }

        assert!(matches!(
            parse_grading_response(r#"{"grade": 5}"#),
            Err(ParseError::MissingFields)
        ));
    }

    #[test]
    fn test_malformed_detailed_degrades_to_legacy() {
        let response = parse_grading_response(r#"{"total_score": "6/10", "questions": "oops"}"#).unwrap();
        match response {
            GradingResponse::Legacy { score, .. } => assert_eq!(score, json!("6/10")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
