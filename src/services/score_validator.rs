use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::Score;

/// 校验模型返回的分数
///
/// - 含 "/" 的字符串：恰好两个数字，0 <= earned <= total 且 total > 0
/// - 其他字符串：转成数字，0..=100
/// - 数字：0..=100
/// - "N/A"：无法评分
pub fn validate_score(value: &Value) -> AppResult<Score> {
    match value {
        Value::String(raw) => validate_text(raw),
        Value::Number(n) => {
            let v = n
                .as_f64()
                .ok_or_else(|| AppError::invalid_score(n.to_string(), "not a number"))?;
            check_percent(v, &n.to_string())
        }
        other => Err(AppError::invalid_score(other.to_string(), "unsupported score type")),
    }
}

fn validate_text(raw: &str) -> AppResult<Score> {
    let s = raw.trim();
    if s.eq_ignore_ascii_case("n/a") {
        return Ok(Score::NotAvailable);
    }

    if s.contains('/') {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 2 {
            return Err(AppError::invalid_score(s, "fraction must have exactly two parts"));
        }
        let earned = parse_finite(parts[0]).ok_or_else(|| AppError::invalid_score(s, "earned is not a number"))?;
        let total = parse_finite(parts[1]).ok_or_else(|| AppError::invalid_score(s, "total is not a number"))?;
        if total <= 0.0 {
            return Err(AppError::invalid_score(s, "total must be positive"));
        }
        if earned < 0.0 || earned > total {
            return Err(AppError::invalid_score(s, "earned must be between 0 and total"));
        }
        return Ok(Score::Fraction { earned, total });
    }

    let v = parse_finite(s).ok_or_else(|| AppError::invalid_score(s, "not a number"))?;
    check_percent(v, s)
}

fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn check_percent(v: f64, raw: &str) -> AppResult<Score> {
    if !v.is_finite() || !(0.0..=100.0).contains(&v) {
        return Err(AppError::invalid_score(raw, "score must be between 0 and 100"));
    }
    Ok(Score::Numeric(v))
}
