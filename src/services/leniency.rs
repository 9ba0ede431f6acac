//! 数学作业宽松评分
//!
//! 补偿 OCR 漏识别的解题过程：取整后，接近满分的升级为满分，
//! 次一档加少量分数。每次评分只能调用一次。

use tracing::info;

use crate::config::GradingPolicy;
use crate::models::{LeniencyAdjustment, LeniencyRule, Score};

/// 对分数应用宽松规则，只处理分数形式
pub fn apply_leniency(score: &Score, policy: &GradingPolicy) -> (Score, Option<LeniencyAdjustment>) {
    let (earned, total) = match score {
        Score::Fraction { earned, total } => (*earned, *total),
        other => return (other.clone(), None),
    };

    let rounded = earned.round().clamp(0.0, total);
    let (adjusted, rule, bonus) = if rounded >= total * policy.leniency_full_credit_ratio && rounded < total {
        (total, Some(LeniencyRule::FullCredit), 0.0)
    } else if rounded >= total * policy.leniency_bonus_ratio
        && rounded < total * policy.leniency_full_credit_ratio
    {
        let bonus = policy.leniency_max_bonus.min(total - rounded).max(0.0);
        (rounded + bonus, Some(LeniencyRule::Bonus), bonus)
    } else if (rounded - earned).abs() > f64::EPSILON {
        (rounded, Some(LeniencyRule::Rounded), 0.0)
    } else {
        (rounded, None, 0.0)
    };

    let new_score = Score::Fraction {
        earned: adjusted,
        total,
    };
    let adjustment = rule.map(|rule| {
        let record = LeniencyAdjustment {
            original: score.to_string(),
            adjusted: new_score.to_string(),
            rule,
            bonus_points: bonus,
        };
        info!("📐 宽松评分: {} -> {} ({:?})", record.original, record.adjusted, rule);
        record
    });
    (new_score, adjustment)
}
