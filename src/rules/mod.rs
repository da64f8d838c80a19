//! Filter rule model: the closed field allow-list and creation-time
//! validation.
//!
//! Validation runs synchronously at filter create/update, so the compiler
//! and backtest engine never see an invalid rule set. The central check is
//! look-ahead-bias prevention: fields that reflect a match outcome are
//! rejected, redirecting to a pre-match aggregate when one exists.


use crate::types::{Condition, ConditionValue, Operator};
use serde::Serialize;
use std::fmt;

pub const MAX_CONDITIONS: usize = 10;

/// How a filterable field resolves against the fixture store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Maps 1:1 to a fixture column.
    Direct(&'static str),
    /// Column on the home-side team_stats join alias.
    HomeAggregate(&'static str),
    /// Column on the away-side team_stats join alias.
    AwayAggregate(&'static str),
    /// Sum of both sides' scoring averages; needs both join aliases.
    TotalExpectedGoals,
}

/// Direct fixture columns exposed to filters, by field name.
const DIRECT_FIELDS: &[(&str, &str)] = &[
    ("league_id", "league_id"),
    ("season", "season"),
    ("home_team_id", "home_team_id"),
    ("away_team_id", "away_team_id"),
    ("home_odds", "home_odds"),
    ("draw_odds", "draw_odds"),
    ("away_odds", "away_odds"),
];

/// Per-team aggregate columns, addressed as `{home,away}_team_<suffix>`.
const AGGREGATE_SUFFIXES: &[(&str, &str)] = &[
    ("goals_avg", "goals_avg"),
    ("conceded_avg", "conceded_avg"),
    ("clean_sheet_avg", "clean_sheet_avg"),
    ("form_avg", "form_avg"),
];

/// Outcome-only fields and their pre-match substitute, when one exists.
/// Fields with no substitute are rejected outright.
const OUTCOME_FIELDS: &[(&str, Option<&str>)] = &[
    ("home_score", Some("home_team_goals_avg")),
    ("away_score", Some("away_team_goals_avg")),
    ("total_goals", Some("total_expected_goals")),
    ("home_clean_sheet", Some("home_team_clean_sheet_avg")),
    ("away_clean_sheet", Some("away_team_clean_sheet_avg")),
    ("home_winner", Some("home_team_form_avg")),
    ("away_winner", Some("away_team_form_avg")),
    ("winner", None),
    ("final_score", None),
    ("home_shootout_score", None),
    ("away_shootout_score", None),
];

/// Resolve a field name against the allow-list.
pub fn resolve_field(name: &str) -> Option<FieldKind> {
    if name == "total_expected_goals" {
        return Some(FieldKind::TotalExpectedGoals);
    }
    if let Some((_, col)) = DIRECT_FIELDS.iter().find(|(f, _)| *f == name) {
        return Some(FieldKind::Direct(col));
    }
    for (suffix, col) in AGGREGATE_SUFFIXES {
        if name == format!("home_team_{suffix}") {
            return Some(FieldKind::HomeAggregate(col));
        }
        if name == format!("away_team_{suffix}") {
            return Some(FieldKind::AwayAggregate(col));
        }
    }
    None
}

/// Look up an outcome-only field. `Some(Some(alt))` means rejected with a
/// pre-match substitute to suggest; `Some(None)` means rejected outright.
fn outcome_field(name: &str) -> Option<Option<&'static str>> {
    OUTCOME_FIELDS
        .iter()
        .find(|(f, _)| *f == name)
        .map(|(_, alt)| *alt)
}

/// One rejected aspect of a rule set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    /// Field the error is about, empty for rule-set-level errors.
    pub field: String,
    pub message: String,
    /// Pre-match field the user should use instead, when one exists.
    pub suggestion: Option<String>,
}

impl ValidationError {
    fn rule_set(message: impl Into<String>) -> Self {
        Self {
            field: String::new(),
            message: message.into(),
            suggestion: None,
        }
    }

    fn field(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            suggestion: None,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)?;
        } else {
            write!(f, "{}: {}", self.field, self.message)?;
        }
        if let Some(alt) = &self.suggestion {
            write!(f, " (use `{alt}` instead)")?;
        }
        Ok(())
    }
}

/// Validate a rule set. Returns every problem found; an empty vec means the
/// rules are safe to compile. Pure, no side effects.
pub fn validate(conditions: &[Condition]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if conditions.is_empty() {
        errors.push(ValidationError::rule_set("a filter needs at least one condition"));
    }
    if conditions.len() > MAX_CONDITIONS {
        errors.push(ValidationError::rule_set(format!(
            "too many conditions: {} (max {MAX_CONDITIONS})",
            conditions.len()
        )));
    }

    for cond in conditions {
        validate_condition(cond, &mut errors);
    }

    errors
}

fn validate_condition(cond: &Condition, errors: &mut Vec<ValidationError>) {
    // Look-ahead bias first: an outcome field is rejected even before shape
    // checks, so the user sees the redirect rather than a type complaint.
    if let Some(alt) = outcome_field(&cond.field) {
        let mut err = ValidationError::field(
            &cond.field,
            "reflects the match outcome and cannot be filtered on pre-match",
        );
        err.suggestion = alt.map(str::to_string);
        errors.push(err);
        return;
    }

    if resolve_field(&cond.field).is_none() {
        errors.push(ValidationError::field(&cond.field, "unknown field"));
        return;
    }

    match cond.operator {
        Operator::In => match &cond.value {
            ConditionValue::List(items) if !items.is_empty() => {
                if items.iter().any(|v| matches!(v, ConditionValue::List(_))) {
                    errors.push(ValidationError::field(
                        &cond.field,
                        "`in` list must contain scalars",
                    ));
                }
            }
            ConditionValue::List(_) => {
                errors.push(ValidationError::field(&cond.field, "`in` list is empty"));
            }
            _ => {
                errors.push(ValidationError::field(
                    &cond.field,
                    "`in` requires a list value",
                ));
            }
        },
        Operator::Between => match cond.value.as_list() {
            Some(items) if items.len() == 2 => {
                if !items.iter().all(|v| v.as_number().is_some()) {
                    errors.push(ValidationError::field(
                        &cond.field,
                        "`between` bounds must be numeric",
                    ));
                }
            }
            Some(items) => {
                errors.push(ValidationError::field(
                    &cond.field,
                    format!("`between` requires exactly 2 values, got {}", items.len()),
                ));
            }
            None => {
                errors.push(ValidationError::field(
                    &cond.field,
                    "`between` requires a 2-element list",
                ));
            }
        },
        _ => {
            if matches!(cond.value, ConditionValue::List(_)) {
                errors.push(ValidationError::field(
                    &cond.field,
                    format!("operator `{}` requires a scalar value", cond.operator),
                ));
            }
        }
    }
}
