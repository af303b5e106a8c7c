//! Operator-supplied generation filters
//!
//! Raw criteria arrive from the HTTP layer or the command-line client and are
//! validated into [`ResolvedCriteria`] before any job state is created.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which transactions a run covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Every matching transaction
    #[default]
    All,
    /// Transactions created inside a date range
    Period,
}

impl FromStr for GenerationMode {
    type Err = CriteriaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(GenerationMode::All),
            "period" => Ok(GenerationMode::Period),
            other => Err(CriteriaError::UnknownMode(other.to_string())),
        }
    }
}

/// MemberPress transaction status values this service understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Complete,
    Pending,
    Refunded,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub const KNOWN: [TransactionStatus; 5] = [
        TransactionStatus::Complete,
        TransactionStatus::Pending,
        TransactionStatus::Refunded,
        TransactionStatus::Confirmed,
        TransactionStatus::Failed,
    ];

    /// Used when the operator does not pick any statuses
    pub const DEFAULT_SELECTION: [TransactionStatus; 3] = [
        TransactionStatus::Complete,
        TransactionStatus::Pending,
        TransactionStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Complete => "complete",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Statuses that never receive an invoice, whatever the selection
    pub fn is_never_invoiced(&self) -> bool {
        matches!(self, TransactionStatus::Confirmed | TransactionStatus::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = CriteriaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionStatus::KNOWN
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CriteriaError::UnknownStatus(s.to_string()))
    }
}

/// Criteria validation failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CriteriaError {
    #[error("Unknown generation type: {0}")]
    UnknownMode(String),

    #[error("Unknown transaction status: {0}")]
    UnknownStatus(String),

    #[error("Please select both start and end dates.")]
    MissingDates,

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Start date must be before end date.")]
    StartAfterEnd,

    #[error("Please select at least one transaction status.")]
    NoStatusSelected,

    #[error("Please enter a valid email address.")]
    InvalidEmail(String),
}

/// Criteria as submitted by an operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationCriteria {
    #[serde(default)]
    pub mode: GenerationMode,
    /// `None` selects the default statuses; unknown values are dropped
    #[serde(default)]
    pub statuses: Option<Vec<String>>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    /// Membership (product) id; 0 or absent means every membership
    #[serde(default)]
    pub membership_id: Option<i64>,
    #[serde(default)]
    pub customer_email: Option<String>,
}

/// Criteria after validation, ready for the transaction query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCriteria {
    /// Selected statuses restricted to [`TransactionStatus::KNOWN`]; may be empty
    pub statuses: Vec<TransactionStatus>,
    pub period: Option<(NaiveDate, NaiveDate)>,
    pub membership_id: Option<i64>,
    /// Trimmed and lowercased
    pub customer_email: Option<String>,
}

impl GenerationCriteria {
    /// Validate the criteria.
    ///
    /// Runs identically in the service and in the command-line client so a
    /// bad request never reaches the server.
    pub fn validate(&self) -> Result<ResolvedCriteria, CriteriaError> {
        let period = match self.mode {
            GenerationMode::All => None,
            GenerationMode::Period => {
                let start = non_blank(self.start_date.as_deref());
                let end = non_blank(self.end_date.as_deref());
                let (start, end) = match (start, end) {
                    (Some(start), Some(end)) => (parse_date(start)?, parse_date(end)?),
                    _ => return Err(CriteriaError::MissingDates),
                };
                if start > end {
                    return Err(CriteriaError::StartAfterEnd);
                }
                Some((start, end))
            }
        };

        let statuses = match &self.statuses {
            None => TransactionStatus::DEFAULT_SELECTION.to_vec(),
            Some(raw) if raw.is_empty() => return Err(CriteriaError::NoStatusSelected),
            Some(raw) => restrict_statuses(raw),
        };

        let customer_email = match non_blank(self.customer_email.as_deref()) {
            None => None,
            Some(email) => {
                let email = email.to_ascii_lowercase();
                if !is_valid_email(&email) {
                    return Err(CriteriaError::InvalidEmail(email));
                }
                Some(email)
            }
        };

        Ok(ResolvedCriteria {
            statuses,
            period,
            membership_id: self.membership_id.filter(|id| *id > 0),
            customer_email,
        })
    }
}

/// Keep known statuses, in selection order, without duplicates
fn restrict_statuses(raw: &[String]) -> Vec<TransactionStatus> {
    let mut statuses = Vec::new();
    for value in raw {
        if let Ok(status) = value.trim().parse::<TransactionStatus>() {
            if !statuses.contains(&status) {
                statuses.push(status);
            }
        }
    }
    statuses
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(value: &str) -> Result<NaiveDate, CriteriaError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| CriteriaError::InvalidDate(value.to_string()))
}

/// `local@domain.tld` shape check
///
/// No whitespace, exactly one `@`, and a dot inside the domain part with
/// characters on both sides.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(start: &str, end: &str) -> GenerationCriteria {
        GenerationCriteria {
            mode: GenerationMode::Period,
            start_date: Some(start.to_string()),
            end_date: Some(end.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_statuses_when_none_selected() {
        let resolved = GenerationCriteria::default().validate().unwrap();
        assert_eq!(
            resolved.statuses,
            vec![
                TransactionStatus::Complete,
                TransactionStatus::Pending,
                TransactionStatus::Refunded
            ]
        );
        assert_eq!(resolved.period, None);
    }

    #[test]
    fn test_empty_status_list_rejected() {
        let criteria = GenerationCriteria {
            statuses: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(criteria.validate(), Err(CriteriaError::NoStatusSelected));
    }

    #[test]
    fn test_unknown_statuses_restricted_away() {
        let criteria = GenerationCriteria {
            statuses: Some(vec!["bogus".to_string(), "active".to_string()]),
            ..Default::default()
        };
        // Non-empty selection that restricts to nothing is valid but matches nothing
        assert!(criteria.validate().unwrap().statuses.is_empty());

        let criteria = GenerationCriteria {
            statuses: Some(vec![
                "refunded".to_string(),
                "bogus".to_string(),
                "complete".to_string(),
                "refunded".to_string(),
            ]),
            ..Default::default()
        };
        assert_eq!(
            criteria.validate().unwrap().statuses,
            vec![TransactionStatus::Refunded, TransactionStatus::Complete]
        );
    }

    #[test]
    fn test_period_requires_both_dates() {
        let mut criteria = period("2024-01-01", "");
        assert_eq!(criteria.validate(), Err(CriteriaError::MissingDates));

        criteria.end_date = None;
        assert_eq!(criteria.validate(), Err(CriteriaError::MissingDates));
    }

    #[test]
    fn test_period_start_after_end_rejected() {
        assert_eq!(
            period("2024-03-01", "2024-02-01").validate(),
            Err(CriteriaError::StartAfterEnd)
        );
    }

    #[test]
    fn test_period_single_day_allowed() {
        let resolved = period("2024-03-01", "2024-03-01").validate().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(resolved.period, Some((day, day)));
    }

    #[test]
    fn test_period_rejects_malformed_date() {
        assert_eq!(
            period("03/01/2024", "2024-03-31").validate(),
            Err(CriteriaError::InvalidDate("03/01/2024".to_string()))
        );
    }

    #[test]
    fn test_dates_ignored_in_all_mode() {
        let criteria = GenerationCriteria {
            start_date: Some("2024-03-01".to_string()),
            end_date: Some("2024-02-01".to_string()),
            ..Default::default()
        };
        assert_eq!(criteria.validate().unwrap().period, None);
    }

    #[test]
    fn test_email_normalized_and_checked() {
        let criteria = GenerationCriteria {
            customer_email: Some("  Jane.Doe@Example.COM ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            criteria.validate().unwrap().customer_email.as_deref(),
            Some("jane.doe@example.com")
        );

        let criteria = GenerationCriteria {
            customer_email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        assert!(matches!(criteria.validate(), Err(CriteriaError::InvalidEmail(_))));

        let criteria = GenerationCriteria {
            customer_email: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(criteria.validate().unwrap().customer_email, None);
    }

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("a@b.c"));
        assert!(is_valid_email("first.last@sub.example.org"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@.b"));
        assert!(!is_valid_email("a@b."));
        assert!(!is_valid_email("@b.c"));
        assert!(!is_valid_email("a@@b.c"));
        assert!(!is_valid_email("a b@c.d"));
    }

    #[test]
    fn test_membership_zero_means_all() {
        let criteria = GenerationCriteria {
            membership_id: Some(0),
            ..Default::default()
        };
        assert_eq!(criteria.validate().unwrap().membership_id, None);

        let criteria = GenerationCriteria {
            membership_id: Some(42),
            ..Default::default()
        };
        assert_eq!(criteria.validate().unwrap().membership_id, Some(42));
    }

    #[test]
    fn test_deserialize_from_request_json() {
        let criteria: GenerationCriteria = serde_json::from_value(serde_json::json!({
            "mode": "period",
            "statuses": ["complete", "refunded"],
            "start_date": "2024-01-01",
            "end_date": "2024-01-31"
        }))
        .unwrap();
        assert_eq!(criteria.mode, GenerationMode::Period);
        assert_eq!(criteria.statuses.as_ref().map(Vec::len), Some(2));
        assert!(criteria.validate().is_ok());
    }
}
