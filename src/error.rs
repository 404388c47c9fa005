use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::schemas::UserNick;
use crate::split::SplitError;
use crate::store::StoreError;

/// Failures of ledger operations. Everything except `Store` is a
/// request-local rejection.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Split(#[from] SplitError),

    #[error("group {0} not found")]
    GroupNotFound(String),

    #[error("group {0} already exists")]
    GroupExists(String),

    #[error("expense {0} not found")]
    ExpenseNotFound(String),

    #[error("{member} is not a member of group {group}")]
    NotMember { group: String, member: UserNick },

    #[error("{member} is already a member of group {group}")]
    AlreadyMember { group: String, member: UserNick },

    #[error("only group admins can {0}")]
    NotAdmin(&'static str),

    #[error("only the payer or a group admin can change expense {0}")]
    NotPayer(String),

    #[error("{member} still has unsettled splits in group {group}")]
    UnsettledSplits { group: String, member: UserNick },

    #[error("expense {0} has settled splits and can no longer change")]
    ExpenseLocked(String),

    #[error("{member} has no split on expense {expense}")]
    NoSplit { expense: String, member: UserNick },

    #[error("split of {member} on expense {expense} is already settled")]
    AlreadySettled { expense: String, member: UserNick },

    #[error("group {0} kept changing underneath the request, try again")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateGroup(id) => LedgerError::GroupExists(id),
            other => {
                error!(error = %other, "store failure");
                LedgerError::Store(other)
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Ledger(err) => match err {
                LedgerError::Split(_) => StatusCode::BAD_REQUEST,
                LedgerError::GroupNotFound(_) | LedgerError::ExpenseNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                LedgerError::NotMember { .. }
                | LedgerError::NotAdmin(_)
                | LedgerError::NotPayer(_) => StatusCode::FORBIDDEN,
                LedgerError::GroupExists(_)
                | LedgerError::AlreadyMember { .. }
                | LedgerError::UnsettledSplits { .. }
                | LedgerError::ExpenseLocked(_)
                | LedgerError::NoSplit { .. }
                | LedgerError::AlreadySettled { .. }
                | LedgerError::Conflict(_) => StatusCode::CONFLICT,
                LedgerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn split_failures_are_bad_requests() {
        let err = ApiError::from(LedgerError::from(SplitError::AmountMismatch {
            declared: dec!(9),
            amount: dec!(10),
        }));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "exact shares add up to 9, but the expense is 10"
        );
    }

    #[test]
    fn duplicate_group_maps_to_conflict() {
        let err = LedgerError::from(StoreError::DuplicateGroup("g".into()));
        assert!(matches!(err, LedgerError::GroupExists(ref id) if id == "g"));
        assert_eq!(ApiError::from(err).status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn database_failures_are_internal_errors() {
        let driver = mongodb::error::Error::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ));
        let err = LedgerError::from(StoreError::Database(driver));
        assert!(matches!(err, LedgerError::Store(StoreError::Database(_))));
        assert_eq!(
            ApiError::from(err).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthorized_is_401() {
        assert_eq!(
            ApiError::Unauthorized("missing header").status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
