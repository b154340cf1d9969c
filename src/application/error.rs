use thiserror::Error;

use crate::domain::{BankAccountId, FundTransferId, TransferRuleError};

/// How an error should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before touching the store.
    Validation,
    /// The store refused or failed; nothing was applied.
    Store,
    /// Ledger and balances could not be kept in step; the operation was rolled back.
    Consistency,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(#[from] TransferRuleError),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Bank transfer postings must name a bank account")]
    MissingBankAccount,

    #[error("Not authenticated: a user is required for this operation")]
    NotAuthenticated,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("Bank account not found: {0}")]
    BankAccountNotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Idempotency key '{0}' was already used for a different transfer")]
    IdempotencyConflict(String),

    #[error("Fund transfer not found: {0}")]
    TransferNotFound(FundTransferId),

    #[error("Permission denied: only administrators may delete fund transfers")]
    PermissionDenied,

    #[error(
        "Could not reverse balances for transfer {transfer_id} (account {account_id}); the transfer was kept"
    )]
    ReversalFailed {
        transfer_id: FundTransferId,
        account_id: BankAccountId,
    },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidTransfer(_)
            | AppError::InvalidAmount(_)
            | AppError::MissingBankAccount
            | AppError::NotAuthenticated
            | AppError::UserNotFound(_)
            | AppError::SiteNotFound(_)
            | AppError::BankAccountNotFound(_)
            | AppError::AlreadyExists(_)
            | AppError::IdempotencyConflict(_) => ErrorKind::Validation,
            AppError::TransferNotFound(_) | AppError::PermissionDenied | AppError::Database(_) => {
                ErrorKind::Store
            }
            AppError::ReversalFailed { .. } => ErrorKind::Consistency,
        }
    }
}
