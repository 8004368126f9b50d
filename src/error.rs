use std::{error::Error, fmt};

use ecow::EcoString;

/// An error caused by the algebra specification itself, as opposed to a
/// defect in the generator. These are collected rather than thrown so a
/// single generation run can report every independent problem at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserError {
    pub message: EcoString,
}

impl UserError {
    pub fn new(message: impl Into<EcoString>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for UserError {}

#[derive(Debug, Clone)]
pub enum GagenError {
    /// A single specification error
    User(UserError),
    /// Several independent specification errors from one generation run
    Collected(Vec<UserError>),
}

pub type GagenResult<T = ()> = Result<T, GagenError>;

impl From<UserError> for GagenError {
    fn from(error: UserError) -> Self {
        Self::User(error)
    }
}

impl From<Vec<UserError>> for GagenError {
    fn from(errors: Vec<UserError>) -> Self {
        Self::Collected(errors)
    }
}

impl fmt::Display for GagenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GagenError::User(error) => write!(f, "{error}"),
            GagenError::Collected(errors) => {
                for error in errors {
                    writeln!(f, "{error}")?;
                }
                Ok(())
            }
        }
    }
}

impl GagenError {
    pub fn message(&self) -> String {
        match self {
            GagenError::User(error) => error.message.to_string(),
            GagenError::Collected(errors) => errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl Error for GagenError {}
