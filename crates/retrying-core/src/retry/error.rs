//! Error types for the retry execution engine
//!
//! This module defines the failure of a single attempt, the composite report
//! built when every attempt fails, configuration errors collected before a
//! run, and the terminal [`RunOutcome`] of a run.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Boxed error returned by operations
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// A configuration mistake detected before any attempt is made
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Trace buffer size is zero or negative
    #[error("stack size must be positive integer")]
    StackSizeNotPositive,

    /// Attempt count is zero or negative
    #[error("max attempt times must be positive integer")]
    MaxAttemptsNotPositive,

    /// Overall deadline is zero or negative
    #[error("max delay must be positive duration")]
    MaxDelayNotPositive,

    /// Fixed wait is zero or negative
    #[error("wait fixed must be positive duration")]
    WaitFixedNotPositive,

    /// A random wait bound is negative
    #[error("wait random min/max must be non-negative duration")]
    WaitRandomNegative,

    /// The random wait range is empty or inverted
    #[error("wait random min must be smaller than max")]
    WaitRandomInverted,

    /// No operation was bound before running
    #[error("no function is specified")]
    NoFunctionSpecified,
}

/// Display prefix of a panicked attempt
pub(crate) const PANICKED: &str = "panicked: ";

/// Why a single attempt failed
#[derive(Error, Debug)]
pub enum AttemptFailure {
    /// The operation returned an error
    #[error("{0}")]
    Returned(BoxError),

    /// The operation panicked; the panic was caught at the wrapper boundary
    #[error("{}{payload}\n{trace}", PANICKED)]
    Panicked {
        /// Panic message (or a placeholder for non-string payloads)
        payload: String,
        /// Trace captured at the panic site, bounded by the configured size
        trace: String,
    },
}

impl AttemptFailure {
    /// Check if the attempt ended in a panic
    pub fn is_panic(&self) -> bool {
        matches!(self, AttemptFailure::Panicked { .. })
    }
}

/// The failure of one numbered attempt
#[derive(Debug)]
pub struct AttemptError {
    /// Attempt number (1-indexed)
    pub attempt: u32,
    /// What went wrong
    pub failure: AttemptFailure,
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt {} failed with {}", self.attempt, self.failure)
    }
}

impl Error for AttemptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.failure)
    }
}

/// Every attempt failure of a run, in attempt order
#[derive(Debug, Default)]
pub struct AttemptErrors {
    errors: Vec<AttemptError>,
}

impl AttemptErrors {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the failure of `attempt`
    pub fn push(&mut self, attempt: u32, failure: AttemptFailure) {
        self.errors.push(AttemptError { attempt, failure });
    }

    /// Number of recorded failures
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Check if no failure was recorded
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate over the failures in attempt order
    pub fn iter(&self) -> std::slice::Iter<'_, AttemptError> {
        self.errors.iter()
    }

    /// The failure of the final attempt
    pub fn last(&self) -> Option<&AttemptError> {
        self.errors.last()
    }

    /// Consume the report, returning the failures in attempt order
    pub fn into_vec(self) -> Vec<AttemptError> {
        self.errors
    }
}

impl fmt::Display for AttemptErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => return write!(f, "no attempts were made"),
            1 => write!(f, "1 attempt failed: ")?,
            n => write!(f, "{} attempts failed: ", n)?,
        }
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl Error for AttemptErrors {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.errors.last().map(|e| e as &(dyn Error + 'static))
    }
}

impl<'a> IntoIterator for &'a AttemptErrors {
    type Item = &'a AttemptError;
    type IntoIter = std::slice::Iter<'a, AttemptError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

/// Terminal error of a run
#[derive(Error, Debug)]
pub enum RetryError {
    /// Configuration was invalid; the operation was never invoked
    #[error("invalid retry configuration: {}", join_config_errors(.0))]
    InvalidConfig(Vec<ConfigError>),

    /// Every attempt failed
    #[error(transparent)]
    Exhausted(AttemptErrors),

    /// The overall deadline elapsed before a success was observed
    #[error("timeout error: no success within {}ms", .after.as_millis())]
    TimedOut {
        /// The configured deadline
        after: Duration,
    },
}

fn join_config_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl RetryError {
    /// Check if all attempts were exhausted
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted(_))
    }

    /// Check if the overall deadline elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::TimedOut { .. })
    }

    /// Check if the configuration was rejected
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, RetryError::InvalidConfig(_))
    }

    /// Number of failed attempts carried by this error
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::Exhausted(errors) => errors.len(),
            _ => 0,
        }
    }

    /// Configuration errors, if the run was rejected before starting
    pub fn config_errors(&self) -> &[ConfigError] {
        match self {
            RetryError::InvalidConfig(errors) => errors,
            _ => &[],
        }
    }

    /// Per-attempt failures, if all attempts were exhausted
    pub fn failures(&self) -> Option<&AttemptErrors> {
        match self {
            RetryError::Exhausted(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Terminal outcome of [`RetryExecutor::run`](super::RetryExecutor::run)
#[derive(Debug)]
pub enum RunOutcome {
    /// An attempt succeeded
    Success {
        /// Number of invocations made, including the successful one
        attempts: u32,
    },

    /// The attempt budget was consumed without success
    Exhausted(AttemptErrors),

    /// The overall deadline elapsed first; partial failures are discarded
    TimedOut {
        /// The configured deadline
        after: Duration,
    },

    /// Configuration errors were found; nothing was invoked
    Invalid(Vec<ConfigError>),
}

impl RunOutcome {
    /// Check if the run succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    /// Collapse the outcome into the caller-facing error-or-nothing value
    pub fn into_result(self) -> Result<(), RetryError> {
        match self {
            RunOutcome::Success { .. } => Ok(()),
            RunOutcome::Exhausted(errors) => Err(RetryError::Exhausted(errors)),
            RunOutcome::TimedOut { after } => Err(RetryError::TimedOut { after }),
            RunOutcome::Invalid(errors) => Err(RetryError::InvalidConfig(errors)),
        }
    }
}
