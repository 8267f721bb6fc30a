use std::ops::{BitOr, BitOrAssign};

/// The retry verdict of a pipeline stage.
///
/// Every stage (fetch chunk, daily merge, monthly roll-up, ...) hands one of
/// these back to the orchestrator, which folds them together with `|` and
/// decides whether another global pass is needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryOutcome {
    retry: bool,
    auth_failed: bool,
}

impl RetryOutcome {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn retry() -> Self {
        Self {
            retry: true,
            auth_failed: false,
        }
    }

    /// Authentication was refused. Implies a retry of the whole run.
    pub fn auth_failed() -> Self {
        Self {
            retry: true,
            auth_failed: true,
        }
    }

    pub fn needs_retry(&self) -> bool {
        self.retry
    }

    pub fn is_auth_failure(&self) -> bool {
        self.auth_failed
    }

    pub fn is_clean(&self) -> bool {
        !self.retry && !self.auth_failed
    }
}

impl BitOr for RetryOutcome {
    type Output = RetryOutcome;

    fn bitor(self, rhs: Self) -> Self::Output {
        RetryOutcome {
            retry: self.retry || rhs.retry,
            auth_failed: self.auth_failed || rhs.auth_failed,
        }
    }
}

impl BitOrAssign for RetryOutcome {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}
