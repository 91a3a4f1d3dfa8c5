use crate::error::DataError;

/// Lifecycle state of a connection scope.
///
/// `Unopened → Open → InTransaction → Open → ... → Closed`. The physical
/// connection is opened lazily on the first data operation; `Closed` is
/// terminal and reached exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Unopened,
    Open,
    InTransaction,
    Closed,
}

impl std::fmt::Display for ScopeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScopeState::Unopened => "unopened",
            ScopeState::Open => "open",
            ScopeState::InTransaction => "in-transaction",
            ScopeState::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// What a backend must do to complete a close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// The scope was already closed; no physical call may be issued.
    AlreadyClosed,
    /// Release the connection, rolling back a still-active transaction
    /// first when `rollback` is set.
    Release { rollback: bool },
}

/// Result of a non-query statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Generated key of the inserted row, where the driver reports one.
    pub last_insert_id: Option<i64>,
}

/// The pure state machine behind every connection scope.
///
/// Backends own the physical connection; this type owns the legality rules,
/// so success, failure and nested-call paths all converge on the same
/// transitions. A scope instance belongs to exactly one logical unit of
/// work and is never shared across concurrent callers.
#[derive(Debug)]
pub struct ScopeLifecycle {
    state: ScopeState,
}

impl Default for ScopeLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeLifecycle {
    pub fn new() -> Self {
        Self {
            state: ScopeState::Unopened,
        }
    }

    pub fn state(&self) -> ScopeState {
        self.state
    }

    pub fn in_transaction(&self) -> bool {
        self.state == ScopeState::InTransaction
    }

    /// Guard any data operation: a closed scope accepts nothing.
    pub fn ensure_usable(&self, operation: &'static str) -> Result<(), DataError> {
        if self.state == ScopeState::Closed {
            return Err(DataError::Scope {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Record the lazy `Unopened → Open` transition after the physical
    /// connection was established.
    pub fn mark_open(&mut self) {
        if self.state == ScopeState::Unopened {
            self.state = ScopeState::Open;
        }
    }

    /// `begin` is legal from `Unopened` (the connection opens lazily first)
    /// and `Open`; nested transactions are rejected.
    pub fn ensure_can_begin(&self) -> Result<(), DataError> {
        match self.state {
            ScopeState::Unopened | ScopeState::Open => Ok(()),
            ScopeState::InTransaction | ScopeState::Closed => Err(DataError::Scope {
                operation: "begin",
                state: self.state,
            }),
        }
    }

    pub fn on_begin(&mut self) {
        debug_assert_eq!(self.state, ScopeState::Open);
        self.state = ScopeState::InTransaction;
    }

    /// `commit` without an active transaction is a caller bug.
    pub fn ensure_can_commit(&self) -> Result<(), DataError> {
        if self.state != ScopeState::InTransaction {
            return Err(DataError::Scope {
                operation: "commit",
                state: self.state,
            });
        }
        Ok(())
    }

    pub fn on_commit(&mut self) {
        self.state = ScopeState::Open;
    }

    /// A failed commit leaves the scope open with the transaction aborted.
    pub fn on_commit_failed(&mut self) {
        self.state = ScopeState::Open;
    }

    /// Rollback transitions back to `Open` whether or not the physical
    /// rollback succeeded; the transaction is dead either way.
    pub fn on_rollback(&mut self) {
        if self.state == ScopeState::InTransaction {
            self.state = ScopeState::Open;
        }
    }

    /// Transition to `Closed`, reporting what the backend must release.
    /// Idempotent: the second and later calls see `AlreadyClosed`.
    pub fn close(&mut self) -> CloseAction {
        match self.state {
            ScopeState::Closed => CloseAction::AlreadyClosed,
            state => {
                self.state = ScopeState::Closed;
                CloseAction::Release {
                    rollback: state == ScopeState::InTransaction,
                }
            }
        }
    }
}
