//! # Transaction Module
//!
//! Bookkeeping for a connection's logical transaction: nesting depth plus the
//! after-commit and after-rollback callback queues.
//!
//! Nesting is logical only. Only the outermost `begin_transaction` issues
//! `BEGIN`, only the outermost `commit`/`roll_back` touches the database and
//! fires a queue. A rollback at an inner level marks the whole unit as
//! rollback-only, so the outer `commit` rolls back instead of persisting a
//! partial unit of work.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! conn.begin_transaction().await?;
//! conn.table("users").insert(row).await?;
//! conn.after_commit(|| {
//!     log::info!("user created");
//!     Ok(())
//! })?;
//! conn.commit().await?;
//! ```

use std::fmt;

use crate::Error;

/// A zero-argument callback run once after the outermost commit or rollback.
pub type TransactionCallback = Box<dyn FnOnce() -> Result<(), Error> + Send>;

// ============================================================================
// Transaction State
// ============================================================================

#[derive(Default)]
pub struct TransactionState {
    depth: u32,
    rollback_only: bool,
    after_commit: Vec<TransactionCallback>,
    after_rollback: Vec<TransactionCallback>,
}

impl fmt::Debug for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionState")
            .field("depth", &self.depth)
            .field("rollback_only", &self.rollback_only)
            .field("after_commit", &self.after_commit.len())
            .field("after_rollback", &self.after_rollback.len())
            .finish()
    }
}

impl TransactionState {
    pub fn level(&self) -> u32 {
        self.depth
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub(crate) fn enter(&mut self) {
        self.depth += 1;
    }

    /// Leaves one nesting level; errors at depth 0.
    pub(crate) fn leave(&mut self, action: &str) -> Result<u32, Error> {
        if self.depth == 0 {
            return Err(Error::Transaction(format!("cannot {}: no active transaction", action)));
        }
        self.depth -= 1;
        Ok(self.depth)
    }

    pub(crate) fn mark_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    pub fn queue_after_commit(&mut self, callback: TransactionCallback) -> Result<(), Error> {
        if !self.is_active() {
            return Err(Error::transaction("after_commit requires an active transaction"));
        }
        self.after_commit.push(callback);
        Ok(())
    }

    pub fn queue_after_rollback(&mut self, callback: TransactionCallback) -> Result<(), Error> {
        if !self.is_active() {
            return Err(Error::transaction("after_rollback requires an active transaction"));
        }
        self.after_rollback.push(callback);
        Ok(())
    }

    /// Ends the unit of work as committed: returns the commit queue and drops
    /// the rollback queue.
    pub(crate) fn finish_committed(&mut self) -> Vec<TransactionCallback> {
        self.depth = 0;
        self.rollback_only = false;
        self.after_rollback.clear();
        std::mem::take(&mut self.after_commit)
    }

    /// Ends the unit of work as rolled back: returns the rollback queue and
    /// drops the commit queue.
    pub(crate) fn finish_rolled_back(&mut self) -> Vec<TransactionCallback> {
        self.depth = 0;
        self.rollback_only = false;
        self.after_commit.clear();
        std::mem::take(&mut self.after_rollback)
    }

    /// Forgets everything without firing callbacks (disconnect).
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Runs every callback in order. The first failure is returned after the
/// whole queue ran; later failures are only logged.
pub(crate) fn run_callbacks(callbacks: Vec<TransactionCallback>, stage: &str) -> Result<(), Error> {
    let mut first_error = None;

    for callback in callbacks {
        if let Err(e) = callback() {
            log::error!("{} callback failed: {}", stage, e);
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(Error::TransactionCallback(Box::new(e))),
        None => Ok(()),
    }
}
