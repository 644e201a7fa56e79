//! Miscompare accounting.
//!
//! Every reported miscompare lands here. The tracker keeps the monotonic
//! error counter, the match-loop counter, the bounded transaction buffer and
//! the two breaker flags that switch the session into degraded mode once the
//! configured error budget is spent.

use serde::Serialize;

/// Most miscompare records a transaction retains.
///
/// The transaction's total keeps counting past this, only the detail records
/// stop accumulating.
pub const MAX_TRANSACTION_RECORDS: usize = 128;

/// One retained miscompare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MiscompareRecord {
    /// Pin that failed.
    pub pin: String,
    /// Cycle count at the time of the failure.
    pub cycle: u64,
    /// Expected logic level.
    pub expected: u8,
    /// Observed level, `-1` when the net was undefined.
    pub received: i64,
}

/// Detail handed back when a transaction closes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionReport {
    /// Total miscompares seen while the transaction was open.
    pub total: u64,
    /// Retained records, at most [`MAX_TRANSACTION_RECORDS`].
    pub records: Vec<MiscompareRecord>,
}

#[derive(Debug, Default)]
struct Transaction {
    total: u64,
    records: Vec<MiscompareRecord>,
}

/// Counters and breaker state for a session.
#[derive(Debug)]
pub struct ErrorTracker {
    error_count: u64,
    match_errors: u64,
    max_errors: u64,
    max_errors_exceeded: bool,
    exceeded_during_transaction: bool,
    transaction: Option<Transaction>,
    match_loop_open: bool,
}

impl ErrorTracker {
    /// Creates a tracker with the given error budget.
    pub fn new(max_errors: u64) -> Self {
        ErrorTracker {
            error_count: 0,
            match_errors: 0,
            max_errors,
            max_errors_exceeded: false,
            exceeded_during_transaction: false,
            transaction: None,
            match_loop_open: false,
        }
    }

    /// Replaces the error budget.
    ///
    /// Takes effect from the next recorded miscompare; a breaker that has
    /// already tripped stays tripped.
    pub fn set_max_errors(&mut self, limit: u64) {
        self.max_errors = limit;
    }

    /// Records one miscompare.
    pub fn record(&mut self, pin: &str, cycle: u64, expected: u8, received: i64) {
        self.error_count += 1;
        if self.match_loop_open {
            self.match_errors += 1;
        }
        if let Some(txn) = &mut self.transaction {
            txn.total += 1;
            if txn.records.len() < MAX_TRANSACTION_RECORDS {
                txn.records.push(MiscompareRecord {
                    pin: pin.to_string(),
                    cycle,
                    expected,
                    received,
                });
            }
        }
        if self.error_count > self.max_errors && !self.max_errors_exceeded {
            if self.transaction.is_some() {
                self.exceeded_during_transaction = true;
            } else {
                self.max_errors_exceeded = true;
            }
        }
    }

    /// Opens a transaction, discarding any buffer left from an earlier one.
    pub fn start_transaction(&mut self) {
        self.transaction = Some(Transaction::default());
    }

    /// Closes the transaction and returns what it collected.
    ///
    /// An error budget spent while the transaction was open trips the
    /// breaker here, not earlier, so the generator always gets this report
    /// intact. Closing without an open transaction yields an empty report.
    pub fn close_transaction(&mut self) -> TransactionReport {
        let report = match self.transaction.take() {
            Some(txn) => TransactionReport { total: txn.total, records: txn.records },
            None => TransactionReport::default(),
        };
        if self.exceeded_during_transaction {
            self.max_errors_exceeded = true;
        }
        report
    }

    /// Starts match-loop counting from zero.
    pub fn open_match_loop(&mut self) {
        self.match_loop_open = true;
        self.match_errors = 0;
    }

    /// Stops match-loop counting. The count stays readable.
    pub fn close_match_loop(&mut self) {
        self.match_loop_open = false;
    }

    /// Total miscompares recorded over the session.
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Miscompares recorded since the match loop opened.
    pub fn match_errors(&self) -> u64 {
        self.match_errors
    }

    /// Currently configured error budget.
    pub fn max_errors(&self) -> u64 {
        self.max_errors
    }

    /// `true` once the breaker has tripped.
    pub fn is_degraded(&self) -> bool {
        self.max_errors_exceeded
    }

    /// `true` while a transaction is collecting records.
    pub fn transaction_open(&self) -> bool {
        self.transaction.is_some()
    }

    /// `true` while the match loop is counting.
    pub fn match_loop_open(&self) -> bool {
        self.match_loop_open
    }
}
