//! Tracing and logging setup shared by ledger binaries and harnesses.

/// Initialize process-wide tracing/logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Human-readable logs routed through the test writer.
pub fn init_for_tests() {
    tracing::init_pretty("ledger_infra=debug,ledger_accounts=debug");
}

/// Tracing configuration (filters, layers).
pub mod tracing;
