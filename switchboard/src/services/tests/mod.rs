//! Tests for service implementations
//!
//! These verify the ledger's durable-record semantics: idempotent writes,
//! terminal-state guards, aggregate correctness, and alert deduplication.
