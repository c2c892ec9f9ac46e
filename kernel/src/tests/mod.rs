//! Kernel Unit Tests Module
//!
//! Scenarios spanning several process-control modules.
