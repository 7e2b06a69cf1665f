//! Logging and observability
//!
//! Structured logging built on `tracing`: a console layer for operators and
//! an optional JSON file layer with rotation.
//!
//! # Example
//!
//! ```no_run
//! use edi::logging::init_logging;
//! use edi::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(gateway = "partner", "Transfer started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a gateway transfer
///
/// # Example
///
/// ```no_run
/// use edi::log_transfer_start;
///
/// log_transfer_start!("partner", "TRANSFER/00001");
/// ```
#[macro_export]
macro_rules! log_transfer_start {
    ($gateway:expr, $transfer:expr) => {
        tracing::info!(
            gateway = %$gateway,
            transfer = %$transfer,
            "Starting transfer"
        );
    };
}

/// Log the completion of a gateway transfer
///
/// # Example
///
/// ```no_run
/// use edi::log_transfer_complete;
/// use std::time::Duration;
///
/// log_transfer_complete!("partner", 3, 0, Duration::from_millis(120));
/// ```
#[macro_export]
macro_rules! log_transfer_complete {
    ($gateway:expr, $documents:expr, $issues:expr, $duration:expr) => {
        tracing::info!(
            gateway = %$gateway,
            documents = $documents,
            issues = $issues,
            duration_ms = $duration.as_millis() as u64,
            "Transfer completed"
        );
    };
}

/// Log a document state transition
///
/// ```no_run
/// use edi::log_document_action;
///
/// log_document_action!("FRIENDS/00001", "prepare", "Prepared");
/// ```
#[macro_export]
macro_rules! log_document_action {
    ($document:expr, $action:expr, $state:expr) => {
        tracing::info!(
            document = %$document,
            action = $action,
            state = %$state,
            "Document action"
        );
    };
}

/// Log a batch processing operation
///
/// # Example
///
/// ```no_run
/// use edi::log_batch_processing;
///
/// log_batch_processing!(100, 1000);
/// ```
#[macro_export]
macro_rules! log_batch_processing {
    ($current:expr, $total:expr) => {
        tracing::debug!(
            current = $current,
            total = $total,
            progress_pct = ($current as f64 / ($total as f64).max(1.0) * 100.0),
            "Processing batch"
        );
    };
}
