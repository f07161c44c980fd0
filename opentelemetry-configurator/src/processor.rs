//! Batch tuning shared by the span and log processors.

use std::time::Duration;

use opentelemetry::otel_warn;

use crate::env::get_env_long;

/// Delay between two consecutive span exports, in milliseconds.
pub const OTEL_BSP_SCHEDULE_DELAY: &str = "OTEL_BSP_SCHEDULE_DELAY";
/// Maximum number of spans buffered before new ones are dropped.
pub const OTEL_BSP_MAX_QUEUE_SIZE: &str = "OTEL_BSP_MAX_QUEUE_SIZE";
/// Maximum number of spans in one export. Must not exceed the queue size.
pub const OTEL_BSP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BSP_MAX_EXPORT_BATCH_SIZE";

/// Delay between two consecutive log exports, in milliseconds.
pub const OTEL_BLRP_SCHEDULE_DELAY: &str = "OTEL_BLRP_SCHEDULE_DELAY";
/// Maximum number of log records buffered before new ones are dropped.
pub const OTEL_BLRP_MAX_QUEUE_SIZE: &str = "OTEL_BLRP_MAX_QUEUE_SIZE";
/// Maximum number of log records in one export. Must not exceed the queue size.
pub const OTEL_BLRP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BLRP_MAX_EXPORT_BATCH_SIZE";

/// Default schedule delay, in milliseconds.
pub const SCHEDULE_DELAY_DEFAULT: u64 = 5_000;
/// Default queue size.
pub const MAX_QUEUE_SIZE_DEFAULT: u64 = 2_048;
/// Default export batch size.
pub const MAX_EXPORT_BATCH_SIZE_DEFAULT: u64 = 512;

/// Names of the variables tuning one batch processor.
#[derive(Debug, Clone, Copy)]
pub struct BatchEnvVars {
    pub schedule_delay: &'static str,
    pub max_queue_size: &'static str,
    pub max_export_batch_size: &'static str,
}

/// Variables for the batch span processor.
pub const SPAN_BATCH_ENV_VARS: BatchEnvVars = BatchEnvVars {
    schedule_delay: OTEL_BSP_SCHEDULE_DELAY,
    max_queue_size: OTEL_BSP_MAX_QUEUE_SIZE,
    max_export_batch_size: OTEL_BSP_MAX_EXPORT_BATCH_SIZE,
};

/// Variables for the batch log record processor.
pub const LOG_BATCH_ENV_VARS: BatchEnvVars = BatchEnvVars {
    schedule_delay: OTEL_BLRP_SCHEDULE_DELAY,
    max_queue_size: OTEL_BLRP_MAX_QUEUE_SIZE,
    max_export_batch_size: OTEL_BLRP_MAX_EXPORT_BATCH_SIZE,
};

/// Tuning applied to every batch processor of one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub scheduled_delay: Duration,
    pub max_queue_size: usize,
    pub max_export_batch_size: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            scheduled_delay: Duration::from_millis(SCHEDULE_DELAY_DEFAULT),
            max_queue_size: MAX_QUEUE_SIZE_DEFAULT as usize,
            max_export_batch_size: MAX_EXPORT_BATCH_SIZE_DEFAULT as usize,
        }
    }
}

impl BatchOptions {
    /// Reads the options from the environment. A batch size larger than the
    /// queue is lowered to the queue size.
    pub fn from_env(vars: BatchEnvVars) -> Self {
        let scheduled_delay = get_env_long(vars.schedule_delay, SCHEDULE_DELAY_DEFAULT);
        let max_queue_size = get_env_long(vars.max_queue_size, MAX_QUEUE_SIZE_DEFAULT);
        let mut max_export_batch_size =
            get_env_long(vars.max_export_batch_size, MAX_EXPORT_BATCH_SIZE_DEFAULT);

        if max_export_batch_size > max_queue_size {
            otel_warn!(
                name: "BatchOptions.BatchSizeClamped",
                env_var = vars.max_export_batch_size,
                max_queue_size = max_queue_size,
                message = "Export batch size is greater than the queue size, using the queue size as the batch size"
            );
            max_export_batch_size = max_queue_size;
        }

        BatchOptions {
            scheduled_delay: Duration::from_millis(scheduled_delay),
            max_queue_size: to_usize(max_queue_size),
            max_export_batch_size: to_usize(max_export_batch_size),
        }
    }
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
