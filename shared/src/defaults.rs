//! Default values for configuration parameters
//!
//! This module centralizes all default value functions used by the
//! configuration structures. These functions are used by serde when
//! deserializing configuration files that don't specify certain fields.

/// Default worker dispatcher cadence: one queue tick every 5 seconds
pub fn default_dispatch_interval_worker() -> u64 {
    5
}

/// Default host metrics collection cadence (10 seconds)
pub fn default_stats_interval() -> u64 {
    10
}

/// Default manager dispatch cadence: one pending event every 10 seconds
pub fn default_dispatch_interval_manager() -> u64 {
    10
}

/// Default reconcile cadence (15 seconds)
pub fn default_reconcile_interval() -> u64 {
    15
}

/// Default health-check cadence (10 seconds)
pub fn default_health_check_interval() -> u64 {
    10
}

/// Default worker listen address
pub fn default_worker_listen_address() -> String {
    "0.0.0.0:50051".to_string()
}

/// Default manager listen address
pub fn default_manager_listen_address() -> String {
    "0.0.0.0:50050".to_string()
}

/// Default worker name when none is configured
pub fn default_worker_name() -> String {
    "worker".to_string()
}
