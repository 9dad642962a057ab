//! Structured GC events plus free-text logging.
//!
//! Free-text operational logging (safepoint entry, heap growth, allocator
//! fallback) goes through the `log` facade directly - `log::debug!`,
//! `log::warn!`, and so on - so a host picks its own backend. Collection
//! cycles are frequent and numeric enough that callers usually want to plot
//! them rather than grep them, so those specifically are also emitted as
//! structured [`GcEvent`]s through a small observer ([`GcLogger`]) a host
//! can subscribe to without adopting any particular logging crate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::Instant;

/// Minimum severity of a [`GcEvent`], for filtering in [`GcLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// A single collector lifecycle event.
#[derive(Debug, Clone)]
pub enum GcEvent {
    /// A cycle has begun: world is about to stop for the root snapshot.
    CycleStart {
        generation: String,
        reason: String,
        cycle: u64,
    },

    /// Marking finished; `marked_count` cells are reachable.
    MarkStats { marked_count: u64 },

    /// A cycle has completed and the world has resumed.
    CycleEnd {
        cycle: u64,
        duration_ms: f64,
        freed_cells: usize,
    },

    /// Heap occupancy snapshot, reported periodically by a host.
    HeapStats {
        used_cells: usize,
        total_cells: usize,
        utilization: f64,
    },

    /// Allocation failed even after a retry through the GC trigger.
    AllocationFailure { heap_used: usize, heap_max: usize },
}

impl GcEvent {
    fn level(&self) -> LogLevel {
        match self {
            GcEvent::AllocationFailure { .. } => LogLevel::Error,
            GcEvent::CycleStart { .. } | GcEvent::CycleEnd { .. } | GcEvent::HeapStats { .. } => {
                LogLevel::Info
            }
            GcEvent::MarkStats { .. } => LogLevel::Debug,
        }
    }
}

/// Configuration for a [`GcLogger`].
#[derive(Debug, Clone)]
pub struct GcLoggerConfig {
    pub level: LogLevel,
    /// Emit each accepted event through the `log` facade in addition to
    /// recording it for [`GcLogger::events`].
    pub forward_to_log: bool,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        GcLoggerConfig {
            level: LogLevel::Info,
            forward_to_log: true,
        }
    }
}

/// Records [`GcEvent`]s a host can poll, in addition to (optionally)
/// forwarding them through the `log` facade.
pub struct GcLogger {
    config: GcLoggerConfig,
    events: Mutex<Vec<(Instant, GcEvent)>>,
    enabled: AtomicBool,
}

impl GcLogger {
    pub fn new(config: GcLoggerConfig) -> Self {
        GcLogger {
            config,
            events: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn log(&self, event: GcEvent) {
        if !self.is_enabled() || event.level() > self.config.level {
            return;
        }

        if self.config.forward_to_log {
            match &event {
                GcEvent::CycleStart { generation, reason, cycle } => {
                    log::info!("gc cycle {cycle} starting ({generation}, {reason})");
                }
                GcEvent::CycleEnd { cycle, duration_ms, freed_cells } => {
                    log::info!("gc cycle {cycle} done in {duration_ms:.2}ms, freed {freed_cells} cells");
                }
                GcEvent::MarkStats { marked_count } => {
                    log::debug!("gc marked {marked_count} cells live");
                }
                GcEvent::HeapStats { used_cells, total_cells, utilization } => {
                    log::info!("gc heap {used_cells}/{total_cells} cells ({:.1}%)", utilization * 100.0);
                }
                GcEvent::AllocationFailure { heap_used, heap_max } => {
                    log::error!("gc allocation failed: heap at {heap_used} of {heap_max} bytes");
                }
            }
        }

        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((Instant::now(), event));
    }

    pub fn events(&self) -> Vec<(Instant, GcEvent)> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        GcLogger::new(GcLoggerConfig::default())
    }
}

static GLOBAL_LOGGER: LazyLock<Mutex<GcLogger>> = LazyLock::new(|| Mutex::new(GcLogger::default()));

/// Log an event to the process-wide logger, shared by every
/// [`crate::gc::GarbageCollector`] in this process.
pub fn log_event(event: GcEvent) {
    GLOBAL_LOGGER
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .log(event);
}

pub fn configure_logger(config: GcLoggerConfig) {
    *GLOBAL_LOGGER.lock().unwrap_or_else(|e| e.into_inner()) = GcLogger::new(config);
}

pub fn global_event_count() -> usize {
    GLOBAL_LOGGER
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .event_count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logger_records_accepted_events() {
        let logger = GcLogger::default();
        logger.log(GcEvent::CycleStart {
            generation: "Young".into(),
            reason: "explicit".into(),
            cycle: 1,
        });
        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn disabled_logger_drops_events() {
        let logger = GcLogger::default();
        logger.disable();
        logger.log(GcEvent::MarkStats { marked_count: 3 });
        assert_eq!(logger.event_count(), 0);
    }

    #[test]
    fn level_filter_drops_below_threshold() {
        let logger = GcLogger::new(GcLoggerConfig {
            level: LogLevel::Info,
            forward_to_log: false,
        });
        logger.log(GcEvent::MarkStats { marked_count: 1 });
        assert_eq!(logger.event_count(), 0);
    }
}
