mod runner;

pub use runner::{MaintenanceReport, MaintenanceScheduler, SchedulerConfig};
