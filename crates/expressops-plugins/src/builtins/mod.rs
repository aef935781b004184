pub mod disk_cleaner;
pub mod flow_lister;
pub mod health_alert_formatter;
pub mod health_check;
pub mod kube_health;
pub mod log_cleaner;
pub mod log_file_creator;
pub mod slack;

pub use disk_cleaner::DiskCleanerPlugin;
pub use flow_lister::FlowListerPlugin;
pub use health_alert_formatter::HealthAlertFormatterPlugin;
pub use health_check::HealthCheckPlugin;
pub use kube_health::KubeHealthPlugin;
pub use log_cleaner::LogCleanerPlugin;
pub use log_file_creator::LogFileCreatorPlugin;
pub use slack::SlackPlugin;
