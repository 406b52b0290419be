pub mod comparison;
pub mod eco_driving;
pub mod fleet_report;
pub mod scoring;
pub mod utilization;
