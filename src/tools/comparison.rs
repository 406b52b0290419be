use chrono_tz::Tz;
use tracing::{info, warn};

use super::{
    eco_driving::{self, ViolationRecord},
    fleet_report::{load_report, ReportKind, ReportLoadError, ReportSource, SubReport},
};
use crate::period::Period;

/// Fetches and aggregates the eco-driving report for the calendar month
/// before `period`. Any failure is returned as [`SubReport::Unavailable`].
pub fn compare_to_previous_month<S: ReportSource + ?Sized>(
    source: &S,
    group_id: u64,
    period: &Period,
    tz: &Tz,
) -> SubReport<eco_driving::ViolationPivot> {
    let previous = period.previous_month();
    info!("fetching previous month ({}) for comparison", previous.describe());
    let result = load_report(source, ReportKind::EcoDriving, group_id, previous.interval(tz))
        .and_then(|table| ViolationRecord::from_table(&table).map_err(ReportLoadError::from));
    match result {
        Ok(records) => SubReport::Ready(eco_driving::aggregate(&records)),
        Err(e) => {
            warn!("previous month comparison unavailable: {}", e);
            SubReport::Unavailable(e.to_string())
        }
    }
}
