//! Assembles the monthly fleet report for one vehicle group: utilization from
//! the trips report, violation counts and scores from the eco-driving report,
//! and a comparison with the previous month.

use std::fmt::Display;

use chrono_tz::Tz;
use csv as csv_crate;
use thiserror::Error;
use tracing::{info, warn};

use super::{
    comparison,
    eco_driving::{self, ViolationPivot, ViolationRecord},
    scoring::ScoreTable,
    utilization::{self, TripRecord, Utilization},
};
use crate::{
    apis::telematics::FetchError,
    groups::VehicleGroup,
    period::Period,
    table::{self, Table, TableError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Trips,
    EcoDriving,
}

impl Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ReportKind::Trips => "trips",
            ReportKind::EcoDriving => "eco-driving",
        })
    }
}

/// Something that can run a report for a vehicle group and hand back the
/// exported workbook.
pub trait ReportSource {
    fn fetch(&self, kind: ReportKind, group_id: u64, interval: (i64, i64)) -> Result<Vec<u8>, FetchError>;

    /// The sheet of the exported workbook that holds the report rows.
    fn sheet_name(&self, kind: ReportKind) -> &str;
}

/// The outcome of a part of the report that is allowed to fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SubReport<T> {
    Ready(T),
    Unavailable(String),
}

impl<T> SubReport<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            SubReport::Ready(value) => Some(value),
            SubReport::Unavailable(_) => None,
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            SubReport::Ready(_) => None,
            SubReport::Unavailable(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportLoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Error)]
pub enum FleetReportError {
    #[error("eco-driving report for {group} could not be loaded: {source}")]
    EcoDriving {
        group: String,
        #[source]
        source: ReportLoadError,
    },
}

/// Fetches one report and loads its sheet.
pub fn load_report<S: ReportSource + ?Sized>(
    source: &S,
    kind: ReportKind,
    group_id: u64,
    interval: (i64, i64),
) -> Result<Table, ReportLoadError> {
    let bytes = source.fetch(kind, group_id, interval)?;
    Ok(table::load_sheet(&bytes, source.sheet_name(kind))?)
}

#[derive(Debug, Clone)]
pub struct FleetReport {
    pub group: VehicleGroup,
    pub period: Period,
    /// Trip detail rows. Unavailable when the trips report could not be
    /// loaded, in which case `utilization` is empty.
    pub trips: SubReport<Table>,
    pub utilization: Utilization,
    /// Eco-driving rows without the no-violation rows.
    pub eco_driving: Table,
    pub violations: ViolationPivot,
    pub scores: ScoreTable,
    pub previous_period: Period,
    pub previous: SubReport<ViolationPivot>,
}

impl FleetReport {
    /// Human readable notes about the parts of the report that are missing.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(reason) = self.trips.unavailable_reason() {
            warnings.push(format!("Trips report could not be fetched: {reason}"));
        }
        if let Some(reason) = self.previous.unavailable_reason() {
            warnings.push(format!(
                "Could not fetch previous month data ({reason}). Proceeding without comparison."
            ));
        }
        warnings
    }
}

/// Runs the whole pipeline for one group and period. Only a failure of the
/// current month's eco-driving report is an error; the trips report and the
/// previous month degrade to [`SubReport::Unavailable`].
pub fn build_fleet_report<S: ReportSource + ?Sized>(
    source: &S,
    group: &VehicleGroup,
    period: Period,
    tz: &Tz,
) -> Result<FleetReport, FleetReportError> {
    info!("building report for {} ({}) over {}", group.name, group.id, period.describe());
    let interval = period.interval(tz);

    let trips = load_report(source, ReportKind::Trips, group.id, interval)
        .and_then(|table| TripRecord::from_table(&table).map_err(ReportLoadError::from));
    let (trips, utilization) = match trips {
        Ok(records) => {
            let trips = utilization::filter_trips(&records, &period, tz);
            info!("{} of {} trip rows are complete trips in the period", trips.len(), records.len());
            let utilization = Utilization::from_trips(&trips, &period);
            (SubReport::Ready(utilization::trip_detail_table(&trips)), utilization)
        }
        Err(e) => {
            warn!("trips report unavailable, continuing without utilization: {}", e);
            (SubReport::Unavailable(e.to_string()), Utilization::empty(&period))
        }
    };

    let eco_error = |source: ReportLoadError| FleetReportError::EcoDriving { group: group.name.clone(), source };
    let eco_table = load_report(source, ReportKind::EcoDriving, group.id, interval).map_err(eco_error)?;
    let records = ViolationRecord::from_table(&eco_table).map_err(|e| eco_error(e.into()))?;
    let violations = eco_driving::aggregate(&records);
    info!(
        "{} violations across {} vehicles and {} violation types",
        records.len(),
        violations.rows.len(),
        violations.violation_types.len()
    );

    let mut scores = ScoreTable::merge(&utilization, &violations);
    let previous = comparison::compare_to_previous_month(source, group.id, &period, tz);
    if let Some(previous) = previous.ready() {
        scores = scores.with_previous(previous);
    }

    Ok(FleetReport {
        group: group.clone(),
        period,
        trips,
        utilization,
        eco_driving: eco_driving::detail_table(&eco_table),
        violations,
        scores,
        previous_period: period.previous_month(),
        previous,
    })
}

pub mod output {
    use std::io::Write;

    use super::{csv_crate, FleetReport};

    pub mod xlsx;

    /// File name offered for the exported workbook.
    pub fn report_file_name(group: &str) -> String {
        let group: String =
            group.chars().map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c }).collect();
        format!("{group}_Report.xlsx")
    }

    pub mod human {
        use super::*;
        use crate::tools::scoring::{ScoreTier, COLUMN_ADVANCED_SCORE};

        pub fn print_report<W>(report: &FleetReport, out: &mut W) -> std::io::Result<()>
        where
            W: Write,
        {
            writeln!(out, "Fleet report for {} ({}) ================", report.group.name, report.period.describe())?;
            for warning in report.warnings() {
                writeln!(out, "WARNING: {warning}")?;
            }

            writeln!(out)?;
            writeln!(out, "Utilization: ================")?;
            let utilization = &report.utilization;
            match (utilization.least_utilized(), utilization.most_utilized(), utilization.average_distance()) {
                (Some(least), Some(most), Some(average)) => {
                    writeln!(out, "Least utilized: {} with {:.2} KM", least.vehicle, least.total_distance)?;
                    writeln!(out, "Most utilized: {} with {:.2} KM", most.vehicle, most.total_distance)?;
                    writeln!(out, "Average distance per vehicle: {:.1} KM", average)?;
                    for row in &utilization.rows {
                        writeln!(
                            out,
                            "{:30}    Weekday {:>9.2} | Weekend {:>9.2} | Total {:>9.2} | Active days {:2}",
                            row.vehicle,
                            row.weekday_distance,
                            row.weekend_distance,
                            row.total_distance,
                            row.days_with_trips,
                        )?;
                    }
                }
                _ => writeln!(out, "No trip data for this period")?,
            }

            writeln!(out)?;
            writeln!(out, "Scoring: ================")?;
            let counts = report.scores.tier_counts();
            for tier in ScoreTier::ALL {
                writeln!(
                    out,
                    "{:40} {:3} vehicles ({:.2}%)",
                    tier.heading(),
                    counts.get(tier),
                    counts.percentage(tier)
                )?;
            }
            for row in &report.scores.rows {
                write!(out, "{:30}    {} {:4}", row.vehicle, COLUMN_ADVANCED_SCORE, row.advanced_score)?;
                if let Some(previous) = row.previous {
                    write!(out, " | Previous {:4} | Change {:+}", previous.advanced_score, previous.change)?;
                }
                writeln!(out)?;
            }

            writeln!(out)?;
            writeln!(out, "Top Violators: ================")?;
            for violation_type in &report.scores.violation_types {
                writeln!(out, "{}", report.scores.top_violators_line(violation_type))?;
            }
            Ok(())
        }
    }

    pub mod csv {
        use super::*;

        /// Writes the scoring table, one row per vehicle.
        pub fn print_scores<W>(report: &FleetReport, out: W) -> std::io::Result<()>
        where
            W: Write,
        {
            let scores = &report.scores;
            let mut writer = csv_crate::Writer::from_writer(out);
            writer.write_record(scores.column_names())?;
            for row in &scores.rows {
                let mut record = vec![row.vehicle.clone(), row.total_distance.to_string()];
                record.extend(row.counts.iter().map(u32::to_string));
                record.push(row.advanced_score.to_string());
                if let Some(previous) = row.previous {
                    record.push(previous.advanced_score.to_string());
                    record.push(previous.change.to_string());
                }
                writer.write_record(&record)?;
            }
            writer.flush()?;
            Ok(())
        }

    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::tools::fleet_report::testing::sample_report;

        #[test]
        fn file_name_is_safe() {
            assert_eq!(report_file_name("Agility"), "Agility_Report.xlsx");
            assert_eq!(report_file_name("North/East"), "North_East_Report.xlsx");
        }

        #[test]
        fn human_report_mentions_every_vehicle() {
            let report = sample_report();
            let mut out = Vec::new();
            human::print_report(&report, &mut out).unwrap();
            let text = String::from_utf8(out).unwrap();
            for row in &report.scores.rows {
                assert!(text.contains(&row.vehicle), "{} missing", row.vehicle);
            }
            assert!(text.contains("Top Violators"));
        }
    }
}


#[cfg(test)]
mod tests {
    use super::{testing::*, *};

    #[test]
    fn builds_full_report() {
        let report = sample_report();
        assert!(report.warnings().is_empty());

        let vehicles: Vec<_> = report.utilization.rows.iter().map(|r| r.vehicle.as_str()).collect();
        assert_eq!(vehicles, vec!["KDA 001", "KDA 002"]);
        assert_eq!(report.utilization.rows[1].weekend_distance, 150.25);
        assert_eq!(report.trips.ready().map(Table::len), Some(2));
        assert_eq!(report.eco_driving.len(), 3);

        let scores = &report.scores;
        assert_eq!(scores.rows.len(), 3);
        let kda001 = &scores.rows[0];
        assert_eq!(kda001.total_distance, 42.5);
        assert_eq!(kda001.advanced_score, 1);
        assert_eq!(kda001.previous.map(|p| p.change), Some(-1));
        let kda003 = &scores.rows[2];
        assert_eq!(kda003.total_distance, 0.0);
        assert_eq!(kda003.previous.map(|p| p.advanced_score), Some(0));
    }

    #[test]
    fn previous_month_uses_calendar_bounds() {
        let source = full_source();
        build_fleet_report(&source, &group(), march(), &chrono_tz::Africa::Nairobi).unwrap();
        let tz = chrono_tz::Africa::Nairobi;
        let february = Period::new(
            chrono::NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        )
        .unwrap();
        let requests = source.requests.borrow();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2], (ReportKind::EcoDriving, 28475360, february.interval(&tz)));
    }

    #[test]
    fn trips_failure_degrades_to_empty_utilization() {
        let mut source = full_source();
        source.workbooks.retain(|(kind, _), _| *kind != ReportKind::Trips);
        let report = build_fleet_report(&source, &group(), march(), &chrono_tz::Africa::Nairobi).unwrap();
        assert!(report.trips.unavailable_reason().is_some());
        assert!(report.utilization.is_empty());
        assert_eq!(report.utilization.days.len(), 31);
        assert_eq!(report.scores.rows.len(), 3);
        assert!(report.scores.rows.iter().all(|row| row.total_distance == 0.0));
        assert_eq!(report.warnings().len(), 1);
    }

    #[test]
    fn eco_driving_failure_is_fatal() {
        let tz = chrono_tz::Africa::Nairobi;
        let mut source = full_source();
        source.workbooks.remove(&(ReportKind::EcoDriving, march().interval(&tz).0));
        let err = build_fleet_report(&source, &group(), march(), &tz).unwrap_err();
        assert!(matches!(
            err,
            FleetReportError::EcoDriving { source: ReportLoadError::Fetch(FetchError::Timeout { .. }), .. }
        ));
    }

    #[test]
    fn wrong_sheet_in_eco_workbook_is_fatal() {
        let tz = chrono_tz::Africa::Nairobi;
        let mut source = full_source();
        source.workbooks.insert(
            (ReportKind::EcoDriving, march().interval(&tz).0),
            workbook("Statistics", &["Grouping"], &[]),
        );
        let err = build_fleet_report(&source, &group(), march(), &tz).unwrap_err();
        assert!(matches!(
            err,
            FleetReportError::EcoDriving { source: ReportLoadError::Table(TableError::SheetNotFound { .. }), .. }
        ));
    }

    #[test]
    fn missing_previous_month_drops_comparison_only() {
        let tz = chrono_tz::Africa::Nairobi;
        let mut source = full_source();
        source.workbooks.remove(&(ReportKind::EcoDriving, march().previous_month().interval(&tz).0));
        let report = build_fleet_report(&source, &group(), march(), &tz).unwrap();
        assert!(report.previous.unavailable_reason().is_some());
        assert!(!report.scores.has_previous);
        assert!(report.scores.rows.iter().all(|row| row.previous.is_none()));
        assert_eq!(report.warnings().len(), 1);
    }
}
