//! Daily distance per vehicle, built from the trips report.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike as _, NaiveDate, NaiveDateTime, TimeDelta, Weekday};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::{
    period::{self, Period},
    table::{Cell, Table, TableError},
};

pub const COLUMN_GROUPING: &str = "Grouping";
pub const COLUMN_WEEKDAY_DISTANCE: &str = "Weekday Distance (km)";
pub const COLUMN_WEEKEND_DISTANCE: &str = "Weekend Distance (km)";
pub const COLUMN_TOTAL_DISTANCE: &str = "Total Distance (km)";
pub const COLUMN_DAYS_WITH_TRIPS: &str = "Days With Trips";
pub const COLUMN_DAYS_WITHOUT_TRIPS: &str = "Days Without Trips";

/// One row of the trips sheet as exported. Summary rows are kept here and
/// only dropped by [`filter_trips`].
#[derive(Debug, Clone)]
pub struct TripRecord {
    pub vehicle: String,
    pub beginning: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub initial_location: String,
    pub final_location: String,
    pub mileage: f64,
    pub max_speed: Cell,
    /// 1 for a single trip; group and total rows carry the number of trips
    /// they summarize.
    pub count: Option<f64>,
}

impl TripRecord {
    pub fn from_table(table: &Table) -> Result<Vec<Self>, TableError> {
        let grouping = table.require_column(COLUMN_GROUPING)?;
        let beginning = table.require_column("Beginning")?;
        let end = table.require_column("End")?;
        let mileage = table.require_column("Mileage")?;
        let initial_location = table.column("Initial location");
        let final_location = table.column("Final location");
        let max_speed = table.column("Max speed");
        let count = table.column("Count");

        let text_at = |row: &[Cell], col: Option<usize>| col.map(|c| row[c].as_text()).unwrap_or_default();
        let mut records = Vec::with_capacity(table.len());
        for row in &table.rows {
            let vehicle = row[grouping].as_text();
            if vehicle.is_empty() {
                debug!("skipping trip row without a vehicle");
                continue;
            }
            let Some(distance) = row[mileage].as_f64() else {
                warn!("skipping trip row of {} with unreadable mileage \"{}\"", vehicle, row[mileage]);
                continue;
            };
            records.push(TripRecord {
                vehicle,
                beginning: row[beginning].as_datetime(),
                end: row[end].as_datetime(),
                initial_location: text_at(row, initial_location),
                final_location: text_at(row, final_location),
                mileage: distance,
                max_speed: max_speed.map(|c| row[c].clone()).unwrap_or(Cell::Empty),
                // Without a count column every row is taken to be a single trip.
                count: match count {
                    Some(c) => row[c].as_f64(),
                    None => Some(1.0),
                },
            });
        }
        Ok(records)
    }
}

/// A single trip that falls completely inside the report period.
#[derive(Debug, Clone)]
pub struct Trip {
    pub vehicle: String,
    pub beginning: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub initial_location: String,
    pub final_location: String,
    pub mileage: f64,
    pub max_speed: Cell,
}

impl Trip {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.beginning
    }
}

/// Keeps single trips whose local times resolve unambiguously and that lie
/// entirely within the period.
pub fn filter_trips(records: &[TripRecord], period: &Period, tz: &Tz) -> Vec<Trip> {
    let (from, to) = period.bounds(tz);
    records
        .iter()
        .filter(|record| record.count == Some(1.0))
        .filter_map(|record| {
            let (Some(beginning), Some(end)) = (record.beginning, record.end) else {
                warn!("skipping trip of {} with unreadable start or end time", record.vehicle);
                return None;
            };
            let localize = |naive: NaiveDateTime| {
                let local = period::localize_strict(tz, naive);
                if local.is_none() {
                    warn!(
                        "skipping trip of {} at {}: local time is ambiguous or does not exist",
                        record.vehicle, naive
                    );
                }
                local
            };
            let beginning = localize(beginning)?;
            let end = localize(end)?;
            (beginning >= from && end <= to).then(|| Trip {
                vehicle: record.vehicle.clone(),
                beginning,
                end,
                initial_location: record.initial_location.clone(),
                final_location: record.final_location.clone(),
                mileage: record.mileage,
                max_speed: record.max_speed.clone(),
            })
        })
        .collect()
}

/// The trips detail sheet, one row per trip with its duration.
pub fn trip_detail_table(trips: &[Trip]) -> Table {
    let columns = [
        COLUMN_GROUPING,
        "Beginning",
        "End",
        "Duration",
        "Initial location",
        "Final location",
        "Max speed",
        "Mileage",
    ];
    let mut table = Table::new(columns.iter().map(|c| c.to_string()).collect());
    for trip in trips {
        table.push_row(vec![
            Cell::Text(trip.vehicle.clone()),
            Cell::DateTime(trip.beginning.naive_local()),
            Cell::DateTime(trip.end.naive_local()),
            Cell::Text(format_duration(trip.duration())),
            Cell::Text(trip.initial_location.clone()),
            Cell::Text(trip.final_location.clone()),
            trip.max_speed.clone(),
            Cell::Number(trip.mileage),
        ]);
    }
    table
}

fn format_duration(duration: TimeDelta) -> String {
    let seconds = duration.num_seconds().max(0);
    format!("{}:{:02}:{:02}", seconds / 3600, seconds / 60 % 60, seconds % 60)
}

#[derive(Debug, Clone, PartialEq)]
pub struct UtilizationRow {
    pub vehicle: String,
    /// Distance per day of the period, in period order.
    pub daily: Vec<f64>,
    pub weekday_distance: f64,
    pub weekend_distance: f64,
    pub total_distance: f64,
    pub days_with_trips: usize,
    pub days_without_trips: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utilization {
    pub days: Vec<NaiveDate>,
    /// Sorted by ascending total distance.
    pub rows: Vec<UtilizationRow>,
}

impl Utilization {
    /// A table with all the columns of the period but no vehicles.
    pub fn empty(period: &Period) -> Self {
        Self { days: period.days().collect(), rows: Vec::new() }
    }

    /// Pivots already filtered trips into daily distances per vehicle.
    pub fn from_trips(trips: &[Trip], period: &Period) -> Self {
        let days: Vec<NaiveDate> = period.days().collect();
        let mut per_vehicle: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for trip in trips {
            let day = trip.beginning.date_naive();
            let Some(index) = days.iter().position(|d| *d == day) else {
                continue;
            };
            per_vehicle.entry(&trip.vehicle).or_insert_with(|| vec![0.0; days.len()])[index] +=
                trip.mileage;
        }

        let mut rows: Vec<UtilizationRow> = per_vehicle
            .into_iter()
            .map(|(vehicle, daily)| {
                let daily: Vec<f64> = daily.into_iter().map(round2).collect();
                let (weekday, weekend): (Vec<_>, Vec<_>) =
                    days.iter().zip(&daily).partition(|(day, _)| !is_weekend(**day));
                let weekday_distance = round2(weekday.iter().map(|(_, d)| **d).sum());
                let weekend_distance = round2(weekend.iter().map(|(_, d)| **d).sum());
                let days_with_trips = daily.iter().filter(|d| **d > 0.0).count();
                UtilizationRow {
                    vehicle: vehicle.to_owned(),
                    weekday_distance,
                    weekend_distance,
                    total_distance: round2(weekday_distance + weekend_distance),
                    days_with_trips,
                    days_without_trips: daily.len() - days_with_trips,
                    daily,
                }
            })
            .collect();
        rows.sort_by(|a, b| a.total_distance.total_cmp(&b.total_distance));
        Self { days, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn day_labels(&self) -> Vec<String> {
        self.days.iter().copied().map(period::day_label).collect()
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut columns = vec![COLUMN_GROUPING.to_owned()];
        columns.extend(self.day_labels());
        columns.extend(
            [
                COLUMN_WEEKDAY_DISTANCE,
                COLUMN_WEEKEND_DISTANCE,
                COLUMN_TOTAL_DISTANCE,
                COLUMN_DAYS_WITH_TRIPS,
                COLUMN_DAYS_WITHOUT_TRIPS,
            ]
            .map(str::to_owned),
        );
        columns
    }

    pub fn total_distance_of(&self, vehicle: &str) -> Option<f64> {
        self.rows.iter().find(|row| row.vehicle == vehicle).map(|row| row.total_distance)
    }

    pub fn least_utilized(&self) -> Option<&UtilizationRow> {
        self.rows.iter().min_by(|a, b| a.total_distance.total_cmp(&b.total_distance))
    }

    pub fn most_utilized(&self) -> Option<&UtilizationRow> {
        // max_by returns the last maximum; keep the first one instead
        self.rows.iter().rev().max_by(|a, b| a.total_distance.total_cmp(&b.total_distance))
    }

    pub fn average_distance(&self) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        Some(self.rows.iter().map(|row| row.total_distance).sum::<f64>() / self.rows.len() as f64)
    }
}

/// Filters trip records and pivots them over the period.
pub fn aggregate(records: &[TripRecord], period: &Period, tz: &Tz) -> Utilization {
    Utilization::from_trips(&filter_trips(records, period, tz), period)
}

fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn march() -> Period {
        Period::month_containing(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    }

    fn at(day: u32, hour: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap().and_hms_opt(hour, 0, 0)
    }

    fn record(vehicle: &str, day: u32, mileage: f64) -> TripRecord {
        TripRecord {
            vehicle: vehicle.to_owned(),
            beginning: at(day, 8),
            end: at(day, 9),
            initial_location: "Depot".to_owned(),
            final_location: "Site".to_owned(),
            mileage,
            max_speed: Cell::Text("80 km/h".to_owned()),
            count: Some(1.0),
        }
    }

    #[test]
    fn single_trip_fills_one_day() {
        let utilization = aggregate(&[record("V1", 1, 42.5)], &march(), &chrono_tz::Africa::Nairobi);
        assert_eq!(utilization.days.len(), 31);
        let row = &utilization.rows[0];
        assert_eq!(row.vehicle, "V1");
        assert_eq!(row.total_distance, 42.5);
        assert_eq!(row.days_with_trips, 1);
        assert_eq!(row.days_without_trips, 30);
        // 1 March 2024 is a Friday
        assert_eq!(row.weekday_distance, 42.5);
        assert_eq!(row.weekend_distance, 0.0);
    }

    #[test]
    fn splits_weekday_and_weekend_and_sorts_by_total() {
        let records = vec![
            record("Busy", 2, 100.123),
            record("Busy", 4, 50.0),
            record("Busy", 4, 0.333),
            record("Quiet", 5, 3.0),
        ];
        let utilization = aggregate(&records, &march(), &chrono_tz::Africa::Nairobi);
        let vehicles: Vec<_> = utilization.rows.iter().map(|r| r.vehicle.as_str()).collect();
        assert_eq!(vehicles, vec!["Quiet", "Busy"]);

        let busy = &utilization.rows[1];
        assert_eq!(busy.weekend_distance, 100.12);
        assert_eq!(busy.weekday_distance, 50.33);
        assert!((busy.total_distance - (busy.weekday_distance + busy.weekend_distance)).abs() < 1e-9);
        for row in &utilization.rows {
            assert_eq!(row.days_with_trips + row.days_without_trips, utilization.days.len());
        }
    }

    #[test]
    fn drops_summary_rows_and_trips_outside_the_period() {
        let mut summary = record("V1", 3, 500.0);
        summary.count = Some(12.0);
        let mut spills_over = record("V1", 31, 7.0);
        spills_over.end = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap().and_hms_opt(1, 0, 0);
        let mut unreadable = record("V1", 6, 9.0);
        unreadable.end = None;

        let trips = filter_trips(
            &[summary, spills_over, unreadable, record("V1", 10, 1.5)],
            &march(),
            &chrono_tz::Africa::Nairobi,
        );
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].mileage, 1.5);
        assert_eq!(trips[0].duration(), TimeDelta::hours(1));
    }

    #[test]
    fn skips_trips_in_a_dst_gap() {
        let tz = chrono_tz::Europe::London;
        let mut in_gap = record("V1", 31, 5.0);
        in_gap.beginning = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(1, 30, 0);
        in_gap.end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(3, 0, 0);
        assert!(filter_trips(&[in_gap], &march(), &tz).is_empty());

        // only the end falls in the gap
        let mut ends_in_gap = record("V2", 31, 5.0);
        ends_in_gap.beginning = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(0, 30, 0);
        ends_in_gap.end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(1, 30, 0);
        let mut before_gap = record("V3", 31, 5.0);
        before_gap.beginning = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(0, 10, 0);
        before_gap.end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(0, 50, 0);
        let trips = filter_trips(&[ends_in_gap, before_gap], &march(), &tz);
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].vehicle, "V3");
    }

    #[test]
    fn no_trips_gives_empty_table_with_all_columns() {
        let utilization = aggregate(&[], &march(), &chrono_tz::Africa::Nairobi);
        assert!(utilization.is_empty());
        assert_eq!(utilization, Utilization::empty(&march()));
        let columns = utilization.column_names();
        assert_eq!(columns.len(), 1 + 31 + 5);
        assert_eq!(columns[1], "F-1");
        assert_eq!(columns[32], COLUMN_WEEKDAY_DISTANCE);
        assert!(utilization.least_utilized().is_none());
        assert!(utilization.average_distance().is_none());
    }

    #[test]
    fn narrative_statistics() {
        let records = vec![record("A", 1, 10.0), record("B", 1, 30.0), record("C", 2, 30.0)];
        let utilization = aggregate(&records, &march(), &chrono_tz::Africa::Nairobi);
        assert_eq!(utilization.least_utilized().map(|r| r.vehicle.as_str()), Some("A"));
        assert_eq!(utilization.most_utilized().map(|r| r.vehicle.as_str()), Some("B"));
        assert!((utilization.average_distance().unwrap() - 70.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn reads_records_from_a_table() {
        let mut table = Table::new(
            ["Grouping", "Beginning", "End", "Mileage", "Count"].map(str::to_owned).to_vec(),
        );
        table.push_row(vec![
            Cell::Text("V1".to_owned()),
            Cell::infer("01.03.2024 08:00:00"),
            Cell::infer("01.03.2024 09:15:00"),
            Cell::Text("12.5 km".to_owned()),
            Cell::Number(1.0),
        ]);
        table.push_row(vec![Cell::Empty, Cell::Empty, Cell::Empty, Cell::Number(3.0)]);
        let records = TripRecord::from_table(&table).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mileage, 12.5);
        assert_eq!(records[0].count, Some(1.0));

        let detail = trip_detail_table(&filter_trips(&records, &march(), &chrono_tz::Africa::Nairobi));
        assert_eq!(detail.cell(0, "Duration"), Some(&Cell::Text("1:15:00".to_owned())));
    }

    #[test]
    fn unreadable_mileage_drops_the_row() {
        let mut table = Table::new(
            ["Grouping", "Beginning", "End", "Mileage", "Count"].map(str::to_owned).to_vec(),
        );
        table.push_row(vec![
            Cell::Text("V1".to_owned()),
            Cell::infer("01.03.2024 08:00:00"),
            Cell::infer("01.03.2024 09:00:00"),
            Cell::infer("n/a"),
            Cell::Number(1.0),
        ]);
        table.push_row(vec![
            Cell::Text("V2".to_owned()),
            Cell::infer("02.03.2024 08:00:00"),
            Cell::infer("02.03.2024 09:00:00"),
            Cell::infer("7 km"),
            Cell::Number(1.0),
        ]);
        let records = TripRecord::from_table(&table).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vehicle, "V2");

        let utilization = aggregate(&records, &march(), &chrono_tz::Africa::Nairobi);
        assert_eq!(utilization.total_distance_of("V1"), None);
        assert_eq!(utilization.total_distance_of("V2"), Some(7.0));
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let table = Table::new(vec!["Grouping".to_owned()]);
        assert!(matches!(TripRecord::from_table(&table), Err(TableError::MissingColumn(_))));
    }
}
