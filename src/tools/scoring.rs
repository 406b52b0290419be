//! The scoring table: distance and violation counts per vehicle, with RAG
//! tiers and month-over-month change.

use std::collections::BTreeSet;

use super::{
    eco_driving::ViolationPivot,
    utilization::{Utilization, COLUMN_GROUPING, COLUMN_TOTAL_DISTANCE},
};

pub const COLUMN_ADVANCED_SCORE: &str = "Advanced Score";
pub const COLUMN_PREVIOUS_ADVANCED_SCORE: &str = "Previous Advanced Score";
pub const COLUMN_ADVANCED_SCORE_CHANGE: &str = "Advanced Score Change";

/// Violation types measured in distance rather than occurrences.
const DISTANCE_BASED: &[&str] = &["over speeding", "free wheeling"];

const EXPLANATIONS: &[(&str, &str)] = &[
    ("Harsh Acceleration", "This violation reduces tire life and increases fuel consumption."),
    (
        "Harsh Braking",
        "This violation causes damage of brake pads & Brake drums, suspension parts and may lead to tire burst and reduced tire life.",
    ),
    ("Over Speeding", "This violation results in high fuel consumption, and a high risk of accidents."),
    (
        "Free Wheeling",
        "Freewheeling is likely to cause Gearbox Damage and engine problems in case the driver engages the wrong gear after freewheeling, there's also increased chances of an accident.",
    ),
    ("Harsh Cornering", "This violation increases the chances of a possible rollover."),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScoreTier {
    Green,
    Amber,
    Red,
}

impl ScoreTier {
    pub const ALL: [ScoreTier; 3] = [ScoreTier::Green, ScoreTier::Amber, ScoreTier::Red];

    pub fn of(score: u32) -> Self {
        match score {
            0..=20 => ScoreTier::Green,
            21..=40 => ScoreTier::Amber,
            _ => ScoreTier::Red,
        }
    }

    pub fn heading(self) -> &'static str {
        match self {
            ScoreTier::Green => "Green Drivers (0 - 20 violations)",
            ScoreTier::Amber => "Amber Drivers (21 - 40 violations)",
            ScoreTier::Red => "Red Drivers (above 40 violations)",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ScoreTier::Green => {
                "The drivers in this group can serve as mentors or coaches for the rest of the team."
            }
            ScoreTier::Amber => "These are the average drivers...",
            ScoreTier::Red => "These drivers require immediate coaching and support...",
        }
    }
}

/// How a vehicle's score moved compared to the previous month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTrend {
    Worse,
    Better,
    Unchanged,
}

impl ScoreTrend {
    pub fn of(change: i64) -> Self {
        match change.signum() {
            1 => ScoreTrend::Worse,
            -1 => ScoreTrend::Better,
            _ => ScoreTrend::Unchanged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviousScore {
    pub advanced_score: u32,
    /// Current score minus previous score.
    pub change: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    pub vehicle: String,
    pub total_distance: f64,
    /// Counts in the same order as [`ScoreTable::violation_types`].
    pub counts: Vec<u32>,
    pub advanced_score: u32,
    pub previous: Option<PreviousScore>,
}

impl ScoreRow {
    pub fn tier(&self) -> ScoreTier {
        ScoreTier::of(self.advanced_score)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub green: usize,
    pub amber: usize,
    pub red: usize,
}

impl TierCounts {
    pub fn get(&self, tier: ScoreTier) -> usize {
        match tier {
            ScoreTier::Green => self.green,
            ScoreTier::Amber => self.amber,
            ScoreTier::Red => self.red,
        }
    }

    pub fn total(&self) -> usize {
        self.green + self.amber + self.red
    }

    /// Share of the fleet in `tier`, in percent. Zero for an empty fleet.
    pub fn percentage(&self, tier: ScoreTier) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.get(tier) as f64 / total as f64 * 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    pub violation_types: Vec<String>,
    pub rows: Vec<ScoreRow>,
    pub has_previous: bool,
}

impl ScoreTable {
    /// Outer-joins utilization and violations on the vehicle label. A vehicle
    /// missing from either side gets zeros for that side's columns.
    pub fn merge(utilization: &Utilization, violations: &ViolationPivot) -> Self {
        let vehicles: BTreeSet<&str> = utilization
            .rows
            .iter()
            .map(|row| row.vehicle.as_str())
            .chain(violations.rows.keys().map(String::as_str))
            .collect();

        let rows = vehicles
            .into_iter()
            .map(|vehicle| {
                let pivot_row = violations.rows.get(vehicle);
                ScoreRow {
                    vehicle: vehicle.to_owned(),
                    total_distance: utilization.total_distance_of(vehicle).unwrap_or(0.0),
                    counts: violations
                        .violation_types
                        .iter()
                        .map(|t| pivot_row.map_or(0, |row| row.count(t)))
                        .collect(),
                    advanced_score: pivot_row.map_or(0, |row| row.advanced_score),
                    previous: None,
                }
            })
            .collect();

        Self { violation_types: violations.violation_types.clone(), rows, has_previous: false }
    }

    /// Adds last month's scores. Vehicles without a score last month count as
    /// zero.
    pub fn with_previous(mut self, previous: &ViolationPivot) -> Self {
        for row in &mut self.rows {
            let advanced_score = previous.advanced_score(&row.vehicle).unwrap_or(0);
            row.previous = Some(PreviousScore {
                advanced_score,
                change: i64::from(row.advanced_score) - i64::from(advanced_score),
            });
        }
        self.has_previous = true;
        self
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut columns = vec![COLUMN_GROUPING.to_owned(), COLUMN_TOTAL_DISTANCE.to_owned()];
        columns.extend(self.violation_types.iter().cloned());
        columns.push(COLUMN_ADVANCED_SCORE.to_owned());
        if self.has_previous {
            columns.push(COLUMN_PREVIOUS_ADVANCED_SCORE.to_owned());
            columns.push(COLUMN_ADVANCED_SCORE_CHANGE.to_owned());
        }
        columns
    }

    pub fn tier_counts(&self) -> TierCounts {
        let mut counts = TierCounts::default();
        for row in &self.rows {
            match row.tier() {
                ScoreTier::Green => counts.green += 1,
                ScoreTier::Amber => counts.amber += 1,
                ScoreTier::Red => counts.red += 1,
            }
        }
        counts
    }

    /// The `n` vehicles with the most violations of one type, most first.
    /// Vehicles with no such violations are not listed.
    pub fn top_violators(&self, violation_type: &str, n: usize) -> Vec<(&str, u32)> {
        let Some(index) = self.violation_types.iter().position(|t| t == violation_type) else {
            return Vec::new();
        };
        let mut ranked: Vec<(&str, u32)> = self
            .rows
            .iter()
            .map(|row| (row.vehicle.as_str(), row.counts[index]))
            .filter(|(_, count)| *count > 0)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(n);
        ranked
    }

    /// One line of the "Top Violators" narrative.
    pub fn top_violators_line(&self, violation_type: &str) -> String {
        let unit = violation_unit(violation_type);
        let top = self.top_violators(violation_type, 3);
        let top = if top.is_empty() {
            "No data".to_owned()
        } else {
            top.iter()
                .map(|(vehicle, count)| format!("{vehicle} - {count} {unit}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "{}: {} Top violators were: {}",
            violation_type,
            violation_explanation(violation_type),
            top
        )
    }
}

/// The fixed explanation for a known violation type, matched ignoring case.
/// Unknown types have an empty explanation.
pub fn violation_explanation(violation_type: &str) -> &'static str {
    EXPLANATIONS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(violation_type.trim()))
        .map_or("", |(_, explanation)| *explanation)
}

pub fn violation_unit(violation_type: &str) -> &'static str {
    let lower = violation_type.trim().to_lowercase();
    if DISTANCE_BASED.iter().any(|prefix| lower.starts_with(prefix)) {
        "km"
    } else {
        "occurrences"
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{
        period::Period,
        tools::{
            eco_driving::{aggregate, ViolationRecord},
            utilization::UtilizationRow,
        },
        table::Cell,
    };

    fn pivot(events: &[(&str, &str)]) -> ViolationPivot {
        let records: Vec<_> = events
            .iter()
            .map(|(vehicle, violation)| ViolationRecord {
                vehicle: vehicle.to_string(),
                violation: violation.to_string(),
                beginning: None,
                end: None,
                value: Cell::Empty,
            })
            .collect();
        aggregate(&records)
    }

    fn utilization(totals: &[(&str, f64)]) -> Utilization {
        let period = Period::month_containing(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let mut utilization = Utilization::empty(&period);
        utilization.rows = totals
            .iter()
            .map(|(vehicle, total)| UtilizationRow {
                vehicle: vehicle.to_string(),
                daily: vec![0.0; 31],
                weekday_distance: *total,
                weekend_distance: 0.0,
                total_distance: *total,
                days_with_trips: 1,
                days_without_trips: 30,
            })
            .collect();
        utilization
    }

    #[test]
    fn outer_join_keeps_every_vehicle() {
        let table = ScoreTable::merge(
            &utilization(&[("Only Trips", 12.5), ("Both", 40.0)]),
            &pivot(&[("Both", "Harsh Braking"), ("Only Eco", "Over Speeding")]),
        );
        let vehicles: Vec<_> = table.rows.iter().map(|r| r.vehicle.as_str()).collect();
        assert_eq!(vehicles, vec!["Both", "Only Eco", "Only Trips"]);

        let only_trips = &table.rows[2];
        assert_eq!(only_trips.total_distance, 12.5);
        assert_eq!(only_trips.counts, vec![0, 0]);
        assert_eq!(only_trips.advanced_score, 0);

        let only_eco = &table.rows[1];
        assert_eq!(only_eco.total_distance, 0.0);
        assert_eq!(only_eco.counts, vec![0, 1]);
        assert_eq!(only_eco.advanced_score, 1);
    }

    #[test]
    fn previous_scores_and_change() {
        let table = ScoreTable::merge(
            &utilization(&[]),
            &pivot(&[("A", "Harsh Braking"), ("A", "Harsh Braking"), ("B", "Harsh Braking")]),
        )
        .with_previous(&pivot(&[("B", "Harsh Braking"), ("B", "Harsh Braking"), ("B", "Over Speeding")]));

        assert_eq!(table.rows[0].previous, Some(PreviousScore { advanced_score: 0, change: 2 }));
        assert_eq!(table.rows[1].previous, Some(PreviousScore { advanced_score: 3, change: -2 }));
        assert_eq!(ScoreTrend::of(2), ScoreTrend::Worse);
        assert_eq!(ScoreTrend::of(-2), ScoreTrend::Better);
        assert_eq!(ScoreTrend::of(0), ScoreTrend::Unchanged);
        assert_eq!(table.column_names().last().map(String::as_str), Some(COLUMN_ADVANCED_SCORE_CHANGE));
    }

    #[test]
    fn tiers_follow_fixed_thresholds() {
        assert_eq!(ScoreTier::of(0), ScoreTier::Green);
        assert_eq!(ScoreTier::of(20), ScoreTier::Green);
        assert_eq!(ScoreTier::of(21), ScoreTier::Amber);
        assert_eq!(ScoreTier::of(40), ScoreTier::Amber);
        assert_eq!(ScoreTier::of(41), ScoreTier::Red);

        let events: Vec<(&str, &str)> = std::iter::repeat(("Red", "Harsh Braking")).take(41).collect();
        let table = ScoreTable::merge(&utilization(&[("Idle", 0.0)]), &pivot(&events));
        let counts = table.tier_counts();
        assert_eq!(counts, TierCounts { green: 1, amber: 0, red: 1 });
        assert_eq!(counts.percentage(ScoreTier::Red), 50.0);
        assert_eq!(TierCounts::default().percentage(ScoreTier::Green), 0.0);
    }

    #[test]
    fn top_violators_are_ranked_and_capped() {
        let table = ScoreTable::merge(
            &utilization(&[]),
            &pivot(&[
                ("A", "Over Speeding"),
                ("B", "Over Speeding"),
                ("B", "Over Speeding"),
                ("C", "Over Speeding"),
                ("C", "Over Speeding"),
                ("C", "Over Speeding"),
                ("D", "Over Speeding"),
                ("E", "Harsh Braking"),
            ]),
        );
        assert_eq!(table.top_violators("Over Speeding", 3), vec![("C", 3), ("B", 2), ("A", 1)]);
        assert_eq!(
            table.top_violators_line("Harsh Braking"),
            format!("Harsh Braking: {} Top violators were: E - 1 occurrences", violation_explanation("harsh braking"))
        );
        assert!(table.top_violators_line("Over Speeding").ends_with("C - 3 km, B - 2 km, A - 1 km"));
        assert!(table.top_violators("Unknown", 3).is_empty());
    }

    #[test]
    fn explanations_and_units() {
        assert!(violation_explanation("HARSH CORNERING").contains("rollover"));
        assert_eq!(violation_explanation("Idling"), "");
        assert_eq!(violation_unit("Over Speeding(km)"), "km");
        assert_eq!(violation_unit("free wheeling"), "km");
        assert_eq!(violation_unit("Harsh Braking"), "occurrences");
    }
}
