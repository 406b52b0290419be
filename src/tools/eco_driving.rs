use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use tracing::debug;

use crate::table::{Cell, Table, TableError};

/// Marker the service puts in the violation column of rows that are not
/// violations.
pub const NO_VIOLATION: &str = "-----";

pub const COLUMN_VIOLATION: &str = "Violation";

#[derive(Debug, Clone, PartialEq)]
pub struct ViolationRecord {
    pub vehicle: String,
    pub violation: String,
    pub beginning: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub value: Cell,
}

impl ViolationRecord {
    /// Reads every qualifying violation row. Sentinel rows and rows missing a
    /// vehicle or violation name are left out.
    pub fn from_table(table: &Table) -> Result<Vec<Self>, TableError> {
        let grouping = table.require_column("Grouping")?;
        let violation = table.require_column(COLUMN_VIOLATION)?;
        let beginning = table.column("Beginning");
        let end = table.column("End");
        let value = table.column("Value");

        let records: Vec<_> = table
            .rows
            .iter()
            .filter_map(|row| {
                let record = ViolationRecord {
                    vehicle: row[grouping].as_text(),
                    violation: row[violation].as_text(),
                    beginning: beginning.and_then(|c| row[c].as_datetime()),
                    end: end.and_then(|c| row[c].as_datetime()),
                    value: value.map(|c| row[c].clone()).unwrap_or(Cell::Empty),
                };
                record.is_violation().then_some(record)
            })
            .collect();
        debug!("read {} violations from {} rows", records.len(), table.len());
        Ok(records)
    }

    fn is_violation(&self) -> bool {
        !self.vehicle.is_empty() && !self.violation.is_empty() && self.violation != NO_VIOLATION
    }
}

/// The eco-driving sheet without its sentinel rows, for the detail view.
pub fn detail_table(table: &Table) -> Table {
    let mut detail = table.clone();
    if let Some(violation) = table.column(COLUMN_VIOLATION) {
        detail.retain_rows(|row| row[violation].as_text() != NO_VIOLATION);
    }
    detail
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleViolations {
    /// Count per violation type. Every discovered type has an entry.
    pub counts: BTreeMap<String, u32>,
    /// Sum of all counts.
    pub advanced_score: u32,
}

impl VehicleViolations {
    pub fn count(&self, violation_type: &str) -> u32 {
        self.counts.get(violation_type).copied().unwrap_or(0)
    }
}

/// Violation counts per vehicle and type. The set of types is whatever showed
/// up in the report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViolationPivot {
    pub violation_types: Vec<String>,
    pub rows: BTreeMap<String, VehicleViolations>,
}

impl ViolationPivot {
    pub fn advanced_score(&self, vehicle: &str) -> Option<u32> {
        self.rows.get(vehicle).map(|row| row.advanced_score)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Counts violations per vehicle and type and sums them into the Advanced
/// Score. This is the only place the score is computed.
pub fn aggregate(records: &[ViolationRecord]) -> ViolationPivot {
    let violation_types: BTreeSet<&str> = records
        .iter()
        .filter(|r| r.is_violation())
        .map(|r| r.violation.as_str())
        .collect();

    let mut rows: BTreeMap<String, VehicleViolations> = BTreeMap::new();
    for record in records.iter().filter(|r| r.is_violation()) {
        let row = rows.entry(record.vehicle.clone()).or_insert_with(|| VehicleViolations {
            counts: violation_types.iter().map(|t| (t.to_string(), 0)).collect(),
            advanced_score: 0,
        });
        *row.counts.entry(record.violation.clone()).or_default() += 1;
    }
    for row in rows.values_mut() {
        row.advanced_score = row.counts.values().sum();
    }

    ViolationPivot { violation_types: violation_types.into_iter().map(str::to_owned).collect(), rows }
}
