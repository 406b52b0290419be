//! The downloadable workbook: utilization, eco-driving detail, trips detail
//! and scoring sheets.

use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, Worksheet, XlsxError};
use tracing::info;

use crate::{
    table::{Cell, Table},
    tools::{
        fleet_report::{FleetReport, SubReport},
        scoring::{ScoreTable, ScoreTier, ScoreTrend},
        utilization::{round2, Utilization, UtilizationRow},
    },
};

pub const SHEET_UTILIZATION: &str = "Utilization";
pub const SHEET_ECO_DRIVING: &str = "Eco driving";
pub const SHEET_TRIPS: &str = "Trips";
pub const SHEET_SCORING: &str = "Scoring";

const UTILIZATION_HEADER_ROW: u32 = 10;
const TOP_VIOLATORS_ROW: u32 = 16;
const SCORE_TABLE_INTRO_MIN_ROW: u32 = 22;

const RED: u32 = 0xFF0000;
const ORANGE: u32 = 0xFFA500;
const YELLOW: u32 = 0xFFFF00;
const LIGHT_GREEN: u32 = 0x90EE90;
const AMBER: u32 = 0xFFC000;

/// Color band of a daily distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceBand {
    Idle,
    Low,
    Moderate,
    High,
}

impl DistanceBand {
    pub const ALL: [DistanceBand; 4] =
        [DistanceBand::Idle, DistanceBand::Low, DistanceBand::Moderate, DistanceBand::High];

    pub fn of(km: f64) -> Self {
        if km < 0.1 {
            DistanceBand::Idle
        } else if km < 10.0 {
            DistanceBand::Low
        } else if km < 100.0 {
            DistanceBand::Moderate
        } else {
            DistanceBand::High
        }
    }

    pub fn color(self) -> u32 {
        match self {
            DistanceBand::Idle => RED,
            DistanceBand::Low => ORANGE,
            DistanceBand::Moderate => YELLOW,
            DistanceBand::High => LIGHT_GREEN,
        }
    }

    pub fn legend(self) -> &'static str {
        match self {
            DistanceBand::Idle => "Less Than 0.1 km",
            DistanceBand::Low => "Less Than 10 km",
            DistanceBand::Moderate => "Less Than 100 km",
            DistanceBand::High => "More Than 100 km",
        }
    }
}

fn tier_color(tier: ScoreTier) -> u32 {
    match tier {
        ScoreTier::Green => LIGHT_GREEN,
        ScoreTier::Amber => AMBER,
        ScoreTier::Red => RED,
    }
}

fn trend_color(trend: ScoreTrend) -> u32 {
    match trend {
        ScoreTrend::Worse => RED,
        ScoreTrend::Better => LIGHT_GREEN,
        ScoreTrend::Unchanged => AMBER,
    }
}

struct Formats {
    bold: Format,
    header: Format,
    border: Format,
    total: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            bold: Format::new().set_bold(),
            header: Format::new()
                .set_bold()
                .set_background_color(Color::RGB(0xADD8E6))
                .set_text_wrap()
                .set_border(FormatBorder::Thin),
            border: Format::new().set_border(FormatBorder::Thin),
            total: Format::new()
                .set_bold()
                .set_background_color(Color::RGB(0xE6E6FA))
                .set_border(FormatBorder::Thin),
        }
    }

    fn filled(&self, color: u32) -> Format {
        self.border.clone().set_background_color(Color::RGB(color))
    }
}

/// Renders the report as an xlsx workbook.
pub fn compose(report: &FleetReport) -> Result<Vec<u8>, XlsxError> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();
    write_utilization(workbook.add_worksheet().set_name(SHEET_UTILIZATION)?, &report.utilization, &formats)?;
    write_table(workbook.add_worksheet().set_name(SHEET_ECO_DRIVING)?, &report.eco_driving, &formats)?;
    let trips = workbook.add_worksheet().set_name(SHEET_TRIPS)?;
    match &report.trips {
        SubReport::Ready(table) => write_table(trips, table, &formats)?,
        SubReport::Unavailable(reason) => {
            let message = format!("Trips report could not be fetched: {reason}");
            trips.write_with_format(0, 0, message.as_str(), &formats.bold)?;
        }
    }
    write_scoring(workbook.add_worksheet().set_name(SHEET_SCORING)?, &report.scores, &formats)?;
    let bytes = workbook.save_to_buffer()?;
    info!("composed workbook for {} ({} bytes)", report.group.name, bytes.len());
    Ok(bytes)
}

fn write_utilization(sheet: &mut Worksheet, utilization: &Utilization, formats: &Formats) -> Result<(), XlsxError> {
    sheet.write_with_format(0, 0, "DAILY UTILIZATION REPORT", &formats.bold)?;
    for (i, band) in DistanceBand::ALL.into_iter().enumerate() {
        let format = formats.bold.clone().set_background_color(Color::RGB(band.color()));
        sheet.write_with_format(2 + i as u32, 0, band.legend(), &format)?;
    }

    match (utilization.least_utilized(), utilization.most_utilized(), utilization.average_distance()) {
        (Some(least), Some(most), Some(average)) => {
            let comments = [
                format!("The least utilized vehicle was {} with {:.2} KM", least.vehicle, least.total_distance),
                format!("The most utilized vehicle was {} with {:.2} KM", most.vehicle, most.total_distance),
                format!("The average distance covered by each vehicle in the fleet was {average:.1} KM"),
            ];
            for (i, comment) in comments.into_iter().enumerate() {
                sheet.write_with_format(7 + i as u32, 0, comment.as_str(), &formats.bold)?;
            }
        }
        _ => {
            sheet.write_with_format(7, 0, "No trips were recorded in this period", &formats.bold)?;
        }
    }

    let columns = utilization.column_names();
    let mut widths: Vec<usize> = columns.iter().map(String::len).collect();
    for (col, name) in columns.iter().enumerate() {
        sheet.write_with_format(UTILIZATION_HEADER_ROW, col as u16, name.as_str(), &formats.header)?;
    }

    let band_formats: Vec<Format> = DistanceBand::ALL.iter().map(|band| formats.filled(band.color())).collect();
    let band_format = |km: f64| &band_formats[DistanceBand::of(km) as usize];
    let day_count = utilization.days.len();
    for (i, row) in utilization.rows.iter().enumerate() {
        let r = UTILIZATION_HEADER_ROW + 1 + i as u32;
        sheet.write_with_format(r, 0, row.vehicle.as_str(), &formats.border)?;
        widths[0] = widths[0].max(row.vehicle.len());
        for (d, km) in row.daily.iter().enumerate() {
            sheet.write_with_format(r, 1 + d as u16, *km, band_format(*km))?;
        }
        let derived = [
            row.weekday_distance,
            row.weekend_distance,
            row.total_distance,
            row.days_with_trips as f64,
            row.days_without_trips as f64,
        ];
        for (k, value) in derived.into_iter().enumerate() {
            let col = 1 + day_count + k;
            sheet.write_with_format(r, col as u16, value, &formats.border)?;
            widths[col] = widths[col].max(value.to_string().len());
        }
    }

    if !utilization.is_empty() {
        // Days with/without trips are not summed.
        let r = UTILIZATION_HEADER_ROW + 1 + utilization.rows.len() as u32;
        sheet.write_with_format(r, 0, "TOTAL", &formats.total)?;
        for col in 1..=day_count + 3 {
            let sum: f64 = utilization.rows.iter().map(|row| utilization_value(row, col - 1, day_count)).sum();
            sheet.write_with_format(r, col as u16, round2(sum), &formats.total)?;
        }
        for col in day_count + 4..columns.len() {
            sheet.write_blank(r, col as u16, &formats.total)?;
        }
    }

    for (col, width) in widths.into_iter().enumerate() {
        sheet.set_column_width(col as u16, (width + 2) as f64)?;
    }
    Ok(())
}

/// Numeric value of a utilization row, indexed over the day columns followed
/// by weekday, weekend and total distance.
fn utilization_value(row: &UtilizationRow, index: usize, day_count: usize) -> f64 {
    match index.checked_sub(day_count) {
        None => row.daily[index],
        Some(0) => row.weekday_distance,
        Some(1) => row.weekend_distance,
        Some(_) => row.total_distance,
    }
}

/// Writes a detail table with a header row and columns sized to their
/// content.
fn write_table(sheet: &mut Worksheet, table: &Table, formats: &Formats) -> Result<(), XlsxError> {
    let mut widths: Vec<usize> = table.columns.iter().map(String::len).collect();
    for (col, name) in table.columns.iter().enumerate() {
        sheet.write_with_format(0, col as u16, name.as_str(), &formats.bold)?;
    }
    for (i, row) in table.rows.iter().enumerate() {
        let r = 1 + i as u32;
        for (col, cell) in row.iter().enumerate() {
            match cell {
                Cell::Empty => continue,
                Cell::Number(n) => sheet.write(r, col as u16, *n)?,
                cell => sheet.write(r, col as u16, cell.to_string().as_str())?,
            };
            widths[col] = widths[col].max(cell.to_string().len());
        }
    }
    for (col, width) in widths.into_iter().enumerate() {
        sheet.set_column_width(col as u16, (width + 2) as f64)?;
    }
    Ok(())
}

fn write_scoring(sheet: &mut Worksheet, scores: &ScoreTable, formats: &Formats) -> Result<(), XlsxError> {
    sheet.write_with_format(
        0,
        0,
        "This report shows a classification of drivers in 3 different categories: Green, Amber, and Red.",
        &formats.bold,
    )?;
    if scores.has_previous {
        sheet.write_with_format(
            1,
            0,
            "We have also made a comparison between the two months, The Red dots are an indication that a vehicle increased on the violations from the previous month, the Light green dots shows an improvement on the different drivers and amber shows no change.",
            &formats.bold,
        )?;
    }

    let counts = scores.tier_counts();
    for (i, tier) in ScoreTier::ALL.into_iter().enumerate() {
        let r = 3 + 4 * i as u32;
        sheet.write_with_format(r, 0, tier.heading(), &formats.bold)?;
        sheet.write(r + 1, 0, tier.description())?;
        sheet.write(
            r + 2,
            0,
            format!(
                "This category includes {} vehicles, accounting for {:.2}% of the total fleet.",
                counts.get(tier),
                counts.percentage(tier)
            )
            .as_str(),
        )?;
    }

    sheet.write_with_format(TOP_VIOLATORS_ROW - 1, 0, "Top Violators:", &formats.bold)?;
    for (i, violation_type) in scores.violation_types.iter().enumerate() {
        sheet.write(TOP_VIOLATORS_ROW + i as u32, 0, scores.top_violators_line(violation_type).as_str())?;
    }

    let intro_row =
        SCORE_TABLE_INTRO_MIN_ROW.max(TOP_VIOLATORS_ROW + scores.violation_types.len() as u32 + 1);
    sheet.write_with_format(intro_row, 0, "The table below outlines the vehicles in the three categories:", &formats.bold)?;

    let header_row = intro_row + 3;
    let columns = scores.column_names();
    let mut widths: Vec<usize> = columns.iter().map(String::len).collect();
    for (col, name) in columns.iter().enumerate() {
        sheet.write_with_format(header_row, col as u16, name.as_str(), &formats.header)?;
    }
    for (i, row) in scores.rows.iter().enumerate() {
        let r = header_row + 1 + i as u32;
        sheet.write_with_format(r, 0, row.vehicle.as_str(), &formats.border)?;
        widths[0] = widths[0].max(row.vehicle.len());
        sheet.write_with_format(r, 1, row.total_distance, &formats.border)?;
        for (k, count) in row.counts.iter().enumerate() {
            sheet.write_with_format(r, 2 + k as u16, *count, &formats.border)?;
        }
        let score_col = 2 + row.counts.len() as u16;
        sheet.write_with_format(r, score_col, row.advanced_score, &formats.filled(tier_color(row.tier())))?;
        if let Some(previous) = row.previous {
            sheet.write_with_format(r, score_col + 1, previous.advanced_score, &formats.border)?;
            sheet.write_with_format(
                r,
                score_col + 2,
                previous.change as f64,
                &formats.filled(trend_color(ScoreTrend::of(previous.change))),
            )?;
        }
    }
    for (col, width) in widths.into_iter().enumerate() {
        sheet.set_column_width(col as u16, (width + 2) as f64)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use calamine::{Data, Reader as _, Xlsx};

    use super::*;
    use crate::tools::fleet_report::testing::sample_report;

    fn open(bytes: Vec<u8>) -> Xlsx<Cursor<Vec<u8>>> {
        Xlsx::new(Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn distance_bands() {
        assert_eq!(DistanceBand::of(0.0), DistanceBand::Idle);
        assert_eq!(DistanceBand::of(0.1), DistanceBand::Low);
        assert_eq!(DistanceBand::of(9.99), DistanceBand::Low);
        assert_eq!(DistanceBand::of(10.0), DistanceBand::Moderate);
        assert_eq!(DistanceBand::of(100.0), DistanceBand::High);
    }

    #[test]
    fn workbook_has_four_sheets_in_order() {
        let mut workbook = open(compose(&sample_report()).unwrap());
        assert_eq!(workbook.sheet_names(), vec![SHEET_UTILIZATION, SHEET_ECO_DRIVING, SHEET_TRIPS, SHEET_SCORING]);
        let trips = workbook.worksheet_range(SHEET_TRIPS).unwrap();
        assert_eq!(trips.get_value((0, 3)), Some(&Data::String("Duration".to_owned())));
        assert_eq!(trips.get_value((1, 3)), Some(&Data::String("1:00:00".to_owned())));
    }

    #[test]
    fn utilization_sheet_layout() {
        let report = sample_report();
        let mut workbook = open(compose(&report).unwrap());
        let sheet = workbook.worksheet_range(SHEET_UTILIZATION).unwrap();
        let text = |row: u32, col: u32| sheet.get_value((row, col)).map(|d| d.to_string()).unwrap_or_default();

        assert_eq!(text(0, 0), "DAILY UTILIZATION REPORT");
        assert_eq!(text(2, 0), "Less Than 0.1 km");
        assert_eq!(text(7, 0), "The least utilized vehicle was KDA 001 with 42.50 KM");
        assert_eq!(text(8, 0), "The most utilized vehicle was KDA 002 with 150.25 KM");
        assert_eq!(text(9, 0), "The average distance covered by each vehicle in the fleet was 96.4 KM");
        assert_eq!(text(10, 0), "Grouping");
        assert_eq!(text(10, 1), "F-1");
        assert_eq!(text(13, 0), "TOTAL");

        let total_col = 1 + 31 + 2;
        assert_eq!(text(10, total_col), "Total Distance (km)");
        assert_eq!(sheet.get_value((13, total_col)), Some(&Data::Float(192.75)));
    }

    #[test]
    fn scoring_sheet_has_narrative_and_comparison() {
        let mut workbook = open(compose(&sample_report()).unwrap());
        let sheet = workbook.worksheet_range(SHEET_SCORING).unwrap();
        let text = |row: u32, col: u32| sheet.get_value((row, col)).map(|d| d.to_string()).unwrap_or_default();

        assert!(text(1, 0).starts_with("We have also made a comparison"));
        assert_eq!(text(3, 0), "Green Drivers (0 - 20 violations)");
        assert_eq!(
            text(5, 0),
            "This category includes 3 vehicles, accounting for 100.00% of the total fleet."
        );
        assert_eq!(text(15, 0), "Top Violators:");
        assert!(text(16, 0).starts_with("Harsh Braking: This violation causes damage"));
        assert!(text(17, 0).ends_with("KDA 002 - 1 km"));
        assert_eq!(text(22, 0), "The table below outlines the vehicles in the three categories:");
        assert_eq!(text(25, 0), "Grouping");
        assert_eq!(text(25, 6), "Advanced Score Change");
        assert_eq!(text(26, 0), "KDA 001");
        assert_eq!(sheet.get_value((26, 6)), Some(&Data::Float(-1.0)));
    }

    #[test]
    fn degraded_report_still_composes() {
        let mut report = sample_report();
        report.trips = SubReport::Unavailable("report was not ready after 6 export attempts".to_owned());
        report.utilization = Utilization::empty(&report.period);
        report.previous = SubReport::Unavailable("timeout".to_owned());
        report.scores = ScoreTable::merge(&report.utilization, &report.violations);

        let mut workbook = open(compose(&report).unwrap());
        let utilization = workbook.worksheet_range(SHEET_UTILIZATION).unwrap();
        assert_eq!(
            utilization.get_value((7, 0)),
            Some(&Data::String("No trips were recorded in this period".to_owned()))
        );
        let scoring = workbook.worksheet_range(SHEET_SCORING).unwrap();
        assert!(!scoring.get_value((1, 0)).is_some_and(|d| d.to_string().starts_with("We have also")));
        assert_eq!(scoring.get_value((25, 4)), Some(&Data::String("Advanced Score".to_owned())));
        assert_eq!(scoring.get_value((25, 5)), None);
    }
}
