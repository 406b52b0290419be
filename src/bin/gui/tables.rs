//! Read-only grids for the report tables.

use fleetscore::{
    table::Table,
    tools::{
        eco_driving::ViolationPivot,
        scoring::{ScoreTable, ScoreTier, ScoreTrend},
        utilization::Utilization,
    },
};

fn grid(ui: &mut egui::Ui, id: &str, columns: &[String], rows: impl Iterator<Item = Vec<egui::RichText>>) {
    egui::ScrollArea::both().id_salt(id).max_height(400.0).show(ui, |ui| {
        egui::Grid::new(id).striped(true).num_columns(columns.len()).show(ui, |ui| {
            for column in columns {
                ui.strong(column);
            }
            ui.end_row();
            for row in rows {
                for cell in row {
                    ui.label(cell);
                }
                ui.end_row();
            }
        });
    });
}

pub fn render_table(ui: &mut egui::Ui, id: &str, table: &Table) {
    if table.is_empty() {
        ui.label("No rows.");
        return;
    }
    grid(
        ui,
        id,
        &table.columns,
        table.rows.iter().map(|row| row.iter().map(|cell| egui::RichText::new(cell.to_string())).collect()),
    );
}

pub fn render_utilization(ui: &mut egui::Ui, utilization: &Utilization) {
    if utilization.is_empty() {
        ui.label("No trips were recorded in this period.");
        return;
    }
    grid(
        ui,
        "utilization",
        &utilization.column_names(),
        utilization.rows.iter().map(|row| {
            let mut cells = vec![egui::RichText::new(&row.vehicle)];
            cells.extend(row.daily.iter().map(|km| egui::RichText::new(format!("{km:.2}"))));
            cells.extend(
                [row.weekday_distance, row.weekend_distance, row.total_distance]
                    .map(|km| egui::RichText::new(format!("{km:.2}"))),
            );
            cells.push(egui::RichText::new(row.days_with_trips.to_string()));
            cells.push(egui::RichText::new(row.days_without_trips.to_string()));
            cells
        }),
    );
}

fn tier_color(tier: ScoreTier) -> egui::Color32 {
    match tier {
        ScoreTier::Green => egui::Color32::LIGHT_GREEN,
        ScoreTier::Amber => egui::Color32::from_rgb(0xFF, 0xC0, 0x00),
        ScoreTier::Red => egui::Color32::RED,
    }
}

pub fn render_scores(ui: &mut egui::Ui, scores: &ScoreTable) {
    let counts = scores.tier_counts();
    for tier in ScoreTier::ALL {
        ui.colored_label(
            tier_color(tier),
            format!("{}: {} vehicles ({:.2}%)", tier.heading(), counts.get(tier), counts.percentage(tier)),
        );
    }
    ui.add_space(8.0);
    grid(
        ui,
        "scores",
        &scores.column_names(),
        scores.rows.iter().map(|row| {
            let mut cells = vec![
                egui::RichText::new(&row.vehicle),
                egui::RichText::new(format!("{:.2}", row.total_distance)),
            ];
            cells.extend(row.counts.iter().map(|count| egui::RichText::new(count.to_string())));
            cells.push(egui::RichText::new(row.advanced_score.to_string()).color(tier_color(row.tier())));
            if let Some(previous) = row.previous {
                let trend = match ScoreTrend::of(previous.change) {
                    ScoreTrend::Worse => egui::Color32::RED,
                    ScoreTrend::Better => egui::Color32::LIGHT_GREEN,
                    ScoreTrend::Unchanged => egui::Color32::from_rgb(0xFF, 0xC0, 0x00),
                };
                cells.push(egui::RichText::new(previous.advanced_score.to_string()));
                cells.push(egui::RichText::new(format!("{:+}", previous.change)).color(trend));
            }
            cells
        }),
    );
    ui.add_space(8.0);
    ui.strong("Top Violators:");
    for violation_type in &scores.violation_types {
        ui.label(scores.top_violators_line(violation_type));
    }
}

pub fn render_pivot(ui: &mut egui::Ui, id: &str, pivot: &ViolationPivot) {
    if pivot.is_empty() {
        ui.label("No violations.");
        return;
    }
    let mut columns = vec!["Grouping".to_owned()];
    columns.extend(pivot.violation_types.iter().cloned());
    columns.push("Advanced Score".to_owned());
    grid(
        ui,
        id,
        &columns,
        pivot.rows.iter().map(|(vehicle, row)| {
            let mut cells = vec![egui::RichText::new(vehicle)];
            cells.extend(pivot.violation_types.iter().map(|t| egui::RichText::new(row.count(t).to_string())));
            cells.push(egui::RichText::new(row.advanced_score.to_string()));
            cells
        }),
    );
}
