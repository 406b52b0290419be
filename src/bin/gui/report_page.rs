use std::{path::PathBuf, sync::Arc};

use chrono::{Datelike as _, Local, NaiveDate};
use fleetscore::{
    apis::telematics::TelematicsClient,
    config::Config,
    groups::VehicleGroup,
    period::Period,
    tools::fleet_report::{self, output, FleetReport},
    utils,
};
use tracing::{info, warn};

use crate::{background::BackgroundTask, tables};

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September", "October",
    "November", "December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportView {
    Utilization,
    Trips,
    EcoDriving,
    Scoring,
    PreviousMonth,
}

pub struct ReportPage {
    selected_group: usize,
    year: i32,
    month: u32,
    view: ReportView,
    open_after_export: bool,
    fetch: BackgroundTask<Result<FleetReport, String>>,
    report: Option<Result<Arc<FleetReport>, String>>,
    export_status: Option<Result<PathBuf, String>>,
}

impl Default for ReportPage {
    fn default() -> Self {
        let last_month = Period::month_containing(Local::now().date_naive()).previous_month().start;
        Self {
            selected_group: 0,
            year: last_month.year(),
            month: last_month.month(),
            view: ReportView::Scoring,
            open_after_export: true,
            fetch: BackgroundTask::default(),
            report: None,
            export_status: None,
        }
    }
}

impl ReportPage {
    pub fn render(&mut self, ui: &mut egui::Ui, groups: &[VehicleGroup], config: &Arc<Config>) {
        if let Some(result) = self.fetch.poll() {
            self.report = Some(result.map(Arc::new));
            self.export_status = None;
        }
        self.selected_group = self.selected_group.min(groups.len() - 1);

        egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.horizontal(|ui| {
                egui::ComboBox::from_label("Vehicle group")
                    .selected_text(groups[self.selected_group].name.as_str())
                    .show_ui(ui, |ui| {
                        for (i, group) in groups.iter().enumerate() {
                            ui.selectable_value(&mut self.selected_group, i, group.name.as_str());
                        }
                    });
            });
            ui.horizontal(|ui| {
                egui::ComboBox::from_label("Month")
                    .selected_text(MONTHS[self.month as usize - 1])
                    .show_ui(ui, |ui| {
                        for (i, name) in MONTHS.iter().enumerate() {
                            ui.selectable_value(&mut self.month, i as u32 + 1, *name);
                        }
                    });
                ui.add(egui::DragValue::new(&mut self.year).range(2000..=2100));
            });

            let period = NaiveDate::from_ymd_opt(self.year, self.month, 1).map(Period::month_containing);
            ui.horizontal(|ui| {
                let fetching = self.fetch.is_running();
                let button = ui.add_enabled(
                    !fetching && period.is_some(),
                    egui::Button::new("Fetch Monthly Eco Driving Reports"),
                );
                if fetching {
                    ui.spinner();
                    ui.label("Fetching reports...");
                } else if let Some(period) = period {
                    ui.label(format!(
                        "Report for {} compared with {}",
                        period.start.format("%B %Y"),
                        period.previous_month().start.format("%B %Y")
                    ));
                }
                if let (true, Some(period)) = (button.clicked(), period) {
                    self.start_fetch(ui.ctx(), groups[self.selected_group].clone(), period, Arc::clone(config));
                }
            });
        });

        match &self.report {
            None => {
                ui.label("No report loaded; choose a group and month and fetch.");
            }
            Some(Err(e)) => {
                ui.colored_label(egui::Color32::RED, format!("Error while fetching or processing reports: {e}"));
            }
            Some(Ok(report)) => {
                let report = Arc::clone(report);
                self.render_report(ui, &report);
            }
        }
    }

    fn start_fetch(&mut self, ctx: &egui::Context, group: VehicleGroup, period: Period, config: Arc<Config>) {
        info!("fetching report for {} over {}", group.name, period.describe());
        self.fetch.spawn(ctx, move || {
            let tz = config.time_zone().map_err(|e| e.to_string())?;
            let client = TelematicsClient::connect(&config).map_err(|e| format!("{:#}", e))?;
            fleet_report::build_fleet_report(&client, &group, period, &tz).map_err(|e| e.to_string())
        });
    }

    fn render_report(&mut self, ui: &mut egui::Ui, report: &FleetReport) {
        ui.separator();
        ui.heading(format!("{}: {}", report.group.name, report.period.describe()));
        for warning in report.warnings() {
            ui.colored_label(egui::Color32::YELLOW, warning);
        }

        ui.horizontal(|ui| {
            if ui.button("Export workbook").clicked() {
                self.export_status = Some(export(report, self.open_after_export));
            }
            ui.checkbox(&mut self.open_after_export, "open after export");
            match &self.export_status {
                Some(Ok(path)) => {
                    ui.label(format!("Saved to {}", path.display()));
                }
                Some(Err(e)) => {
                    ui.colored_label(egui::Color32::RED, format!("Failed to generate Excel file: {e}"));
                }
                None => {}
            }
        });

        ui.horizontal(|ui| {
            ui.selectable_value(&mut self.view, ReportView::Utilization, "Utilization");
            ui.selectable_value(&mut self.view, ReportView::Trips, "Trips");
            ui.selectable_value(&mut self.view, ReportView::EcoDriving, "Eco Driving");
            ui.selectable_value(&mut self.view, ReportView::Scoring, "RAG Score");
            ui.selectable_value(&mut self.view, ReportView::PreviousMonth, "Previous Month");
        });
        egui::Frame::group(ui.style()).show(ui, |ui| match self.view {
            ReportView::Utilization => tables::render_utilization(ui, &report.utilization),
            ReportView::Trips => match &report.trips {
                fleet_report::SubReport::Ready(table) => tables::render_table(ui, "trips", table),
                fleet_report::SubReport::Unavailable(reason) => {
                    ui.label(format!("Trips report could not be fetched: {reason}"));
                }
            },
            ReportView::EcoDriving => tables::render_table(ui, "eco_driving", &report.eco_driving),
            ReportView::Scoring => tables::render_scores(ui, &report.scores),
            ReportView::PreviousMonth => match &report.previous {
                fleet_report::SubReport::Ready(pivot) => {
                    ui.label(report.previous_period.describe());
                    tables::render_pivot(ui, "previous_month", pivot);
                }
                fleet_report::SubReport::Unavailable(reason) => {
                    ui.label(format!("Could not fetch previous month data: {reason}"));
                }
            },
        });
    }
}

fn export(report: &FleetReport, open: bool) -> Result<PathBuf, String> {
    let path = PathBuf::from(output::report_file_name(&report.group.name));
    let bytes = output::xlsx::compose(report).map_err(|e| e.to_string())?;
    std::fs::write(&path, bytes).map_err(|e| {
        warn!("could not write {}: {}", path.display(), e);
        e.to_string()
    })?;
    info!("wrote report to {}", path.display());
    if open {
        utils::open_path(&path);
    }
    Ok(path)
}
