use std::sync::Arc;

use fleetscore::{
    config::Config,
    groups::{self, VehicleGroup},
};
use tracing::warn;

use crate::report_page::ReportPage;

pub struct MainApp {
    config: Arc<Config>,
    /// The group directory, or the reason it could not be loaded.
    groups: Result<Vec<VehicleGroup>, String>,
    report_page: ReportPage,
}

impl MainApp {
    pub fn new(config: Config) -> Self {
        let groups = groups::load_group_directory(&config.group_directory, &config.group_directory_sheet)
            .map_err(|e| {
                warn!("could not load group directory: {:#}", e);
                format!("{:#}", e)
            });
        Self { config: Arc::new(config), groups, report_page: ReportPage::default() }
    }

    pub fn render(&mut self, ui: &mut egui::Ui) {
        ui.heading("Monthly Eco Driving Reports");
        ui.separator();
        match &self.groups {
            Ok(groups) if !groups.is_empty() => self.report_page.render(ui, groups, &self.config),
            Ok(_) => {
                ui.label(format!(
                    "The group directory {} has no groups.",
                    self.config.group_directory.display()
                ));
            }
            Err(e) => {
                ui.colored_label(egui::Color32::RED, format!("Could not load the group directory: {e}"));
                ui.label(format!(
                    "Provide '{}' with 'id' and 'report_name' columns in sheet '{}'.",
                    self.config.group_directory.display(),
                    self.config.group_directory_sheet
                ));
            }
        }
    }
}
