use eframe::egui;
use fleetscore::config::Config;
use tracing::warn;

mod app;
mod background;
mod report_page;
mod tables;

fn main() {
    // set up tracing
    tracing_subscriber::fmt::init();

    let config = match Config::load(None) {
        Ok(config) => config,
        Err(e) => {
            warn!("error loading config, using defaults: {}", e);
            Config::default()
        }
    };

    // run the UI on the main thread
    let result = eframe::run_native(
        "Fleet Score",
        Default::default(),
        Box::new(|_cc| Ok(Box::new(FleetScoreApp { app: app::MainApp::new(config) }))),
    );
    if let Err(e) = result {
        warn!("error in UI thread: {}", e);
    }
}

struct FleetScoreApp {
    app: app::MainApp,
}

impl eframe::App for FleetScoreApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| self.app.render(ui));
    }
}
