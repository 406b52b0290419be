use std::path::Path;

use tracing::{info, warn};

/// Opens a file with the system's default application. Failing to open it is
/// not an error; the path is printed instead.
pub fn open_path(path: &Path) {
    match open::that(path) {
        Ok(()) => info!("Opened {}", path.display()),
        Err(e) => {
            warn!("Failed to open {}: {}", path.display(), e);
            println!("The report was written to {}", path.display());
        }
    }
}
