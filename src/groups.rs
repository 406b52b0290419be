use std::path::Path;

use anyhow::Context as _;
use tracing::{info, warn};

use crate::table::{self, Cell};

const COLUMN_ID: &str = "id";
const COLUMN_NAME: &str = "report_name";

/// A vehicle group that reports can be run for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleGroup {
    pub id: u64,
    pub name: String,
}

/// Reads the group directory workbook. Rows without a numeric id are skipped.
pub fn load_group_directory(path: &Path, sheet: &str) -> anyhow::Result<Vec<VehicleGroup>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("could not read group directory {}", path.display()))?;
    let table = table::load_sheet(&bytes, sheet)?;
    let id_col = table.require_column(COLUMN_ID)?;
    let name_col = table.require_column(COLUMN_NAME)?;

    let groups: Vec<_> = table
        .rows
        .iter()
        .filter_map(|row| {
            let id = row[id_col].as_f64().filter(|id| *id >= 0.0 && id.fract() == 0.0);
            match (id, &row[name_col]) {
                (Some(id), name) if !name.is_empty() => {
                    Some(VehicleGroup { id: id as u64, name: name.as_text() })
                }
                (_, Cell::Empty) => None,
                (_, name) => {
                    warn!("skipping group \"{}\" with invalid id \"{}\"", name, row[id_col]);
                    None
                }
            }
        })
        .collect();
    info!("loaded {} vehicle groups from {}", groups.len(), path.display());
    Ok(groups)
}

/// Finds a group by display name, or by id if `query` is numeric.
pub fn find_group<'a>(groups: &'a [VehicleGroup], query: &str) -> Option<&'a VehicleGroup> {
    groups.iter().find(|group| group.name == query).or_else(|| {
        let id: u64 = query.trim().parse().ok()?;
        groups.iter().find(|group| group.id == id)
    })
}

#[cfg(test)]
mod tests {
    use rust_xlsxwriter::Workbook;

    use super::*;

    #[test]
    fn loads_directory_and_finds_groups() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Sheet1").unwrap();
        sheet.write_string(0, 0, "id").unwrap();
        sheet.write_string(0, 1, "report_name").unwrap();
        sheet.write_number(1, 0, 28475360).unwrap();
        sheet.write_string(1, 1, "Agility").unwrap();
        sheet.write_string(2, 0, "n/a").unwrap();
        sheet.write_string(2, 1, "Broken").unwrap();
        sheet.write_number(3, 0, 17).unwrap();
        sheet.write_string(3, 1, "Coast Fleet").unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &workbook.save_to_buffer().unwrap()).unwrap();

        let groups = load_group_directory(file.path(), "Sheet1").unwrap();
        assert_eq!(
            groups,
            vec![
                VehicleGroup { id: 28475360, name: "Agility".to_owned() },
                VehicleGroup { id: 17, name: "Coast Fleet".to_owned() },
            ]
        );
        assert_eq!(find_group(&groups, "Coast Fleet").map(|g| g.id), Some(17));
        assert_eq!(find_group(&groups, "28475360").map(|g| g.name.as_str()), Some("Agility"));
        assert!(find_group(&groups, "Unknown").is_none());
    }
}
