use std::path::Path;

use fleetscore::{config::Config, groups};

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Only list groups whose name contains this text (case-insensitive).
    #[arg(long)]
    filter: Option<String>,
}

pub fn main(config: Option<&Path>, args: Args) -> anyhow::Result<()> {
    let Args { filter } = args;
    let config = Config::load(config)?;
    let groups = groups::load_group_directory(&config.group_directory, &config.group_directory_sheet)?;
    let filter = filter.map(|f| f.to_lowercase());
    for group in groups
        .iter()
        .filter(|group| filter.as_ref().map_or(true, |f| group.name.to_lowercase().contains(f)))
    {
        println!("{:>12}  {}", group.id, group.name);
    }
    Ok(())
}
