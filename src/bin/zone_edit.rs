//! zone_edit - inspect and edit the zone map file

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use depot_monitor::{zones, BoundingBox, FrameSize, ZoneMap};

#[derive(Parser, Debug)]
#[command(name = "zone_edit", about = "Show or edit depot zone rectangles")]
struct Args {
    /// Zone map JSON file.
    #[arg(long, env = "DEPOT_ZONES_PATH", default_value = "zones.json")]
    zones: PathBuf,

    /// Frame width zones are clamped to.
    #[arg(long, default_value_t = 960)]
    width: u32,

    /// Frame height zones are clamped to.
    #[arg(long, default_value_t = 540)]
    height: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every zone with its role and rectangle
    Show,

    /// Replace one zone's rectangle (clamped to the frame)
    Set {
        key: String,
        #[arg(allow_negative_numbers = true)]
        x1: i32,
        #[arg(allow_negative_numbers = true)]
        y1: i32,
        #[arg(allow_negative_numbers = true)]
        x2: i32,
        #[arg(allow_negative_numbers = true)]
        y2: i32,
    },

    /// Restore the built-in layout
    Reset,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let frame = FrameSize::new(args.width, args.height);
    let mut map = zones::load(&args.zones, frame)?;

    match args.command {
        Command::Show => {}
        Command::Set { key, x1, y1, x2, y2 } => {
            let stored = map.set_box(&key, BoundingBox::new(x1, y1, x2, y2))?;
            zones::save(&args.zones, &map)?;
            println!("{} -> {:?}", key, stored.to_array());
        }
        Command::Reset => {
            map.reset();
            zones::save(&args.zones, &map)?;
            println!("zones reset to defaults");
        }
    }
    print_zones(&map);
    Ok(())
}

fn print_zones(map: &ZoneMap) {
    for zone in map.iter() {
        println!("{:<16} {:<16} {:?}", zone.key, zone.role.as_str(), zone.bounds.to_array());
    }
}
