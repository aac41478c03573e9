use std::path::PathBuf;

use clap::Parser;
use pmstore::meta::{list_elements, write_tp_metadata, TpMetadata};

#[derive(Parser)]
#[command(name = "pm-tp-meta")]
#[command(about = "Export distinct transport points per element from the PM store")]
struct Cli {
    /// Store root containing NE=... partitions
    #[arg(long, default_value = "./pm_store")]
    root: PathBuf,

    /// Restrict to one element; default is every element in the store
    #[arg(long)]
    ne: Option<String>,

    /// Write tp_meta.json under each element directory instead of stdout
    #[arg(long)]
    write: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let elements = match cli.ne {
        Some(ne) => vec![ne],
        None => list_elements(&cli.root)?,
    };

    for element in &elements {
        if cli.write {
            let path = write_tp_metadata(&cli.root, element)?;
            eprintln!("wrote {}", path.display());
        } else {
            let metadata = TpMetadata::collect(&cli.root, element)?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
    }
    Ok(())
}
