use anyhow::{bail, Context};
use pluginfinder_core::{write_index, EmbeddedMetadataLoader, Registry, RegistryConfig};
use std::path::Path;

const USAGE: &str = "usage: pluginfinder query <dir> [capability] [constraint]
       pluginfinder index <dir>";

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pluginfinder_core=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["query", dir, rest @ ..] if rest.len() <= 2 => {
            let capability = rest.first().copied().unwrap_or("");
            let constraint = rest.get(1).copied().unwrap_or("");
            let plugins = Registry::global().query(dir, capability, constraint);
            for plugin in &plugins {
                let line = serde_json::json!({
                    "library": plugin.library_path(),
                    "metadata": plugin.to_structured_json(),
                });
                println!("{line}");
            }
            eprintln!("Matching plugins: {}", plugins.len());
        }
        ["index", dir] => {
            let config = RegistryConfig::from_env();
            let (path, count) = write_index(Path::new(dir), &config, &EmbeddedMetadataLoader)
                .context(format!("Failed to index {dir}"))?;
            println!("Indexed {count} plugins into {}", path.display());
        }
        _ => bail!("{USAGE}"),
    }

    Ok(())
}
