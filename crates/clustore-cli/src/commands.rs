use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;

use clustore_fabric::NullSink;
use clustore_manager::{BackendRegistry, ClusterValue, StorageConfig, StorageManager};
use clustore_store::{Property, StoredObject};
use clustore_types::{ClusterPath, ClusterType, ItemId};

use crate::cli::*;

/// Open the configured storage and run one command against it.
pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    if let Command::NewItem = cli.command {
        println!("{}", ItemId::new());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let manager = StorageManager::from_config(
        &config,
        &BackendRegistry::with_builtins(),
        Arc::new(NullSink),
    )
    .context("failed to start storage manager")?;
    tracing::debug!(backends = config.backends.len(), "storage manager ready");

    let json = matches!(cli.format, OutputFormat::Json);
    let result = match cli.command {
        Command::Capabilities => cmd_capabilities(&manager, json),
        Command::NewItem => Ok(()),
        Command::Get(args) => cmd_get(&manager, args, json),
        Command::Put(args) => cmd_put(&manager, args),
        Command::Ls(args) => cmd_ls(&manager, args, json),
        Command::Rm(args) => cmd_rm(&manager, args),
        Command::LastId(args) => cmd_last_id(&manager, args),
    };
    manager.close();
    result
}

fn load_config(path: Option<&Path>) -> anyhow::Result<StorageConfig> {
    match path {
        Some(path) => StorageConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(StorageConfig::default()),
    }
}

fn parse_item(raw: &str) -> anyhow::Result<ItemId> {
    raw.parse::<ItemId>()
        .with_context(|| format!("'{raw}' is not an item id"))
}

fn parse_path(raw: &str) -> anyhow::Result<ClusterPath> {
    ClusterPath::parse(raw).with_context(|| format!("'{raw}' is not a cluster path"))
}

/// `Property/<name>` content becomes a property record; anything else is
/// stored as given.
fn object_for(path: ClusterPath, data: Vec<u8>) -> anyhow::Result<StoredObject> {
    if path.cluster_type() == ClusterType::Property && path.is_leaf() {
        let value = String::from_utf8(data).context("property values must be UTF-8")?;
        return Ok(Property::new(path.name(), value).to_stored_object()?);
    }
    Ok(StoredObject::new(path, data))
}

/// Printable form of an object: the value of a property, the text of
/// anything else.
fn render(object: &StoredObject) -> String {
    if object.cluster_type() == ClusterType::Property {
        if let Ok(property) = Property::from_stored_object(object) {
            return property.value;
        }
    }
    String::from_utf8_lossy(object.data()).into_owned()
}

fn print_keys(keys: &[String], json: bool) {
    if json {
        println!("{}", json!(keys));
    } else if keys.is_empty() {
        println!("{}", "(empty)".dimmed());
    } else {
        for key in keys {
            println!("{key}");
        }
    }
}

fn cmd_capabilities(manager: &StorageManager, json: bool) -> anyhow::Result<()> {
    if json {
        let backends: Vec<_> = manager
            .backends()
            .iter()
            .map(|backend| {
                let caps: serde_json::Map<_, _> = ClusterType::ALL
                    .iter()
                    .map(|ct| (ct.name().to_string(), json!(backend.capability(*ct))))
                    .collect();
                json!({ "id": backend.id(), "name": backend.name(), "capabilities": caps })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&backends)?);
        return Ok(());
    }

    print!("{:<12}", "backend".bold());
    for ct in ClusterType::ALL {
        print!(" {:<11}", ct.name().bold());
    }
    println!();
    for backend in manager.backends() {
        print!("{:<12}", backend.id().cyan());
        for ct in ClusterType::ALL {
            let cap = backend.capability(ct);
            let cell = format!("{:<11}", cap.to_string());
            let cell = if cap.can_write() {
                cell.green()
            } else if cap.can_read() {
                cell.yellow()
            } else {
                cell.dimmed()
            };
            print!(" {cell}");
        }
        println!();
    }
    Ok(())
}

fn cmd_get(manager: &StorageManager, args: GetArgs, json: bool) -> anyhow::Result<()> {
    let item = parse_item(&args.item)?;
    let path = parse_path(&args.path)?;
    match manager.get(&item, &path, None)? {
        ClusterValue::Object(object) => {
            if json {
                println!(
                    "{}",
                    json!({ "item": item.to_string(), "path": object.path(), "data": render(&object) })
                );
            } else {
                println!("{}", render(&object));
            }
        }
        ClusterValue::Map(map) => {
            let keys: Vec<String> = map.keys()?.into_iter().collect();
            print_keys(&keys, json);
        }
        ClusterValue::Sequence(sequence) => print_keys(&sequence.keys()?, json),
    }
    Ok(())
}

fn cmd_put(manager: &StorageManager, args: PutArgs) -> anyhow::Result<()> {
    let item = parse_item(&args.item)?;
    let path = parse_path(&args.path)?;
    let data = match (args.value, args.file) {
        (Some(value), None) => value.into_bytes(),
        (None, Some(file)) => std::fs::read(&file)
            .with_context(|| format!("failed to read {}", file.display()))?,
        _ => bail!("give the content as VALUE or with --file"),
    };
    let object = object_for(path.clone(), data)?;
    let size = object.size();
    manager.put(&item, object, None)?;
    println!("{} Stored {} ({} bytes)", "✓".green().bold(), path.to_string().bold(), size);
    Ok(())
}

fn cmd_ls(manager: &StorageManager, args: LsArgs, json: bool) -> anyhow::Result<()> {
    let item = parse_item(&args.item)?;
    let path = match args.path.as_deref() {
        Some(raw) => parse_path(raw)?,
        None => ClusterPath::root(),
    };
    print_keys(&manager.child_keys(&item, &path, None)?, json);
    Ok(())
}

fn cmd_rm(manager: &StorageManager, args: RmArgs) -> anyhow::Result<()> {
    let item = parse_item(&args.item)?;
    let path = parse_path(&args.path)?;
    if args.recursive {
        manager.remove_cluster(&item, &path, None)?;
    } else {
        manager.remove(&item, &path, None)?;
    }
    println!("{} Removed {}", "✓".green().bold(), path.to_string().bold());
    Ok(())
}

fn cmd_last_id(manager: &StorageManager, args: LastIdArgs) -> anyhow::Result<()> {
    let item = parse_item(&args.item)?;
    let path = parse_path(&args.path)?;
    match manager.last_integer_id(&item, &path, None)? {
        Some(id) => println!("{id}"),
        None => println!("{}", "(none)".dimmed()),
    }
    Ok(())
}
