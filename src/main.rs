//! Command-line interface for xmlmodel

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::PathBuf;
#[cfg(feature = "cli")]
use std::str::FromStr;

#[cfg(feature = "cli")]
use log::{debug, LevelFilter};

#[cfg(feature = "cli")]
use xmlmodel::bpmn;
#[cfg(feature = "cli")]
use xmlmodel::dump::{InstanceDump, ModelDump};
#[cfg(feature = "cli")]
use xmlmodel::ModelInstance;

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "xmlmodel")]
#[command(author, version, about = "Inspect BPMN documents through a typed XML model", long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace); RUST_LOG still applies per module
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a BPMN document and list its elements with resolved references
    Inspect {
        /// Path to the BPMN file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List the BPMN type registry
    Types {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();

    let log_level = LevelFilter::from_str(&cli.log_level).unwrap_or_else(|_| {
        eprintln!("Invalid log level: {}. Using 'warn' instead.", cli.log_level);
        LevelFilter::Warn
    });
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(log_level)
        .init();

    let result = match cli.command {
        Commands::Inspect { file, json } => cmd_inspect(file, json),
        Commands::Types { json } => cmd_types(json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn cmd_inspect(path: PathBuf, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let xml = fs::read_to_string(&path)?;
    let instance = ModelInstance::parse(bpmn::model(), &xml)?;
    debug!(file = path.display().to_string(), ids = instance.index().len(); "Document loaded");

    let dump = instance.dump()?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&dump)?);
    } else {
        print_instance(&dump);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn print_instance(dump: &InstanceDump) {
    println!("xmlmodel v{} ({} model)", xmlmodel::VERSION, dump.model);
    println!();

    let mut dangling = 0;
    for element in &dump.elements {
        let indent = "  ".repeat(element.depth);
        match &element.id {
            Some(id) => println!("{}{} #{}", indent, element.element_type, id),
            None => println!("{}{}", indent, element.element_type),
        }
        for reference in &element.references {
            match &reference.target {
                Some(target) => println!("{}  {} -> {}", indent, reference.name, target),
                None => {
                    dangling += 1;
                    println!("{}  {} -> {} (dangling)", indent, reference.name, reference.identifier);
                }
            }
        }
    }

    println!();
    println!("Elements: {}", dump.elements.len());
    println!("Dangling references: {}", dangling);
}

#[cfg(feature = "cli")]
fn cmd_types(json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dump = bpmn::model().dump();
    if json_output {
        println!("{}", serde_json::to_string_pretty(&dump)?);
    } else {
        print_types(&dump);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn print_types(dump: &ModelDump) {
    println!("=== {} types ===", dump.name);
    for ty in &dump.types {
        let mut header = ty.name.clone();
        if let Some(base) = &ty.base_type {
            header.push_str(&format!(" : {}", base));
        }
        if ty.is_abstract {
            header.push_str(" (abstract)");
        }
        println!("{}  {}", header, ty.qualified_name);

        for attribute in &ty.attributes {
            let mut flags = Vec::new();
            if attribute.id {
                flags.push("id".to_string());
            }
            if attribute.required {
                flags.push("required".to_string());
            }
            if let Some(default) = &attribute.default {
                flags.push(format!("default={}", default));
            }
            println!("  @{} : {} {}", attribute.name, attribute.value_type, flags.join(" "));
        }
        for child in &ty.children {
            let max = child
                .max_occurs
                .map(|m| m.to_string())
                .unwrap_or_else(|| "unbounded".to_string());
            println!("  <{}> {}..{}", child.element_type, child.min_occurs, max);
        }
        for reference in &ty.references {
            println!("  {} -> {} ({})", reference.name, reference.target, reference.kind);
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
