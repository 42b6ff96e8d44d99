use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, info};
use serde_json::{Value, json};

use classweave::search::Match;
use classweave::{
    ClassInfo, ClassPath, ClassRecord, ClassResolver, FieldRecord, Hierarchy, NameTable,
    NamingMode, Remapper, find_last_call, find_last_return, generate_getter, generate_setter, opcodes, serialize,
};

/// CLI arguments for classweave execution.
#[derive(Parser, Debug)]
#[command(
    name = "classweave",
    about = "Inspect, search and synthesize JVM class structures across obfuscated and canonical names.",
    version
)]
struct Cli {
    /// Directories and JAR files to load classes from.
    #[arg(long, value_name = "PATH", global = true)]
    classpath: Vec<PathBuf>,
    /// JSON name table translating canonical names to runtime names.
    #[arg(long, value_name = "FILE", global = true)]
    mapping: Option<PathBuf>,
    /// Classes on the class path use the runtime names from --mapping.
    #[arg(long, global = true)]
    obfuscated: bool,
    #[arg(long, value_name = "PATH", global = true)]
    output: Option<PathBuf>,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the structure of a class.
    Inspect { class: String },
    /// Check whether CHILD can be assigned to PARENT.
    Assignable { parent: String, child: String },
    /// Locate the last return instruction of a method.
    FindReturn {
        class: String,
        method: String,
        desc: String,
    },
    /// Locate the last call to --target on --owner inside a method.
    FindCall {
        class: String,
        method: String,
        desc: String,
        #[arg(long)]
        owner: String,
        /// Method name immediately followed by its descriptor.
        #[arg(long)]
        target: String,
        #[arg(long, default_value = "invokevirtual")]
        opcode: String,
        #[arg(long)]
        fallback_owner: bool,
    },
    /// Add a getter for a field and write the class to --output.
    AddGetter(AccessorArgs),
    /// Add a setter for a field and write the class to --output.
    AddSetter(AccessorArgs),
}

#[derive(Args, Debug)]
struct AccessorArgs {
    class: String,
    method: String,
    field: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

fn run(cli: Cli) -> Result<()> {
    let class_path = ClassPath::new(&cli.classpath)?;
    info!("class path has {} entries", cli.classpath.len());
    let remapper = build_remapper(cli.mapping.as_deref(), cli.obfuscated)?;
    let resolver = ClassResolver::new(&class_path, &remapper);

    let report = match &cli.command {
        Command::Inspect { class } => {
            let info = resolver.resolve_canonical(class)?;
            inspect_json(&info)
        }
        Command::Assignable { parent, child } => {
            let parent = resolver.resolve_canonical(parent)?;
            let child = resolver.resolve_canonical(child)?;
            let assignable = Hierarchy::new(&resolver).is_assignable_from(&parent, &child)?;
            json!({ "assignable": assignable })
        }
        Command::FindReturn {
            class,
            method,
            desc,
        } => {
            let record = load_canonical(&resolver, class)?;
            let target = remapper.to_runtime_method(class, method, desc)?;
            let method = record
                .method(&target.name, &target.descriptor)
                .with_context(|| format!("method {}{} not found", target.name, target.descriptor))?;
            json!({ "found": match_json(find_last_return(method)?) })
        }
        Command::FindCall {
            class,
            method,
            desc,
            owner,
            target,
            opcode,
            fallback_owner,
        } => {
            let opcode = opcodes::from_name(opcode)
                .with_context(|| format!("unknown opcode {opcode}"))?;
            let record = load_canonical(&resolver, class)?;
            let scanned = remapper.to_runtime_method(class, method, desc)?;
            let method = record
                .method(&scanned.name, &scanned.descriptor)
                .with_context(|| {
                    format!("method {}{} not found", scanned.name, scanned.descriptor)
                })?;
            let found = find_last_call(method, &remapper, owner, target, opcode, *fallback_owner)?;
            json!({ "found": match_json(found) })
        }
        Command::AddGetter(args) => {
            return add_accessor(&cli, &resolver, &remapper, args, AccessorKind::Getter);
        }
        Command::AddSetter(args) => {
            return add_accessor(&cli, &resolver, &remapper, args, AccessorKind::Setter);
        }
    };

    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &report).context("failed to serialize report")?;
    writer.write_all(b"\n").context("failed to write report")?;
    Ok(())
}

fn build_remapper(mapping: Option<&Path>, obfuscated: bool) -> Result<Remapper> {
    let table = match mapping {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            NameTable::from_json(&json)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => NameTable::default(),
    };
    if obfuscated && table.is_empty() {
        anyhow::bail!("--obfuscated needs a non-empty --mapping table");
    }
    let mode = if obfuscated {
        NamingMode::Obfuscated
    } else {
        NamingMode::Canonical
    };
    Ok(Remapper::new(mode, Arc::new(table)))
}

fn load_canonical(resolver: &ClassResolver<'_>, class: &str) -> Result<ClassRecord> {
    let runtime = resolver.remapper().to_runtime_name(class)?;
    Ok(resolver.load_record(&runtime)?)
}

#[derive(Clone, Copy, Debug)]
enum AccessorKind {
    Getter,
    Setter,
}

fn add_accessor(
    cli: &Cli,
    resolver: &ClassResolver<'_>,
    remapper: &Remapper,
    args: &AccessorArgs,
    kind: AccessorKind,
) -> Result<()> {
    let output = cli
        .output
        .as_deref()
        .context("--output is required when writing a class")?;
    let mut record = load_canonical(resolver, &args.class)?;
    let field = find_field(remapper, &record, &args.field)?;
    let method = match kind {
        AccessorKind::Getter => generate_getter(
            &record.name,
            &args.method,
            &field.name,
            &field.descriptor,
            classweave::synth::DEFAULT_ACCESSOR_ACCESS,
        )?,
        AccessorKind::Setter => generate_setter(
            &record.name,
            &args.method,
            &field.name,
            &field.descriptor,
            classweave::synth::DEFAULT_ACCESSOR_ACCESS,
        )?,
    };
    let signature = format!("{}{}", method.name, method.descriptor);
    if !record.add_method(method) {
        anyhow::bail!("{} already declares {signature}", record.name);
    }
    info!("added {signature} to {}", record.name);

    let bytes = serialize(&record)?;
    let mut writer = output_writer(Some(output))?;
    writer
        .write_all(&bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(())
}

/// Runtime field of `record` whose canonical name is `canonical`.
///
/// Each declared field is mapped with its own descriptor, so oracles keyed
/// by descriptor resolve it too.
fn find_field<'c>(
    remapper: &Remapper,
    record: &'c ClassRecord,
    canonical: &str,
) -> Result<&'c FieldRecord> {
    for field in &record.fields {
        let mapped = remapper.to_canonical_field(&record.name, &field.name, &field.descriptor)?;
        if mapped.name == canonical {
            return Ok(field);
        }
    }
    anyhow::bail!("field {canonical} not found in {}", record.name)
}

fn inspect_json(info: &ClassInfo) -> Value {
    let mut report = json!({
        "name": info.internal_name(),
        "super": info.super_name(),
        "interfaces": info.interfaces(),
        "is_interface": info.is_interface(),
    });
    if let Some(record) = info.record() {
        report["fields"] = record
            .fields
            .iter()
            .map(|field| {
                json!({
                    "name": field.name,
                    "descriptor": field.descriptor,
                    "access": field.access.bits(),
                })
            })
            .collect();
        report["methods"] = record
            .methods
            .iter()
            .map(|method| {
                json!({
                    "name": method.name,
                    "descriptor": method.descriptor,
                    "access": method.access.bits(),
                    "instructions": method.instructions().len(),
                })
            })
            .collect();
    }
    report
}

fn match_json(found: Option<Match<'_>>) -> Value {
    match found {
        Some(found) => json!({
            "index": found.index,
            "opcode": found
                .instruction
                .opcode()
                .and_then(opcodes::name),
        }),
        None => Value::Null,
    }
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}
