//! Minimal CLI: universe → (source | clone)
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;

use crate::bridge::{CompileMode, ErrorReporter};
use crate::clone_gen::CloneSynthesizer;
use crate::script::ScriptEngine;
use crate::universe::{TypeRef, TypeUniverse};
use crate::value;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// load a structural type universe and either print the clone units it
/// synthesizes or run one against a JSON sample instance
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// print the generated source of the clone units for the selected types
    Source(SourceOut),
    /// synthesize a clone routine and run it over a JSON sample instance
    Clone(CloneRun),
}

#[derive(Args, Debug, Clone)]
struct UniverseSettings {
    /// One or more universe .json files. May be literal paths or quoted glob
    /// patterns; multiple files are merged, later declarations win
    #[arg(long, short, num_args = 1.., required = true)]
    universe: Vec<String>,
}

#[derive(Args, Debug)]
struct SourceOut {
    #[command(flatten)]
    universe_settings: UniverseSettings,

    /// type to synthesize for; repeatable. Every declared type when omitted
    #[arg(long = "type", short)]
    types: Vec<String>,

    /// output .cs file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CloneRun {
    #[command(flatten)]
    universe_settings: UniverseSettings,

    /// declared type of the sample instance
    #[arg(long = "type", short)]
    type_name: String,

    /// JSON file holding the sample instance
    #[arg(long, short)]
    instance: PathBuf,

    /// materialize generated sources under this directory and compile from file
    #[arg(long)]
    via_file: Option<PathBuf>,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl UniverseSettings {
    fn load(&self) -> anyhow::Result<TypeUniverse> {
        let source_paths = resolve_file_path_patterns(&self.universe)?;
        let parsed: Vec<TypeUniverse> = source_paths
            .par_iter()
            .map(|path| {
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read universe file {}", path.display()))?;
                TypeUniverse::from_json_str(&source)
                    .with_context(|| format!("invalid universe file {}", path.display()))
            })
            .collect::<anyhow::Result<_>>()?;
        let mut merged = TypeUniverse::new();
        for universe in parsed {
            for (_, descriptor) in universe.types {
                merged.insert(descriptor);
            }
        }
        Ok(merged)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Source(target) => {
                let universe = Arc::new(target.universe_settings.load()?);
                let engine = Arc::new(ScriptEngine::new(universe.clone()));
                let synth = CloneSynthesizer::new(universe.clone(), engine)
                    .with_reporter(stderr_reporter());

                let selected: Vec<String> = if target.types.is_empty() {
                    universe.types.keys().cloned().collect()
                } else {
                    target.types.clone()
                };

                // Components overlap across roots; emit each unit once.
                let mut seen = std::collections::BTreeSet::new();
                let mut rendered = Vec::new();
                for name in &selected {
                    for (unit, source) in synth.generated_source(name)? {
                        if seen.insert(unit) {
                            rendered.push(source);
                        }
                    }
                }
                write_output(target.out.as_deref(), &rendered.join("\n"))?;
                summary(&format!("{} unit(s) generated", rendered.len()));
            }
            Command::Clone(target) => {
                let universe = Arc::new(target.universe_settings.load()?);
                let mut engine = ScriptEngine::new(universe.clone());
                let mut mode = CompileMode::InMemory;
                if let Some(dir) = &target.via_file {
                    engine = engine.with_artifacts_dir(dir.clone());
                    mode = CompileMode::ViaFile;
                }
                let synth = CloneSynthesizer::new(universe.clone(), Arc::new(engine))
                    .with_mode(mode)
                    .with_reporter(stderr_reporter());

                let callable = synth.ensure(&target.type_name)?;
                let source = std::fs::read_to_string(&target.instance).with_context(|| {
                    format!("failed to read instance file {}", target.instance.display())
                })?;
                let json: serde_json::Value = serde_json::from_str(&source).with_context(|| {
                    format!("invalid JSON in {}", target.instance.display())
                })?;
                let instance = value::from_json(
                    &json,
                    &TypeRef::named(target.type_name.as_str()),
                    &universe,
                );

                let cloned = callable.invoke_one(&instance)?;
                let out_json = serde_json::to_string_pretty(&value::to_json(&cloned))?;
                write_output(target.out.as_deref(), &out_json)?;
                summary(&format!("cloned one {} instance", target.type_name));
            }
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn stderr_reporter() -> ErrorReporter {
    Arc::new(|message: &str| {
        eprintln!("{} {message}", "error:".red().bold());
    })
}

fn summary(message: &str) {
    eprintln!(
        "{} {message} at {}",
        "done:".green().bold(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
}

fn write_output(out: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(path, text)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                // Pattern was explicitly a glob but matched nothing -> surface as an error
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            // Treat as a literal path
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
