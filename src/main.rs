use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::fmt;

use capastrophic::cap::{encode_json, Cap, CapSummary};
use capastrophic::exp::Exp;

use crate::args::{Cli, Command};

mod args;

fn main() {
    let format = fmt::format()
        .with_ansi(true)
        .without_time()
        .with_level(true)
        .with_target(false)
        .compact();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .event_format(format)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{e:#}");
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Cap2json {
            file,
            output,
            print,
            overwrite,
        } => {
            let bytes = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let cap = Cap::decode(&bytes)?;
            let json = serde_json::to_string_pretty(&cap.to_json())?;
            let explicit_output = output.is_some();
            let path = output_path(output, &file, "_cap.json")?;
            emit_text(&json, &path, print, overwrite, explicit_output)
        }

        Command::Exp2json {
            file,
            output,
            print,
            overwrite,
        } => {
            let bytes = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let exp = Exp::decode(&bytes)?;
            let json = serde_json::to_string_pretty(&exp.to_json())?;
            let explicit_output = output.is_some();
            let path = output_path(output, &file, "_exp.json")?;
            emit_text(&json, &path, print, overwrite, explicit_output)
        }

        Command::Json2cap {
            file,
            output,
            overwrite,
        } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let intermediate: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            let bytes = encode_json(&intermediate)?;

            let path = output_path(output, &file, "_json.cap")?;
            check_overwrite(&path, overwrite)?;
            ensure_parent(&path)?;
            fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
            info!("Rebuilt CAP file written to '{}'", path.display());
            Ok(())
        }

        Command::Capinfo { file } => {
            let cap = load_cap(&file)?;
            print_summary(&cap.summary());
            Ok(())
        }
    }
}

/// A JSON input is first rebuilt (shallow) and then decoded like any other
/// CAP, so tampered `raw_modified` edits show up in the summary too.
fn load_cap(file: &Path) -> Result<Cap> {
    let is_json = file
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let bytes = if is_json {
        let text =
            fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
        let intermediate: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("{} is not valid JSON", file.display()))?;
        encode_json(&intermediate)?
    } else {
        fs::read(file).with_context(|| format!("reading {}", file.display()))?
    };

    Ok(Cap::decode(&bytes)?)
}

fn print_summary(summary: &CapSummary) {
    println!();
    if !summary.package_aid.is_empty() {
        println!("Package:");
        println!(
            "\t- {} (v{})",
            to_upper_hex(&summary.package_aid),
            summary.package_version
        );
        println!();
    }

    if !summary.applet_aids.is_empty() {
        println!("Applets:");
        for aid in &summary.applet_aids {
            println!("\t- {}", to_upper_hex(aid));
        }
        println!();
    }

    if !summary.imports.is_empty() {
        println!("Imports:");
        for (aid, version) in &summary.imports {
            println!("\t- {} (v{version})", to_upper_hex(aid));
        }
        println!();
    }
}

fn to_upper_hex(bytes: &[u8]) -> String {
    capastrophic::support::hex::encode(bytes).to_uppercase()
}

fn output_path(output: Option<PathBuf>, input: &Path, suffix: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path);
    }

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".into());
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Ok(PathBuf::from("output").join(format!("{timestamp}_{stem}{suffix}")))
}

fn check_overwrite(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        bail!(
            "output file '{}' already exists, use --overwrite or provide a new name",
            path.display()
        );
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }
    Ok(())
}

fn emit_text(
    text: &str,
    path: &Path,
    print: bool,
    overwrite: bool,
    explicit_output: bool,
) -> Result<()> {
    if print {
        println!("{text}");
    }

    // with -p alone, printing replaces the file write
    if explicit_output || !print {
        check_overwrite(path, overwrite)?;
        ensure_parent(path)?;
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        info!("Parsed output written to '{}'", path.display());
    }

    Ok(())
}
