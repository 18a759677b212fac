use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "Inspect and manipulate Java Card CAP and EXP files")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(about = "Read a CAP file and write its parsed JSON representation")]
    Cap2json {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long, help = "Output path (default: autogenerated under output/)")]
        output: Option<PathBuf>,

        #[arg(short, long, help = "Print the JSON to stdout")]
        print: bool,

        #[arg(long, help = "Overwrite the output file if it exists")]
        overwrite: bool,
    },

    #[command(about = "Read an EXP file and write its parsed JSON representation")]
    Exp2json {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long, help = "Output path (default: autogenerated under output/)")]
        output: Option<PathBuf>,

        #[arg(short, long, help = "Print the JSON to stdout")]
        print: bool,

        #[arg(long, help = "Overwrite the output file if it exists")]
        overwrite: bool,
    },

    #[command(about = "Rebuild a CAP file from its JSON representation (shallow mode)")]
    Json2cap {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long, help = "Output path (default: autogenerated under output/)")]
        output: Option<PathBuf>,

        #[arg(long, help = "Overwrite the output file if it exists")]
        overwrite: bool,
    },

    #[command(about = "Print package, applet and import info of a CAP or JSON file")]
    Capinfo {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}
