use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use qoob_flasher::BinaryType;

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FormatArg {
    /// Already container-wrapped image, flashed as-is.
    Gcb,
    /// Raw ELF executable, wrapped before flashing.
    Elf,
    /// Raw DOL executable, wrapped before flashing.
    Dol,
}

impl FormatArg {
    pub fn to_binary_type(self) -> BinaryType {
        match self {
            FormatArg::Gcb => BinaryType::Gcb,
            FormatArg::Elf => BinaryType::Elf,
            FormatArg::Dol => BinaryType::Dol,
        }
    }
}

#[derive(Parser)]
#[command(name = "qoob-flasher")]
#[command(about = "Qoob Pro GameCube modchip flash programmer")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the 32 flash slots.
    List(ListArgs),

    /// Read an application out of the flash into a file.
    Read(ReadArgs),

    /// Write a GCB/ELF/DOL file into the flash.
    Write(WriteArgs),

    /// Erase an application, or a forced slot range.
    Erase(EraseArgs),
}

#[derive(Parser)]
pub struct ListArgs {
    /// Emit JSON line output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ReadArgs {
    /// First slot of the application to read.
    #[arg(long)]
    pub slot: usize,

    /// Destination file.
    pub file: PathBuf,

    /// Emit JSON line events to stdout.
    #[arg(long)]
    pub json: bool,

    /// Reduce output (only errors).
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// More logs to stderr.
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Parser)]
pub struct WriteArgs {
    /// Destination slot.
    #[arg(long)]
    pub slot: usize,

    /// Source file (GCB, ELF or DOL).
    pub file: PathBuf,

    /// Skip content detection and treat the file as this format.
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Emit JSON line events to stdout.
    #[arg(long)]
    pub json: bool,

    /// Reduce output (only errors).
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// More logs to stderr.
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Parser)]
pub struct EraseArgs {
    /// First slot to erase.
    pub slot: usize,

    /// Erase unconditionally, ignoring application boundaries.
    #[arg(long)]
    pub force: bool,

    /// Last slot of the forced range (defaults to SLOT).
    #[arg(long, requires = "force")]
    pub to: Option<usize>,

    /// Emit JSON line events to stdout.
    #[arg(long)]
    pub json: bool,

    /// Reduce output (only errors).
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// More logs to stderr.
    #[arg(long, short)]
    pub verbose: bool,
}
