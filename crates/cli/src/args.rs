use clap::Parser;
use std::path::PathBuf;

use opc6_core::{CoreConfig, Predication};

#[derive(Parser, Debug, Clone)]
#[command(name = "opc6-sim", version, about = "Run OPC6 program images")]
pub struct Args {
    /// Program image: Intel HEX or a `$readmemh` word list
    pub image: PathBuf,

    /// Core configuration file (TOML). Flags below override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stop after this many clocks
    #[arg(long, default_value_t = 1_000_000)]
    pub max_cycles: u64,

    /// Stop when an opcode at this address is fetched (hex: 0x1234 or decimal: 1234)
    #[arg(long = "break", value_parser = parse_hex_or_dec)]
    pub breakpoints: Vec<u16>,

    /// Interactive step debugger
    #[arg(long)]
    pub step: bool,

    /// Log every bus cycle
    #[arg(long)]
    pub trace: bool,

    /// Print an execution profile when the run stops
    #[arg(long)]
    pub profile: bool,

    /// r0 reads as zero everywhere
    #[arg(long)]
    pub zero_register: bool,

    /// Run false-predicate instructions through their full state path
    #[arg(long)]
    pub squash: bool,

    /// Drive int_b to LEVEL once CYCLE clocks have run (e.g. 500:2, 900:3)
    #[arg(long = "irq", value_parser = parse_irq)]
    pub irqs: Vec<IrqEvent>,

    /// Write a save state when the run stops (default: IMAGE with a .state extension)
    #[arg(long, num_args = 0..=1, value_name = "PATH")]
    pub save_state: Option<Option<PathBuf>>,

    /// Resume from a save state instead of reset
    #[arg(long)]
    pub load_state: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

/// A scheduled change of the interrupt pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqEvent {
    pub cycle: u64,
    pub level: u8,
}

impl Args {
    /// Build the core configuration from the file (if any) and flags.
    pub fn core_config(&self) -> opc6_core::Result<CoreConfig> {
        let mut config = match &self.config {
            Some(path) => CoreConfig::load(path)?,
            None => CoreConfig::default(),
        };
        if self.zero_register {
            config.zero_register = true;
        }
        if self.squash {
            config.predication = Predication::Squash;
        }
        Ok(config)
    }

    /// Where `--save-state` writes, if it was given.
    pub fn save_state_path(&self) -> Option<PathBuf> {
        match &self.save_state {
            Some(Some(path)) => Some(path.clone()),
            Some(None) => Some(opc6_core::savestate::state_path(&self.image)),
            None => None,
        }
    }

    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.trace {
            "info,opc6_core=trace"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

pub fn parse_hex_or_dec(s: &str) -> Result<u16, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}

pub fn parse_irq(s: &str) -> Result<IrqEvent, String> {
    let (cycle, level) = s.split_once(':')
        .ok_or_else(|| format!("expected CYCLE:LEVEL, got '{}'", s))?;
    let cycle = cycle.parse().map_err(|e| format!("bad cycle '{}': {}", cycle, e))?;
    let level: u8 = level.parse().map_err(|e| format!("bad level '{}': {}", level, e))?;
    if level > 3 {
        return Err(format!("int_b level must be 0..=3, got {}", level));
    }
    Ok(IrqEvent { cycle, level })
}
