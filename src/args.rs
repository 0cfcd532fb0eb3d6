/*
 * args.rs
 *
 * Hand-rolled argv parsing for the linepool CLI. Two subcommands and a
 * handful of flags don't justify a parser crate, and this stays no_std:
 * errors borrow the offending argument instead of allocating.
 *
 *   linepool size  BLOCK_SIZE COUNT [-c LINE] [--json]
 *   linepool probe BLOCK_SIZE COUNT [-c LINE] [--json] [-v]
 */

use core::fmt;

use crate::layout::DEFAULT_CACHE_LINE_SIZE;

pub const USAGE: &str = "\
usage: linepool size  BLOCK_SIZE COUNT [-c LINE] [--json]
       linepool probe BLOCK_SIZE COUNT [-c LINE] [--json] [-v]

  size   print the chunk layout and the bytes a pool needs
  probe  build a pool, allocate every block, verify, free, report

options:
  -c, --cache-line LINE  cache line size in bytes (default 128, power of two)
      --json             machine-readable output
  -v, --verbose          probe: print every block address
  -h, --help             this text
  -V, --version          version";

/// Geometry and output flags shared by both subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub block_size: u32,
    pub blocks_in_chunk: u32,
    pub cache_line_size: u32,
    pub json: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Size(Options),
    Probe(Options),
    Help,
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgError<'a> {
    MissingCommand,
    UnknownCommand(&'a str),
    UnknownOption(&'a str),
    MissingValue(&'a str),
    InvalidNumber(&'a str),
    MissingOperand(&'static str),
    UnexpectedOperand(&'a str),
}

impl fmt::Display for ArgError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCommand => write!(f, "missing command"),
            Self::UnknownCommand(s) => write!(f, "unknown command '{s}'"),
            Self::UnknownOption(s) => write!(f, "unknown option '{s}'"),
            Self::MissingValue(s) => write!(f, "option '{s}' needs a value"),
            Self::InvalidNumber(s) => write!(f, "'{s}' is not a valid unsigned 32-bit number"),
            Self::MissingOperand(name) => write!(f, "missing {name}"),
            Self::UnexpectedOperand(s) => write!(f, "unexpected argument '{s}'"),
        }
    }
}

fn parse_u32(s: &str) -> Result<u32, ArgError<'_>> {
    s.parse::<u32>().map_err(|_| ArgError::InvalidNumber(s))
}

/// Parse argv without the program name.
pub fn parse_args<'a>(args: &[&'a str]) -> Result<Command, ArgError<'a>> {
    let Some((&first, rest)) = args.split_first() else {
        return Err(ArgError::MissingCommand);
    };

    let probe = match first {
        "-h" | "--help" | "help" => return Ok(Command::Help),
        "-V" | "--version" => return Ok(Command::Version),
        "size" => false,
        "probe" => true,
        other if other.starts_with('-') => return Err(ArgError::UnknownOption(other)),
        other => return Err(ArgError::UnknownCommand(other)),
    };

    let mut cache_line_size = DEFAULT_CACHE_LINE_SIZE;
    let mut json = false;
    let mut verbose = false;
    let mut operands: [Option<u32>; 2] = [None, None];
    let mut filled = 0;

    let mut iter = rest.iter().copied();
    while let Some(arg) = iter.next() {
        match arg {
            "-h" | "--help" => return Ok(Command::Help),
            "--json" => json = true,
            "-v" | "--verbose" if probe => verbose = true,
            "-c" | "--cache-line" => {
                let value = iter.next().ok_or(ArgError::MissingValue(arg))?;
                cache_line_size = parse_u32(value)?;
            }
            _ if arg.starts_with("--cache-line=") => {
                cache_line_size = parse_u32(&arg["--cache-line=".len()..])?;
            }
            _ if arg.starts_with('-') && arg.len() > 1 => {
                return Err(ArgError::UnknownOption(arg));
            }
            _ => {
                if filled == operands.len() {
                    return Err(ArgError::UnexpectedOperand(arg));
                }
                operands[filled] = Some(parse_u32(arg)?);
                filled += 1;
            }
        }
    }

    let options = Options {
        block_size: operands[0].ok_or(ArgError::MissingOperand("BLOCK_SIZE"))?,
        blocks_in_chunk: operands[1].ok_or(ArgError::MissingOperand("COUNT"))?,
        cache_line_size,
        json,
        verbose,
    };

    Ok(if probe {
        Command::Probe(options)
    } else {
        Command::Size(options)
    })
}
