//! Purpose: `ntdump-column-data` entry point: print the decoded values of one column.
//! Role: Thin CLI over `api::Dumper::dump_column_data`.
//! Invariants: stdout (or the `-o` file) holds only values, one per line.
//! Invariants: Every fatal error is reported on stderr and exits with status 1.
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use clap::{Parser, ValueHint};
use ntdump::api::{Dumper, Error, check_output_file};
use ntdump::core::error::io_error;
use ntdump::diagnostics::{EXIT_FAILURE, emit_error, init_tracing};

#[derive(Parser)]
#[command(
    name = "ntdump-column-data",
    version,
    about = "Print the decoded values of one column of an ntuple",
    after_help = r#"EXAMPLES
  $ ntdump-column-data 3 data.ntpk events
  $ ntdump-column-data -n 10 -o ./px.txt 0 data.ntpk events"#
)]
struct Cli {
    #[arg(
        short = 'n',
        long = "max",
        default_value_t = 0,
        help = "Stop after this many values (0 = all)"
    )]
    max: u64,
    #[arg(
        short = 'o',
        long = "output",
        help = "Write values to this file instead of stdout (must include a directory, e.g. ./out.txt)",
        value_hint = ValueHint::FilePath
    )]
    output: Option<PathBuf>,
    #[arg(short = 'v', long, help = "Log debug details to stderr")]
    verbose: bool,
    #[arg(help = "Physical column id")]
    column_id: u64,
    #[arg(help = "Container file", value_hint = ValueHint::FilePath)]
    file: PathBuf,
    #[arg(help = "Name of the ntuple inside the file")]
    ntuple: String,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        emit_error(&err);
        std::process::exit(EXIT_FAILURE);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    if let Some(path) = &cli.output {
        check_output_file(path)?;
    }
    let limit = (cli.max > 0).then_some(cli.max);
    let dumper = Dumper::open(&cli.file, &cli.ntuple)?;
    let column_type = dumper.decodable_column_type(cli.column_id)?;
    eprintln!(
        "Reading column {} ({column_type}) from '{}' (in '{}')",
        cli.column_id,
        cli.ntuple,
        cli.file.display()
    );

    match &cli.output {
        Some(path) => {
            let file = File::create(path).map_err(|err| io_error(err, path))?;
            let mut out = BufWriter::new(file);
            dumper.dump_column_data(cli.column_id, limit, &mut out)?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            dumper.dump_column_data(cli.column_id, limit, &mut out)?;
        }
    }
    Ok(())
}
