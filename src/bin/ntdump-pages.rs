//! Purpose: `ntdump-pages` entry point: dump sealed pages and/or re-serialized metadata.
//! Role: Thin CLI over `api::Dumper::{dump_metadata, dump_pages}`.
//! Invariants: At least one of `-m`, `-a`, `-f` is required.
//! Invariants: Columns are resolved before anything is written, so a bad field writes nothing.
//! Invariants: Every fatal error is reported on stderr and exits with status 1.
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, ValueHint};
use ntdump::api::{
    DEFAULT_PAGE_TEMPLATE, Dumper, Error, ErrorKind, PageDumpOptions, PageFileTemplate,
    check_output_dir,
};
use ntdump::diagnostics::{EXIT_FAILURE, emit_error, init_tracing};

#[derive(Parser)]
#[command(
    name = "ntdump-pages",
    version,
    about = "Dump the sealed pages and metadata blocks of an ntuple",
    after_help = r#"EXAMPLES
  $ ntdump-pages -m -o ./meta data.ntpk events
  $ ntdump-pages -a data.ntpk events
  $ ntdump-pages -f jets -o ./pages data.ntpk events
  $ ntdump-pages -a --template '{column}.{cluster}.{page}.bin' data.ntpk events"#
)]
struct Cli {
    #[arg(short = 'm', long = "metadata", help = "Write header, page lists and footer")]
    metadata: bool,
    #[arg(short = 'a', long = "all", help = "Dump the pages of every column")]
    all: bool,
    #[arg(
        short = 'f',
        long = "field",
        help = "Dump the pages of this field and its subfields (dotted paths allowed)"
    )]
    field: Option<String>,
    #[arg(
        short = 'o',
        long = "output-dir",
        default_value = "./",
        help = "Existing directory receiving the dumped files",
        value_hint = ValueHint::DirPath
    )]
    output_dir: PathBuf,
    #[arg(
        long,
        default_value = DEFAULT_PAGE_TEMPLATE,
        help = "Page file name with {cluster}, {column} and {page} placeholders"
    )]
    template: String,
    #[arg(short = 'v', long, help = "Log debug details to stderr")]
    verbose: bool,
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
    if !cli.metadata && !cli.all && cli.field.is_none() {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_message("nothing to dump")
            .with_hint("Pass -m for metadata, -a for all pages or -f FIELD for one field."));
    }
    check_output_dir(&cli.output_dir)?;
    let options = PageDumpOptions {
        template: PageFileTemplate::parse(&cli.template)?,
    };

    let dumper = Dumper::open(&cli.file, &cli.ntuple)?;
    let columns = match (cli.all, cli.field.as_deref()) {
        (true, _) => Some(dumper.collect_columns("")?),
        (false, Some(field)) => Some(dumper.collect_columns(field)?),
        (false, None) => None,
    };

    if cli.metadata {
        for path in dumper.dump_metadata(&cli.output_dir)? {
            println!("Wrote {}", path.display());
        }
    }

    if let Some(columns) = columns {
        for column in &columns {
            println!(
                "Column {}: {}[{}]",
                column.column_id, column.field_path, column.column_index
            );
        }
        let stdout = io::stdout();
        let n_clusters = dumper.dump_pages(&columns, &cli.output_dir, &options, |done, total| {
            let mut out = stdout.lock();
            let _ = write!(out, "\rDumping pages... [{done} / {total} clusters processed]");
            let _ = out.flush();
        })?;
        println!();
        println!("Dumped data in {n_clusters} clusters!");
    }
    Ok(())
}
