use clap::{Parser, Subcommand};
use fqc::config::{CompressConfig, DecompressConfig, StreamSelector};
use fqc::format::{IdMode, PeLayout, QualityMode};
use fqc::{compress_to_archive, compress_to_archive_seekable, ArchiveReader, FqcError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fqc", version = "1.0.0", about = "Block-oriented, random-access compressor for FASTQ sequencing data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a FASTQ file into a .fqc archive
    Compress {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value_t = num_cpus_fallback())]
        threads: usize,
        #[arg(long, default_value_t = 4096)]
        memory_limit: u64,
        #[arg(long)]
        block_size: Option<u32>,
        #[arg(long, default_value_t = 3)]
        compression_level: i32,
        #[arg(long, default_value = "lossless")]
        quality_mode: String,
        #[arg(long, default_value = "exact")]
        id_mode: String,
        #[arg(long, default_value_t = true, overrides_with = "no_reorder")]
        reorder: bool,
        #[arg(long, default_value_t = false, overrides_with = "reorder")]
        no_reorder: bool,
        /// Treat the input as an unseekable stream: forces preserve-order
        /// and disables global reordering.
        #[arg(long)]
        streaming: bool,
        #[arg(long)]
        paired: bool,
        #[arg(long, default_value = "interleaved")]
        pe_layout: String,
        #[arg(long, default_value_t = String::from("!"))]
        placeholder_qual: String,
        #[arg(long, default_value_t = String::new())]
        id_prefix: String,
    },
    /// Decompress a .fqc archive back to FASTQ
    Decompress {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 1-based inclusive archive-ID range, e.g. "150001:250000"
        #[arg(long)]
        range: Option<String>,
        #[arg(long)]
        original_order: bool,
        #[arg(long, default_value = "all")]
        streams: String,
        #[arg(long, default_value_t = String::from("!"))]
        placeholder_qual: String,
        #[arg(long, default_value_t = String::new())]
        id_prefix: String,
        #[arg(long)]
        skip_corrupted: bool,
    },
    /// Print archive metadata
    Info { input: PathBuf },
    /// Validate the footer sentinel, global checksum, and every block checksum
    Verify { input: PathBuf },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("fqc: {err}");
        std::process::exit(err.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), FqcError> {
    match cli.command {
        Commands::Compress {
            input,
            output,
            threads,
            memory_limit,
            block_size,
            compression_level,
            quality_mode,
            id_mode,
            reorder,
            no_reorder,
            streaming,
            paired,
            pe_layout,
            placeholder_qual,
            id_prefix,
        } => {
            let config = CompressConfig {
                threads,
                memory_limit_mb: memory_limit,
                block_size,
                compression_level,
                quality_mode: parse_quality_mode(&quality_mode)?,
                id_mode: parse_id_mode(&id_mode)?,
                reorder: reorder && !no_reorder,
                streaming,
                paired,
                pe_layout: parse_pe_layout(&pe_layout)?,
                placeholder_qual: parse_placeholder_qual(&placeholder_qual)?,
                id_prefix,
                ..CompressConfig::default()
            };
            config.validate()?;

            let cancel = install_cancel_handler();
            let original_filename = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let timestamp = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);

            if streaming && input == PathBuf::from("-") {
                compress_to_archive(&config, std::io::stdin().lock(), &output, &original_filename, timestamp, &cancel)?;
            } else {
                let file = std::fs::File::open(&input)?;
                compress_to_archive_seekable(&config, file, &output, &original_filename, timestamp, &cancel)?;
            }
            println!("compressed {} -> {}", input.display(), output.display());
        }

        Commands::Decompress { input, output, range, original_order, streams, placeholder_qual, id_prefix, skip_corrupted } => {
            let mut reader = ArchiveReader::open(&input)?;
            let config = DecompressConfig {
                range: range.map(|r| parse_range(&r, reader.global_header.total_read_count)).transpose()?,
                original_order,
                streams: parse_stream_selector(&streams)?,
                placeholder_qual: parse_placeholder_qual(&placeholder_qual)?,
                id_prefix,
                skip_corrupted,
            };

            match output {
                Some(path) => {
                    let mut out = std::fs::File::create(&path)?;
                    reader.decompress(&config, &mut out)?;
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut out = stdout.lock();
                    reader.decompress(&config, &mut out)?;
                }
            }
        }

        Commands::Info { input } => {
            let reader = ArchiveReader::open(&input)?;
            let header = &reader.global_header;
            let file_size = std::fs::metadata(&input)?.len();
            println!("── .fqc archive ─────────────────────────────────────────");
            println!("  Path             {}", input.display());
            println!("  File size        {} B", file_size);
            println!("  Original name    {}", header.original_filename);
            println!("  Total reads      {}", header.total_read_count);
            println!("  Paired end       {}", header.flags.paired_end());
            println!("  PE layout        {:?}", header.flags.pe_layout());
            println!("  Preserve order   {}", header.flags.preserve_order());
            println!("  Reorder map      {}", header.flags.reorder_map_present());
            println!("  Quality mode     {:?}", header.flags.quality_mode());
            println!("  ID mode          {:?}", header.flags.id_mode());
            println!("  Read-length class {:?}", header.flags.read_length_class());
            println!("  Streaming mode   {}", header.flags.streaming_mode());
        }

        Commands::Verify { input } => {
            let mut reader = ArchiveReader::open(&input)?;
            reader.verify()?;
            println!("OK: {} verified ({} reads)", input.display(), reader.global_header.total_read_count);
        }
    }
    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Installs a best-effort SIGINT/SIGTERM handler that flips a shared
/// cancellation flag (spec §5: "a best-effort signal handler... invokes
/// abort() on every live writer"); the pipeline observes this flag at chunk
/// and block granularity and unwinds with a cancelled error, whose Drop
/// impl on `Writer` removes the half-written temp file.
fn install_cancel_handler() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    if let Err(e) = unsafe { signal_hook::low_level::register(signal_hook::consts::SIGINT, move || flag.store(true, Ordering::Relaxed)) } {
        log::warn!("failed to install SIGINT handler: {e}");
    }
    let flag = cancel.clone();
    if let Err(e) = unsafe { signal_hook::low_level::register(signal_hook::consts::SIGTERM, move || flag.store(true, Ordering::Relaxed)) } {
        log::warn!("failed to install SIGTERM handler: {e}");
    }
    cancel
}

fn parse_quality_mode(s: &str) -> Result<QualityMode, FqcError> {
    match s {
        "lossless" => Ok(QualityMode::Lossless),
        "illumina8" => Ok(QualityMode::Illumina8Bin),
        "qvz" => Ok(QualityMode::Qvz),
        "discard" => Ok(QualityMode::Discard),
        other => Err(FqcError::Usage(format!("unknown --quality-mode '{other}'"))),
    }
}

fn parse_id_mode(s: &str) -> Result<IdMode, FqcError> {
    match s {
        "exact" => Ok(IdMode::Exact),
        "tokenise" => Ok(IdMode::Tokenise),
        "discard" => Ok(IdMode::Discard),
        other => Err(FqcError::Usage(format!("unknown --id-mode '{other}'"))),
    }
}

fn parse_pe_layout(s: &str) -> Result<PeLayout, FqcError> {
    match s {
        "interleaved" => Ok(PeLayout::Interleaved),
        "consecutive" => Ok(PeLayout::Consecutive),
        other => Err(FqcError::Usage(format!("unknown --pe-layout '{other}'"))),
    }
}

fn parse_stream_selector(s: &str) -> Result<StreamSelector, FqcError> {
    match s {
        "id" => Ok(StreamSelector::Id),
        "seq" => Ok(StreamSelector::Seq),
        "qual" => Ok(StreamSelector::Qual),
        "all" => Ok(StreamSelector::All),
        other => Err(FqcError::Usage(format!("unknown --streams '{other}'"))),
    }
}

fn parse_placeholder_qual(s: &str) -> Result<u8, FqcError> {
    let mut bytes = s.bytes();
    match (bytes.next(), bytes.next()) {
        (Some(b), None) => Ok(b),
        _ => Err(FqcError::Usage(format!("--placeholder-qual must be exactly one character, got '{s}'"))),
    }
}

/// Parses `a:b`, `:b` (⇒ `1:b`) and `a:` (⇒ `a:total`), converting the
/// 1-based inclusive CLI range to the 0-based inclusive pair the reader
/// expects (spec §6).
fn parse_range(s: &str, total_reads: u64) -> Result<(u64, u64), FqcError> {
    let (a_str, b_str) = s
        .split_once(':')
        .ok_or_else(|| FqcError::Usage(format!("--range must be of the form a:b, a:, or :b, got '{s}'")))?;

    let a: u64 = if a_str.is_empty() { 1 } else { a_str.parse().map_err(|_| FqcError::Usage(format!("invalid --range start '{a_str}'")))? };
    let b: u64 = if b_str.is_empty() {
        total_reads
    } else {
        b_str.parse().map_err(|_| FqcError::Usage(format!("invalid --range end '{b_str}'")))?
    };
    if a == 0 || a > b {
        return Err(FqcError::Usage(format!("--range '{s}' is not a valid 1-based inclusive range")));
    }
    Ok((a - 1, b - 1))
}
