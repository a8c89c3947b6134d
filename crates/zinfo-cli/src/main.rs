//! zinfo: seekable gzip span index CLI
//!
//! Commands:
//!   build <layer>            - decode a gzip layer once and write its span index
//!   info <index>             - show span count, span size and checkpoint offsets
//!   extract <layer>          - reconstruct an uncompressed range with ranged reads
//!   digest <index> <layer>   - print per-span BLAKE3 digests of the compressed bytes
//!   config show              - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use zinfo_core::config::{default_config_path, ZinfoConfig};
use zinfo_core::Toc;
use zinfo_index::{
    extract_range_from_source, extract_range_from_source_verified, span_digests, IndexBuilder,
    RangeSource, SeekableIndex, SpanDigests, SpanIndex, Zinfo,
};
use zinfo_storage::{Credentials, FileSource, OperatorSource};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "zinfo",
    version,
    about = "Seekable gzip span index",
    long_about = "zinfo: build span indexes for gzip layers and extract byte ranges from them"
)]
struct Cli {
    /// Path to zinfo.toml configuration file
    /// (default: $XDG_CONFIG_HOME/zinfo/config.toml)
    #[arg(long, short = 'c', env = "ZINFO_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "ZINFO_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "ZINFO_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a span index for a local gzip layer
    Build {
        /// gzip layer (e.g. layer.tar.gz)
        layer: PathBuf,
        /// Output index path (default: <layer>.zinfo)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Minimum uncompressed bytes between checkpoints (overrides config)
        #[arg(long)]
        span_size: Option<u64>,
        /// Skip the gzip CRC-32/length trailer check
        #[arg(long)]
        no_verify: bool,
    },

    /// Show the contents of an index blob
    Info {
        /// Index blob written by `zinfo build`
        index: PathBuf,
    },

    /// Extract an uncompressed byte range, fetching only the spans that cover it
    ///
    /// With --remote the layer is an object path read through the configured
    /// storage backend. Credentials are read from AWS_ACCESS_KEY_ID and
    /// AWS_SECRET_ACCESS_KEY.
    Extract {
        /// Layer path (local file, or object path with --remote)
        layer: String,
        /// Index blob; when omitted a gzip layer is indexed in memory and any
        /// other layer is read as uncompressed
        #[arg(long, short = 'i')]
        index: Option<PathBuf>,
        /// Read the layer through the configured storage backend
        #[arg(long)]
        remote: bool,
        /// Uncompressed start offset
        #[arg(long, conflicts_with = "file")]
        offset: Option<u64>,
        /// Number of bytes to extract
        #[arg(long, conflicts_with = "file")]
        size: Option<u64>,
        /// TOC (JSON) mapping file names to uncompressed ranges
        #[arg(long, requires = "file")]
        toc: Option<PathBuf>,
        /// File inside the layer to extract (looked up in --toc)
        #[arg(long, requires = "toc")]
        file: Option<String>,
        /// Per-span digests written by `zinfo digest`; spans that do not match
        /// are rejected
        #[arg(long)]
        digests: Option<PathBuf>,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Print BLAKE3 digests of each span's compressed bytes
    Digest {
        /// Index blob
        index: PathBuf,
        /// Local gzip layer the index was built from
        layer: PathBuf,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = ZinfoConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.as_deref().unwrap_or(&config.log.level);
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(level, &format);
    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "zinfo starting"
    );

    match cli.command {
        Commands::Build {
            layer,
            output,
            span_size,
            no_verify,
        } => cmd_build(&config, &layer, output.as_deref(), span_size, no_verify),
        Commands::Info { index } => cmd_info(&index),
        Commands::Extract {
            layer,
            index,
            remote,
            offset,
            size,
            toc,
            file,
            digests,
            output,
        } => {
            let range = resolve_range(offset, size, toc.as_deref(), file.as_deref())?;
            let opts = ExtractOptions {
                index,
                range,
                digests,
                output,
            };
            if remote {
                let op = build_operator_from_env(&config)?;
                let src = OperatorSource::open(op, layer.as_str())
                    .await
                    .with_context(|| format!("opening remote layer: {layer}"))?;
                cmd_extract(&config, &src, &opts).await
            } else {
                let src = FileSource::open(&layer)
                    .with_context(|| format!("opening layer: {layer}"))?;
                cmd_extract(&config, &src, &opts).await
            }
        }
        Commands::Digest {
            index,
            layer,
            output,
        } => cmd_digest(&index, &layer, output.as_deref()),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so extracted bytes on stdout stay clean
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Storage operator from environment credentials ─────────────────────────────

/// Build an OpenDAL operator from config, taking S3 credentials from the
/// standard AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY environment variables.
fn build_operator_from_env(config: &ZinfoConfig) -> Result<opendal::Operator> {
    let credentials = if config.storage.endpoint.is_empty() {
        None
    } else {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("ZINFO_ACCESS_KEY_ID"))
            .context(
                "S3 credentials not set\n\
                 Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.",
            )?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("ZINFO_SECRET_ACCESS_KEY"))
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        Some(Credentials {
            access_key_id,
            secret_access_key,
        })
    };

    zinfo_storage::build_from_core_config(&config.storage, credentials.as_ref())
        .context("building storage operator")
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `zinfo build` ─────────────────────────────────────────────────────────────

fn cmd_build(
    config: &ZinfoConfig,
    layer: &Path,
    output: Option<&Path>,
    span_size: Option<u64>,
    no_verify: bool,
) -> Result<()> {
    let mut index_config = config.index.clone();
    if let Some(size) = span_size {
        index_config.span_size = size;
    }
    if no_verify {
        index_config.verify_trailer = false;
    }
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_index_path(layer));

    let pb = make_spinner("build");
    pb.set_message(format!("{}", layer.display()));

    let data = std::fs::read(layer).with_context(|| format!("reading {}", layer.display()))?;
    let index = IndexBuilder::from_config(&index_config)
        .build_from_bytes(&data)
        .with_context(|| format!("indexing {}", layer.display()))?;
    let blob = index.to_bytes();
    std::fs::write(&output, &blob).with_context(|| format!("writing {}", output.display()))?;

    pb.finish_with_message("done".to_string());
    info!(spans = index.span_count(), index = %output.display(), "wrote span index");
    println!("  layer:      {} ({})", layer.display(), fmt_bytes(data.len() as u64));
    println!("  spans:      {}", index.span_count());
    println!("  span size:  {}", fmt_bytes(index.span_size()));
    println!("  index:      {} ({})", output.display(), fmt_bytes(blob.len() as u64));
    Ok(())
}

fn default_index_path(layer: &Path) -> PathBuf {
    let mut name = layer.as_os_str().to_os_string();
    name.push(".zinfo");
    PathBuf::from(name)
}

fn load_index(path: &Path) -> Result<SpanIndex> {
    let blob = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    SpanIndex::from_bytes(&blob).with_context(|| format!("parsing index {}", path.display()))
}

// ── `zinfo info` ──────────────────────────────────────────────────────────────

fn cmd_info(path: &Path) -> Result<()> {
    let index = load_index(path)?;
    println!("index:      {}", path.display());
    println!("spans:      {}", index.span_count());
    println!("span size:  {} ({} bytes)", fmt_bytes(index.span_size()), index.span_size());
    println!();
    println!("{:>6}  {:>14}  {:>14}  {:>4}", "span", "compressed", "uncompressed", "bits");
    for (span, p) in index.points().iter().enumerate() {
        println!(
            "{:>6}  {:>14}  {:>14}  {:>4}",
            span, p.in_offset, p.out_offset, p.bits
        );
    }
    Ok(())
}

// ── `zinfo extract` ───────────────────────────────────────────────────────────

struct ExtractOptions {
    index: Option<PathBuf>,
    range: (u64, u64),
    digests: Option<PathBuf>,
    output: Option<PathBuf>,
}

/// Uncompressed `(offset, size)` from explicit flags or a TOC lookup.
fn resolve_range(
    offset: Option<u64>,
    size: Option<u64>,
    toc: Option<&Path>,
    file: Option<&str>,
) -> Result<(u64, u64)> {
    match (toc, file) {
        (Some(toc_path), Some(name)) => {
            let toc = Toc::load(toc_path)
                .with_context(|| format!("loading TOC {}", toc_path.display()))?;
            let entry = toc
                .find(name)
                .with_context(|| format!("{name} not found in {}", toc_path.display()))?;
            let (start, end) = entry.range()?;
            Ok((start, end - start))
        }
        _ => {
            let offset = offset.context("--offset is required (or use --toc and --file)")?;
            let size = size.context("--size is required (or use --toc and --file)")?;
            Ok((offset, size))
        }
    }
}

async fn cmd_extract<S: RangeSource>(
    config: &ZinfoConfig,
    src: &S,
    opts: &ExtractOptions,
) -> Result<()> {
    let (offset, size) = opts.range;
    let pb = make_spinner("extract");

    let index = match &opts.index {
        Some(path) => Zinfo::Gzip(load_index(path)?),
        None => {
            pb.set_message("indexing layer...".to_string());
            let whole = src
                .read_range(0, src.size())
                .await
                .context("reading layer")?;
            let builder = IndexBuilder::from_config(&config.index);
            Zinfo::build(&builder, config.index.span_size, &whole).context("indexing layer")?
        }
    };

    pb.set_message(format!("{} bytes at {}", size, offset));
    let data = match &opts.digests {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let digests = SpanDigests::from_hex_lines(&text)?;
            extract_range_from_source_verified(&index, src, offset, size, &digests).await?
        }
        None => extract_range_from_source(&index, src, offset, size).await?,
    };
    pb.finish_and_clear();

    info!(
        offset,
        size,
        first_span = index.span_for_offset(offset),
        last_span = index.span_for_offset(offset.saturating_add(size)),
        "extracted range"
    );
    match &opts.output {
        Some(path) => {
            std::fs::write(path, &data).with_context(|| format!("writing {}", path.display()))?
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data).context("writing to stdout")?;
            stdout.flush().context("flushing stdout")?;
        }
    }
    Ok(())
}

// ── `zinfo digest` ────────────────────────────────────────────────────────────

fn cmd_digest(index_path: &Path, layer: &Path, output: Option<&Path>) -> Result<()> {
    let index = load_index(index_path)?;
    let data = std::fs::read(layer).with_context(|| format!("reading {}", layer.display()))?;
    let digests = span_digests(&index, &data)
        .with_context(|| format!("hashing spans of {}", layer.display()))?;
    let text = digests.to_hex_lines();
    match output {
        Some(path) => {
            std::fs::write(path, &text).with_context(|| format!("writing {}", path.display()))?
        }
        None => print!("{text}"),
    }
    Ok(())
}

// ── `zinfo config show` ───────────────────────────────────────────────────────

fn cmd_config_show(config: &ZinfoConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
