//! pbwire - Inspect, verify and fingerprint Protocol Buffer payloads
//!
//! This tool decodes binary protobuf payloads without generated code,
//! keeping every field as raw wire values, and either prints them, checks
//! that re-encoding reproduces the input, or hashes the canonical encoding.

use anyhow::{bail, Context as _, Result};
use clap::{Args, Parser, ValueEnum};
use pbwire_core::io::{DEFAULT_RECURSION_LIMIT, DEFAULT_SIZE_LIMIT};
use pbwire_core::schema::decode_file_descriptor_set;
use pbwire_core::wire::decode_varint;
use pbwire_core::{Message, MessageLayout, ReaderConfig, UnknownFieldSet, WireValues};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Number of payload bytes shown in a hex preview
const HEX_PREVIEW_LEN: usize = 32;

/// Inspect, verify and fingerprint Protocol Buffer payloads
#[derive(Parser, Debug)]
#[command(name = "pbwire")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// What to do with each payload
    #[arg(long, value_enum, default_value = "dump")]
    format: OutputFormat,

    /// Maximum nesting depth of messages and groups
    #[arg(long, default_value_t = DEFAULT_RECURSION_LIMIT)]
    recursion_limit: usize,

    /// Maximum payload size in bytes
    #[arg(long, default_value_t = DEFAULT_SIZE_LIMIT)]
    size_limit: usize,

    /// Treat each file as a stream of varint length-prefixed messages
    #[arg(long)]
    length_delimited: bool,

    /// Serialized FileDescriptorSet used to name known fields
    #[arg(long, requires = "message")]
    descriptor_set: Option<PathBuf>,

    /// Fully qualified message type of the payload, e.g. `pkg.Outer`
    #[arg(long, requires = "descriptor_set")]
    message: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single payload file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of payload files to process
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Operation applied to each payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Print the decoded field tree
    Dump,
    /// Re-encode and compare with the input
    Verify,
    /// BLAKE3 digest of the canonical re-encoding
    Digest,
}

/// Outcome of re-encoding a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    /// Re-encoding reproduced the input exactly
    Identical,
    /// Same length, different bytes: fields came back in canonical order
    Reordered,
    /// Re-encoding differs in length
    Mismatch,
}

impl Verdict {
    fn of(original: &[u8], encoded: &[u8]) -> Self {
        if original == encoded {
            Verdict::Identical
        } else if original.len() == encoded.len() {
            Verdict::Reordered
        } else {
            Verdict::Mismatch
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Verdict::Identical => "identical",
            Verdict::Reordered => "reordered",
            Verdict::Mismatch => "MISMATCH",
        }
    }
}

/// Settings shared by every processed file
struct Context {
    format: OutputFormat,
    config: ReaderConfig,
    length_delimited: bool,
    layout: Option<MessageLayout>,
}

impl Context {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let layout = match (&cli.descriptor_set, &cli.message) {
            (Some(path), Some(name)) => Some(load_layout(path, name)?),
            _ => None,
        };
        Ok(Self {
            format: cli.format,
            config: ReaderConfig::new()
                .recursion_limit(cli.recursion_limit)
                .size_limit(cli.size_limit),
            length_delimited: cli.length_delimited,
            layout,
        })
    }
}

#[derive(Debug, Default)]
struct RunStats {
    processed: usize,
    failed: usize,
    mismatched: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::from_cli(&cli)?;

    // Dispatch based on input mode
    let stats = if let Some(ref file) = cli.input.file {
        process_single_file(&ctx, file)?
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&ctx, directory)?
    } else {
        bail!("Either --file or --directory must be specified")
    };

    info!(
        "Summary: {} processed, {} failed, {} mismatched",
        stats.processed, stats.failed, stats.mismatched
    );

    if stats.mismatched > 0 {
        bail!("{} payload(s) failed verification", stats.mismatched);
    }
    Ok(())
}

/// Resolve the message layout used to annotate dumps
fn load_layout(path: &Path, name: &str) -> Result<MessageLayout> {
    let data = fs::read(path)
        .with_context(|| format!("Failed to read descriptor set: {}", path.display()))?;
    let files = decode_file_descriptor_set(&data)
        .with_context(|| format!("Failed to parse descriptor set: {}", path.display()))?;
    match MessageLayout::find(&files, name)? {
        Some(layout) => {
            debug!("Loaded layout for {} ({} fields)", layout.full_name, layout.fields().count());
            Ok(layout)
        }
        None => bail!("Message {} not found in {}", name, path.display()),
    }
}

/// Process a single payload file
fn process_single_file(ctx: &Context, file: &Path) -> Result<RunStats> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let mut stats = RunStats::default();
    let mut out = String::new();
    process_file(ctx, file, &mut stats, &mut out)?;
    print!("{}", out);
    Ok(stats)
}

/// Process a directory of payload files recursively
fn process_directory(ctx: &Context, directory: &Path) -> Result<RunStats> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut stats = RunStats::default();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() || is_hidden(path) {
            continue;
        }

        debug!("Processing payload: {}", path.display());
        let mut out = String::new();
        match process_file(ctx, path, &mut stats, &mut out) {
            Ok(()) => print!("{}", out),
            Err(e) => {
                // Log error but continue with other files
                warn!("Error processing {}: {:#}", path.display(), e);
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Decode every message in `path` and apply the selected operation
fn process_file(ctx: &Context, path: &Path, stats: &mut RunStats, out: &mut String) -> Result<()> {
    trace!("Reading {}", path.display());

    let data = fs::read(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    trace!("Read {} bytes from {}", data.len(), path.display());

    if ctx.length_delimited {
        let mut rest = data.as_slice();
        let mut index = 0;
        while !rest.is_empty() {
            let (length, prefix_len) = decode_varint(rest).with_context(|| {
                format!("Failed to read length of message {} of {}", index, path.display())
            })?;
            let end = usize::try_from(length)
                .ok()
                .and_then(|length| prefix_len.checked_add(length))
                .filter(|&end| end <= rest.len())
                .with_context(|| {
                    format!("Message {} of {} is truncated", index, path.display())
                })?;
            let body = &rest[prefix_len..end];
            let set = UnknownFieldSet::decode_with_config(body, ctx.config.clone())
                .with_context(|| {
                    format!("Failed to decode message {} of {}", index, path.display())
                })?;
            let label = format!("{}#{}", path.display(), index);
            apply(ctx, &label, body, &set, stats, out)?;
            rest = &rest[end..];
            index += 1;
        }
        debug!("Read {} message(s) from {}", index, path.display());
        return Ok(());
    }

    let set = UnknownFieldSet::decode_with_config(&data, ctx.config.clone())
        .with_context(|| format!("Failed to decode payload: {}", path.display()))?;
    apply(ctx, &path.display().to_string(), &data, &set, stats, out)
}

fn apply(
    ctx: &Context,
    label: &str,
    original: &[u8],
    set: &UnknownFieldSet,
    stats: &mut RunStats,
    out: &mut String,
) -> Result<()> {
    stats.processed += 1;
    match ctx.format {
        OutputFormat::Dump => {
            writeln!(out, "# {} ({} bytes)", label, original.len())?;
            render_dump(set, ctx.layout.as_ref(), 0, out)?;
        }
        OutputFormat::Verify => {
            let encoded = set.encode_to_vec()?;
            let verdict = Verdict::of(original, &encoded);
            if verdict == Verdict::Mismatch {
                warn!(
                    "{}: re-encoded to {} bytes, input had {}",
                    label,
                    encoded.len(),
                    original.len()
                );
                stats.mismatched += 1;
            }
            writeln!(out, "{}  {}", verdict.as_str(), label)?;
        }
        OutputFormat::Digest => {
            writeln!(out, "{}  {}", digest(set)?, label)?;
        }
    }
    Ok(())
}

/// First 16 hex chars of the BLAKE3 hash of the canonical encoding
fn digest(set: &UnknownFieldSet) -> Result<String> {
    let encoded = set.encode_to_vec()?;
    let hash = blake3::hash(&encoded);
    Ok(hash.to_hex()[..16].to_string())
}

/// Write the field tree of `set`, one value per line
fn render_dump(
    set: &UnknownFieldSet,
    layout: Option<&MessageLayout>,
    depth: usize,
    out: &mut String,
) -> std::fmt::Result {
    let indent = "  ".repeat(depth);
    for (number, field) in set.iter() {
        let name = layout
            .and_then(|l| l.field(number))
            .map(|f| format!(" {} {}", f.field_type, f.name))
            .unwrap_or_default();
        for list in field.lists() {
            let wire = list.wire_type();
            match list {
                WireValues::Varint(values) => {
                    for value in values {
                        write!(out, "{}{}{} {}: {}", indent, number, name, wire, value)?;
                        if *value > i64::MAX as u64 {
                            write!(out, " ({})", *value as i64)?;
                        }
                        writeln!(out)?;
                    }
                }
                WireValues::Fixed32(values) => {
                    for value in values {
                        writeln!(
                            out,
                            "{}{}{} {}: 0x{:08x} ({})",
                            indent,
                            number,
                            name,
                            wire,
                            value,
                            f32::from_bits(*value)
                        )?;
                    }
                }
                WireValues::Fixed64(values) => {
                    for value in values {
                        writeln!(
                            out,
                            "{}{}{} {}: 0x{:016x} ({})",
                            indent,
                            number,
                            name,
                            wire,
                            value,
                            f64::from_bits(*value)
                        )?;
                    }
                }
                WireValues::LengthDelimited(values) => {
                    for value in values {
                        write!(out, "{}{}{} {}[{}]: ", indent, number, name, wire, value.len())?;
                        match printable_text(value) {
                            Some(text) => writeln!(out, "{:?}", text)?,
                            None => writeln!(out, "{}", hex_preview(value))?,
                        }
                    }
                }
                WireValues::Group(groups) => {
                    for group in groups {
                        writeln!(out, "{}{}{} {} {{", indent, number, name, wire)?;
                        render_dump(group, None, depth + 1, out)?;
                        writeln!(out, "{}}}", indent)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Returns the payload as text if it is UTF-8 without control characters
fn printable_text(data: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(data).ok()?;
    text.chars()
        .all(|c| !c.is_control() || c == '\n' || c == '\t')
        .then_some(text)
}

fn hex_preview(data: &[u8]) -> String {
    let mut hex = String::with_capacity(HEX_PREVIEW_LEN * 2 + 3);
    for byte in data.iter().take(HEX_PREVIEW_LEN) {
        let _ = write!(hex, "{:02x}", byte);
    }
    if data.len() > HEX_PREVIEW_LEN {
        hex.push_str("...");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbwire_core::UnknownField;
    use tempfile::TempDir;

    fn context(format: OutputFormat) -> Context {
        Context {
            format,
            config: ReaderConfig::new(),
            length_delimited: false,
            layout: None,
        }
    }

    fn sample_set() -> UnknownFieldSet {
        // 1: 150, 2: "hi", 3: group { 1: 7 }
        UnknownFieldSet::decode(&[0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i', 0x1B, 0x08, 0x07, 0x1C])
            .unwrap()
    }

    #[test]
    fn test_render_dump() {
        let mut out = String::new();
        render_dump(&sample_set(), None, 0, &mut out).unwrap();
        assert_eq!(
            out,
            "1 varint: 150\n2 len[2]: \"hi\"\n3 sgroup {\n  1 varint: 7\n}\n"
        );
    }

    #[test]
    fn test_render_negative_and_binary() {
        let mut field = UnknownField::new();
        field.add_varint(u64::MAX).add_length_delimited(vec![0u8, 0xFF]);
        let mut set = UnknownFieldSet::new();
        set.add_field(4, field).unwrap();

        let mut out = String::new();
        render_dump(&set, None, 0, &mut out).unwrap();
        assert_eq!(out, "4 varint: 18446744073709551615 (-1)\n4 len[2]: 00ff\n");
    }

    #[test]
    fn test_hex_preview_truncates() {
        let preview = hex_preview(&[0xAB; 40]);
        assert_eq!(preview.len(), HEX_PREVIEW_LEN * 2 + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_verdicts() {
        assert_eq!(Verdict::of(&[1, 2], &[1, 2]), Verdict::Identical);
        assert_eq!(Verdict::of(&[1, 2], &[2, 1]), Verdict::Reordered);
        assert_eq!(Verdict::of(&[1, 2], &[1]), Verdict::Mismatch);
    }

    #[test]
    fn test_digest() {
        let first = digest(&sample_set()).unwrap();
        assert_eq!(first.len(), 16);
        assert_eq!(first, digest(&sample_set()).unwrap());
        assert_ne!(first, digest(&UnknownFieldSet::new()).unwrap());
    }

    #[test]
    fn test_process_file_verify() {
        let temp_dir = TempDir::new().unwrap();
        let canonical = temp_dir.path().join("canonical.bin");
        let reordered = temp_dir.path().join("reordered.bin");
        fs::write(&canonical, [0x08, 0x01, 0x10, 0x02]).unwrap();
        fs::write(&reordered, [0x10, 0x02, 0x08, 0x01]).unwrap();

        let ctx = context(OutputFormat::Verify);
        let mut stats = RunStats::default();
        let mut out = String::new();
        process_file(&ctx, &canonical, &mut stats, &mut out).unwrap();
        process_file(&ctx, &reordered, &mut stats, &mut out).unwrap();

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.mismatched, 0);
        assert!(out.starts_with("identical"));
        assert!(out.contains("reordered"));
    }

    #[test]
    fn test_process_file_rejects_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("truncated.bin");
        fs::write(&path, [0x12, 0x05, b'a']).unwrap();

        let mut stats = RunStats::default();
        let mut out = String::new();
        assert!(process_file(&context(OutputFormat::Dump), &path, &mut stats, &mut out).is_err());
    }

    #[test]
    fn test_size_limit_applies() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.bin");
        fs::write(&path, [0x08, 0x01].repeat(50)).unwrap();

        let mut ctx = context(OutputFormat::Verify);
        ctx.config = ReaderConfig::new().size_limit(10);
        let mut stats = RunStats::default();
        let mut out = String::new();
        let err = process_file(&ctx, &path, &mut stats, &mut out).unwrap_err();
        assert!(format!("{:#}", err).contains("size limit"));

        ctx.config = ReaderConfig::new().size_limit(100);
        process_file(&ctx, &path, &mut stats, &mut out).unwrap();
        assert_eq!(stats.processed, 1);
    }

    #[test]
    fn test_size_limit_applies_per_frame() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("frames.bin");
        // two frames of 4 bytes each
        fs::write(&path, [0x04, 0x08, 0x01, 0x10, 0x02, 0x04, 0x08, 0x03, 0x10, 0x04]).unwrap();

        let mut ctx = context(OutputFormat::Verify);
        ctx.length_delimited = true;
        ctx.config = ReaderConfig::new().size_limit(4);
        let mut stats = RunStats::default();
        let mut out = String::new();
        process_file(&ctx, &path, &mut stats, &mut out).unwrap();
        assert_eq!(stats.processed, 2);

        ctx.config = ReaderConfig::new().size_limit(3);
        assert!(process_file(&ctx, &path, &mut stats, &mut out).is_err());
    }

    #[test]
    fn test_recursion_limit_applies() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("deep.bin");
        // 1: group { 1: group { } }
        fs::write(&path, [0x0B, 0x0B, 0x0C, 0x0C]).unwrap();

        let mut ctx = context(OutputFormat::Dump);
        ctx.config = ReaderConfig::new().recursion_limit(1);
        let mut stats = RunStats::default();
        let mut out = String::new();
        assert!(process_file(&ctx, &path, &mut stats, &mut out).is_err());

        ctx.config = ReaderConfig::new().recursion_limit(2);
        process_file(&ctx, &path, &mut stats, &mut out).unwrap();
    }

    #[test]
    fn test_length_delimited_stream() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stream.bin");
        let mut stream = Vec::new();
        sample_set().encode_length_delimited_to(&mut stream).unwrap();
        UnknownFieldSet::new().encode_length_delimited_to(&mut stream).unwrap();
        fs::write(&path, &stream).unwrap();

        let mut ctx = context(OutputFormat::Digest);
        ctx.length_delimited = true;
        let mut stats = RunStats::default();
        let mut out = String::new();
        process_file(&ctx, &path, &mut stats, &mut out).unwrap();
        assert_eq!(stats.processed, 2);
        assert!(out.contains("#0"));
        assert!(out.contains("#1"));
    }

    #[test]
    fn test_length_delimited_truncated_frame() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("short.bin");
        // declares 5 bytes, carries 2
        fs::write(&path, [0x05, 0x08, 0x01]).unwrap();

        let mut ctx = context(OutputFormat::Dump);
        ctx.length_delimited = true;
        let mut stats = RunStats::default();
        let mut out = String::new();
        let err = process_file(&ctx, &path, &mut stats, &mut out).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_directory_skips_hidden_and_continues() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.bin"), [0x08, 0x01]).unwrap();
        fs::write(temp_dir.path().join("b.bin"), [0x12, 0x09]).unwrap();
        fs::write(temp_dir.path().join(".hidden"), [0x12, 0x09]).unwrap();

        let stats = process_directory(&context(OutputFormat::Verify), temp_dir.path()).unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden(Path::new("/tmp/.git")));
        assert!(!is_hidden(Path::new("/tmp/payload.bin")));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
