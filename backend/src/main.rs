//! ePACT2 compiler CLI - build the overprescribing chart workbook
//!
//! # Main Commands
//!
//! ```bash
//! epact-compiler compile --local a.csv --local-label "Antibiotics (%)" \
//!                        --national b.csv --national-label "Antibiotics (%)"
//! epact-compiler compile --manifest files.json   # paths, kinds and labels in JSON
//! epact-compiler serve                           # Start HTTP server (port 3000)
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! epact-compiler parse input.csv                          # Just parse CSV to JSON
//! epact-compiler clean input.csv --kind local --label X   # Cleaned rows as JSON
//! epact-compiler organisations                            # Show the organisation map
//! ```

use clap::{Parser, Subcommand};
use epact_compiler::{
    compile, compile_manifest, loader::load_file, pair_labels_or_default, parse_csv_file_auto,
    transform::clean, CompileOptions, CompileResult, MetricFile, MetricLabel, Settings,
    SourceKind, Upload, ORGANISATIONS,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "epact-compiler")]
#[command(about = "Compile ePACT2 CSV extracts into the overprescribing chart workbook", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: CSVs → cleaned → merged → pivoted → xlsx
    Compile {
        /// Local (practice-level) CSV file, repeatable
        #[arg(long)]
        local: Vec<PathBuf>,

        /// Label for each local file, in order (defaults to "Metric N (%)")
        #[arg(long)]
        local_label: Vec<String>,

        /// National CSV file, repeatable
        #[arg(long)]
        national: Vec<PathBuf>,

        /// Label for each national file, in order (defaults to "Metric N (%)")
        #[arg(long)]
        national_label: Vec<String>,

        /// JSON manifest of {path, kind, label} entries instead of flags
        #[arg(short, long, conflicts_with_all = ["local", "national"])]
        manifest: Option<PathBuf>,

        /// Output workbook (default: ./overprescribing_charts.xlsx)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Name of the regional rollup organisation
        #[arg(long)]
        region_name: Option<String>,
    },

    /// Parse a CSV file and output JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Clean a single file and output its rows as JSON
    Clean {
        /// Input CSV file
        input: PathBuf,

        /// Source kind
        #[arg(short, long, value_enum)]
        kind: SourceKind,

        /// Metric label
        #[arg(short, long, default_value = "Metric 1 (%)")]
        label: String,

        /// Name of the regional rollup organisation
        #[arg(long)]
        region_name: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the organisation name map
    Organisations,

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: EPACT_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present) and environment overrides
    let settings = Settings::from_env();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile {
            local,
            local_label,
            national,
            national_label,
            manifest,
            output,
            region_name,
        } => {
            let options = CompileOptions {
                region_name: region_name.unwrap_or_else(|| settings.region_name.clone()),
            };
            cmd_compile(
                (local, local_label),
                (national, national_label),
                manifest.as_deref(),
                output.as_deref(),
                &options,
            )
        }

        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Clean {
            input,
            kind,
            label,
            region_name,
            output,
        } => {
            let region = region_name.unwrap_or_else(|| settings.region_name.clone());
            cmd_clean(&input, kind, label, &region, output.as_deref())
        }

        Commands::Organisations => cmd_organisations(),

        Commands::Serve { port } => {
            let settings = Settings {
                port: port.unwrap_or(settings.port),
                ..settings
            };
            cmd_serve(settings).await
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_compile(
    local: (Vec<PathBuf>, Vec<String>),
    national: (Vec<PathBuf>, Vec<String>),
    manifest: Option<&Path>,
    output: Option<&Path>,
    options: &CompileOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = match manifest {
        Some(path) => {
            eprintln!("📋 Manifest: {}", path.display());
            compile_manifest(path, options)?
        }
        None => {
            eprintln!(
                "📄 Compiling {} local, {} national file(s)",
                local.0.len(),
                national.0.len()
            );
            let mut files = labelled(SourceKind::Local, local)?;
            files.extend(labelled(SourceKind::National, national)?);
            compile(files, options)?
        }
    };

    print_summary(&result);

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&result.file_name));
    fs::write(&path, &result.workbook)?;
    eprintln!("💾 Workbook written to: {}", path.display());

    eprintln!("\n✨ Done!");
    Ok(())
}

fn labelled(
    kind: SourceKind,
    (paths, labels): (Vec<PathBuf>, Vec<String>),
) -> Result<Vec<MetricFile>, Box<dyn std::error::Error>> {
    let uploads = paths
        .iter()
        .map(|p| Upload::from_path(p))
        .collect::<Result<Vec<_>, _>>()?;
    let labels = labels.into_iter().map(MetricLabel::new).collect();
    Ok(pair_labels_or_default(kind, uploads, labels)?)
}

fn print_summary(result: &CompileResult) {
    eprintln!("\n📊 Sheets:");
    for summary in result.summaries() {
        eprintln!(
            "   {} - {} month(s) × {} organisation(s)",
            summary.name, summary.months, summary.organisations
        );
    }

    if !result.warnings.is_empty() {
        eprintln!("\n⚠️  Warnings:");
        for warning in &result.warnings {
            eprintln!("   - {}", warning);
        }
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let result = parse_csv_file_auto(input)?;

    eprintln!("   Encoding: {}", result.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(result.delimiter));
    eprintln!("   Columns: {}", result.headers.join(", "));
    eprintln!("✅ Parsed {} records", result.records.len());

    let json = serde_json::to_string_pretty(&result.records)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_clean(
    input: &Path,
    kind: SourceKind,
    label: String,
    region_name: &str,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🧹 Cleaning {} file: {}", kind, input.display());

    let upload = Upload::from_path(input)?;
    let loaded = load_file(MetricFile::new(
        upload.name,
        kind,
        MetricLabel::new(label),
        upload.bytes,
    ))?;
    let cleaned = clean(&loaded, region_name)?;

    eprintln!(
        "✅ {} row(s) kept, {} dropped",
        cleaned.rows.len(),
        cleaned.stats.dropped()
    );

    let json = serde_json::to_string_pretty(&cleaned)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_organisations() -> Result<(), Box<dyn std::error::Error>> {
    println!("🏥 Organisation map ({} entries):\n", ORGANISATIONS.len());
    for (raw, name) in ORGANISATIONS.entries() {
        println!("  {} → {}", raw, name);
    }
    Ok(())
}

async fn cmd_serve(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    epact_compiler::server::start_server(settings).await?;
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
