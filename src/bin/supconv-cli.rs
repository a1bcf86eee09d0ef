use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use supconv::{
    BdnXmlExporter, ConversionSession, ConversionSettings, JobReport, JobRunner, Palette,
    SubtitleStream,
    conversion::{ticks_to_clock, ticks_to_timecode},
    image_sequence,
    labels::{
        self, FORCED_FLAG_MODES, MOVE_MODES_X, MOVE_MODES_Y, OUTPUT_MODES, PALETTE_MODES,
        RESOLUTIONS, SCALING_FILTERS,
    },
    timing::ms_to_ticks,
};

const CLI_AFTER_HELP: &str = "Examples:\n  supconv info captions/manifest.json\n  supconv convert captions/manifest.json --out pal --resolution pal --fps-target pal --move-y inside --progress\n  supconv palette --out dvd.txt\n  supconv completions zsh > _supconv";

#[derive(Debug, Parser)]
#[command(
    name = "supconv",
    version,
    about = "Convert bitmap subtitle captions: retime, rescale, re-palette and reposition",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Print every warning of the conversion report.
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar while exporting.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long)]
    overwrite: bool,
}

#[derive(Debug, Parser, Clone, Default)]
struct ConvertOptions {
    /// Output resolution (ntsc, pal, 720p, 1440x1080, 1080p). Omit to keep the source size.
    #[arg(long)]
    resolution: Option<String>,

    /// Source frame rate (24p, 23.975, 24, pal, ntsc, pali, ntsci or a number).
    #[arg(long)]
    fps_source: Option<String>,

    /// Target frame rate; enables frame-rate conversion together with --fps-source.
    #[arg(long)]
    fps_target: Option<String>,

    /// Delay added to every caption, in milliseconds (may be negative).
    #[arg(long, allow_hyphen_values = true)]
    delay_ms: Option<f64>,

    /// Minimum display duration in milliseconds.
    #[arg(long)]
    min_duration_ms: Option<f64>,

    /// Extend captions shorter than the minimum duration.
    #[arg(long)]
    fix_short: bool,

    /// Free scale factors as `X,Y` (0.5 to 2.0).
    #[arg(long)]
    free_scale: Option<String>,

    /// Forced flag policy (keep, set, clear).
    #[arg(long)]
    forced: Option<String>,

    /// Export only forced captions.
    #[arg(long)]
    forced_only: bool,

    /// Output palette model (vobsub, supifo, bdsup, xml).
    #[arg(long, default_value = "xml")]
    output: String,

    /// Palette mode (keep, create, dither).
    #[arg(long)]
    palette_mode: Option<String>,

    /// Scaling filter (bilinear, triangle, bicubic, bell, hermite, lanczos3, mitchell, bspline).
    #[arg(long)]
    filter: Option<String>,

    /// Horizontal move mode (keep, left, right, center).
    #[arg(long)]
    move_x: Option<String>,

    /// Vertical move mode (keep, inside, outside).
    #[arg(long)]
    move_y: Option<String>,

    /// Horizontal move offset in pixels.
    #[arg(long)]
    offset_x: Option<u32>,

    /// Vertical move offset in pixels.
    #[arg(long)]
    offset_y: Option<u32>,

    /// Lines kept free at the top and bottom of the screen.
    #[arg(long)]
    crop_y: Option<u32>,

    /// Cinemascope bar height as a fraction of the screen height.
    #[arg(long)]
    cine_bar: Option<f64>,

    /// Edit palette in PGCEdit format.
    #[arg(long)]
    palette_file: Option<PathBuf>,

    /// Captions to leave out, 1-based (`3,7-9`).
    #[arg(long)]
    exclude: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Convert an image-sequence manifest to BDN XML + PNG.
    #[command(
        about = "Convert captions",
        after_help = "Examples:\n  supconv convert in/manifest.json --out out --resolution pal --fps-source 24p --fps-target pal\n  supconv convert in/manifest.json --out out --output vobsub --move-y inside --offset-y 12"
    )]
    Convert {
        /// Input manifest (JSON).
        input: PathBuf,
        /// Output directory.
        #[arg(long)]
        out: PathBuf,
        /// Base name of the written files (defaults to the manifest name).
        #[arg(long)]
        name: Option<String>,
        /// Print the job report as JSON.
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        options: ConvertOptions,
    },

    /// Print a summary of an image-sequence manifest.
    #[command(
        about = "Print caption information",
        visible_alias = "probe",
        after_help = "Examples:\n  supconv info in/manifest.json\n  supconv info in/manifest.json --json"
    )]
    Info {
        /// Input manifest (JSON).
        input: PathBuf,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show or write a PGCEdit palette.
    #[command(
        about = "Show or write a PGCEdit palette",
        after_help = "Examples:\n  supconv palette\n  supconv palette --input custom.txt --json\n  supconv palette --out dvd.txt"
    )]
    Palette {
        /// Palette to read instead of the default DVD palette.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Write the palette to this file.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn lookup<T: Copy>(table: &[labels::Label<T>], value: &str, flag: &str) -> CliResult<T> {
    labels::parse(table, value).ok_or_else(|| {
        let keys: Vec<&str> = table.iter().map(|l| l.key).collect();
        format!("unsupported --{flag}: {value} (expected one of {})", keys.join(", ")).into()
    })
}

fn parse_fps(value: &str, flag: &str) -> CliResult<f64> {
    labels::parse_frame_rate(value).ok_or_else(|| format!("unsupported --{flag}: {value}").into())
}

fn parse_free_scale(value: &str) -> CliResult<(f64, f64)> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("invalid --free-scale: {value} (expected X,Y)"))?;
    Ok((x.trim().parse()?, y.trim().parse()?))
}

/// Parse `1,3-5` into zero-based indices.
fn parse_index_list(value: &str) -> CliResult<Vec<usize>> {
    let mut indices = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (first, last) = match part.split_once('-') {
            Some((a, b)) => (a.trim().parse::<usize>()?, b.trim().parse::<usize>()?),
            None => {
                let n = part.parse::<usize>()?;
                (n, n)
            }
        };
        if first == 0 || last < first {
            return Err(format!("invalid caption range: {part}").into());
        }
        indices.extend(first - 1..last);
    }
    Ok(indices)
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> CliResult<()> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn build_settings(options: &ConvertOptions, manifest_fps: Option<f64>) -> CliResult<ConversionSettings> {
    let mut settings = ConversionSettings::new()
        .with_batch_mode(true)
        .with_output_mode(lookup(OUTPUT_MODES, &options.output, "output")?);

    if let Some(value) = &options.resolution {
        settings = settings.with_resolution(lookup(RESOLUTIONS, value, "resolution")?);
    }

    let source = match &options.fps_source {
        Some(value) => Some(parse_fps(value, "fps-source")?),
        None => manifest_fps,
    };
    match (source, &options.fps_target) {
        (Some(source), Some(target)) => {
            settings = settings.with_frame_rates(source, parse_fps(target, "fps-target")?);
        }
        (Some(source), None) => settings = settings.with_target_fps(source),
        (None, Some(target)) => settings = settings.with_target_fps(parse_fps(target, "fps-target")?),
        (None, None) => {}
    }

    if let Some(ms) = options.delay_ms {
        settings = settings.with_delay(ms_to_ticks(ms));
    }
    if options.min_duration_ms.is_some() || options.fix_short {
        let ms = options.min_duration_ms.unwrap_or(500.0);
        settings = settings.with_min_duration(ms_to_ticks(ms), options.fix_short);
    }
    if let Some(value) = &options.free_scale {
        let (x, y) = parse_free_scale(value)?;
        settings = settings.with_free_scale(x, y);
    }
    if let Some(value) = &options.forced {
        settings = settings.with_forced_flag(lookup(FORCED_FLAG_MODES, value, "forced")?);
    }
    settings = settings.with_export_forced_only(options.forced_only);
    if let Some(value) = &options.palette_mode {
        settings = settings.with_palette_mode(lookup(PALETTE_MODES, value, "palette-mode")?);
    }
    if let Some(value) = &options.filter {
        settings = settings.with_scaling_filter(lookup(SCALING_FILTERS, value, "filter")?);
    }
    if let Some(value) = &options.move_x {
        settings = settings.with_move_mode_x(lookup(MOVE_MODES_X, value, "move-x")?);
    }
    if let Some(value) = &options.move_y {
        settings = settings.with_move_mode_y(lookup(MOVE_MODES_Y, value, "move-y")?);
    }
    if options.offset_x.is_some() || options.offset_y.is_some() {
        settings = settings.with_move_offsets(options.offset_x.unwrap_or(10), options.offset_y.unwrap_or(10));
    }
    if let Some(crop) = options.crop_y {
        settings = settings.with_crop_offset_y(crop);
    }
    if let Some(factor) = options.cine_bar {
        settings = settings.with_cine_bar_factor(factor);
    }
    if let Some(path) = &options.palette_file {
        settings = settings.with_edit_palette(Palette::load_pgcedit(path)?);
    }

    settings.validate()?;
    Ok(settings)
}

fn print_report(report: &JobReport, verbose: bool) {
    for item in &report.info {
        println!("{} {item}", "info:".cyan().bold());
    }
    if verbose {
        for item in &report.warnings {
            eprintln!("{} {}", "warning:".yellow().bold(), item.yellow());
        }
    } else if !report.warnings.is_empty() {
        eprintln!(
            "{} {} timing/placement fix(es), use --verbose for details",
            "warning:".yellow().bold(),
            report.warning_count()
        );
    }
    for item in &report.errors {
        eprintln!("{} {}", "error:".red().bold(), item.red());
    }
}

fn report_json(report: &JobReport) -> serde_json::Value {
    json!({
        "info": report.info,
        "warnings": report.warnings,
        "errors": report.errors,
    })
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            out,
            name,
            json,
            options,
        } => {
            let sequence = image_sequence::load(&input)?;
            let settings = build_settings(&options, sequence.fps)?;
            let base_name = name.unwrap_or_else(|| {
                input
                    .file_stem()
                    .map_or_else(|| "captions".to_string(), |s| s.to_string_lossy().into_owned())
            });
            let exporter = BdnXmlExporter::new(&out, &base_name);
            ensure_writable_path(&exporter.manifest_path(), cli.global.overwrite)?;

            let session = Arc::new(ConversionSession::new(sequence.stream));
            let scan_report = session.scan(&settings)?;
            if let Some(list) = &options.exclude {
                for index in parse_index_list(list)? {
                    session.set_excluded(index, true)?;
                }
            }

            let runner = JobRunner::new(Arc::clone(&session));
            let job = runner.export(Box::new(exporter), settings)?;

            let bar = cli.global.progress.then(|| ProgressBar::new(100));
            if let Some(bar) = &bar {
                let style = ProgressStyle::with_template(
                    "{spinner:.green} {bar:40.cyan/blue} {pos}% {msg}",
                )?;
                bar.set_style(style.progress_chars("##-"));
            }
            while job.is_alive() {
                if let (Some(bar), Some(info)) = (&bar, job.poll_progress()) {
                    bar.set_position(info.percentage as u64);
                }
                thread::sleep(Duration::from_millis(40));
            }
            let export_report = job.wait()?;
            if let Some(bar) = &bar {
                bar.finish_with_message("done");
            }

            if json {
                let payload = json!({
                    "scan": report_json(&scan_report),
                    "export": report_json(&export_report),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print_report(&scan_report, cli.global.verbose);
                print_report(&export_report, cli.global.verbose);
                println!(
                    "{} {}",
                    "saved".green().bold(),
                    out.join(format!("{base_name}.xml")).display()
                );
            }
        }
        Commands::Info { input, json } => {
            let sequence = image_sequence::load(&input)?;
            let fps = sequence.fps.unwrap_or(supconv::FPS_24P);
            let stream = &sequence.stream;
            let frames: Vec<_> = (0..stream.frame_count())
                .filter_map(|i| stream.source_frame(i).cloned())
                .collect();
            let first = frames.first();

            if json {
                let payload = json!({
                    "captions": stream.frame_count(),
                    "forced": stream.forced_frame_count(),
                    "width": first.map(|f| f.width),
                    "height": first.map(|f| f.height),
                    "fps": fps,
                    "frames": frames.iter().map(|f| json!({
                        "in": ticks_to_timecode(f.start_time, fps),
                        "out": ticks_to_timecode(f.end_time, fps),
                        "x": f.x_offset,
                        "y": f.y_offset,
                        "width": f.image_width,
                        "height": f.image_height,
                        "forced": f.forced,
                    })).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "Captions: {} ({} forced)",
                    stream.frame_count(),
                    stream.forced_frame_count()
                );
                if let Some(frame) = first {
                    println!("Screen: {}x{} @ {}", frame.width, frame.height, labels::frame_rate_name(fps));
                }
                for (index, frame) in frames.iter().enumerate() {
                    println!(
                        "#{:<4} {} --> {}  {}x{} at ({}, {}){}",
                        index + 1,
                        ticks_to_clock(frame.start_time),
                        ticks_to_clock(frame.end_time),
                        frame.image_width,
                        frame.image_height,
                        frame.x_offset,
                        frame.y_offset,
                        if frame.forced { " forced".magenta().to_string() } else { String::new() }
                    );
                }
            }
        }
        Commands::Palette { input, out, json } => {
            let palette = match &input {
                Some(path) => Palette::load_pgcedit(path)?,
                None => Palette::default_dvd(),
            };
            if let Some(path) = out {
                ensure_writable_path(&path, cli.global.overwrite)?;
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                palette.save_pgcedit(&path)?;
                println!("{} {}", "saved".green().bold(), path.display());
            } else if json {
                let payload: Vec<_> = palette
                    .entries()
                    .iter()
                    .enumerate()
                    .map(|(index, e)| json!({
                        "index": index,
                        "rgb": [e.red, e.green, e.blue],
                        "luminance": e.luminance,
                    }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print!("{}", palette.to_pgcedit());
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "supconv", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
