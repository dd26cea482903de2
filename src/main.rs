//! Audiometry - calibration command line tool
//!
//! Inspects and edits the calibration data of an audiometry installation and
//! mixes demo stimuli through the stream graph.

use anyhow::{anyhow, bail, Context, Result};
use audiometry::stream::buffer::ToneStream;
use audiometry::stream::normalize::NormalizedStream;
use audiometry::stream::{real_rms, AnalyticSample};
use audiometry::{
    AnalyticStream, AudioChannel, AudiometricCalibration, CalibrationSet, FileStore, Source,
    StreamAdder, TransducerProfile,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Default directory holding `System/` and `Calibration/`
const DEFAULT_DATA_DIR: &str = "data";

/// Sampling rate of the demo mix
const MIX_SAMPLING_RATE: f64 = 48000.0;

/// Measurement file accepted by `import`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MeasurementFile {
    /// Device curve; the standard supra-aural curve when omitted
    #[serde(default)]
    transducer_profile: Option<TransducerProfile>,
    measurements: Vec<Measurement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Measurement {
    set: CalibrationSet,
    #[serde(default)]
    frequency: f64,
    #[serde(rename = "LevelHL")]
    level_hl: f64,
    channel: AudioChannel,
    #[serde(rename = "RMS")]
    rms: f64,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("audiometry=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut data_dir = PathBuf::from(DEFAULT_DATA_DIR);
    let mut positional: Vec<String> = Vec::new();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("audiometry {} ({})", audiometry::VERSION, audiometry::BUILD_DATE);
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--data-dir" | "-d" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --data-dir requires a directory");
                    return Ok(());
                }
                data_dir = PathBuf::from(&args[i + 1]);
                i += 2;
                continue;
            }
            arg if arg.starts_with('-') && arg.parse::<f64>().is_err() => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                return Ok(());
            }
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }

    let Some((command, rest)) = positional.split_first() else {
        print_help();
        return Ok(());
    };

    if command == "mix" {
        return run_mix(rest);
    }

    let calibration = AudiometricCalibration::new(FileStore::new(&data_dir));
    info!(data_dir = %data_dir.display(), "Calibration data loaded");

    match command.as_str() {
        "status" => print_status(&calibration),
        "rms" => run_rms(&calibration, rest),
        "spl" => run_conversion(&calibration, rest, Conversion::Spl),
        "hl" => run_conversion(&calibration, rest, Conversion::Hl),
        "drop" => {
            calibration.drop_calibration_results(Source::Custom)?;
            println!("Custom calibration dropped; default formula in use.");
            Ok(())
        }
        "select" => {
            let name = rest.first().ok_or_else(|| anyhow!("select requires a calibration name"))?;
            calibration.select_calibration(name)?;
            println!("Current calibration: {}", name);
            Ok(())
        }
        "import" => {
            let path = rest.first().ok_or_else(|| anyhow!("import requires a measurement file"))?;
            run_import(&calibration, Path::new(path))
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Usage: audiometry [OPTIONS] COMMAND [ARGS]");
    println!();
    println!("Commands:");
    println!("  status                        Show the current calibration state");
    println!("  rms LEVEL SET FREQ [SOURCE]   RMS per channel producing LEVEL dB HL");
    println!("  spl LEVEL FREQ [SOURCE]       Convert dB HL to dB SPL");
    println!("  hl SPL FREQ [SOURCE]          Convert dB SPL to dB HL");
    println!("  drop                          Drop the custom calibration");
    println!("  select NAME                   Make a stored calibration current");
    println!("  import FILE                   Calibrate from a JSON measurement file");
    println!("  mix [RMS]                     Mix demo tones and normalize them to RMS");
    println!();
    println!("SET is pure-tone, narrowband or broadband.");
    println!("SOURCE is default, custom or results (default: custom).");
    println!();
    println!("Options:");
    println!("  -d, --data-dir DIR   Data directory (default: {})", DEFAULT_DATA_DIR);
    println!("  -v, --version        Show version");
    println!("  -h, --help           Show this help");
    println!();
    println!("Examples:");
    println!("  audiometry rms 60 pure-tone 1000");
    println!("  audiometry -d /var/lib/audiometry import measurements.json");
}

fn parse_number(value: Option<&String>, what: &str) -> Result<f64> {
    let value = value.ok_or_else(|| anyhow!("missing {}", what))?;
    value
        .parse()
        .with_context(|| format!("invalid {}: {}", what, value))
}

fn parse_set(value: Option<&String>) -> Result<CalibrationSet> {
    match value.map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("pure-tone" | "puretone" | "tone") => Ok(CalibrationSet::PureTone),
        Some("narrowband" | "nb") => Ok(CalibrationSet::Narrowband),
        Some("broadband" | "bb") => Ok(CalibrationSet::Broadband),
        Some(other) => bail!("unknown calibration set: {}", other),
        None => bail!("missing calibration set"),
    }
}

fn parse_source(value: Option<&String>) -> Result<Source> {
    match value.map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("custom") => Ok(Source::Custom),
        Some("default") => Ok(Source::Default),
        Some("results") => Ok(Source::Results),
        Some(other) => bail!("unknown source: {}", other),
    }
}

fn print_status(calibration: &AudiometricCalibration<FileStore>) -> Result<()> {
    println!("Audiometry v{}", audiometry::VERSION);
    println!("Data directory: {}", calibration.store().root().display());
    println!("────────────────────────────────────────");

    match calibration.custom_profile() {
        Some(profile) => {
            println!(
                "Current calibration: {}",
                calibration.current_calibration_name().unwrap_or_default()
            );
            println!("  Transducer: {}", profile.transducer_profile().name());
            println!("  Date:       {}", profile.calibration_date().format("%Y-%m-%d %H:%M:%S"));
            println!("  Pure tone:  {} frequencies", profile.pure_tone().points().len());
            println!("  Narrowband: {} frequencies", profile.narrowband().points().len());
            println!(
                "  Broadband:  {}",
                if profile.broadband().is_empty() { "none" } else { "recorded" }
            );
        }
        None => println!("Current calibration: none (default formula)"),
    }

    let stored = calibration.available_calibrations()?;
    println!();
    println!("Stored calibrations: {}", stored.len());
    for name in &stored {
        println!("  {}", name);
    }

    let validations = calibration.available_validations()?;
    if !validations.is_empty() {
        println!();
        println!("Stored validations: {}", validations.len());
        for name in &validations {
            match calibration.load_validation(name) {
                Ok(results) => println!(
                    "  {} (max discrepancy {:.1} dB)",
                    name,
                    results.max_discrepancy().unwrap_or(0.0)
                ),
                Err(e) => println!("  {} (unreadable: {})", name, e),
            }
        }
    }

    Ok(())
}

fn run_rms(calibration: &AudiometricCalibration<FileStore>, args: &[String]) -> Result<()> {
    let level_hl = parse_number(args.first(), "level")?;
    let set = parse_set(args.get(1))?;
    let frequency = if set == CalibrationSet::Broadband {
        args.get(2).and_then(|v| v.parse().ok()).unwrap_or(0.0)
    } else {
        parse_number(args.get(2), "frequency")?
    };
    let source = parse_source(args.get(3))?;

    let resolved = calibration.resolved_source(source);
    let (left, right) = calibration.get_level_rms(level_hl, set, frequency, source)?;
    println!("Source: {} (requested {})", resolved, source);
    println!("Left:   {:.6e}", left);
    println!("Right:  {:.6e}", right);
    Ok(())
}

enum Conversion {
    Spl,
    Hl,
}

fn run_conversion(
    calibration: &AudiometricCalibration<FileStore>,
    args: &[String],
    conversion: Conversion,
) -> Result<()> {
    let level = parse_number(args.first(), "level")?;
    let frequency = parse_number(args.get(1), "frequency")?;
    let source = parse_source(args.get(2))?;

    match conversion {
        Conversion::Spl => {
            let spl = calibration.level_spl(source, frequency, level)?;
            println!("{:.1} dB HL at {} Hz = {:.1} dB SPL", level, frequency, spl);
        }
        Conversion::Hl => {
            let hl = calibration.level_hl(source, frequency, level)?;
            println!("{:.1} dB SPL at {} Hz = {:.1} dB HL", level, frequency, hl);
        }
    }
    Ok(())
}

fn run_import(calibration: &AudiometricCalibration<FileStore>, path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: MeasurementFile = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    if file.measurements.is_empty() {
        bail!("{} contains no measurements", path.display());
    }

    calibration.initiate_calibration(file.transducer_profile.unwrap_or_default());
    for m in &file.measurements {
        if let Err(e) = calibration.push_calibration_value(m.level_hl, m.set, m.frequency, m.channel, m.rms) {
            error!(error = %e, "Rejected measurement, calibration aborted");
            calibration.drop_calibration_results(Source::Results)?;
            return Err(e.into());
        }
    }

    let name = calibration.finalize_calibration_results()?;
    println!("Imported {} measurements into {}", file.measurements.len(), name);
    Ok(())
}

fn run_mix(args: &[String]) -> Result<()> {
    let target_rms = if args.is_empty() {
        0.01
    } else {
        parse_number(args.first(), "target RMS")?
    };

    let mut adder = StreamAdder::new();
    for (frequency, amplitude, seconds) in [(500.0, 0.5, 1.0), (1000.0, 0.25, 0.5), (2000.0, 0.125, 0.25)] {
        adder.add_stream(ToneStream::new(frequency, amplitude, seconds, MIX_SAMPLING_RATE))?;
    }

    println!("Streams:        {}", adder.len());
    println!("Samples:        {}", adder.samples());
    println!("Sampling rate:  {} Hz", adder.sampling_rate());
    println!("Combined RMS:   {:.6}", adder.rms());

    let mut normalized = NormalizedStream::to_rms(adder, target_rms);
    println!("Target RMS:     {:.6}", target_rms);
    println!("Scale factor:   {:.6}", normalized.factor());

    let mut output = vec![AnalyticSample::new(0.0, 0.0); normalized.samples()];
    let read = normalized.read(&mut output);
    println!("Rendered RMS:   {:.6} over {} samples", real_rms(&output[..read]), read);
    Ok(())
}
