//! Virtual-source simulator entry point — CLI wiring and config-driven
//! harness construction.

use std::path::Path;
use std::process;

use vsrc_sim::calibration::CalibrationSet;
use vsrc_sim::config::{PresetCatalog, RunConfig};
use vsrc_sim::io::export::export_csv;
use vsrc_sim::io::import::import_csv;
use vsrc_sim::models::accelerated::AcceleratedConverter;
use vsrc_sim::models::converter::ReferenceConverter;
use vsrc_sim::models::harvester::Harvester;
use vsrc_sim::params::{ConverterSpec, HarvesterSpec, Resolver};
use vsrc_sim::sim::engine::VirtualSource;
use vsrc_sim::sim::stats::EnergyReport;
use vsrc_sim::sim::trace::SinusoidTrace;
use vsrc_sim::sim::types::{LoadModel, OutputSample, Sample, SimTiming};

/// Parsed CLI arguments.
struct CliArgs {
    harvester: String,
    converter: String,
    config_path: Option<String>,
    calibration_path: Option<String>,
    backend: Backend,
    rate_hz: u32,
    seconds: f64,
    load_ua: f64,
    noise_v: f64,
    noise_a: f64,
    seed: u64,
    trace_in: Option<String>,
    trace_out: Option<String>,
    export_params: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Backend {
    Reference,
    Accelerated,
}

fn print_help() {
    eprintln!("vsrc-sim — virtual-source simulator for energy-harvesting traces");
    eprintln!();
    eprintln!("Usage: vsrc-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --harvester <name>       Harvester preset (default: neutral)");
    eprintln!("  --converter <name>       Converter preset (default: bq25504)");
    eprintln!("  --config <path>          TOML overrides for both models");
    eprintln!("  --calibration <path>     TOML calibration coefficients");
    eprintln!("  --backend <name>         reference | accelerated (default: reference)");
    eprintln!("  --rate <hz>              Sample rate (default: 100000)");
    eprintln!("  --seconds <f64>          Synthetic trace length (default: 1.0)");
    eprintln!("  --load-ua <f64>          Constant output load in µA (default: 0)");
    eprintln!("  --noise-v <f64>          Synthetic voltage noise std dev (default: 0)");
    eprintln!("  --noise-a <f64>          Synthetic current noise std dev (default: 0)");
    eprintln!("  --seed <u64>             Noise seed (default: 42)");
    eprintln!("  --trace-in <path>        Replay a recorded raw trace CSV");
    eprintln!("  --trace-out <path>       Export the output trace to CSV");
    eprintln!("  --export-params          Print the wire parameter lists and exit");
    eprintln!("  --help                   Show this help message");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        harvester: "neutral".to_string(),
        converter: "bq25504".to_string(),
        config_path: None,
        calibration_path: None,
        backend: Backend::Reference,
        rate_hz: 100_000,
        seconds: 1.0,
        load_ua: 0.0,
        noise_v: 0.0,
        noise_a: 0.0,
        seed: 42,
        trace_in: None,
        trace_out: None,
        export_params: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--harvester" => cli.harvester = take_value(&args, &mut i, "--harvester"),
            "--converter" => cli.converter = take_value(&args, &mut i, "--converter"),
            "--config" => cli.config_path = Some(take_value(&args, &mut i, "--config")),
            "--calibration" => {
                cli.calibration_path = Some(take_value(&args, &mut i, "--calibration"));
            }
            "--backend" => {
                cli.backend = match take_value(&args, &mut i, "--backend").as_str() {
                    "reference" => Backend::Reference,
                    "accelerated" => Backend::Accelerated,
                    other => {
                        eprintln!("error: unknown backend \"{other}\"");
                        process::exit(1);
                    }
                }
            }
            "--rate" => cli.rate_hz = parse_value(&args, &mut i, "--rate"),
            "--seconds" => cli.seconds = parse_value(&args, &mut i, "--seconds"),
            "--load-ua" => cli.load_ua = parse_value(&args, &mut i, "--load-ua"),
            "--noise-v" => cli.noise_v = parse_value(&args, &mut i, "--noise-v"),
            "--noise-a" => cli.noise_a = parse_value(&args, &mut i, "--noise-a"),
            "--seed" => cli.seed = parse_value(&args, &mut i, "--seed"),
            "--trace-in" => cli.trace_in = Some(take_value(&args, &mut i, "--trace-in")),
            "--trace-out" => cli.trace_out = Some(take_value(&args, &mut i, "--trace-out")),
            "--export-params" => cli.export_params = true,
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    if cli.rate_hz == 0 {
        eprintln!("error: --rate must be > 0");
        process::exit(1);
    }
    if !cli.seconds.is_finite() || cli.seconds <= 0.0 {
        eprintln!("error: --seconds must be a positive number");
        process::exit(1);
    }
    if !cli.load_ua.is_finite() || cli.load_ua < 0.0 {
        eprintln!("error: --load-ua must be a non-negative number");
        process::exit(1);
    }

    cli
}

fn take_value(args: &[String], i: &mut usize, flag: &str) -> String {
    *i += 1;
    if *i >= args.len() {
        eprintln!("error: {flag} requires a value");
        process::exit(1);
    }
    args[*i].clone()
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: &mut usize, flag: &str) -> T {
    let raw = take_value(args, i, flag);
    match raw.parse() {
        Ok(v) => v,
        Err(_) => {
            eprintln!("error: {flag} value \"{raw}\" is not valid");
            process::exit(1);
        }
    }
}

/// Runs the harness over the trace with the selected backend.
fn run_with_backend(
    cli: &CliArgs,
    timing: SimTiming,
    harvester: Harvester,
    converter_params: vsrc_sim::params::ConverterParams,
    cal: CalibrationSet,
    load: LoadModel,
    trace: Vec<Sample>,
    sink: Option<&mut Vec<OutputSample>>,
) -> EnergyReport {
    match cli.backend {
        Backend::Reference => {
            let converter = ReferenceConverter::new(converter_params, cal.current_in);
            let mut source = VirtualSource::new(timing, harvester, converter, cal, load);
            source.run(trace, sink)
        }
        Backend::Accelerated => {
            let converter = AcceleratedConverter::new(converter_params, cal.current_in);
            let mut source = VirtualSource::new(timing, harvester, converter, cal, load);
            source.run(trace, sink)
        }
    }
}

fn main() {
    let cli = parse_args();
    let timing = SimTiming::new(cli.rate_hz);

    // Calibration: file or ideal defaults
    let cal = if let Some(ref path) = cli.calibration_path {
        match CalibrationSet::from_toml_file(Path::new(path)) {
            Ok(cal) => cal,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        CalibrationSet::default()
    };

    // Specs: TOML overrides win; their base defaults to the chosen presets
    let (harvester_spec, converter_spec) = if let Some(ref path) = cli.config_path {
        let cfg = match RunConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        };
        let mut harvester = cfg.harvester;
        if harvester.base.is_none() {
            harvester.base = Some(cli.harvester.clone());
        }
        let mut converter = cfg.converter;
        if converter.base.is_none() {
            converter.base = Some(cli.converter.clone());
        }
        (
            HarvesterSpec::Partial(harvester),
            ConverterSpec::Partial(converter),
        )
    } else {
        (
            HarvesterSpec::Preset(cli.harvester.clone()),
            ConverterSpec::Preset(cli.converter.clone()),
        )
    };

    // Resolve both parameter sets before a single sample runs
    let catalog = PresetCatalog::builtin();
    let resolver = Resolver::new(&catalog);
    let harvester_params = match resolver.resolve_harvester(harvester_spec, &timing) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    let converter_params = match resolver.resolve_converter(converter_spec, &timing) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    for clamp in harvester_params
        .diagnostics()
        .iter()
        .chain(converter_params.diagnostics())
    {
        eprintln!("warning: {clamp}");
    }

    if cli.export_params {
        let harvester_wire: Vec<String> = harvester_params
            .export()
            .iter()
            .map(u32::to_string)
            .collect();
        let converter_wire: Vec<String> = converter_params
            .export()
            .iter()
            .map(u32::to_string)
            .collect();
        println!("harvester: {}", harvester_wire.join(","));
        println!("converter: {}", converter_wire.join(","));
        return;
    }

    // Input trace: recorded file or synthetic sinusoid
    let trace = if let Some(ref path) = cli.trace_in {
        match import_csv(Path::new(path), &cal) {
            Ok(trace) => trace,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        let n = timing.samples_for_seconds(cli.seconds);
        SinusoidTrace::new(
            timing,
            2.5,
            1.0,
            0.020,
            0.010,
            50.0,
            cli.noise_v,
            cli.noise_a,
            cli.seed,
        )
        .generate(n as usize)
    };

    let load = if cli.load_ua > 0.0 {
        LoadModel::Constant {
            current_na: (cli.load_ua * 1000.0).round() as u32,
        }
    } else {
        LoadModel::Off
    };

    let harvester = Harvester::new(harvester_params);
    let mut output = Vec::new();
    let sink = if cli.trace_out.is_some() {
        Some(&mut output)
    } else {
        None
    };

    let report = run_with_backend(
        &cli,
        timing,
        harvester,
        converter_params,
        cal,
        load,
        trace,
        sink,
    );

    println!("{report}");

    if let Some(ref path) = cli.trace_out {
        if let Err(e) = export_csv(&output, Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Output trace written to {path}");
    }
}
