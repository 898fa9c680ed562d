//! Shared test fixtures for integration tests.

use vsrc_sim::calibration::CalibrationSet;
use vsrc_sim::config::{PartialConverterConfig, PresetCatalog};
use vsrc_sim::models::converter::ReferenceConverter;
use vsrc_sim::models::harvester::Harvester;
use vsrc_sim::params::{ConverterParams, ConverterSpec, HarvesterParams, HarvesterSpec, Resolver};
use vsrc_sim::sim::engine::VirtualSource;
use vsrc_sim::sim::trace::SinusoidTrace;
use vsrc_sim::sim::types::{LoadModel, Sample, SimTiming};

/// Default sampling clock: 100 000 samples/s.
pub fn default_timing() -> SimTiming {
    SimTiming::new(100_000)
}

/// Resolves a built-in harvester preset at the default clock.
pub fn harvester_params(name: &str) -> HarvesterParams {
    let catalog = PresetCatalog::builtin();
    Resolver::new(&catalog)
        .resolve_harvester(HarvesterSpec::Preset(name.into()), &default_timing())
        .expect("preset should resolve")
}

/// Resolves a built-in converter preset at the default clock.
pub fn converter_params(name: &str) -> ConverterParams {
    let catalog = PresetCatalog::builtin();
    Resolver::new(&catalog)
        .resolve_converter(ConverterSpec::Preset(name.into()), &default_timing())
        .expect("preset should resolve")
}

/// Resolves a converter partial (over `"neutral"` unless it names a base)
/// at the default clock.
pub fn converter_params_from(partial: PartialConverterConfig) -> ConverterParams {
    let catalog = PresetCatalog::builtin();
    Resolver::new(&catalog)
        .resolve_converter(ConverterSpec::Partial(partial), &default_timing())
        .expect("partial should resolve")
}

/// Reference-backend virtual source from resolved parameter sets.
pub fn reference_source(
    harvester: HarvesterParams,
    converter: ConverterParams,
    load: LoadModel,
) -> VirtualSource<ReferenceConverter> {
    let cal = CalibrationSet::default();
    VirtualSource::new(
        default_timing(),
        Harvester::new(harvester),
        ReferenceConverter::new(converter, cal.current_in),
        cal,
        load,
    )
}

/// The primary regression fixture: 1 s of a noiseless 50 Hz sinusoidal
/// sweep, `2.5 V ± 1.0 V` and `20 mA ± 10 mA`, at 100 000 samples/s.
pub fn sinusoid_fixture() -> Vec<Sample> {
    SinusoidTrace::new(default_timing(), 2.5, 1.0, 0.020, 0.010, 50.0, 0.0, 0.0, 0).generate(100_000)
}

/// Analytic energy integral of the sinusoid fixture over one second:
/// `V0·I0 + Va·Ia/2` joules.
pub fn sinusoid_fixture_energy_j() -> f64 {
    2.5 * 0.020 + 1.0 * 0.010 / 2.0
}

/// A flat trace holding one operating point for `n` samples.
pub fn constant_trace(voltage_uv: u32, current_na: u32, n: usize) -> Vec<Sample> {
    let timing = default_timing();
    (0..n)
        .map(|i| Sample {
            timestamp_ns: i as u64 * timing.dt_ns,
            voltage_uv,
            current_na,
        })
        .collect()
}
