//! Simulation harness composing harvester and converter sample by sample.

use std::thread;

use crate::calibration::CalibrationSet;
use crate::models::converter::{ConverterModel, ReferenceConverter};
use crate::models::harvester::Harvester;
use crate::params::{ConverterParams, HarvesterParams};
use crate::sim::stats::EnergyReport;
use crate::sim::types::{LoadModel, OutputSample, Sample, SimTiming};

/// Virtual source: one harvester, one converter backend, one load.
///
/// Generic over `C: ConverterModel` so the caller injects the backend
/// (reference or accelerated) explicitly. The per-sample loop is strictly
/// sequential; the capacitor integration is a running sum whose result
/// depends on sample order.
pub struct VirtualSource<C: ConverterModel> {
    timing: SimTiming,
    harvester: Harvester,
    converter: C,
    cal: CalibrationSet,
    load: LoadModel,
    samples: u64,
    enabled_samples: u64,
    good_samples: u64,
    energy_in_fw_samples: u128,
}

impl<C: ConverterModel> VirtualSource<C> {
    /// Creates a virtual source over an injected converter backend.
    pub fn new(
        timing: SimTiming,
        harvester: Harvester,
        converter: C,
        cal: CalibrationSet,
        load: LoadModel,
    ) -> Self {
        Self {
            timing,
            harvester,
            converter,
            cal,
            load,
            samples: 0,
            enabled_samples: 0,
            good_samples: 0,
            energy_in_fw_samples: 0,
        }
    }

    /// Executes one simulation sample and returns its record.
    ///
    /// Converter operations run in their fixed order: input power,
    /// capacitor update, output power, output stage.
    pub fn step(&mut self, sample: &Sample) -> OutputSample {
        // 1. Harvester selects the operating point
        let op = self.harvester.operating_point(sample);

        // 2. Input power from the operating point
        let p_in = self.converter.calc_input_power(op.voltage_uv, op.current_na);
        self.energy_in_fw_samples = self.energy_in_fw_samples.saturating_add(u128::from(p_in));

        // 3. Capacitor integration (the only state-carrying step)
        let v_mid = self.converter.update_capacitor();

        // 4. Output power from the load current, as a raw ADC code
        let i_out_na = self.load.current_na(self.converter.output_enabled());
        let i_out_raw = self.cal.current_in.si_to_raw(i64::from(i_out_na));
        let p_out = self.converter.calc_output_power(i_out_raw);

        // 5. Enable/power-good state machine
        let enabled = self.converter.update_output_stage();

        self.samples += 1;
        if enabled {
            self.enabled_samples += 1;
        }
        if self.converter.power_good() {
            self.good_samples += 1;
        }

        OutputSample {
            timestamp_ns: sample.timestamp_ns,
            v_out_uv: self.converter.v_output_uv(),
            i_out_na,
            v_intermediate_uv: v_mid,
            p_in_fw: p_in,
            p_out_fw: p_out,
            output_enabled: enabled,
            power_good: self.converter.power_good(),
        }
    }

    /// Processes a finite trace strictly in order.
    ///
    /// When a sink is attached it receives exactly one output sample per
    /// input sample. Returns the aggregate energy report.
    pub fn run(
        &mut self,
        samples: impl IntoIterator<Item = Sample>,
        mut sink: Option<&mut Vec<OutputSample>>,
    ) -> EnergyReport {
        for sample in samples {
            let out = self.step(&sample);
            if let Some(sink) = sink.as_deref_mut() {
                sink.push(out);
            }
        }
        self.report()
    }

    /// Aggregate report over everything processed so far.
    pub fn report(&self) -> EnergyReport {
        EnergyReport::from_accumulators(
            self.samples,
            self.energy_in_fw_samples,
            self.converter.delivered_energy_fw_samples(),
            self.enabled_samples,
            self.good_samples,
            self.converter.v_intermediate_uv(),
            &self.timing,
        )
    }

    /// Returns a reference to the converter backend.
    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// Returns a reference to the harvester.
    pub fn harvester(&self) -> &Harvester {
        &self.harvester
    }
}

/// Runs independent harvester×converter combinations over one trace on
/// worker threads.
///
/// Each run owns its state; there is no shared mutable state and no
/// synchronization beyond collecting the reports, which come back in
/// input order.
pub fn run_matrix(
    timing: SimTiming,
    combos: &[(HarvesterParams, ConverterParams)],
    cal: &CalibrationSet,
    load: LoadModel,
    trace: &[Sample],
) -> Vec<EnergyReport> {
    thread::scope(|scope| {
        let handles: Vec<_> = combos
            .iter()
            .map(|(harvester, converter)| {
                scope.spawn(move || {
                    let mut source = VirtualSource::new(
                        timing,
                        Harvester::new(harvester.clone()),
                        ReferenceConverter::new(converter.clone(), cal.current_in),
                        *cal,
                        load,
                    );
                    source.run(trace.iter().copied(), None)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(report) => report,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}
