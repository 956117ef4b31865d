// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

use crate::{
    analog::{AdcFrame, Frontend, Sample},
    calib::{CalibCtx, CalibStage, Supervisor},
    config::{ConfigStore, RuntimeConfig},
    debug::Debug,
    fixpt::{Fix16, fix16},
    regulator::Regulator,
    speedo::Speedo,
    triac::{Triac, TriacGate},
};

/// Open loop setpoint while the motor resistance is uncalibrated.
const UNCALIBRATED_SETPOINT: Fix16 = fix16!(0.2);

/// The complete controller.
///
/// Call [System::tick_adc] (or [System::tick] with an already converted
/// sample) once per tick at `TICK_FREQ`.
pub struct System<R: Regulator, S: ConfigStore, G: TriacGate> {
    cfg: RuntimeConfig,
    store: S,
    frontend: Frontend,
    speedo: Speedo,
    regulator: R,
    supervisor: Supervisor<R>,
    triac: Triac<G>,
    /// Triac setpoint in effect.
    setpoint: Fix16,
}

impl<R: Regulator, S: ConfigStore, G: TriacGate> System<R, S, G> {
    pub fn new(store: S, gate: G, mut regulator: R) -> Self {
        let cfg = RuntimeConfig::load(&store);
        if cfg.is_r_calibrated() {
            info!("system: calibrated");
        } else {
            warn!("system: motor not calibrated. Running open loop.");
        }
        regulator.configure(&cfg);
        Self {
            frontend: Frontend::new(&cfg),
            speedo: Speedo::new(&cfg),
            regulator,
            supervisor: Supervisor::new(),
            triac: Triac::new(gate),
            setpoint: Fix16::ZERO,
            cfg,
            store,
        }
    }

    /// Convert one ADC frame and run the tick on it.
    pub fn tick_adc(&mut self, frame: &AdcFrame) -> Sample {
        let sample = self.frontend.process(frame);
        self.tick(&sample);
        sample
    }

    pub fn tick(&mut self, sample: &Sample) {
        self.speedo.tick(sample, self.setpoint);

        let mut setpoint = self.setpoint;
        let calibrating = {
            let mut ctx = CalibCtx {
                speedo: &mut self.speedo,
                regulator: &mut self.regulator,
                cfg: &mut self.cfg,
                store: &mut self.store,
                setpoint: &mut setpoint,
            };
            self.supervisor.tick(&mut ctx, sample)
        };

        if !calibrating {
            setpoint = if self.speedo.is_calibrated() {
                self.regulator.tick(sample.knob, self.speedo.speed())
            } else {
                self.regulator.reset_state();
                if self.regulator.knob_scale().in_dead_zone(sample.knob) {
                    Fix16::ZERO
                } else {
                    UNCALIBRATED_SETPOINT
                }
            };
        }

        self.setpoint = setpoint.max(Fix16::ZERO).min(Fix16::ONE);
        self.triac.set_setpoint(self.setpoint);
        self.triac.run(sample);

        Debug::Speed.log_fix16(self.speedo.speed());
        Debug::Setpoint.log_fix16(self.setpoint);
        Debug::Knob.log_fix16(sample.knob);
        Debug::RegulatorOut.log_fix16(self.regulator.out_power());
        Debug::CalibStage.log_i32(self.supervisor.stage() as i32);
    }

    /// Normalized estimated speed.
    pub fn speed(&self) -> Fix16 {
        self.speedo.speed()
    }

    /// Triac setpoint in effect.
    pub fn setpoint(&self) -> Fix16 {
        self.setpoint
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.cfg
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn gate(&self) -> &G {
        self.triac.gate()
    }

    pub fn regulator(&self) -> &R {
        &self.regulator
    }

    pub fn is_calibrating(&self) -> bool {
        self.supervisor.is_active()
    }

    pub fn stage(&self) -> CalibStage {
        self.supervisor.stage()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{analog::ZeroCross, config::MemStore, regulator::Pid};

    #[derive(Default)]
    struct Gate {
        on: bool,
        fired: u32,
    }

    impl TriacGate for Gate {
        fn ignition_on(&mut self) {
            self.on = true;
            self.fired += 1;
        }

        fn ignition_off(&mut self) {
            self.on = false;
        }
    }

    fn system() -> System<Pid, MemStore, Gate> {
        let store = MemStore::new();
        let pid = Pid::new(&RuntimeConfig::load(&store));
        System::new(store, Gate::default(), pid)
    }

    /// Square wave "mains" with 100 tick half waves.
    fn run(sys: &mut System<Pid, MemStore, Gate>, zc: &mut ZeroCross, knob: Fix16, periods: u32) {
        for _ in 0..periods {
            for t in 0..200 {
                let v = if t < 100 { fix16!(300) } else { Fix16::ZERO };
                sys.tick(&zc.sample(v, Fix16::ZERO, knob));
            }
        }
    }

    #[test]
    fn test_uncalibrated_fallback() {
        let mut sys = system();
        let mut zc = ZeroCross::new();
        assert!(!sys.speedo.is_calibrated());

        run(&mut sys, &mut zc, Fix16::ZERO, 3);
        assert_eq!(sys.setpoint(), Fix16::ZERO);
        assert_eq!(sys.gate().fired, 0);

        run(&mut sys, &mut zc, fix16!(0.6), 3);
        assert_eq!(sys.setpoint(), UNCALIBRATED_SETPOINT);
        assert!(sys.gate().fired > 0);
        assert_eq!(sys.speed(), Fix16::ZERO);
        assert!(!sys.is_calibrating());
        assert_eq!(sys.stage(), CalibStage::WaitTrigger);
    }

    #[test]
    fn test_debug_channels() {
        let mut sys = system();
        let mut zc = ZeroCross::new();
        run(&mut sys, &mut zc, fix16!(0.6), 1);
        #[cfg(feature = "debug")]
        {
            let values = crate::debug::snapshot();
            assert_eq!(values[Debug::CalibStage as usize], CalibStage::WaitTrigger as i32);
        }
    }
}

// vim: ts=4 sw=4 expandtab
