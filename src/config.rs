// -*- coding: utf-8 -*-
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (C) 2025 Michael Büsch <m@bues.ch>

//! Persistent runtime configuration.

/// Persistent float key/value store.
///
/// Reads return `default` for missing or unreadable slots.
pub trait ConfigStore {
    fn read_float(&self, addr: u16, default: f32) -> f32;
    fn write_float(&mut self, addr: u16, value: f32);
}

/// Shunt resistance, in mOhm.
pub const ADDR_SHUNT_RESISTANCE: u16 = 1;
pub const ADDR_RPM_MAX: u16 = 2;
pub const ADDR_RPM_MIN_LIMIT: u16 = 3;
pub const ADDR_RPM_MAX_LIMIT: u16 = 4;
/// Knob dead zone, in percent.
pub const ADDR_DEAD_ZONE_WIDTH: u16 = 5;
pub const ADDR_ADRC_KP: u16 = 6;
pub const ADDR_ADRC_KOBSERVERS: u16 = 7;
pub const ADDR_ADRC_P_CORR_COEFF: u16 = 8;
pub const ADDR_REKV_TO_SPEED_FACTOR: u16 = 9;
pub const ADDR_RPM_TABLE: u16 = 10;
pub const ADDR_R_TABLE: u16 = ADDR_RPM_TABLE + RPM_TABLE_LEN as u16;
pub const ADDR_PID_P: u16 = ADDR_R_TABLE + R_TABLE_LEN as u16;
/// PID integral time, in seconds.
pub const ADDR_PID_I: u16 = ADDR_PID_P + 1;
pub const ADDR_VERSION: u16 = ADDR_PID_I + 1;
/// Number of slots including the unused slot 0.
pub const NR_SLOTS: usize = ADDR_VERSION as usize + 1;

/// Bump this to invalidate everything stored with an older layout.
pub const CONFIG_VERSION: f32 = 1.0;

/// Number of RPM-vs-drive table entries (excluding the 0 and 1 endpoints).
pub const RPM_TABLE_LEN: usize = 16;
/// Number of resistance-vs-setpoint table entries.
pub const R_TABLE_LEN: usize = 7;

/// Marks an uncalibrated resistance table.
pub const R_CAL_CHECK_MARKER: f32 = 123456789.0;

/// Runtime configuration, loaded from the [ConfigStore].
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeConfig {
    /// mOhm
    pub shunt_resistance: f32,
    pub rpm_max: f32,
    pub rpm_min_limit: f32,
    pub rpm_max_limit: f32,
    /// percent
    pub dead_zone_width: f32,
    pub pid_p: f32,
    /// Integral time, in seconds.
    pub pid_i: f32,
    pub adrc_kp: f32,
    pub adrc_kobservers: f32,
    pub adrc_p_corr_coeff: f32,
    pub rekv_to_speed_factor: f32,
    pub r_interp_table: [f32; R_TABLE_LEN],
    pub rpm_interp_table: [f32; RPM_TABLE_LEN],
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shunt_resistance: 10.0,
            rpm_max: 37500.0,
            rpm_min_limit: 5000.0,
            rpm_max_limit: 30000.0,
            dead_zone_width: 2.0,
            pid_p: 1.0,
            pid_i: 1.0,
            adrc_kp: 1.0,
            adrc_kobservers: 1.0,
            adrc_p_corr_coeff: 0.0,
            rekv_to_speed_factor: 450.0,
            r_interp_table: [R_CAL_CHECK_MARKER; R_TABLE_LEN],
            rpm_interp_table: core::array::from_fn(|i| (i + 1) as f32 / (RPM_TABLE_LEN + 1) as f32),
        }
    }
}

impl RuntimeConfig {
    /// Load the configuration. Missing slots read as their defaults.
    /// A version mismatch discards all stored values.
    pub fn load(store: &impl ConfigStore) -> Self {
        let mut cfg = Self::default();
        if !version_valid(store) {
            warn!("config: stored layout version mismatch, using defaults");
            return cfg;
        }

        cfg.shunt_resistance = store.read_float(ADDR_SHUNT_RESISTANCE, cfg.shunt_resistance);
        cfg.rpm_max = store.read_float(ADDR_RPM_MAX, cfg.rpm_max);
        cfg.rpm_min_limit = store.read_float(ADDR_RPM_MIN_LIMIT, cfg.rpm_min_limit);
        cfg.rpm_max_limit = store.read_float(ADDR_RPM_MAX_LIMIT, cfg.rpm_max_limit);
        cfg.dead_zone_width = store.read_float(ADDR_DEAD_ZONE_WIDTH, cfg.dead_zone_width);
        cfg.pid_p = store.read_float(ADDR_PID_P, cfg.pid_p);
        cfg.pid_i = store.read_float(ADDR_PID_I, cfg.pid_i);
        cfg.adrc_kp = store.read_float(ADDR_ADRC_KP, cfg.adrc_kp);
        cfg.adrc_kobservers = store.read_float(ADDR_ADRC_KOBSERVERS, cfg.adrc_kobservers);
        cfg.adrc_p_corr_coeff = store.read_float(ADDR_ADRC_P_CORR_COEFF, cfg.adrc_p_corr_coeff);
        cfg.rekv_to_speed_factor =
            store.read_float(ADDR_REKV_TO_SPEED_FACTOR, cfg.rekv_to_speed_factor);
        for (i, v) in cfg.r_interp_table.iter_mut().enumerate() {
            *v = store.read_float(ADDR_R_TABLE + i as u16, *v);
        }
        for (i, v) in cfg.rpm_interp_table.iter_mut().enumerate() {
            *v = store.read_float(ADDR_RPM_TABLE + i as u16, *v);
        }

        info!("config: loaded, calibrated={}", cfg.is_r_calibrated());
        cfg
    }

    pub fn is_r_calibrated(&self) -> bool {
        self.r_interp_table[0] != R_CAL_CHECK_MARKER
    }

    /// Store the resistance table.
    pub fn save_r_table(&mut self, store: &mut impl ConfigStore, table: &[f32; R_TABLE_LEN]) {
        self.r_interp_table = *table;
        self.prepare(store);
        for (i, v) in table.iter().enumerate() {
            store.write_float(ADDR_R_TABLE + i as u16, *v);
        }
    }

    /// Store the back-EMF scale factor together with the RPM-vs-drive table.
    pub fn save_speed_scale(
        &mut self,
        store: &mut impl ConfigStore,
        factor: f32,
        table: &[f32; RPM_TABLE_LEN],
    ) {
        self.rekv_to_speed_factor = factor;
        self.rpm_interp_table = *table;
        self.prepare(store);
        store.write_float(ADDR_REKV_TO_SPEED_FACTOR, factor);
        for (i, v) in table.iter().enumerate() {
            store.write_float(ADDR_RPM_TABLE + i as u16, *v);
        }
    }

    pub fn save_speed_factor(&mut self, store: &mut impl ConfigStore, factor: f32) {
        self.rekv_to_speed_factor = factor;
        self.save(store, ADDR_REKV_TO_SPEED_FACTOR, factor);
    }

    pub fn save_pid_p(&mut self, store: &mut impl ConfigStore, p: f32) {
        self.pid_p = p;
        self.save(store, ADDR_PID_P, p);
    }

    pub fn save_pid_i(&mut self, store: &mut impl ConfigStore, i: f32) {
        self.pid_i = i;
        self.save(store, ADDR_PID_I, i);
    }

    pub fn save_adrc_kp(&mut self, store: &mut impl ConfigStore, kp: f32) {
        self.adrc_kp = kp;
        self.save(store, ADDR_ADRC_KP, kp);
    }

    pub fn save_adrc_kobservers(&mut self, store: &mut impl ConfigStore, kobs: f32) {
        self.adrc_kobservers = kobs;
        self.save(store, ADDR_ADRC_KOBSERVERS, kobs);
    }

    pub fn save_adrc_p_corr_coeff(&mut self, store: &mut impl ConfigStore, coeff: f32) {
        self.adrc_p_corr_coeff = coeff;
        self.save(store, ADDR_ADRC_P_CORR_COEFF, coeff);
    }

    fn save(&self, store: &mut impl ConfigStore, addr: u16, value: f32) {
        self.prepare(store);
        store.write_float(addr, value);
    }

    /// After a version mismatch, rewrite everything before the first
    /// partial update, so the store never mixes layouts.
    fn prepare(&self, store: &mut impl ConfigStore) {
        if !version_valid(store) {
            info!("config: rewriting store with layout version {}", CONFIG_VERSION);
            self.write_all(store);
            store.write_float(ADDR_VERSION, CONFIG_VERSION);
        }
    }

    fn write_all(&self, store: &mut impl ConfigStore) {
        store.write_float(ADDR_SHUNT_RESISTANCE, self.shunt_resistance);
        store.write_float(ADDR_RPM_MAX, self.rpm_max);
        store.write_float(ADDR_RPM_MIN_LIMIT, self.rpm_min_limit);
        store.write_float(ADDR_RPM_MAX_LIMIT, self.rpm_max_limit);
        store.write_float(ADDR_DEAD_ZONE_WIDTH, self.dead_zone_width);
        store.write_float(ADDR_PID_P, self.pid_p);
        store.write_float(ADDR_PID_I, self.pid_i);
        store.write_float(ADDR_ADRC_KP, self.adrc_kp);
        store.write_float(ADDR_ADRC_KOBSERVERS, self.adrc_kobservers);
        store.write_float(ADDR_ADRC_P_CORR_COEFF, self.adrc_p_corr_coeff);
        store.write_float(ADDR_REKV_TO_SPEED_FACTOR, self.rekv_to_speed_factor);
        for (i, v) in self.r_interp_table.iter().enumerate() {
            store.write_float(ADDR_R_TABLE + i as u16, *v);
        }
        for (i, v) in self.rpm_interp_table.iter().enumerate() {
            store.write_float(ADDR_RPM_TABLE + i as u16, *v);
        }
    }
}

fn version_valid(store: &impl ConfigStore) -> bool {
    store.read_float(ADDR_VERSION, 0.0) == CONFIG_VERSION
}

/// Volatile in-memory [ConfigStore].
#[derive(Clone, Debug)]
pub struct MemStore {
    slots: [Option<f32>; NR_SLOTS],
    writes: u32,
}

impl MemStore {
    pub const fn new() -> Self {
        Self {
            slots: [None; NR_SLOTS],
            writes: 0,
        }
    }

    /// Number of writes so far.
    pub fn writes(&self) -> u32 {
        self.writes
    }

    pub fn slot(&self, addr: u16) -> Option<f32> {
        self.slots.get(addr as usize).copied().flatten()
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for MemStore {
    fn read_float(&self, addr: u16, default: f32) -> f32 {
        self.slot(addr).unwrap_or(default)
    }

    fn write_float(&mut self, addr: u16, value: f32) {
        if let Some(slot) = self.slots.get_mut(addr as usize) {
            *slot = Some(value);
            self.writes += 1;
        }
    }
}


// vim: ts=4 sw=4 expandtab
