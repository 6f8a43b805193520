//! The sync engine: the single writer of panel state.
//!
//! Consumes hardware events and simulator updates from the worker channels,
//! owns `PanelMode` and the last sent image, and produces simulator commands
//! and display images. Everything here runs on one thread; the workers never
//! touch engine state directly.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info};

use crate::codec::{
    BaroField, ButtonId, DeviceMask, Knob, Led, PanelFlags, PanelInputEvent, PanelOutputImage,
    Switch,
};
use crate::config::BridgeConfig;
use crate::mapping::{self, buttons, dref, Target};
use crate::status::{send_lossy, ConnectionState, ControlCmd, StatusSender};
use crate::xplane::LinkCmd;

/// Everything that can wake the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Input(PanelInputEvent),
    DeviceUp(DeviceMask),
    DeviceDown,
    SimData(Vec<(&'static str, f32)>),
    SimDown,
    Control(ControlCmd),
}

// -----------------------------
// Panel mode
// -----------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpdUnit {
    Knots,
    Mach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LateralMode {
    HdgVs,
    TrkFpa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltStep {
    Hundred,
    Thousand,
}

/// Which reference each window shows. Owned by the engine; flipped by panel
/// input, reconciled when the simulator echoes a mode dataref (the cockpit
/// side can change modes too).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelMode {
    pub spd_unit: SpdUnit,
    pub lateral: LateralMode,
    pub alt_step: AltStep,
}

impl Default for PanelMode {
    fn default() -> Self {
        Self {
            spd_unit: SpdUnit::Knots,
            lateral: LateralMode::HdgVs,
            alt_step: AltStep::Hundred,
        }
    }
}

// -----------------------------
// Simulator state
// -----------------------------

/// Latest value and arrival instant per subscribed dataref. Only `SimData`
/// events mutate it.
#[derive(Debug, Default)]
pub struct SimState {
    values: HashMap<&'static str, (f32, Instant)>,
}

impl SimState {
    fn insert(&mut self, name: &'static str, value: f32, now: Instant) {
        self.values.insert(name, (value, now));
    }

    /// A value older than the staleness window is as good as absent.
    fn fresh(&self, name: &str, now: Instant, staleness: std::time::Duration) -> Option<f32> {
        self.values
            .get(name)
            .filter(|(_, at)| now.duration_since(*at) <= staleness)
            .map(|(v, _)| *v)
    }
}

// -----------------------------
// Engine
// -----------------------------

pub struct Engine {
    cfg: BridgeConfig,
    rx: Receiver<EngineEvent>,
    link_tx: Sender<LinkCmd>,
    image_tx: Sender<PanelOutputImage>,
    image_rx: Receiver<PanelOutputImage>,
    status: StatusSender,
    stop: Arc<AtomicBool>,

    state: ConnectionState,
    mode: PanelMode,
    sim: SimState,
    device: Option<DeviceMask>,
    panel_light: u8,
    lcd_light: u8,
    last_image: Option<PanelOutputImage>,
    last_press: HashMap<ButtonId, Instant>,
    deltas: BTreeMap<Knob, i32>,
    pending: Vec<PanelInputEvent>,
    last_sim_rx: Option<Instant>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: BridgeConfig,
        rx: Receiver<EngineEvent>,
        link_tx: Sender<LinkCmd>,
        image_tx: Sender<PanelOutputImage>,
        image_rx: Receiver<PanelOutputImage>,
        status: StatusSender,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let panel_light = cfg.device.backlight;
        let lcd_light = cfg.device.lcd_backlight;
        Self {
            cfg,
            rx,
            link_tx,
            image_tx,
            image_rx,
            status,
            stop,
            state: ConnectionState::DeviceDown,
            mode: PanelMode::default(),
            sim: SimState::default(),
            device: None,
            panel_light,
            lcd_light,
            last_image: None,
            last_press: HashMap::new(),
            deltas: BTreeMap::new(),
            pending: Vec::new(),
            last_sim_rx: None,
        }
    }

    pub fn run(&mut self) {
        info!("sync engine started");
        self.status.connection(self.state);
        let tick = self.cfg.tick();
        let mut next_tick = Instant::now() + tick;

        loop {
            if self.stop.load(Ordering::Relaxed) && self.state != ConnectionState::ShuttingDown {
                self.begin_shutdown();
            }
            if self.state == ConnectionState::ShuttingDown {
                break;
            }

            let timeout = next_tick.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(timeout) {
                Ok(ev) => self.handle_event(ev, Instant::now()),
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    self.tick(now);
                    next_tick = now + tick;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("sync engine stopped");
    }

    // -----------------------------
    // Event handling
    // -----------------------------

    fn handle_event(&mut self, ev: EngineEvent, now: Instant) {
        match ev {
            EngineEvent::Input(input) => {
                if self.state == ConnectionState::Bridging {
                    self.pending.push(input);
                }
            }
            EngineEvent::DeviceUp(mask) => {
                self.device = Some(mask);
                self.status.log(format!("panel connected ({:#04b})", mask.0));
                let fresh = self
                    .last_sim_rx
                    .is_some_and(|at| now.duration_since(at) <= self.cfg.staleness());
                self.transition(if fresh {
                    ConnectionState::Bridging
                } else {
                    ConnectionState::SimDown
                });
            }
            EngineEvent::DeviceDown => {
                self.device = None;
                self.pending.clear();
                self.deltas.clear();
                self.last_image = None;
                self.status.log("panel disconnected");
                self.transition(ConnectionState::DeviceDown);
            }
            EngineEvent::SimData(values) => {
                for (name, value) in values {
                    self.apply_sim_value(name, value, now);
                }
                self.last_sim_rx = Some(now);
                if self.device.is_some() && self.state == ConnectionState::SimDown {
                    self.status.log("simulator data flowing");
                    self.transition(ConnectionState::Bridging);
                }
            }
            EngineEvent::SimDown => {
                self.last_sim_rx = None;
                if self.state == ConnectionState::Bridging {
                    self.status.log("simulator link lost");
                    self.transition(ConnectionState::SimDown);
                    self.push_image(self.blank_image());
                }
            }
            EngineEvent::Control(ControlCmd::Reconnect) => {
                self.status.log("reconnect requested");
                let _ = self.link_tx.send(LinkCmd::Resubscribe);
            }
            EngineEvent::Control(ControlCmd::Shutdown) => self.begin_shutdown(),
        }
    }

    fn apply_sim_value(&mut self, name: &'static str, value: f32, now: Instant) {
        // cockpit rheostats arrive as 0..1 ratios
        match name {
            dref::LIGHT_PANEL => {
                self.panel_light = if value <= 1.0 {
                    (value * 255.0) as u8
                } else {
                    value.min(255.0) as u8
                };
            }
            dref::LIGHT_LCD => {
                self.lcd_light = if value <= 1.0 {
                    (value * 235.0 + 20.0) as u8
                } else {
                    value.min(255.0) as u8
                };
            }
            // the simulator wins a mode disagreement
            dref::AIRSPEED_IS_MACH => {
                self.mode.spd_unit = if value != 0.0 {
                    SpdUnit::Mach
                } else {
                    SpdUnit::Knots
                };
            }
            dref::HDGTRK_MODE => {
                self.mode.lateral = if value != 0.0 {
                    LateralMode::TrkFpa
                } else {
                    LateralMode::HdgVs
                };
            }
            _ => {}
        }
        self.sim.insert(name, value, now);
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            info!(from = ?self.state, to = ?next, "state change");
            self.state = next;
            self.status.connection(next);
        }
    }

    fn begin_shutdown(&mut self) {
        if self.state != ConnectionState::ShuttingDown {
            self.push_image(self.blank_image());
            self.transition(ConnectionState::ShuttingDown);
        }
    }

    // -----------------------------
    // Tick
    // -----------------------------

    fn tick(&mut self, now: Instant) {
        if self.state == ConnectionState::Bridging {
            self.process_inputs(now);
        }

        // sim gone quiet: blank the panel within one tick
        if self.state == ConnectionState::Bridging {
            let stale = self
                .last_sim_rx
                .map_or(true, |at| now.duration_since(at) > self.cfg.staleness());
            if stale {
                self.status.log("simulator stale, blanking panel");
                self.transition(ConnectionState::SimDown);
                self.push_image(self.blank_image());
                return;
            }
        }

        if self.state == ConnectionState::Bridging {
            let image = self.compute_image(now);
            self.push_image(image);
        }
    }

    fn process_inputs(&mut self, now: Instant) {
        let pending = std::mem::take(&mut self.pending);
        for input in pending {
            match input {
                PanelInputEvent::ButtonPress(id) => {
                    if let Some(at) = self.last_press.get(&id) {
                        if now.duration_since(*at) < self.cfg.debounce() {
                            debug!(id, "debounced press");
                            continue;
                        }
                    }
                    self.last_press.insert(id, now);
                    self.press(id, now);
                }
                PanelInputEvent::ButtonRelease(_) => {}
                PanelInputEvent::EncoderDelta(knob, delta) => {
                    *self.deltas.entry(knob).or_insert(0) += delta;
                }
                PanelInputEvent::SwitchState(sw, pos) => {
                    if sw == Switch::AltStep {
                        self.mode.alt_step = if pos == 0 {
                            AltStep::Hundred
                        } else {
                            AltStep::Thousand
                        };
                    }
                    let _ = self
                        .link_tx
                        .send(LinkCmd::WriteDataRef(mapping::switch_dataref(sw), pos as f32));
                }
            }
        }

        // knob detents queued faster than the tick rate sum up; one command
        // per net step, reset every tick
        for (knob, net) in std::mem::take(&mut self.deltas) {
            if net == 0 {
                continue;
            }
            let (inc, dec) = mapping::encoder_commands(knob);
            let cmd = if net > 0 { inc } else { dec };
            for _ in 0..net.abs() {
                let _ = self.link_tx.send(LinkCmd::Command(cmd));
            }
        }
    }

    fn press(&mut self, id: ButtonId, now: Instant) {
        match mapping::button_target(id) {
            Some(Target::Command(path)) => {
                // optimistic flip; the sim echo reconciles on the next cycle
                if id == buttons::MACH {
                    self.mode.spd_unit = match self.mode.spd_unit {
                        SpdUnit::Knots => SpdUnit::Mach,
                        SpdUnit::Mach => SpdUnit::Knots,
                    };
                }
                if id == buttons::TRK {
                    self.mode.lateral = match self.mode.lateral {
                        LateralMode::HdgVs => LateralMode::TrkFpa,
                        LateralMode::TrkFpa => LateralMode::HdgVs,
                    };
                }
                let _ = self.link_tx.send(LinkCmd::Command(path));
            }
            Some(Target::ToggleDataRef(dataref)) => {
                let current = self
                    .sim
                    .fresh(dataref, now, self.cfg.staleness())
                    .unwrap_or(0.0);
                let next = if current != 0.0 { 0.0 } else { 1.0 };
                let _ = self.link_tx.send(LinkCmd::WriteDataRef(dataref, next));
            }
            None => debug!(id, "press on unmapped button"),
        }
    }

    // -----------------------------
    // Image computation
    // -----------------------------

    fn push_image(&mut self, image: PanelOutputImage) {
        if self.last_image.as_ref() == Some(&image) {
            return;
        }
        send_lossy(&self.image_tx, &self.image_rx, image.clone());
        self.status.image(&image);
        self.last_image = Some(image);
    }

    fn base_lamps(&self) -> BTreeMap<Led, u8> {
        let mut lamps = BTreeMap::new();
        lamps.insert(Led::Backlight, self.panel_light);
        lamps.insert(Led::ScreenBacklight, self.lcd_light);
        lamps.insert(Led::FlagGreen, self.panel_light);
        lamps.insert(Led::ExpedYellow, self.panel_light);
        if self
            .device
            .is_some_and(|m| m.contains(DeviceMask::EFIS_R))
        {
            lamps.insert(Led::EfisrBacklight, self.panel_light);
            lamps.insert(Led::EfisrScreenBacklight, self.lcd_light);
            lamps.insert(Led::EfisrFlagGreen, self.panel_light);
        }
        lamps
    }

    /// Dashed windows, annunciators dark, backlight untouched.
    fn blank_image(&self) -> PanelOutputImage {
        PanelOutputImage {
            lamps: self.base_lamps(),
            ..PanelOutputImage::blank()
        }
    }

    fn compute_image(&self, now: Instant) -> PanelOutputImage {
        let staleness = self.cfg.staleness();
        let fresh = |name: &str| self.sim.fresh(name, now, staleness);
        let is_set = |name: &str| fresh(name).map(|v| v != 0.0).unwrap_or(false);

        let mach = self.mode.spd_unit == SpdUnit::Mach;
        let trk_fpa = self.mode.lateral == LateralMode::TrkFpa;

        let speed = if is_set(dref::SPD_DASHED) {
            None
        } else {
            fresh(dref::AIRSPEED_DIAL).map(|v| {
                let shown = if mach && v < 1.0 { (v + 0.005) * 100.0 } else { v };
                shown.clamp(0.0, 999.0) as u16
            })
        };

        let heading = if is_set(dref::HDG_DASHED) {
            None
        } else {
            fresh(dref::HEADING_MAG).map(|v| v.clamp(0.0, 359.0) as u16)
        };

        let altitude = fresh(dref::ALTITUDE).map(|v| v as i32);

        let vertical_speed = if is_set(dref::VS_DASHED) {
            None
        } else if trk_fpa {
            // the V/S window shows flight path angle in tenths of a degree
            fresh(dref::FPA).map(|v| (v * 10.0).round().clamp(-99.0, 99.0) as i16)
        } else {
            fresh(dref::VERTICAL_VELOCITY).map(|v| v.clamp(-9900.0, 9900.0) as i16)
        };

        let flags = PanelFlags {
            spd_label: !mach,
            mach_label: mach,
            mach_comma: mach,
            hdg_label: !trk_fpa,
            trk_label: trk_fpa,
            vs_hdg_label: !trk_fpa,
            vs_label: !trk_fpa,
            trk_fpa_trk_label: trk_fpa,
            trk_fpa_fpa_label: trk_fpa,
            fvs_label: !trk_fpa,
            ffpa_label: trk_fpa,
            fpa_comma: trk_fpa && vertical_speed.is_some(),
            spd_managed: is_set(dref::SPD_MANAGED),
            hdg_managed: is_set(dref::HDG_MANAGED),
            alt_managed: is_set(dref::ALT_MANAGED),
            vs_plus_vert: vertical_speed.map(|v| v >= 0).unwrap_or(false),
            efisr_qfe: false,
            efisr_qnh: false,
            efisr_hpa_dec: false,
        };

        let mut image = PanelOutputImage {
            speed,
            heading,
            altitude,
            vertical_speed,
            baro: None,
            flags,
            lamps: self.base_lamps(),
        };

        let lamp_level = |name: &str| fresh(name).map(|v| v.clamp(0.0, 255.0) as u8).unwrap_or(0);
        image.lamps.insert(Led::Ap1Green, lamp_level(dref::AP1_ENGAGE));
        image.lamps.insert(Led::Ap2Green, lamp_level(dref::AP2_ENGAGE));
        image
            .lamps
            .insert(Led::LocGreen, lamp_level(dref::LOC_ILLUMINATED));
        image.lamps.insert(Led::AthrGreen, lamp_level(dref::ATHR_MODE));
        image
            .lamps
            .insert(Led::ApprGreen, lamp_level(dref::APPR_ILLUMINATED));
        let exped = fresh(dref::AP_VERTICAL_MODE).map(|v| v >= 112.0).unwrap_or(false);
        image
            .lamps
            .insert(Led::ExpedGreen, if exped { self.panel_light } else { 0 });

        if self
            .device
            .is_some_and(|m| m.contains(DeviceMask::EFIS_R))
        {
            let std = is_set(dref::BARO_STD_FO);
            let hpa = is_set(dref::BARO_UNIT_FO);
            image.baro = if std {
                Some(BaroField::Std)
            } else {
                fresh(dref::BARO_INHG_FO).map(|raw| {
                    let hundredths = if raw < 100.0 { (raw + 0.005) * 100.0 } else { raw };
                    let shown = if hpa {
                        (hundredths * 33.86388 + 50.0) / 100.0
                    } else {
                        hundredths
                    };
                    BaroField::Value(shown as u16)
                })
            };
            image.flags.efisr_qnh = !std;
            image.flags.efisr_hpa_dec = !hpa && !std;

            image
                .lamps
                .insert(Led::EfisrFdGreen, lamp_level(dref::FD2_ENGAGE));
            image
                .lamps
                .insert(Led::EfisrLsGreen, lamp_level(dref::ILS_ON_FO));
            image
                .lamps
                .insert(Led::EfisrCstrGreen, lamp_level(dref::ND_SHOW_CSTR_FO));
            image
                .lamps
                .insert(Led::EfisrWptGreen, lamp_level(dref::ND_SHOW_WPT_FO));
            image
                .lamps
                .insert(Led::EfisrVordGreen, lamp_level(dref::ND_SHOW_VORD_FO));
            image
                .lamps
                .insert(Led::EfisrNdbGreen, lamp_level(dref::ND_SHOW_NDB_FO));
            image
                .lamps
                .insert(Led::EfisrArptGreen, lamp_level(dref::ND_SHOW_ARPT_FO));
        }

        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusEvent;
    use crossbeam_channel::bounded;
    use std::time::Duration;

    struct Rig {
        engine: Engine,
        link_rx: Receiver<LinkCmd>,
        image_rx: Receiver<PanelOutputImage>,
        status_rx: Receiver<StatusEvent>,
    }

    fn rig() -> Rig {
        let cfg = BridgeConfig::default();
        let (_etx, erx) = bounded(64);
        let (link_tx, link_rx) = bounded(64);
        let (image_tx, image_rx) = bounded(8);
        let (status, status_rx) = StatusSender::channel(64);
        let engine = Engine::new(
            cfg,
            erx,
            link_tx,
            image_tx.clone(),
            image_rx.clone(),
            status,
            Arc::new(AtomicBool::new(false)),
        );
        Rig {
            engine,
            link_rx,
            image_rx,
            status_rx,
        }
    }

    fn scenario_data() -> Vec<(&'static str, f32)> {
        vec![
            (dref::AIRSPEED_DIAL, 250.0),
            (dref::HEADING_MAG, 180.0),
            (dref::ALTITUDE, 35_000.0),
            (dref::VERTICAL_VELOCITY, -500.0),
        ]
    }

    fn commands(rx: &Receiver<LinkCmd>) -> Vec<LinkCmd> {
        rx.try_iter().collect()
    }

    #[test]
    fn bridging_requires_device_and_sim() {
        let mut r = rig();
        let t0 = Instant::now();
        assert_eq!(r.engine.state, ConnectionState::DeviceDown);

        r.engine
            .handle_event(EngineEvent::DeviceUp(DeviceMask::FCU), t0);
        assert_eq!(r.engine.state, ConnectionState::SimDown);

        r.engine
            .handle_event(EngineEvent::SimData(scenario_data()), t0);
        assert_eq!(r.engine.state, ConnectionState::Bridging);
    }

    #[test]
    fn snapshot_renders_then_staleness_blanks() {
        let mut r = rig();
        let t0 = Instant::now();
        r.engine
            .handle_event(EngineEvent::DeviceUp(DeviceMask::FCU), t0);
        r.engine
            .handle_event(EngineEvent::SimData(scenario_data()), t0);

        r.engine.tick(t0 + Duration::from_millis(50));
        let img = r.image_rx.try_recv().expect("image after first tick");
        assert_eq!(img.speed, Some(250));
        assert_eq!(img.heading, Some(180));
        assert_eq!(img.altitude, Some(35_000));
        assert_eq!(img.vertical_speed, Some(-500));
        assert!(!img.flags.vs_plus_vert);

        // nothing arrives for longer than the staleness window
        let late = t0 + r.engine.cfg.staleness() + Duration::from_millis(100);
        r.engine.tick(late);
        let blank = r.image_rx.try_recv().expect("blank image after staleness");
        assert_eq!(blank.speed, None);
        assert_eq!(blank.heading, None);
        assert_eq!(blank.altitude, None);
        assert_eq!(blank.vertical_speed, None);
        assert_eq!(r.engine.state, ConnectionState::SimDown);
    }

    #[test]
    fn unchanged_state_sends_no_second_image() {
        let mut r = rig();
        let t0 = Instant::now();
        r.engine
            .handle_event(EngineEvent::DeviceUp(DeviceMask::FCU), t0);
        r.engine
            .handle_event(EngineEvent::SimData(scenario_data()), t0);

        r.engine.tick(t0 + Duration::from_millis(50));
        assert!(r.image_rx.try_recv().is_ok());
        r.engine.tick(t0 + Duration::from_millis(100));
        assert!(r.image_rx.try_recv().is_err(), "identical image re-sent");
    }

    #[test]
    fn double_press_within_window_fires_once() {
        let mut r = rig();
        let t0 = Instant::now();
        r.engine
            .handle_event(EngineEvent::DeviceUp(DeviceMask::FCU), t0);
        r.engine
            .handle_event(EngineEvent::SimData(scenario_data()), t0);

        let press = EngineEvent::Input(PanelInputEvent::ButtonPress(buttons::MACH));
        r.engine.handle_event(press.clone(), t0);
        r.engine.handle_event(press, t0 + Duration::from_millis(10));
        r.engine.tick(t0 + Duration::from_millis(50));

        let sent = commands(&r.link_rx);
        assert_eq!(
            sent,
            vec![LinkCmd::Command("toliss_airbus/ias_mach_button_push")]
        );
    }

    #[test]
    fn encoder_deltas_sum_to_net_steps() {
        let mut r = rig();
        let t0 = Instant::now();
        r.engine
            .handle_event(EngineEvent::DeviceUp(DeviceMask::FCU), t0);
        r.engine
            .handle_event(EngineEvent::SimData(scenario_data()), t0);

        for delta in [1, 1, -1] {
            r.engine.handle_event(
                EngineEvent::Input(PanelInputEvent::EncoderDelta(Knob::Spd, delta)),
                t0,
            );
        }
        r.engine.tick(t0 + Duration::from_millis(50));

        assert_eq!(
            commands(&r.link_rx),
            vec![LinkCmd::Command("sim/autopilot/airspeed_up")]
        );
        // the accumulator resets each tick
        r.engine.tick(t0 + Duration::from_millis(100));
        assert!(commands(&r.link_rx).is_empty());
    }

    #[test]
    fn alt_step_switch_writes_dataref_and_mode() {
        let mut r = rig();
        let t0 = Instant::now();
        r.engine
            .handle_event(EngineEvent::DeviceUp(DeviceMask::FCU), t0);
        r.engine
            .handle_event(EngineEvent::SimData(scenario_data()), t0);

        r.engine.handle_event(
            EngineEvent::Input(PanelInputEvent::SwitchState(Switch::AltStep, 1)),
            t0,
        );
        r.engine.tick(t0 + Duration::from_millis(50));

        assert_eq!(r.engine.mode.alt_step, AltStep::Thousand);
        assert_eq!(
            commands(&r.link_rx),
            vec![LinkCmd::WriteDataRef("AirbusFBW/ALT100_1000", 1.0)]
        );
    }

    #[test]
    fn ap1_press_toggles_the_engage_dataref() {
        let mut r = rig();
        let t0 = Instant::now();
        r.engine
            .handle_event(EngineEvent::DeviceUp(DeviceMask::FCU), t0);
        let mut data = scenario_data();
        data.push((dref::AP1_ENGAGE, 1.0));
        r.engine.handle_event(EngineEvent::SimData(data), t0);

        r.engine.handle_event(
            EngineEvent::Input(PanelInputEvent::ButtonPress(buttons::AP1)),
            t0,
        );
        r.engine.tick(t0 + Duration::from_millis(50));

        assert_eq!(
            commands(&r.link_rx),
            vec![LinkCmd::WriteDataRef(dref::AP1_ENGAGE, 0.0)]
        );
    }

    #[test]
    fn sim_echo_wins_a_mode_disagreement() {
        let mut r = rig();
        let t0 = Instant::now();
        r.engine
            .handle_event(EngineEvent::DeviceUp(DeviceMask::FCU), t0);
        r.engine
            .handle_event(EngineEvent::SimData(scenario_data()), t0);

        r.engine.handle_event(
            EngineEvent::Input(PanelInputEvent::ButtonPress(buttons::MACH)),
            t0,
        );
        r.engine.tick(t0 + Duration::from_millis(50));
        assert_eq!(r.engine.mode.spd_unit, SpdUnit::Mach);

        r.engine.handle_event(
            EngineEvent::SimData(vec![(dref::AIRSPEED_IS_MACH, 0.0)]),
            t0 + Duration::from_millis(60),
        );
        assert_eq!(r.engine.mode.spd_unit, SpdUnit::Knots);
    }

    #[test]
    fn mach_mode_shows_hundredths_with_comma() {
        let mut r = rig();
        let t0 = Instant::now();
        r.engine
            .handle_event(EngineEvent::DeviceUp(DeviceMask::FCU), t0);
        let mut data = scenario_data();
        data.push((dref::AIRSPEED_IS_MACH, 1.0));
        data.push((dref::AIRSPEED_DIAL, 0.78));
        r.engine.handle_event(EngineEvent::SimData(data), t0);

        r.engine.tick(t0 + Duration::from_millis(50));
        let img = r.image_rx.try_recv().unwrap();
        assert_eq!(img.speed, Some(78));
        assert!(img.flags.mach_label);
        assert!(img.flags.mach_comma);
        assert!(!img.flags.spd_label);
    }

    #[test]
    fn efisr_baro_converts_to_hectopascal() {
        let mut r = rig();
        let t0 = Instant::now();
        r.engine.handle_event(
            EngineEvent::DeviceUp(DeviceMask::FCU.with(DeviceMask::EFIS_R)),
            t0,
        );
        let mut data = scenario_data();
        data.push((dref::BARO_INHG_FO, 29.92));
        data.push((dref::BARO_UNIT_FO, 1.0));
        data.push((dref::BARO_STD_FO, 0.0));
        r.engine.handle_event(EngineEvent::SimData(data), t0);

        r.engine.tick(t0 + Duration::from_millis(50));
        let img = r.image_rx.try_recv().unwrap();
        assert_eq!(img.baro, Some(BaroField::Value(1013)));
        assert!(img.flags.efisr_qnh);
        assert!(!img.flags.efisr_hpa_dec);
    }

    #[test]
    fn device_loss_recovers_without_crash() {
        let mut r = rig();
        let t0 = Instant::now();
        r.engine
            .handle_event(EngineEvent::DeviceUp(DeviceMask::FCU), t0);
        r.engine
            .handle_event(EngineEvent::SimData(scenario_data()), t0);
        r.engine.tick(t0 + Duration::from_millis(50));
        let _ = r.image_rx.try_recv();

        r.engine.handle_event(EngineEvent::DeviceDown, t0);
        assert_eq!(r.engine.state, ConnectionState::DeviceDown);
        r.engine.tick(t0 + Duration::from_millis(100));
        assert!(r.image_rx.try_recv().is_err(), "image sent with no device");

        // plug back in while sim data is still fresh
        r.engine.handle_event(
            EngineEvent::DeviceUp(DeviceMask::FCU),
            t0 + Duration::from_millis(150),
        );
        assert_eq!(r.engine.state, ConnectionState::Bridging);
        r.engine.tick(t0 + Duration::from_millis(200));
        assert!(r.image_rx.try_recv().is_ok());

        let states: Vec<ConnectionState> = r
            .status_rx
            .try_iter()
            .filter_map(|e| match e {
                StatusEvent::Connection(s) => Some(s),
                _ => None,
            })
            .collect();
        assert!(states.contains(&ConnectionState::DeviceDown));
        assert_eq!(states.last(), Some(&ConnectionState::Bridging));
    }

    #[test]
    fn shutdown_control_is_terminal_and_blanks() {
        let mut r = rig();
        let t0 = Instant::now();
        r.engine
            .handle_event(EngineEvent::DeviceUp(DeviceMask::FCU), t0);
        r.engine
            .handle_event(EngineEvent::SimData(scenario_data()), t0);
        r.engine.tick(t0 + Duration::from_millis(50));
        let _ = r.image_rx.try_recv();

        r.engine
            .handle_event(EngineEvent::Control(ControlCmd::Shutdown), t0);
        assert_eq!(r.engine.state, ConnectionState::ShuttingDown);
        let parting = r.image_rx.try_recv().expect("blank image on shutdown");
        assert_eq!(parting.speed, None);
    }

    #[test]
    fn rheostat_ratio_scales_backlight_lamps() {
        let mut r = rig();
        let t0 = Instant::now();
        r.engine
            .handle_event(EngineEvent::DeviceUp(DeviceMask::FCU), t0);
        let mut data = scenario_data();
        data.push((dref::LIGHT_PANEL, 0.5));
        r.engine.handle_event(EngineEvent::SimData(data), t0);

        r.engine.tick(t0 + Duration::from_millis(50));
        let img = r.image_rx.try_recv().unwrap();
        assert_eq!(img.lamps.get(&Led::Backlight), Some(&127));
        assert_eq!(img.lamps.get(&Led::FlagGreen), Some(&127));
        // LCD rheostat untouched: config default stands
        assert_eq!(img.lamps.get(&Led::ScreenBacklight), Some(&180));
    }
}
