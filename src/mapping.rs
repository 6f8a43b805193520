//! Input bit assignments and their ToLiss Airbus dataref/command targets.
//!
//! Bits 0..31 belong to the FCU, 32..63 to EFIS-R, 64..95 to EFIS-L.

use crate::codec::{ButtonId, Knob, Switch};

/// Named input bits.
pub mod buttons {
    use crate::codec::ButtonId;

    pub const MACH: ButtonId = 0;
    pub const LOC: ButtonId = 1;
    pub const TRK: ButtonId = 2;
    pub const AP1: ButtonId = 3;
    pub const AP2: ButtonId = 4;
    pub const ATHR: ButtonId = 5;
    pub const EXPED: ButtonId = 6;
    pub const METRIC: ButtonId = 7;
    pub const APPR: ButtonId = 8;
    pub const SPD_PUSH: ButtonId = 11;
    pub const SPD_PULL: ButtonId = 12;
    pub const HDG_PUSH: ButtonId = 15;
    pub const HDG_PULL: ButtonId = 16;
    pub const ALT_PUSH: ButtonId = 19;
    pub const ALT_PULL: ButtonId = 20;
    pub const VS_PUSH: ButtonId = 23;
    pub const VS_PULL: ButtonId = 24;

    pub const R_FD: ButtonId = 32;
    pub const R_LS: ButtonId = 33;
    pub const R_CSTR: ButtonId = 34;
    pub const R_WPT: ButtonId = 35;
    pub const R_VORD: ButtonId = 36;
    pub const R_NDB: ButtonId = 37;
    pub const R_ARPT: ButtonId = 38;
    pub const R_STD_PUSH: ButtonId = 39;
    pub const R_STD_PULL: ButtonId = 40;

    pub const L_FD: ButtonId = 64;
    pub const L_LS: ButtonId = 65;
    pub const L_CSTR: ButtonId = 66;
    pub const L_WPT: ButtonId = 67;
    pub const L_VORD: ButtonId = 68;
    pub const L_NDB: ButtonId = 69;
    pub const L_ARPT: ButtonId = 70;
    pub const L_STD_PUSH: ButtonId = 71;
    pub const L_STD_PULL: ButtonId = 72;
}

/// What a given input bit means.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputKind {
    Button,
    Encoder(Knob, i32),
    Switch(Switch, u8),
}

pub fn classify(id: ButtonId) -> Option<InputKind> {
    let kind = match id {
        // FCU
        0..=8 | 11 | 12 | 15 | 16 | 19 | 20 | 23 | 24 => InputKind::Button,
        9 => InputKind::Encoder(Knob::Spd, -1),
        10 => InputKind::Encoder(Knob::Spd, 1),
        13 => InputKind::Encoder(Knob::Hdg, -1),
        14 => InputKind::Encoder(Knob::Hdg, 1),
        17 => InputKind::Encoder(Knob::Alt, -1),
        18 => InputKind::Encoder(Knob::Alt, 1),
        21 => InputKind::Encoder(Knob::Vs, -1),
        22 => InputKind::Encoder(Knob::Vs, 1),
        25 => InputKind::Switch(Switch::AltStep, 0),
        26 => InputKind::Switch(Switch::AltStep, 1),
        // EFIS-R
        32..=40 => InputKind::Button,
        41 => InputKind::Encoder(Knob::EfisrBaro, -1),
        42 => InputKind::Encoder(Knob::EfisrBaro, 1),
        43 => InputKind::Switch(Switch::BaroUnitR, 0),
        44 => InputKind::Switch(Switch::BaroUnitR, 1),
        45..=49 => InputKind::Switch(Switch::NdModeR, id - 45),
        50..=55 => InputKind::Switch(Switch::NdRangeR, id - 50),
        56 => InputKind::Switch(Switch::Efis1SelR, 2),
        57 => InputKind::Switch(Switch::Efis1SelR, 1),
        58 => InputKind::Switch(Switch::Efis1SelR, 0),
        59 => InputKind::Switch(Switch::Efis2SelR, 2),
        60 => InputKind::Switch(Switch::Efis2SelR, 1),
        61 => InputKind::Switch(Switch::Efis2SelR, 0),
        // EFIS-L
        64..=72 => InputKind::Button,
        73 => InputKind::Encoder(Knob::EfislBaro, -1),
        74 => InputKind::Encoder(Knob::EfislBaro, 1),
        75 => InputKind::Switch(Switch::BaroUnitL, 0),
        76 => InputKind::Switch(Switch::BaroUnitL, 1),
        77..=81 => InputKind::Switch(Switch::NdModeL, id - 77),
        82..=87 => InputKind::Switch(Switch::NdRangeL, id - 82),
        88 => InputKind::Switch(Switch::Efis1SelL, 0),
        89 => InputKind::Switch(Switch::Efis1SelL, 1),
        90 => InputKind::Switch(Switch::Efis1SelL, 2),
        91 => InputKind::Switch(Switch::Efis2SelL, 0),
        92 => InputKind::Switch(Switch::Efis2SelL, 1),
        93 => InputKind::Switch(Switch::Efis2SelL, 2),
        _ => return None,
    };
    Some(kind)
}

/// Simulator-side effect of a button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// CMND on press.
    Command(&'static str),
    /// Invert the cached dataref value (0 <-> 1).
    ToggleDataRef(&'static str),
}

pub fn button_target(id: ButtonId) -> Option<Target> {
    use buttons::*;
    use Target::*;
    let t = match id {
        MACH => Command("toliss_airbus/ias_mach_button_push"),
        LOC => Command("AirbusFBW/LOCbutton"),
        TRK => Command("toliss_airbus/hdgtrk_button_push"),
        AP1 => ToggleDataRef(dref::AP1_ENGAGE),
        AP2 => ToggleDataRef(dref::AP2_ENGAGE),
        ATHR => Command("AirbusFBW/ATHRbutton"),
        EXPED => Command("AirbusFBW/EXPEDbutton"),
        METRIC => Command("toliss_airbus/metric_alt_button_push"),
        APPR => Command("AirbusFBW/APPRbutton"),
        SPD_PUSH => Command("AirbusFBW/PushSPDSel"),
        SPD_PULL => Command("AirbusFBW/PullSPDSel"),
        HDG_PUSH => Command("AirbusFBW/PushHDGSel"),
        HDG_PULL => Command("AirbusFBW/PullHDGSel"),
        ALT_PUSH => Command("AirbusFBW/PushAltitude"),
        ALT_PULL => Command("AirbusFBW/PullAltitude"),
        VS_PUSH => Command("AirbusFBW/PushVSSel"),
        VS_PULL => Command("AirbusFBW/PullVSSel"),
        R_FD => Command("toliss_airbus/fd2_push"),
        R_LS => Command("toliss_airbus/dispcommands/CoLSButtonPush"),
        R_CSTR => Command("toliss_airbus/dispcommands/CoCstrPushButton"),
        R_WPT => Command("toliss_airbus/dispcommands/CoWptPushButton"),
        R_VORD => Command("toliss_airbus/dispcommands/CoVorDPushButton"),
        R_NDB => Command("toliss_airbus/dispcommands/CoNdbPushButton"),
        R_ARPT => Command("toliss_airbus/dispcommands/CoArptPushButton"),
        R_STD_PUSH => Command("toliss_airbus/copilot_baro_push"),
        R_STD_PULL => Command("toliss_airbus/copilot_baro_pull"),
        L_FD => Command("toliss_airbus/fd1_push"),
        L_LS => Command("toliss_airbus/dispcommands/CaptLSButtonPush"),
        L_CSTR => Command("toliss_airbus/dispcommands/CaptCstrPushButton"),
        L_WPT => Command("toliss_airbus/dispcommands/CaptWptPushButton"),
        L_VORD => Command("toliss_airbus/dispcommands/CaptVorDPushButton"),
        L_NDB => Command("toliss_airbus/dispcommands/CaptNdbPushButton"),
        L_ARPT => Command("toliss_airbus/dispcommands/CaptArptPushButton"),
        L_STD_PUSH => Command("toliss_airbus/capt_baro_push"),
        L_STD_PULL => Command("toliss_airbus/capt_baro_pull"),
        _ => return None,
    };
    Some(t)
}

/// CMND pair fired per accumulated detent: (increase, decrease).
pub fn encoder_commands(knob: Knob) -> (&'static str, &'static str) {
    match knob {
        Knob::Spd => ("sim/autopilot/airspeed_up", "sim/autopilot/airspeed_down"),
        Knob::Hdg => ("sim/autopilot/heading_up", "sim/autopilot/heading_down"),
        Knob::Alt => ("sim/autopilot/altitude_up", "sim/autopilot/altitude_down"),
        Knob::Vs => (
            "sim/autopilot/vertical_speed_up",
            "sim/autopilot/vertical_speed_down",
        ),
        Knob::EfisrBaro => (
            "sim/instruments/barometer_copilot_up",
            "sim/instruments/barometer_copilot_down",
        ),
        Knob::EfislBaro => (
            "sim/instruments/barometer_up",
            "sim/instruments/barometer_down",
        ),
    }
}

/// DREF written with the selected position value.
pub fn switch_dataref(sw: Switch) -> &'static str {
    match sw {
        Switch::AltStep => "AirbusFBW/ALT100_1000",
        Switch::BaroUnitR => dref::BARO_UNIT_FO,
        Switch::NdModeR => "AirbusFBW/NDmodeFO",
        Switch::NdRangeR => "AirbusFBW/NDrangeFO",
        Switch::Efis1SelR => "sim/cockpit2/EFIS/EFIS_1_selection_copilot",
        Switch::Efis2SelR => "sim/cockpit2/EFIS/EFIS_2_selection_copilot",
        Switch::BaroUnitL => "AirbusFBW/BaroUnitCapt",
        Switch::NdModeL => "AirbusFBW/NDmodeCapt",
        Switch::NdRangeL => "AirbusFBW/NDrangeCapt",
        Switch::Efis1SelL => "sim/cockpit2/EFIS/EFIS_1_selection_pilot",
        Switch::Efis2SelL => "sim/cockpit2/EFIS/EFIS_2_selection_pilot",
    }
}

/// Datarefs the display and lamps are computed from.
pub mod dref {
    pub const SPD_DASHED: &str = "AirbusFBW/SPDdashed";
    pub const HDG_DASHED: &str = "AirbusFBW/HDGdashed";
    pub const VS_DASHED: &str = "AirbusFBW/VSdashed";
    pub const AIRSPEED_DIAL: &str = "sim/cockpit2/autopilot/airspeed_dial_kts_mach";
    pub const AIRSPEED_IS_MACH: &str = "sim/cockpit/autopilot/airspeed_is_mach";
    pub const SPD_MANAGED: &str = "AirbusFBW/SPDmanaged";
    pub const HEADING_MAG: &str = "sim/cockpit/autopilot/heading_mag";
    pub const HDG_MANAGED: &str = "AirbusFBW/HDGmanaged";
    pub const HDGTRK_MODE: &str = "AirbusFBW/HDGTRKmode";
    pub const ALTITUDE: &str = "sim/cockpit/autopilot/altitude";
    pub const ALT_MANAGED: &str = "AirbusFBW/ALTmanaged";
    pub const VERTICAL_VELOCITY: &str = "sim/cockpit/autopilot/vertical_velocity";
    pub const FPA: &str = "sim/cockpit2/autopilot/fpa";
    pub const AP_VERTICAL_MODE: &str = "AirbusFBW/APVerticalMode";
    pub const AP1_ENGAGE: &str = "AirbusFBW/AP1Engage";
    pub const AP2_ENGAGE: &str = "AirbusFBW/AP2Engage";
    pub const APPR_ILLUMINATED: &str = "AirbusFBW/APPRilluminated";
    pub const ATHR_MODE: &str = "AirbusFBW/ATHRmode";
    pub const LOC_ILLUMINATED: &str = "AirbusFBW/LOCilluminated";
    pub const LIGHT_PANEL: &str = "AirbusFBW/SupplLightLevelRehostats[0]";
    pub const LIGHT_LCD: &str = "AirbusFBW/SupplLightLevelRehostats[1]";
    pub const BARO_INHG_FO: &str = "sim/cockpit2/gauges/actuators/barometer_setting_in_hg_copilot";
    pub const BARO_STD_FO: &str = "AirbusFBW/BaroStdFO";
    pub const BARO_UNIT_FO: &str = "AirbusFBW/BaroUnitFO";
    pub const ND_SHOW_ARPT_FO: &str = "AirbusFBW/NDShowARPTFO";
    pub const ND_SHOW_NDB_FO: &str = "AirbusFBW/NDShowNDBFO";
    pub const ND_SHOW_VORD_FO: &str = "AirbusFBW/NDShowVORDFO";
    pub const ND_SHOW_WPT_FO: &str = "AirbusFBW/NDShowWPTFO";
    pub const ND_SHOW_CSTR_FO: &str = "AirbusFBW/NDShowCSTRFO";
    pub const FD2_ENGAGE: &str = "AirbusFBW/FD2Engage";
    pub const ILS_ON_FO: &str = "AirbusFBW/ILSonFO";
}

/// Everything subscribed on connect, with the per-dataref update rate in Hz.
pub const SUBSCRIPTIONS: &[(&str, i32)] = &[
    (dref::SPD_DASHED, 2),
    (dref::HDG_DASHED, 2),
    (dref::VS_DASHED, 2),
    (dref::AIRSPEED_DIAL, 5),
    (dref::AIRSPEED_IS_MACH, 2),
    (dref::SPD_MANAGED, 2),
    (dref::HEADING_MAG, 5),
    (dref::HDG_MANAGED, 2),
    (dref::HDGTRK_MODE, 2),
    (dref::ALTITUDE, 5),
    (dref::ALT_MANAGED, 2),
    (dref::VERTICAL_VELOCITY, 5),
    (dref::FPA, 2),
    (dref::AP_VERTICAL_MODE, 5),
    (dref::AP1_ENGAGE, 3),
    (dref::AP2_ENGAGE, 3),
    (dref::APPR_ILLUMINATED, 3),
    (dref::ATHR_MODE, 3),
    (dref::LOC_ILLUMINATED, 3),
    (dref::LIGHT_PANEL, 3),
    (dref::LIGHT_LCD, 3),
    (dref::BARO_INHG_FO, 2),
    (dref::BARO_STD_FO, 2),
    (dref::BARO_UNIT_FO, 2),
    (dref::ND_SHOW_ARPT_FO, 3),
    (dref::ND_SHOW_NDB_FO, 3),
    (dref::ND_SHOW_VORD_FO, 3),
    (dref::ND_SHOW_WPT_FO, 3),
    (dref::ND_SHOW_CSTR_FO, 3),
    (dref::FD2_ENGAGE, 3),
    (dref::ILS_ON_FO, 3),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_physical_bit_classifies() {
        // all FCU inputs are assigned; 27..=31 carry no contact
        for id in 0..=26u8 {
            assert!(classify(id).is_some(), "bit {id} unassigned");
        }
        for id in 27..=31u8 {
            assert!(classify(id).is_none());
        }
        for id in 32..=61u8 {
            assert!(classify(id).is_some(), "bit {id} unassigned");
        }
        for id in 64..=93u8 {
            assert!(classify(id).is_some(), "bit {id} unassigned");
        }
    }

    #[test]
    fn knob_bits_pair_up() {
        for (dec, inc, knob) in [
            (9u8, 10u8, Knob::Spd),
            (13, 14, Knob::Hdg),
            (17, 18, Knob::Alt),
            (21, 22, Knob::Vs),
            (41, 42, Knob::EfisrBaro),
            (73, 74, Knob::EfislBaro),
        ] {
            assert_eq!(classify(dec), Some(InputKind::Encoder(knob, -1)));
            assert_eq!(classify(inc), Some(InputKind::Encoder(knob, 1)));
        }
    }

    #[test]
    fn every_plain_button_has_a_target() {
        for id in 0..=93u8 {
            if classify(id) == Some(InputKind::Button) {
                assert!(button_target(id).is_some(), "button {id} unmapped");
            }
        }
    }

    #[test]
    fn subscriptions_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for (name, freq) in SUBSCRIPTIONS {
            assert!(seen.insert(*name), "{name} subscribed twice");
            assert!(*freq > 0);
        }
    }
}
