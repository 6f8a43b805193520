//! USB transport for the WinWing panel family.
//!
//! One worker thread owns the HID handle: it drains the latest-wins image
//! channel, writes only what changed, reads input reports with a short
//! timeout, and reopens the device on a backoff after an unplug.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use hidapi::{HidApi, HidDevice};
use tracing::{debug, info, warn};

use crate::codec::{self, DeviceMask, Led, PanelOutputImage, ReportDecoder};
use crate::config::DeviceSection;
use crate::engine::EngineEvent;
use crate::error::HidError;
use crate::status::send_lossy;

// -----------------------------
// WinWing IDs
// -----------------------------

const WW_VID: u16 = 0x4098;

pub struct SupportedModel {
    pub pid: u16,
    pub name: &'static str,
    pub mask: DeviceMask,
}

/// Combined products enumerate as one HID device; probe in this order.
pub const SUPPORTED: &[SupportedModel] = &[
    SupportedModel {
        pid: 0xbb10,
        name: "FCU",
        mask: DeviceMask::FCU,
    },
    SupportedModel {
        pid: 0xbc1e,
        name: "FCU + EFIS-R",
        mask: DeviceMask::FCU.with(DeviceMask::EFIS_R),
    },
    SupportedModel {
        pid: 0xbc1d,
        name: "FCU + EFIS-L",
        mask: DeviceMask::FCU.with(DeviceMask::EFIS_L),
    },
    SupportedModel {
        pid: 0xba01,
        name: "FCU + EFIS-L + EFIS-R",
        mask: DeviceMask::FCU
            .with(DeviceMask::EFIS_L)
            .with(DeviceMask::EFIS_R),
    },
];

// -----------------------------
// Transport
// -----------------------------

pub struct FcuDevice {
    dev: HidDevice,
    pub mask: DeviceMask,
    pub name: &'static str,
}

impl FcuDevice {
    /// Opens the first supported product present on the bus.
    pub fn open(api: &HidApi) -> Result<FcuDevice, HidError> {
        for model in SUPPORTED {
            let found = api
                .device_list()
                .find(|d| d.vendor_id() == WW_VID && d.product_id() == model.pid);
            if let Some(info) = found {
                let dev = info
                    .open_device(api)
                    .map_err(|e| HidError::Disconnected(e.to_string()))?;
                info!("panel opened: {} (pid 0x{:04x})", model.name, model.pid);
                return Ok(FcuDevice {
                    dev,
                    mask: model.mask,
                    name: model.name,
                });
            }
        }
        Err(HidError::DeviceNotFound)
    }

    /// `Ok(None)` on timeout; an I/O error means the cable is gone.
    pub fn read_report(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Option<usize>, HidError> {
        match self.dev.read_timeout(buf, timeout.as_millis() as i32) {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(n)),
            Err(e) => Err(HidError::Disconnected(e.to_string())),
        }
    }

    pub fn write_report(&self, data: &[u8]) -> Result<(), HidError> {
        self.dev
            .write(data)
            .map(|_| ())
            .map_err(|e| HidError::Disconnected(e.to_string()))
    }
}

// -----------------------------
// Rendering
// -----------------------------

/// Pushes an image to the panel, writing only reports whose content changed
/// since `last`. LCD packets always travel as payload + commit pairs.
fn render(
    dev: &FcuDevice,
    image: &PanelOutputImage,
    last: &mut Option<PanelOutputImage>,
) -> Result<(), HidError> {
    if last.as_ref() == Some(image) {
        return Ok(());
    }

    for packet in codec::encode_lcd(image) {
        dev.write_report(&packet)?;
    }
    if dev.mask.contains(DeviceMask::EFIS_R) {
        dev.write_report(&codec::encode_efis_lcd(image))?;
    }

    let prev = last.take().map(|i| i.lamps).unwrap_or_default();
    for (&led, &value) in &image.lamps {
        if !lamp_reachable(dev.mask, led) {
            continue;
        }
        if prev.get(&led).copied().unwrap_or(0) != value {
            dev.write_report(&codec::encode_led(led, value))?;
        }
    }
    for (&led, &value) in &prev {
        if value != 0 && !image.lamps.contains_key(&led) && lamp_reachable(dev.mask, led) {
            dev.write_report(&codec::encode_led(led, 0))?;
        }
    }

    *last = Some(image.clone());
    Ok(())
}

fn lamp_reachable(mask: DeviceMask, led: Led) -> bool {
    // EFIS-R LEDs need the combined product; EFIS-L exposes no LED command
    (led as u8) < 100 || mask.contains(DeviceMask::EFIS_R)
}

fn init_panel(dev: &FcuDevice, cfg: &DeviceSection) -> Result<(), HidError> {
    dev.write_report(&codec::encode_lcd_init())?;
    dev.write_report(&codec::encode_led(Led::ScreenBacklight, cfg.lcd_backlight))?;
    dev.write_report(&codec::encode_led(Led::Backlight, cfg.backlight))?;
    if dev.mask.contains(DeviceMask::EFIS_R) {
        dev.write_report(&codec::encode_led(
            Led::EfisrScreenBacklight,
            cfg.lcd_backlight,
        ))?;
        dev.write_report(&codec::encode_led(Led::EfisrBacklight, cfg.backlight))?;
    }
    Ok(())
}

// -----------------------------
// HID worker
// -----------------------------

pub fn hid_worker(
    cfg: DeviceSection,
    engine_tx: Sender<EngineEvent>,
    engine_rx: Receiver<EngineEvent>,
    image_rx: Receiver<PanelOutputImage>,
    stop: Arc<AtomicBool>,
) {
    let mut api = match HidApi::new() {
        Ok(a) => a,
        Err(e) => {
            warn!("hidapi init failed: {e}");
            let _ = engine_tx.send(EngineEvent::DeviceDown);
            return;
        }
    };

    let read_timeout = Duration::from_millis(cfg.read_timeout_ms.max(1));
    let backoff = Duration::from_secs(cfg.reopen_backoff_secs.max(1));

    let mut device: Option<FcuDevice> = None;
    let mut decoder = ReportDecoder::new(DeviceMask::NONE);
    let mut last_image: Option<PanelOutputImage> = None;
    let mut last_open_attempt = Instant::now() - backoff;
    let mut buf = [0u8; 128];

    info!("hid worker started");
    while !stop.load(Ordering::Relaxed) {
        if device.is_none() {
            if last_open_attempt.elapsed() < backoff {
                std::thread::sleep(read_timeout.max(Duration::from_millis(50)));
                continue;
            }
            last_open_attempt = Instant::now();
            api.refresh_devices().ok();
            match FcuDevice::open(&api) {
                Ok(d) => {
                    if let Err(e) = init_panel(&d, &cfg) {
                        warn!("panel init failed: {e}");
                        continue;
                    }
                    decoder = ReportDecoder::new(d.mask);
                    last_image = None;
                    // dashes until the first simulator snapshot lands
                    let _ = render(&d, &PanelOutputImage::blank(), &mut last_image);
                    send_lossy(&engine_tx, &engine_rx, EngineEvent::DeviceUp(d.mask));
                    device = Some(d);
                }
                Err(HidError::DeviceNotFound) => {
                    debug!("no panel on the bus, retrying");
                    continue;
                }
                Err(e) => {
                    warn!("open failed: {e}");
                    continue;
                }
            }
        }

        let mut failed = false;
        if let Some(dev) = device.as_ref() {
            // newest image wins; everything older is obsolete by definition
            let mut latest = None;
            while let Ok(img) = image_rx.try_recv() {
                latest = Some(img);
            }
            if let Some(img) = latest {
                if let Err(e) = render(dev, &img, &mut last_image) {
                    warn!("display write failed: {e}");
                    failed = true;
                }
            }

            if !failed {
                match dev.read_report(&mut buf, read_timeout) {
                    Ok(Some(n)) => {
                        for ev in decoder.decode(&buf[..n]) {
                            debug!(?ev, "panel input");
                            send_lossy(&engine_tx, &engine_rx, EngineEvent::Input(ev));
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("read failed: {e}");
                        failed = true;
                    }
                }
            }
        }

        if failed {
            device = None;
            last_image = None;
            send_lossy(&engine_tx, &engine_rx, EngineEvent::DeviceDown);
        }
    }

    // leave the panel dashed rather than frozen mid-flight
    if let Some(dev) = device.as_ref() {
        let _ = render(dev, &PanelOutputImage::blank(), &mut last_image);
    }
    info!("hid worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::INPUT_REPORT_LEN;

    #[test]
    fn every_supported_model_includes_the_fcu() {
        for model in SUPPORTED {
            assert!(model.mask.contains(DeviceMask::FCU), "{}", model.name);
        }
    }

    #[test]
    fn efis_lamps_need_the_combined_product() {
        assert!(lamp_reachable(DeviceMask::FCU, Led::Ap1Green));
        assert!(!lamp_reachable(DeviceMask::FCU, Led::EfisrFdGreen));
        assert!(lamp_reachable(
            DeviceMask::FCU.with(DeviceMask::EFIS_R),
            Led::EfisrFdGreen
        ));
    }

    #[test]
    fn input_reports_fit_the_read_buffer() {
        assert!(INPUT_REPORT_LEN <= 128);
    }
}
