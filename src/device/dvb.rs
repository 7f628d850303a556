use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result};
use nix::poll::{poll, PollFd, PollFlags};
use nix::{ioctl_write_int_bad, request_code_none};

use crate::buffer::PacketBuffer;
use crate::delivery::{self, DeliverySystem};
use crate::device_data::DeliverySystemId;
use crate::dmx::sys::*;
use crate::dmx::DmxDevice;
use crate::fe::sys::fe_status;
use crate::fe::{FeDevice, FeStatus};

use super::{Device, DeliverySystemTally, FrontendId};
use crate::device_data::StreamProperties;

/// Number of tune submits `retune` attempts before giving up (the initial
/// submit plus 3 more on failure), and the backoff between attempts.
const TUNE_RETRIES: u32 = 4;
const TUNE_RETRY_BACKOFF: Duration = Duration::from_millis(450);

/// How long to wait, and how many times, for the frontend to report lock
/// after a tune before declaring the attempt a failure.
const LOCK_POLL_RETRIES: u32 = 4;
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Retry budget for opening the DVR device and installing PID filters,
/// both of which can transiently fail right after a tune.
const DEVICE_OPEN_RETRIES: u32 = 3;
const DEVICE_OPEN_BACKOFF: Duration = Duration::from_millis(350);

/// A real DVB tuner, reachable through its frontend/demux/DVR character
/// devices.
pub struct DvbDevice {
    frontend_id: FrontendId,
    fe: FeDevice,
    dvr: Option<File>,
    props: StreamProperties<DmxDevice>,
    status: FeStatus,
    tuned: bool,
}

impl DvbDevice {
    pub fn open(adapter: u32, frontend: u32) -> Result<Self> {
        let fe = FeDevice::open_rw(adapter, frontend)
            .with_context(|| format!("opening frontend {}.{}", adapter, frontend))?;

        Ok(DvbDevice {
            frontend_id: FrontendId { adapter, frontend },
            fe,
            dvr: None,
            props: StreamProperties::new(),
            status: FeStatus::default(),
            tuned: false,
        })
    }

    fn open_dvr(&self) -> Result<File> {
        let path = format!(
            "/dev/dvb/adapter{}/dvr{}",
            self.frontend_id.adapter, self.frontend_id.frontend
        );
        let dvr = OpenOptions::new()
            .read(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(&path)
            .with_context(|| format!("opening {}", path))?;
        if let Err(e) = set_dvr_buffer_size(&dvr, self.props.device.dvr_buffer_size) {
            log::warn!("{}: failed to set DVR buffer size: {:#}", self.frontend_id, e);
        }
        Ok(dvr)
    }

    fn retune(&mut self) {
        self.props.filters.close_active_pid_filters(|_pid, dmx| {
            let _ = dmx.stop();
        });
        self.dvr = None;
        self.tuned = false;

        let msys = match self.props.device.msys {
            Some(m) => m,
            None => return,
        };
        let delivery = match delivery::for_delivery_system(msys) {
            Some(d) => d,
            None => {
                log::warn!("{}: {} has no tuning strategy", self.frontend_id, msys);
                return;
            }
        };

        for attempt in 0..TUNE_RETRIES {
            if attempt > 0 {
                sleep(TUNE_RETRY_BACKOFF);
            }

            if let Err(e) = delivery.tune(&self.fe, &self.props.device) {
                log::warn!("{}: tune attempt {} failed: {:#}", self.frontend_id, attempt + 1, e);
                continue;
            }

            if self.wait_for_lock() {
                match self.open_dvr_with_retry() {
                    Ok(dvr) => {
                        self.dvr = Some(dvr);
                        self.tuned = true;
                        log::info!("{}: locked on {}", self.frontend_id, msys);
                        return;
                    }
                    Err(e) => {
                        log::warn!("{}: failed opening dvr after lock: {:#}", self.frontend_id, e);
                    }
                }
            }
        }

        log::warn!("{}: failed to tune after {} attempts", self.frontend_id, TUNE_RETRIES);
    }

    fn wait_for_lock(&self) -> bool {
        for _ in 0..LOCK_POLL_RETRIES {
            sleep(LOCK_POLL_INTERVAL);
            if let Ok(status) = self.fe.read_status() {
                if status.contains(fe_status::FE_HAS_LOCK) {
                    return true;
                }
            }
        }
        false
    }

    fn open_dvr_with_retry(&self) -> Result<File> {
        let mut last_err = None;
        for attempt in 0..DEVICE_OPEN_RETRIES {
            if attempt > 0 {
                sleep(DEVICE_OPEN_BACKOFF);
            }
            match self.open_dvr() {
                Ok(f) => return Ok(f),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap())
    }

    fn install_pid_filters(&mut self) {
        let adapter = self.frontend_id.adapter;
        let frontend = self.frontend_id.frontend;
        self.props.filters.update_pid_filters(
            |pid| open_pid_filter(adapter, frontend, pid).ok(),
            |_pid, dmx| {
                let _ = dmx.stop();
            },
        );
    }
}

/// `DVR_SET_BUFFER_SIZE`, matching `DmxDevice::set_buffer_size`'s ioctl
/// encoding style but applied to the DVR device rather than a demux.
fn set_dvr_buffer_size(dvr: &File, size: u32) -> Result<()> {
    ioctl_write_int_bad!(
        #[inline]
        ioctl_call,
        request_code_none!(b'o', 79)
    );

    unsafe { ioctl_call(dvr.as_raw_fd(), size as _) }.context("DVR: set buffer size")?;

    Ok(())
}

fn open_pid_filter(adapter: u32, device: u32, pid: u16) -> Result<DmxDevice> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = (|| -> Result<DmxDevice> {
            let dmx = DmxDevice::open_rw(adapter, device)?;
            dmx.set_pes_filter(&DmxPesFilterParams {
                pid,
                input: DmxInput::DMX_IN_FRONTEND,
                output: DmxOutput::DMX_OUT_TS_TAP,
                pes_type: DmxTsPes::DMX_PES_OTHER,
                flags: DmxFilterFlags::DMX_IMMEDIATE_START,
            })?;
            Ok(dmx)
        })();

        match result {
            Ok(dmx) => return Ok(dmx),
            Err(e) if attempt < DEVICE_OPEN_RETRIES => {
                sleep(DEVICE_OPEN_BACKOFF);
                log::debug!("pid {} filter open retry {}: {:#}", pid, attempt, e);
            }
            Err(e) => return Err(e),
        }
    }
}

impl Device for DvbDevice {
    fn frontend_id(&self) -> FrontendId {
        self.frontend_id
    }

    fn add_delivery_system_count(&self, tally: &mut DeliverySystemTally) {
        for sys in self.fe.get_delivery_system_list() {
            if let Some(id) = map_fe_delivery_system(*sys) {
                tally.add(id);
            }
        }
    }

    fn capable_of(&self, system: DeliverySystemId) -> bool {
        self.fe
            .get_delivery_system_list()
            .iter()
            .any(|sys| map_fe_delivery_system(*sys) == Some(system))
    }

    fn parse_stream_string(&mut self, params: &str) -> Result<()> {
        self.props.parse_stream_string(params)
    }

    fn has_device_data_changed(&self) -> bool {
        self.props.device.has_changed()
    }

    fn update(&mut self) -> bool {
        if self.props.device.has_changed() {
            self.props.device.reset_changed();
            self.retune();
        }

        // `update_pid_filters` is idempotent, so it is called unconditionally
        // on every cycle once locked: a retune's `close_active_pid_filters`
        // clears every token but preserves `used`, and those PIDs need
        // reinstalling even when the selected-PID set itself never changed.
        if self.tuned {
            self.install_pid_filters();
            self.props.filters.reset_changed();
        }

        self.monitor_signal()
    }

    fn monitor_signal(&mut self) -> bool {
        let _ = self.status.read(&self.fe);
        matches!(self.fe.read_status(), Ok(s) if s.contains(fe_status::FE_HAS_LOCK))
    }

    fn teardown(&mut self) {
        self.props.filters.close_active_pid_filters(|_pid, dmx| {
            let _ = dmx.stop();
        });
        self.dvr = None;
        self.tuned = false;
        let _ = self.fe.clear();
    }

    fn is_data_available(&mut self) -> bool {
        let dvr = match &self.dvr {
            Some(d) => d,
            None => return false,
        };
        let fd = dvr.as_raw_fd();
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        matches!(poll(&mut fds, 100), Ok(n) if n > 0)
    }

    fn read_full_ts_packet(&mut self, buffer: &mut PacketBuffer) -> bool {
        let dvr = match self.dvr.as_mut() {
            Some(d) => d,
            None => return false,
        };

        let n = match dvr.read(buffer.write_region()) {
            Ok(0) => return false,
            Err(e) => {
                log::warn!("{}: dvr read failed: {:#}", self.frontend_id, e);
                return false;
            }
            Ok(n) => n,
        };
        buffer.commit(n);

        buffer.try_sync();
        for packet in buffer.new_packets_mut() {
            // The demux already restricts the DVR stream to selected
            // PIDs; only PCR pacing bookkeeping runs here.
            self.props.filters.add_data(packet, false);
        }

        buffer.full()
    }

    fn attribute_describe_string(&self) -> String {
        self.status.to_string()
    }
}

fn map_fe_delivery_system(sys: crate::fe::sys::fe_delivery_system) -> Option<DeliverySystemId> {
    use crate::fe::sys::fe_delivery_system::*;
    match sys {
        SYS_DVBS => Some(DeliverySystemId::DvbS),
        SYS_DVBS2 => Some(DeliverySystemId::DvbS2),
        SYS_DVBT => Some(DeliverySystemId::DvbT),
        SYS_DVBT2 => Some(DeliverySystemId::DvbT2),
        SYS_DVBC_ANNEX_A | SYS_DVBC_ANNEX_B | SYS_DVBC_ANNEX_C => Some(DeliverySystemId::DvbC),
        SYS_DVBC2 => Some(DeliverySystemId::DvbC2),
        _ => None,
    }
}
