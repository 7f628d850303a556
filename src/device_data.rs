//! Typed tuning parameters parsed from a SAT&gt;IP transport-stream query
//! string (component C3), plus the combined `StreamProperties` type that
//! pairs them with a [`crate::pid_table::FilterData`].

use std::fmt;
use std::str::FromStr;

use crate::fe::sys::{
    fe_code_rate, fe_delivery_system, fe_guard_interval, fe_hierarchy, fe_modulation, fe_pilot,
    fe_rolloff, fe_spectral_inversion, fe_transmit_mode,
};
use crate::pid_table::FilterData;
use crate::xml::{write_tag, XmlFragment};

/// The delivery system a client asked for, independent of the kernel's
/// `fe_delivery_system` numbering (`dvbs` and `dvbs2` both route through
/// the satellite [`crate::delivery::DvbS`] implementation, for instance).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DeliverySystemId {
    DvbS,
    DvbS2,
    DvbT,
    DvbT2,
    DvbC,
    DvbC2,
    /// A child-process source with no real delivery system of its own;
    /// never advertised to clients directly (a `Transform` rewrites it to
    /// whatever system the source should appear to be).
    ChildPipe,
    /// No delivery system resolved yet (a freshly enumerated device before
    /// its first `parse_stream_string`).
    Undefined,
}

impl DeliverySystemId {
    /// Maps to the kernel's `fe_delivery_system` tag. Only meaningful for
    /// the hardware-backed variants; `ChildPipe`/`Undefined` never reach a
    /// frontend ioctl.
    pub fn to_fe_delivery_system(self) -> fe_delivery_system {
        match self {
            DeliverySystemId::DvbS => fe_delivery_system::SYS_DVBS,
            DeliverySystemId::DvbS2 => fe_delivery_system::SYS_DVBS2,
            DeliverySystemId::DvbT => fe_delivery_system::SYS_DVBT,
            DeliverySystemId::DvbT2 => fe_delivery_system::SYS_DVBT2,
            DeliverySystemId::DvbC => fe_delivery_system::SYS_DVBC_ANNEX_A,
            DeliverySystemId::DvbC2 => fe_delivery_system::SYS_DVBC2,
            DeliverySystemId::ChildPipe | DeliverySystemId::Undefined => {
                fe_delivery_system::SYS_UNDEFINED
            }
        }
    }

    pub fn is_satellite(self) -> bool {
        matches!(self, DeliverySystemId::DvbS | DeliverySystemId::DvbS2)
    }
}

impl fmt::Display for DeliverySystemId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            DeliverySystemId::DvbS => "dvbs",
            DeliverySystemId::DvbS2 => "dvbs2",
            DeliverySystemId::DvbT => "dvbt",
            DeliverySystemId::DvbT2 => "dvbt2",
            DeliverySystemId::DvbC => "dvbc",
            DeliverySystemId::DvbC2 => "dvbc2",
            DeliverySystemId::ChildPipe => "childpipe",
            DeliverySystemId::Undefined => "undefined",
        };
        f.write_str(s)
    }
}

impl FromStr for DeliverySystemId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dvbs" => Ok(DeliverySystemId::DvbS),
            "dvbs2" => Ok(DeliverySystemId::DvbS2),
            "dvbt" => Ok(DeliverySystemId::DvbT),
            "dvbt2" => Ok(DeliverySystemId::DvbT2),
            "dvbc" => Ok(DeliverySystemId::DvbC),
            "dvbc2" => Ok(DeliverySystemId::DvbC2),
            other => Err(anyhow::anyhow!("unknown msys value {}", other)),
        }
    }
}

/// DVB-S/S2 polarization, selected via the LNB's DC voltage.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Polarization {
    Horizontal,
    Vertical,
    CircularLeft,
    CircularRight,
}

impl FromStr for Polarization {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "h" => Ok(Polarization::Horizontal),
            "v" => Ok(Polarization::Vertical),
            "l" => Ok(Polarization::CircularLeft),
            "r" => Ok(Polarization::CircularRight),
            other => Err(anyhow::anyhow!("unknown pol value {}", other)),
        }
    }
}

/// Tuning parameters for one `Device`, accumulated across successive
/// `parse_stream_string` calls (a client may retune with a partial query
/// string that only changes e.g. `freq`).
#[derive(Debug, Clone)]
pub struct DeviceData {
    pub msys: Option<DeliverySystemId>,
    /// kHz for satellite/cable, raw Hz-less units for terrestrial
    /// (multiplied by 1000 before being handed to the kernel).
    pub freq: Option<u32>,
    pub pol: Option<Polarization>,
    /// Symbol rate in ksym/s.
    pub sr: Option<u32>,
    pub fec: Option<fe_code_rate>,
    pub ro: Option<fe_rolloff>,
    pub plts: Option<fe_pilot>,
    pub mtype: Option<fe_modulation>,
    /// Bandwidth in MHz.
    pub bw: Option<u32>,
    pub tmode: Option<fe_transmit_mode>,
    pub gi: Option<fe_guard_interval>,
    pub hierarchy: Option<fe_hierarchy>,
    pub specinv: Option<fe_spectral_inversion>,
    /// PLP/stream id for DVB-T2 and multistream DVB-S2.
    pub plp: Option<u32>,
    /// Kernel ring-buffer size (bytes) requested for the DVR device once
    /// locked. Not part of the SAT>IP transport-parameter grammar; carries
    /// the implementation's fixed default unless a caller sets it directly.
    pub dvr_buffer_size: u32,
    changed: bool,
}

/// Default DVR ring-buffer size, matching the common default used by
/// SAT>IP gateways for a single HD transponder's worth of headroom.
pub const DEFAULT_DVR_BUFFER_SIZE: u32 = 5 * 188 * 1024;

impl Default for DeviceData {
    fn default() -> Self {
        DeviceData {
            msys: None,
            freq: None,
            pol: None,
            sr: None,
            fec: None,
            ro: None,
            plts: None,
            mtype: None,
            bw: None,
            tmode: None,
            gi: None,
            hierarchy: None,
            specinv: None,
            plp: None,
            dvr_buffer_size: DEFAULT_DVR_BUFFER_SIZE,
            changed: false,
        }
    }
}

impl DeviceData {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn has_changed(&self) -> bool {
        self.changed
    }

    #[inline]
    pub fn reset_changed(&mut self) {
        self.changed = false;
    }

    /// Consumes one `key=value` pair from the query string, other than the
    /// PID-related keys which `StreamProperties` routes to `FilterData`
    /// instead. Returns whether the key was recognized.
    fn set_param(&mut self, key: &str, value: &str) -> anyhow::Result<bool> {
        macro_rules! set_field {
            ($field:expr, $parsed:expr) => {{
                let parsed = $parsed;
                if $field != Some(parsed) {
                    $field = Some(parsed);
                    self.changed = true;
                }
            }};
        }

        match key {
            "msys" => set_field!(self.msys, value.parse()?),
            "freq" => set_field!(self.freq, value.parse::<u32>()?),
            "pol" => set_field!(self.pol, value.parse()?),
            "sr" => set_field!(self.sr, value.parse::<u32>()?),
            "specinv" => set_field!(self.specinv, parse_inversion(value)?),
            "fec" => set_field!(self.fec, parse_fec(value)?),
            "ro" => set_field!(self.ro, parse_rolloff(value)?),
            "plts" => set_field!(self.plts, parse_pilot(value)?),
            "mtype" => set_field!(self.mtype, parse_modulation(value)?),
            "bw" => set_field!(self.bw, parse_bandwidth(value)?),
            "tmode" => set_field!(self.tmode, parse_transmit_mode(value)?),
            "gi" => set_field!(self.gi, parse_guard_interval(value)?),
            "plp" => set_field!(self.plp, value.parse::<u32>()?),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse_fec(v: &str) -> anyhow::Result<fe_code_rate> {
    use fe_code_rate::*;
    Ok(match v {
        "12" => FEC_1_2,
        "23" => FEC_2_3,
        "34" => FEC_3_4,
        "35" => FEC_3_5,
        "45" => FEC_4_5,
        "56" => FEC_5_6,
        "67" => FEC_6_7,
        "78" => FEC_7_8,
        "89" => FEC_8_9,
        "910" => FEC_9_10,
        "25" => FEC_2_5,
        "14" => FEC_1_4,
        "13" => FEC_1_3,
        "none" => FEC_NONE,
        "auto" => FEC_AUTO,
        other => anyhow::bail!("unknown fec value {}", other),
    })
}

fn parse_rolloff(v: &str) -> anyhow::Result<fe_rolloff> {
    use fe_rolloff::*;
    Ok(match v {
        "0.35" => ROLLOFF_35,
        "0.25" => ROLLOFF_25,
        "0.20" => ROLLOFF_20,
        "0.15" => ROLLOFF_15,
        "0.10" => ROLLOFF_10,
        "0.05" => ROLLOFF_5,
        "auto" => ROLLOFF_AUTO,
        other => anyhow::bail!("unknown ro value {}", other),
    })
}

fn parse_pilot(v: &str) -> anyhow::Result<fe_pilot> {
    use fe_pilot::*;
    Ok(match v {
        "on" => PILOT_ON,
        "off" => PILOT_OFF,
        "auto" => PILOT_AUTO,
        other => anyhow::bail!("unknown plts value {}", other),
    })
}

fn parse_inversion(v: &str) -> anyhow::Result<fe_spectral_inversion> {
    use fe_spectral_inversion::*;
    Ok(match v {
        "0" => INVERSION_OFF,
        "1" => INVERSION_ON,
        "2" | "auto" => INVERSION_AUTO,
        other => anyhow::bail!("unknown specinv value {}", other),
    })
}

fn parse_modulation(v: &str) -> anyhow::Result<fe_modulation> {
    use fe_modulation::*;
    Ok(match v {
        "qpsk" => QPSK,
        "8psk" => PSK_8,
        "16qam" | "qam16" => QAM_16,
        "32qam" | "qam32" => QAM_32,
        "64qam" | "qam64" => QAM_64,
        "128qam" | "qam128" => QAM_128,
        "256qam" | "qam256" => QAM_256,
        "dqpsk" => DQPSK,
        "auto" => QAM_AUTO,
        other => anyhow::bail!("unknown mtype value {}", other),
    })
}

/// `bw` arrives in MHz; the kernel wants Hz.
fn parse_bandwidth(v: &str) -> anyhow::Result<u32> {
    let mhz: f64 = v.parse()?;
    Ok((mhz * 1_000_000.0).round() as u32)
}

fn parse_transmit_mode(v: &str) -> anyhow::Result<fe_transmit_mode> {
    use fe_transmit_mode::*;
    Ok(match v {
        "1k" => TRANSMISSION_MODE_1K,
        "2k" => TRANSMISSION_MODE_2K,
        "4k" => TRANSMISSION_MODE_4K,
        "8k" => TRANSMISSION_MODE_8K,
        "16k" => TRANSMISSION_MODE_16K,
        "32k" => TRANSMISSION_MODE_32K,
        "auto" => TRANSMISSION_MODE_AUTO,
        other => anyhow::bail!("unknown tmode value {}", other),
    })
}

fn parse_guard_interval(v: &str) -> anyhow::Result<fe_guard_interval> {
    use fe_guard_interval::*;
    Ok(match v {
        "132" => GUARD_INTERVAL_1_32,
        "116" => GUARD_INTERVAL_1_16,
        "18" => GUARD_INTERVAL_1_8,
        "14" => GUARD_INTERVAL_1_4,
        "19128" => GUARD_INTERVAL_19_128,
        "19256" => GUARD_INTERVAL_19_256,
        "1128" => GUARD_INTERVAL_1_128,
        "auto" => GUARD_INTERVAL_AUTO,
        other => anyhow::bail!("unknown gi value {}", other),
    })
}

/// Bundles the non-PID tuning parameters with the selected-PID set so a
/// single `parse_stream_string` call can update both from one query
/// string, as the stream-setup handler does for every `Device`.
#[derive(Debug)]
pub struct StreamProperties<T> {
    pub device: DeviceData,
    pub filters: FilterData<T>,
}

impl<T> Default for StreamProperties<T> {
    fn default() -> Self {
        StreamProperties {
            device: DeviceData::new(),
            filters: FilterData::new(),
        }
    }
}

impl<T> StreamProperties<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an ordered, `&`-separated `key=value` query string, applying
    /// each pair in turn. `pids`/`addpids`/`delpids` are routed to the PID
    /// table rather than `DeviceData`. A malformed pair, an unparseable
    /// value, or an unrecognized key is non-fatal: it is logged and
    /// dropped, and every other pair in the string is still applied.
    pub fn parse_stream_string(&mut self, query: &str) -> anyhow::Result<()> {
        for pair in query.split('&') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = match pair.split_once('=') {
                Some(kv) => kv,
                None => {
                    log::warn!("malformed stream parameter {:?}, dropping it", pair);
                    continue;
                }
            };
            let key = key.to_ascii_lowercase();

            let result: anyhow::Result<()> = match key.as_str() {
                "pids" => {
                    if value == "all" {
                        self.filters.select_all();
                        Ok(())
                    } else if value == "none" {
                        self.filters.select_none();
                        Ok(())
                    } else {
                        self.filters.set_pids_csv(value).map_err(Into::into)
                    }
                }
                "addpids" => self.filters.apply_pids_csv(value, true).map_err(Into::into),
                "delpids" => self.filters.apply_pids_csv(value, false).map_err(Into::into),
                _ => match self.device.set_param(&key, value) {
                    Ok(true) => Ok(()),
                    Ok(false) => {
                        log::warn!("unknown stream parameter {}={}, ignoring it", key, value);
                        Ok(())
                    }
                    Err(e) => Err(e),
                },
            };

            if let Err(e) = result {
                log::warn!("dropping stream parameter {}={}: {:#}", key, value, e);
            }
        }
        Ok(())
    }
}

impl XmlFragment for DeviceData {
    fn to_xml(&self, out: &mut String) {
        if let Some(msys) = self.msys {
            write_tag(out, "msys", msys);
        }
        if let Some(freq) = self.freq {
            write_tag(out, "freq", freq);
        }
        if let Some(sr) = self.sr {
            write_tag(out, "sr", sr);
        }
    }
}

impl<T> XmlFragment for StreamProperties<T> {
    fn to_xml(&self, out: &mut String) {
        self.device.to_xml(out);
        write_tag(out, "pids", self.filters.pids_csv());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dvbs2_query() {
        let mut props: StreamProperties<u32> = StreamProperties::new();
        props
            .parse_stream_string("msys=dvbs2&freq=11727&pol=v&sr=27500&fec=34&ro=0.35&pids=0,100,256")
            .unwrap();
        assert_eq!(props.device.msys, Some(DeliverySystemId::DvbS2));
        assert_eq!(props.device.freq, Some(11727));
        assert_eq!(props.device.pol, Some(Polarization::Vertical));
        assert_eq!(props.device.sr, Some(27500));
        assert_eq!(props.filters.used_count(), 3);
        assert!(props.device.has_changed());
    }

    #[test]
    fn repeated_identical_query_does_not_mark_changed() {
        let mut props: StreamProperties<u32> = StreamProperties::new();
        props.parse_stream_string("msys=dvbt&freq=514000&bw=8").unwrap();
        props.device.reset_changed();
        props.parse_stream_string("msys=dvbt&freq=514000&bw=8").unwrap();
        assert!(!props.device.has_changed());
    }

    #[test]
    fn addpids_and_delpids_are_incremental() {
        let mut props: StreamProperties<u32> = StreamProperties::new();
        props.parse_stream_string("pids=100,200").unwrap();
        props.parse_stream_string("addpids=300").unwrap();
        props.parse_stream_string("delpids=100").unwrap();
        assert_eq!(props.filters.pids_csv(), "200,300");
    }

    #[test]
    fn keys_are_case_insensitive() {
        let mut props: StreamProperties<u32> = StreamProperties::new();
        props.parse_stream_string("MSYS=dvbt&Freq=514000&PIDS=100").unwrap();
        assert_eq!(props.device.msys, Some(DeliverySystemId::DvbT));
        assert_eq!(props.device.freq, Some(514000));
        assert_eq!(props.filters.used_count(), 1);
    }

    #[test]
    fn unknown_key_is_ignored() {
        let mut props: StreamProperties<u32> = StreamProperties::new();
        props.parse_stream_string("x_custom=1&freq=100").unwrap();
        assert_eq!(props.device.freq, Some(100));
    }

    #[test]
    fn bad_value_is_dropped_without_aborting_the_rest_of_the_query() {
        let mut props: StreamProperties<u32> = StreamProperties::new();
        props
            .parse_stream_string("freq=not_a_number&msys=dvbt&bw=8")
            .unwrap();
        assert_eq!(props.device.freq, None, "the malformed pair is dropped");
        assert_eq!(props.device.msys, Some(DeliverySystemId::DvbT), "later pairs still apply");
        assert_eq!(props.device.bw, Some(8_000_000));
    }

    #[test]
    fn malformed_pair_with_no_equals_is_dropped_without_aborting_the_rest_of_the_query() {
        let mut props: StreamProperties<u32> = StreamProperties::new();
        props.parse_stream_string("justAKey&freq=100").unwrap();
        assert_eq!(props.device.freq, Some(100));
    }

    #[test]
    fn bad_pid_list_is_dropped_without_aborting_the_rest_of_the_query() {
        let mut props: StreamProperties<u32> = StreamProperties::new();
        props.parse_stream_string("pids=0,xx,18&freq=100").unwrap();
        assert_eq!(props.filters.used_count(), 0, "the whole malformed pids list is dropped");
        assert_eq!(props.device.freq, Some(100));
    }
}
