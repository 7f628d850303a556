use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::device_data::{DeliverySystemId, DeviceData, Polarization};
use crate::fe::sys::*;
use crate::fe::FeDevice;
use crate::{dtv_property, set_dtv_properties};

use super::DeliverySystem;

/// Local oscillator frequency of a universal LNB's low band, in kHz.
const LNB_LOF_LOW: u32 = 9_750_000;
/// Local oscillator frequency of a universal LNB's high band, in kHz.
const LNB_LOF_HIGH: u32 = 10_600_000;
/// Transponder frequency above which the LNB switches to the high band.
const LNB_SWITCH_THRESHOLD: u32 = 11_700_000;

/// Settle time observed by real LNBs/switches between a DiSEqC command,
/// tone, or voltage change and the next one.
const DISEQC_SETTLE: Duration = Duration::from_millis(15);

/// DVB-S / DVB-S2 satellite tuning, including LNB band/polarization
/// selection over the 22kHz tone and 13V/18V supply, and a committed
/// DiSEqC switch command for multi-LNB installations.
pub struct DvbS;

impl DvbS {
    /// Sends the LNB/DiSEqC sequence, returning the LNB-translated
    /// intermediate frequency in kHz.
    fn setup_lnb(&self, fe: &FeDevice, device: &DeviceData) -> Result<u32> {
        let freq = device.freq.context("DVB-S: missing freq")?;
        let pol = device.pol.unwrap_or(Polarization::Vertical);

        let high_band = freq >= LNB_SWITCH_THRESHOLD;
        let lo = if high_band { LNB_LOF_HIGH } else { LNB_LOF_LOW };
        let intermediate_freq = if freq >= lo { freq - lo } else { lo - freq };

        let voltage_18v = matches!(pol, Polarization::Horizontal | Polarization::CircularLeft);
        let voltage = if voltage_18v {
            fe_sec_voltage::SEC_VOLTAGE_18
        } else {
            fe_sec_voltage::SEC_VOLTAGE_13
        };

        fe.set_voltage(voltage as u32).context("DVB-S: set voltage")?;
        sleep(DISEQC_SETTLE);

        // Committed DiSEqC switch: single-LNB input (bits 00), this LNB's
        // band/polarization encoded per FeDevice::diseqc_master_cmd's doc.
        let committed = 0xF0
            | if voltage_18v { 0x02 } else { 0x00 }
            | if high_band { 0x01 } else { 0x00 };
        fe.diseqc_master_cmd(&[0xE0, 0x10, 0x38, committed])
            .context("DVB-S: diseqc master cmd")?;
        sleep(DISEQC_SETTLE);

        let tone = if high_band {
            fe_sec_tone_mode::SEC_TONE_ON
        } else {
            fe_sec_tone_mode::SEC_TONE_OFF
        };
        fe.set_tone(tone as u32).context("DVB-S: set tone")?;
        sleep(DISEQC_SETTLE);

        Ok(intermediate_freq)
    }
}

impl DeliverySystem for DvbS {
    fn id(&self) -> DeliverySystemId {
        DeliverySystemId::DvbS
    }

    fn tune(&self, fe: &FeDevice, device: &DeviceData) -> Result<()> {
        fe.drain_events();

        let intermediate_freq = self.setup_lnb(fe, device)?;
        let sr = device.sr.context("DVB-S: missing sr")? * 1000;
        let msys = device.msys.unwrap_or(DeliverySystemId::DvbS).to_fe_delivery_system();

        set_dtv_properties!(
            fe,
            DTV_CLEAR(()),
            DTV_DELIVERY_SYSTEM(msys),
            DTV_FREQUENCY(intermediate_freq),
            DTV_SYMBOL_RATE(sr),
            DTV_INNER_FEC(device.fec.unwrap_or(fe_code_rate::FEC_AUTO)),
            DTV_INVERSION(device.specinv.unwrap_or(fe_spectral_inversion::INVERSION_AUTO)),
            DTV_MODULATION(device.mtype.unwrap_or(fe_modulation::QPSK)),
            DTV_ROLLOFF(device.ro.unwrap_or(fe_rolloff::ROLLOFF_35)),
            DTV_PILOT(device.plts.unwrap_or(fe_pilot::PILOT_AUTO)),
            DTV_STREAM_ID(device.plp.unwrap_or(0)),
            DTV_TUNE(())
        )
        .context("DVB-S: set properties")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_band_threshold_matches_universal_lnb() {
        assert!(LNB_SWITCH_THRESHOLD > LNB_LOF_LOW);
        assert!(LNB_SWITCH_THRESHOLD < LNB_LOF_HIGH);
    }
}
