use anyhow::{Context, Result};

use crate::device_data::{DeliverySystemId, DeviceData};
use crate::fe::sys::*;
use crate::fe::FeDevice;
use crate::{dtv_property, set_dtv_properties};

use super::DeliverySystem;

/// DVB-T / DVB-T2 terrestrial tuning.
pub struct DvbT;

impl DeliverySystem for DvbT {
    fn id(&self) -> DeliverySystemId {
        DeliverySystemId::DvbT
    }

    fn tune(&self, fe: &FeDevice, device: &DeviceData) -> Result<()> {
        let freq = device.freq.context("DVB-T: missing freq")? * 1000;
        let bw = device.bw.unwrap_or(8_000_000);
        let msys = device.msys.unwrap_or(DeliverySystemId::DvbT).to_fe_delivery_system();

        fe.drain_events();

        set_dtv_properties!(
            fe,
            DTV_CLEAR(()),
            DTV_DELIVERY_SYSTEM(msys),
            DTV_FREQUENCY(freq),
            DTV_BANDWIDTH_HZ(bw),
            DTV_MODULATION(device.mtype.unwrap_or(fe_modulation::QAM_AUTO)),
            DTV_INVERSION(device.specinv.unwrap_or(fe_spectral_inversion::INVERSION_AUTO)),
            DTV_CODE_RATE_HP(device.fec.unwrap_or(fe_code_rate::FEC_AUTO)),
            DTV_CODE_RATE_LP(device.fec.unwrap_or(fe_code_rate::FEC_AUTO)),
            DTV_GUARD_INTERVAL(device.gi.unwrap_or(fe_guard_interval::GUARD_INTERVAL_AUTO)),
            DTV_TRANSMISSION_MODE(device.tmode.unwrap_or(fe_transmit_mode::TRANSMISSION_MODE_AUTO)),
            DTV_HIERARCHY(device.hierarchy.unwrap_or(fe_hierarchy::HIERARCHY_AUTO)),
            DTV_STREAM_ID(device.plp.unwrap_or(0)),
            DTV_TUNE(())
        )
        .context("DVB-T: set properties")?;

        Ok(())
    }
}
