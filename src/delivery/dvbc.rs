use anyhow::{Context, Result};

use crate::device_data::{DeliverySystemId, DeviceData};
use crate::fe::sys::*;
use crate::fe::FeDevice;
use crate::{dtv_property, set_dtv_properties};

use super::DeliverySystem;

/// DVB-C / DVB-C2 cable tuning.
pub struct DvbC;

impl DeliverySystem for DvbC {
    fn id(&self) -> DeliverySystemId {
        DeliverySystemId::DvbC
    }

    fn tune(&self, fe: &FeDevice, device: &DeviceData) -> Result<()> {
        let freq = device.freq.context("DVB-C: missing freq")? * 1000;
        let sr = device.sr.context("DVB-C: missing sr")? * 1000;
        let msys = device.msys.unwrap_or(DeliverySystemId::DvbC).to_fe_delivery_system();
        let bw = device.bw.unwrap_or(8_000_000);

        fe.drain_events();

        set_dtv_properties!(
            fe,
            DTV_CLEAR(()),
            DTV_BANDWIDTH_HZ(bw),
            DTV_DELIVERY_SYSTEM(msys),
            DTV_FREQUENCY(freq),
            DTV_INVERSION(device.specinv.unwrap_or(fe_spectral_inversion::INVERSION_AUTO)),
            DTV_MODULATION(device.mtype.unwrap_or(fe_modulation::QAM_AUTO)),
            DTV_SYMBOL_RATE(sr),
            DTV_INNER_FEC(device.fec.unwrap_or(fe_code_rate::FEC_AUTO)),
            DTV_TUNE(())
        )
        .context("DVB-C: set properties")?;

        Ok(())
    }
}
