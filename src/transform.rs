//! Optional query-string/advertised-capability rewriting (component C5).
//!
//! Most devices advertise exactly the capabilities their tuner hardware
//! has and never rewrite a client's query string. A `ChildPipeTransform`
//! exists for sources that are not real tuners at all (a recorded file or
//! remote multicast replayed through a helper process) but still need to
//! look, to a SAT&gt;IP client, like they support some delivery system.

use crate::device_data::DeliverySystemId;

/// Rewrites an incoming tuning query string and/or the delivery system a
/// `Device` advertises to clients, independent of what it actually does
/// internally.
pub trait Transform: Send {
    /// Rewrites the raw query string before it reaches
    /// `StreamProperties::parse_stream_string`. The identity transform
    /// returns the string unchanged.
    fn transform_stream_string<'a>(&self, params: &'a str) -> std::borrow::Cow<'a, str> {
        std::borrow::Cow::Borrowed(params)
    }

    /// The delivery system this device should claim to be, for capability
    /// advertisement purposes (RTSP `DESCRIBE`, HTTP capability listing).
    fn advertised_delivery_system(&self, native: DeliverySystemId) -> DeliverySystemId {
        native
    }

    /// Whether this transform is willing to accept a request for `msys`.
    /// The identity transform accepts whatever the underlying device
    /// already reports as capable; a transform that only stands in for one
    /// fixed system (`ChildPipeTransform`) overrides this.
    fn capable_to_transform(&self, _msys: DeliverySystemId) -> bool {
        true
    }
}

/// Passes tuning parameters through unchanged and advertises the device's
/// real delivery system. Used by every hardware-backed `Device`.
#[derive(Debug, Default)]
pub struct IdentityTransform;

impl Transform for IdentityTransform {}

/// Rewrites a plain query string into whatever argument convention the
/// child process expects, and advertises a fixed delivery system rather
/// than the source's actual one (a file replayed as if it were a live
/// DVB-S2 transponder, for example).
#[derive(Debug)]
pub struct ChildPipeTransform {
    pub advertise_as: DeliverySystemId,
}

impl ChildPipeTransform {
    pub fn new(advertise_as: DeliverySystemId) -> Self {
        ChildPipeTransform { advertise_as }
    }
}

impl Transform for ChildPipeTransform {
    fn advertised_delivery_system(&self, _native: DeliverySystemId) -> DeliverySystemId {
        self.advertise_as
    }

    fn capable_to_transform(&self, msys: DeliverySystemId) -> bool {
        msys == self.advertise_as
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transform_is_a_passthrough() {
        let t = IdentityTransform;
        assert_eq!(t.transform_stream_string("freq=100"), "freq=100");
        assert_eq!(
            t.advertised_delivery_system(DeliverySystemId::DvbS2),
            DeliverySystemId::DvbS2
        );
    }

    #[test]
    fn childpipe_transform_advertises_fixed_system() {
        let t = ChildPipeTransform::new(DeliverySystemId::DvbT);
        assert_eq!(
            t.advertised_delivery_system(DeliverySystemId::DvbS2),
            DeliverySystemId::DvbT
        );
    }

    #[test]
    fn childpipe_transform_only_accepts_its_advertised_system() {
        let t = ChildPipeTransform::new(DeliverySystemId::DvbS2);
        assert!(t.capable_to_transform(DeliverySystemId::DvbS2));
        assert!(!t.capable_to_transform(DeliverySystemId::DvbT));
    }
}
