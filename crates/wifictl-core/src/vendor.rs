//! Vendor capability set.
//!
//! Each chipset backend is a value implementing [`Vendor`]. Every operation
//! is optional: the default bodies return [`CtrlError::NotImplemented`], so a
//! backend overrides only what its hardware supports and callers get a typed
//! error for the rest.

use crate::error::CtrlError;

/// Builds the error a default capability body returns.
pub fn not_implemented(vendor: &str, op: &'static str) -> CtrlError {
    CtrlError::NotImplemented {
        vendor: vendor.to_string(),
        op,
    }
}

/// Radio, VAP (access point) and endpoint (station) operations.
pub trait Vendor {
    /// Backend name, e.g. `"nl80211"`.
    fn name(&self) -> &str;

    fn radio_enable(&self, radio: &str, enable: bool) -> Result<(), CtrlError> {
        let _ = (radio, enable);
        Err(not_implemented(self.name(), "radio_enable"))
    }

    fn radio_set_channel(&self, radio: &str, channel: u16) -> Result<(), CtrlError> {
        let _ = (radio, channel);
        Err(not_implemented(self.name(), "radio_set_channel"))
    }

    fn vap_create(&self, radio: &str, vap: &str) -> Result<(), CtrlError> {
        let _ = (radio, vap);
        Err(not_implemented(self.name(), "vap_create"))
    }

    fn vap_delete(&self, vap: &str) -> Result<(), CtrlError> {
        let _ = vap;
        Err(not_implemented(self.name(), "vap_delete"))
    }

    fn vap_enable(&self, vap: &str, enable: bool) -> Result<(), CtrlError> {
        let _ = (vap, enable);
        Err(not_implemented(self.name(), "vap_enable"))
    }

    fn endpoint_connect(&self, endpoint: &str, ssid: &str) -> Result<(), CtrlError> {
        let _ = (endpoint, ssid);
        Err(not_implemented(self.name(), "endpoint_connect"))
    }

    fn endpoint_disconnect(&self, endpoint: &str) -> Result<(), CtrlError> {
        let _ = endpoint;
        Err(not_implemented(self.name(), "endpoint_disconnect"))
    }
}
