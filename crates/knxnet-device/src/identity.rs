//! Device hardware identity
//!
//! The identity fields a device announces in its hardware DIB. Dot-byte
//! strings use the same decimal token form the codec expects on the wire.

use serde::{Deserialize, Serialize};

use knxnet_core::Structure;

/// Hardware identity announced in SearchResponse / DescriptionResponse
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// KNX individual address, two dot-separated bytes ("1.1")
    #[serde(default = "default_individual_address")]
    pub knx_individual_address: String,
    /// Project installation identifier, two dot-separated bytes
    #[serde(default = "default_installation_id")]
    pub project_installation_id: String,
    /// KNX serial number, six dot-separated bytes
    #[serde(default = "default_serial_number")]
    pub knx_serial_number: String,
    /// MAC address, six dot-separated decimal bytes
    #[serde(default = "default_mac_address")]
    pub mac_address: String,
    /// Friendly name, at most 30 bytes
    #[serde(default = "default_friendly_name")]
    pub friendly_name: String,
}

fn default_individual_address() -> String {
    "255.255".to_string()
}

fn default_installation_id() -> String {
    "0.1".to_string()
}

fn default_serial_number() -> String {
    "0.250.0.0.0.1".to_string()
}

fn default_mac_address() -> String {
    "6.6.6.3.14.71".to_string()
}

fn default_friendly_name() -> String {
    "SMARTHOMEKNX.DE".to_string()
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            knx_individual_address: default_individual_address(),
            project_installation_id: default_installation_id(),
            knx_serial_number: default_serial_number(),
            mac_address: default_mac_address(),
            friendly_name: default_friendly_name(),
        }
    }
}

impl DeviceIdentity {
    /// Write the identity into a hardware DIB (or CRI/CRD, which share the
    /// device-info field set).
    pub fn fill_device_info(&self, structure: &mut Structure) {
        structure.set_text("KNXIndividualAddress", &self.knx_individual_address);
        structure.set_text("ProjectInstallationIdentifier", &self.project_installation_id);
        structure.set_text("DeviceKNXSerialNumber", &self.knx_serial_number);
        structure.set_text("DeviceMACAddress", &self.mac_address);
        structure.set_text("DeviceFriendlyName", &self.friendly_name);
    }
}
