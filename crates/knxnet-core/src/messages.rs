//! Concrete message constructors
//!
//! One builder per implemented service type. Each returns a [`Message`] with
//! its type-specific structure order and protocol defaults already applied;
//! callers fill in the endpoint addresses and device identity before
//! serializing, or decode an inbound buffer straight into the returned value.

use crate::error::Result;
use crate::message::Message;
use crate::protocol::{ServiceFamily, ServiceType};
use crate::structures;

/// SearchRequest: header + reply-to HPAI. 14 bytes on the wire.
pub fn search_request() -> Message {
    let mut message = Message::new(ServiceType::SearchRequest);
    message.push(structures::hpai("hpai"));
    message
}

/// SearchResponse: header + control endpoint HPAI + hardware DIB +
/// supported-service-family DIB. Announces the core families at version 1.
pub fn search_response() -> Message {
    let mut message = Message::new(ServiceType::SearchResponse);
    message.push(structures::hpai("hpai"));
    message.push(structures::hardware_dib());
    let mut families = structures::service_families_dib();
    for family in [
        ServiceFamily::Core,
        ServiceFamily::DeviceManagement,
        ServiceFamily::Tunneling,
        ServiceFamily::Routing,
    ] {
        structures::add_service_family(&mut families, family, 1);
    }
    message.push(families);
    message
}

/// DescriptionRequest: header + control endpoint HPAI.
pub fn description_request() -> Message {
    let mut message = Message::new(ServiceType::DescriptionRequest);
    message.push(structures::hpai("hpai"));
    message
}

/// DescriptionResponse: header + hardware DIB + supported-service-family DIB,
/// with a raw tail catching optional trailing DIBs (manufacturer data).
pub fn description_response() -> Message {
    let mut message = Message::new(ServiceType::DescriptionResponse);
    message.push(structures::hardware_dib());
    let mut families = structures::service_families_dib();
    for family in [
        ServiceFamily::Core,
        ServiceFamily::DeviceManagement,
        ServiceFamily::Tunneling,
        ServiceFamily::Routing,
    ] {
        structures::add_service_family(&mut families, family, 1);
    }
    message.push(families);
    message.push(structures::raw_tail());
    message
}

/// ConnectRequest: header + control HPAI + data endpoint HPAI + CRI.
pub fn connect_request() -> Message {
    let mut message = Message::new(ServiceType::ConnectRequest);
    message.push(structures::hpai("control_endpoint"));
    message.push(structures::hpai("data_endpoint"));
    message.push(structures::cri());
    message
}

/// ConnectResponse: header + base block + data endpoint HPAI + CRD. On a
/// rejection the peer sends only header and base block; decoding tolerates
/// the missing trailers.
pub fn connect_response() -> Message {
    let mut message = Message::new(ServiceType::ConnectResponse);
    message.push(structures::connection_base());
    message.push(structures::hpai("data_endpoint"));
    message.push(structures::crd());
    message
}

/// Write an address/port pair into one of a message's HPAI structures.
pub fn set_endpoint(message: &mut Message, id: &str, ip_address: &str, port: u16) {
    if let Some(hpai) = message.structure_mut(id) {
        hpai.set_text("IPAddress", ip_address);
        hpai.set_uint("Port", port as u64);
    }
}

/// Read the address/port pair out of one of a message's HPAI structures.
pub fn endpoint(message: &Message, id: &str) -> Result<(String, u16)> {
    let hpai = message
        .structure(id)
        .ok_or_else(|| crate::error::Error::MissingField(id.to_string()))?;
    let ip = hpai.text("IPAddress")?.to_string();
    let port = hpai.uint("Port")? as u16;
    Ok((ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectStatus;
    use crate::structures::service_family_version;

    #[test]
    fn test_search_request_wire_shape() {
        let mut message = search_request();
        set_endpoint(&mut message, "hpai", "192.168.1.138", 3671);
        let buffer = message.to_buffer().unwrap();
        assert_eq!(
            buffer.to_vec(),
            vec![
                0x06, 0x10, 0x02, 0x01, 0x00, 0x0E, // header
                0x08, 0x01, 192, 168, 1, 138, 0x0E, 0x57, // HPAI
            ]
        );
    }

    #[test]
    fn test_search_response_roundtrip() {
        let mut message = search_response();
        set_endpoint(&mut message, "hpai", "192.168.200.12", 50100);
        let dib = message.structure_mut("dib_hardware").unwrap();
        dib.set_text("KNXIndividualAddress", "1.1");
        dib.set_text("ProjectInstallationIdentifier", "0.17");
        dib.set_text("DeviceKNXSerialNumber", "0.250.0.0.0.1");
        dib.set_text("DeviceMACAddress", "6.6.6.3.14.71");
        dib.set_text("DeviceFriendlyName", "SMARTHOMEKNX.DE");

        let buffer = message.to_buffer().unwrap();
        assert_eq!(buffer.len(), 0x4E);
        assert_eq!(message.header().uint("TotalLength").unwrap(), 0x4E);

        let mut decoded = search_response();
        let consumed = decoded.from_buffer(&buffer).unwrap();
        assert_eq!(consumed, 0x4E);
        assert_eq!(endpoint(&decoded, "hpai").unwrap(), ("192.168.200.12".to_string(), 50100));
        let dib = decoded.structure("dib_hardware").unwrap();
        assert_eq!(dib.text("DeviceFriendlyName").unwrap(), "SMARTHOMEKNX.DE");
        let families = decoded.structure("dib_service_families").unwrap();
        assert_eq!(
            service_family_version(families, ServiceFamily::Routing),
            Some(1)
        );
    }

    #[test]
    fn test_connect_response_error_status_fixture() {
        let mut message = connect_response();
        message
            .from_buffer(&[0x06, 0x10, 0x02, 0x06, 0x00, 0x08, 0x00, 0x22])
            .unwrap();
        let base = message.structure("connection_base").unwrap();
        assert_eq!(base.uint("CommunicationChannelID").unwrap(), 0);
        assert_eq!(base.uint("Status").unwrap(), 0x22);
        assert_eq!(
            ConnectStatus::from_code(0x22),
            Some(ConnectStatus::ConnectionType)
        );
    }

    #[test]
    fn test_connect_request_roundtrip() {
        let mut message = connect_request();
        set_endpoint(&mut message, "control_endpoint", "192.168.1.138", 3671);
        set_endpoint(&mut message, "data_endpoint", "192.168.1.1", 3671);
        let cri = message.structure_mut("cri").unwrap();
        cri.set_text("KNXIndividualAddress", "1.1");
        cri.set_text("ProjectInstallationIdentifier", "0.1");
        cri.set_text("DeviceKNXSerialNumber", "0.250.0.0.0.1");
        cri.set_text("DeviceMACAddress", "6.6.6.3.14.71");
        cri.set_text("DeviceFriendlyName", "scanner");

        let buffer = message.to_buffer().unwrap();
        assert_eq!(buffer.len(), 6 + 8 + 8 + 54);

        let mut decoded = connect_request();
        decoded.from_buffer(&buffer).unwrap();
        assert_eq!(
            endpoint(&decoded, "control_endpoint").unwrap().0,
            "192.168.1.138"
        );
        assert_eq!(endpoint(&decoded, "data_endpoint").unwrap().0, "192.168.1.1");
    }

    #[test]
    fn test_description_response_captures_manufacturer_tail() {
        let mut message = description_response();
        let dib = message.structure_mut("dib_hardware").unwrap();
        dib.set_text("KNXIndividualAddress", "1.1");
        dib.set_text("ProjectInstallationIdentifier", "0.17");
        dib.set_text("DeviceKNXSerialNumber", "0.1.17.17.17.17");
        dib.set_text("DeviceMACAddress", "69.73.66.110.101.116");
        dib.set_text("DeviceFriendlyName", "MYHOME");
        let mut buffer = message.to_buffer().unwrap().to_vec();

        // append an 8-byte manufacturer DIB the way a real gateway does
        let mut manufacturer = crate::structures::manufacturer_dib();
        manufacturer.set_uint("KNXManufacturerID", 1);
        manufacturer.set_text("DeviceTypeName", "N146");
        buffer.extend_from_slice(&manufacturer.to_buffer().unwrap());
        // keep the header honest about the extra bytes
        let total = buffer.len() as u16;
        buffer[4..6].copy_from_slice(&total.to_be_bytes());

        let mut decoded = description_response();
        let consumed = decoded.from_buffer(&buffer).unwrap();
        assert_eq!(consumed, buffer.len());
        let raw = decoded.structure("raw").unwrap();
        assert_eq!(raw.raw_bytes().unwrap().len(), 8);
        assert_eq!(raw.raw_bytes().unwrap()[1], 0xFE);
    }
}
