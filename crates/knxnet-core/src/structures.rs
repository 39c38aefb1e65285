//! Concrete structure constructors
//!
//! One builder function per wire structure, each returning a [`Structure`]
//! pre-populated with its protocol-mandated constants. The CRI and CRD carry
//! the same device-information field set as the hardware DIB; the standard
//! allows other layouts but this stack only negotiates with peers using the
//! device-info form.

use crate::field::Field;
use crate::protocol::{
    DescriptionType, HostProtocol, KnxMedium, ServiceFamily, HEADER_SIZE, HPAI_SIZE,
    MULTICAST_ADDRESS, PROG_MODE_OFF, PROTOCOL_VERSION,
};
use crate::schema::{DataMap, Schema};
use crate::structure::Structure;

/// 6-byte KNXnet/IP header.
pub fn header() -> Structure {
    let mut header = Structure::new(
        "Header",
        "header",
        Schema::new()
            .scalar(Field::uint("StructureLength", 1))
            .scalar(Field::uint("ProtocolVersion", 1))
            .scalar(Field::uint("ServiceType", 2))
            .scalar(Field::uint("TotalLength", 2)),
    )
    .with_fixed_size(HEADER_SIZE);
    header.set_uint("StructureLength", HEADER_SIZE as u64);
    header.set_uint("ProtocolVersion", PROTOCOL_VERSION as u64);
    header
}

/// 8-byte host protocol address information block. `id` distinguishes
/// multiple endpoints within one message (control vs. data).
pub fn hpai(id: &'static str) -> Structure {
    let mut hpai = Structure::new(
        "HPAI",
        id,
        Schema::new()
            .scalar(Field::uint("StructureLength", 1))
            .scalar(Field::uint("HostProtocolCode", 1))
            .scalar(Field::dot_bytes("IPAddress", 4))
            .scalar(Field::uint("Port", 2)),
    )
    .with_fixed_size(HPAI_SIZE);
    hpai.set_uint("StructureLength", HPAI_SIZE as u64);
    hpai.set_uint("HostProtocolCode", HostProtocol::Ipv4Udp.code() as u64);
    hpai
}

fn device_info_schema() -> Schema {
    Schema::new()
        .scalar(Field::uint("StructureLength", 1))
        .scalar(Field::uint("DescriptionTypeCode", 1))
        .scalar(Field::uint("KNXMedium", 1))
        .scalar(Field::uint("DeviceStatus", 1))
        .scalar(Field::dot_bytes("KNXIndividualAddress", 2))
        .scalar(Field::dot_bytes("ProjectInstallationIdentifier", 2))
        .scalar(Field::dot_bytes("DeviceKNXSerialNumber", 6))
        .scalar(Field::dot_bytes("DeviceRoutingMulticastAddress", 4))
        .scalar(Field::dot_bytes("DeviceMACAddress", 6))
        .scalar(Field::text("DeviceFriendlyName", 30))
}

/// 54-byte device hardware DIB.
pub fn hardware_dib() -> Structure {
    let mut dib = Structure::new("DIB Hardware", "dib_hardware", device_info_schema());
    dib.set_uint("DescriptionTypeCode", DescriptionType::DeviceInfo.code() as u64);
    dib.set_uint("KNXMedium", KnxMedium::Tp1.code() as u64);
    dib.set_uint("DeviceStatus", PROG_MODE_OFF as u64);
    dib.set_text("DeviceRoutingMulticastAddress", MULTICAST_ADDRESS);
    dib
}

/// Variable-length supported-service-family DIB (2 + 2N bytes).
pub fn service_families_dib() -> Structure {
    let mut dib = Structure::new(
        "DIB Supported Service Families",
        "dib_service_families",
        Schema::new()
            .scalar(Field::uint("StructureLength", 1))
            .scalar(Field::uint("DescriptionTypeCode", 1))
            .repeated(
                "ServiceFamilies",
                Schema::new()
                    .scalar(Field::uint("ServiceFamilyId", 1))
                    .scalar(Field::uint("ServiceFamilyVersion", 1)),
            ),
    );
    dib.set_uint(
        "DescriptionTypeCode",
        DescriptionType::SuppSvcFamilies.code() as u64,
    );
    dib
}

/// Append one `(family, version)` pair to a service-family DIB.
pub fn add_service_family(dib: &mut Structure, family: ServiceFamily, version: u64) {
    let mut item = DataMap::new();
    item.set_uint("ServiceFamilyId", family.code() as u64);
    item.set_uint("ServiceFamilyVersion", version);
    dib.data_mut().push_item("ServiceFamilies", item);
}

/// Look up the announced version for a family, `None` when absent.
pub fn service_family_version(dib: &Structure, family: ServiceFamily) -> Option<u64> {
    dib.data().items("ServiceFamilies")?.iter().find_map(|item| {
        (item.uint("ServiceFamilyId").ok()? == family.code() as u64)
            .then(|| item.uint("ServiceFamilyVersion").ok())
            .flatten()
    })
}

/// 8-byte manufacturer-data DIB.
pub fn manufacturer_dib() -> Structure {
    let mut dib = Structure::new(
        "DIB Manufacturer Data",
        "dib_manufacturer",
        Schema::new()
            .scalar(Field::uint("StructureLength", 1))
            .scalar(Field::uint("DescriptionTypeCode", 1))
            .scalar(Field::uint("KNXManufacturerID", 2))
            .scalar(Field::text("DeviceTypeName", 4)),
    );
    dib.set_uint(
        "DescriptionTypeCode",
        DescriptionType::ManufacturerData.code() as u64,
    );
    dib
}

/// 2-byte ConnectResponse base block. Carries no length prefix on the wire.
pub fn connection_base() -> Structure {
    Structure::new(
        "ConnectionResponse Base",
        "connection_base",
        Schema::new()
            .scalar(Field::uint("CommunicationChannelID", 1))
            .scalar(Field::uint("Status", 1)),
    )
    .with_fixed_size(2)
}

/// Connection request information block.
pub fn cri() -> Structure {
    let mut cri = Structure::new(
        "ConnectionRequestInformation (CRI)",
        "cri",
        device_info_schema(),
    );
    cri.set_uint("DescriptionTypeCode", DescriptionType::DeviceInfo.code() as u64);
    cri.set_uint("KNXMedium", KnxMedium::Tp1.code() as u64);
    cri.set_uint("DeviceStatus", PROG_MODE_OFF as u64);
    cri.set_text("DeviceRoutingMulticastAddress", MULTICAST_ADDRESS);
    cri
}

/// Connection response data block. Populated entirely by the peer.
pub fn crd() -> Structure {
    Structure::new("ConnectionResponseData (CRD)", "crd", device_info_schema())
}

/// Opaque tail capturing trailing DIBs the decoder does not interpret.
pub fn raw_tail() -> Structure {
    Structure::raw("Raw", "raw")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_defaults() {
        let mut header = header();
        let buffer = header.to_buffer().unwrap();
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer[0], 0x06);
        assert_eq!(buffer[1], 0x10);
    }

    #[test]
    fn test_hpai_encodes_to_eight_bytes() {
        let mut hpai = hpai("hpai");
        hpai.set_text("IPAddress", "192.168.1.138");
        hpai.set_uint("Port", 3671);
        let buffer = hpai.to_buffer().unwrap();
        assert_eq!(
            buffer.to_vec(),
            vec![0x08, 0x01, 192, 168, 1, 138, 0x0E, 0x57]
        );
    }

    #[test]
    fn test_hardware_dib_is_54_bytes() {
        let mut dib = hardware_dib();
        dib.set_text("KNXIndividualAddress", "1.1");
        dib.set_text("ProjectInstallationIdentifier", "0.1");
        dib.set_text("DeviceKNXSerialNumber", "0.250.0.0.0.1");
        dib.set_text("DeviceMACAddress", "6.6.6.3.14.71");
        dib.set_text("DeviceFriendlyName", "SMARTHOMEKNX.DE");
        let buffer = dib.to_buffer().unwrap();
        assert_eq!(buffer.len(), 0x36);
        assert_eq!(buffer[0], 0x36);
        assert_eq!(buffer[1], 0x01);
    }

    #[test]
    fn test_service_families_dib_size_tracks_families() {
        let mut dib = service_families_dib();
        for family in [
            ServiceFamily::Core,
            ServiceFamily::DeviceManagement,
            ServiceFamily::Tunneling,
            ServiceFamily::Routing,
        ] {
            add_service_family(&mut dib, family, 1);
        }
        let buffer = dib.to_buffer().unwrap();
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer[0], 0x0A);
        assert_eq!(buffer[1], 0x02);
        assert_eq!(
            buffer[2..].to_vec(),
            vec![0x02, 1, 0x03, 1, 0x04, 1, 0x05, 1]
        );
    }

    #[test]
    fn test_service_family_lookup() {
        let mut dib = service_families_dib();
        add_service_family(&mut dib, ServiceFamily::Core, 1);
        add_service_family(&mut dib, ServiceFamily::Tunneling, 2);
        assert_eq!(service_family_version(&dib, ServiceFamily::Tunneling), Some(2));
        assert_eq!(service_family_version(&dib, ServiceFamily::Routing), None);
    }

    #[test]
    fn test_manufacturer_dib_roundtrip() {
        let mut dib = manufacturer_dib();
        dib.set_uint("KNXManufacturerID", 0x0001);
        dib.set_text("DeviceTypeName", "N146");
        let buffer = dib.to_buffer().unwrap();
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer[1], 0xFE);

        let mut decoded = manufacturer_dib();
        decoded.from_buffer(&buffer).unwrap();
        assert_eq!(decoded.uint("KNXManufacturerID").unwrap(), 1);
        assert_eq!(decoded.text("DeviceTypeName").unwrap(), "N146");
    }

    #[test]
    fn test_connection_base_has_no_length_prefix() {
        let mut base = connection_base();
        base.set_uint("CommunicationChannelID", 21);
        base.set_uint("Status", 0);
        assert_eq!(base.to_buffer().unwrap().to_vec(), vec![21, 0]);
    }
}
