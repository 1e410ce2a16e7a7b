use crate::constants::{
    CHECKSUM_OFFSET, COUNTDOWN_OFFSET, HEADER_SIZE, MIN_DEVICE_PACKET_SIZE, RESULT_START_CODE,
};
use crate::error::ProtocolError;
use bytes::Bytes;
use chrono::{Datelike, NaiveDateTime, Timelike};
use num_enum::{FromPrimitive, IntoPrimitive};
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Category byte values used by the device.
///
/// Only the result category is pinned by every known protocol version;
/// everything else is version-specific and surfaces as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum Category {
    Result = 0x03,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Computes the trailing checksum over the declared bytes of a packet.
///
/// The sum starts at the fixed offset constant and accumulates every
/// declared byte; the result is truncated to `width` bytes, least
/// significant byte first.
pub fn checksum(declared: &[u8], width: usize) -> Vec<u8> {
    let sum = declared
        .iter()
        .fold(u32::from(CHECKSUM_OFFSET), |acc, b| acc + u32::from(*b));
    (0..width).map(|i| (sum >> (8 * i)) as u8).collect()
}

/// Checks that a complete burst ends with the checksum of everything
/// before it.
pub fn verify_checksum(raw: &[u8], width: usize) -> bool {
    if raw.len() <= width {
        return false;
    }
    let (declared, trailer) = raw.split_at(raw.len() - width);
    checksum(declared, width) == trailer
}

/// Leading three bytes shared by every packet on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    pub start_code: u8,
    pub length: u8,
    pub category: u8,
}

impl PacketHeader {
    fn read(raw: &[u8]) -> Result<Self, ProtocolError> {
        if raw.len() < MIN_DEVICE_PACKET_SIZE {
            return Err(ProtocolError::IllegalLength {
                expected: MIN_DEVICE_PACKET_SIZE,
                actual: raw.len(),
            });
        }
        Ok(Self {
            start_code: raw[0],
            length: raw[1],
            category: raw[2],
        })
    }

    pub fn packet_category(&self) -> Category {
        Category::from_primitive(self.category)
    }
}

/// Outbound request packet stamped with the caller-provided time.
///
/// The header bytes default to zero; a protocol version's builder hook
/// may fill them in before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppPacket {
    pub header: PacketHeader,
    /// Years since 2000.
    pub year: u8,
    /// Zero-based month, as the device expects.
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
}

impl AppPacket {
    /// Number of declared bytes, excluding the trailing checksum.
    pub const DECLARED_SIZE: usize = HEADER_SIZE + 5;

    pub fn new(stamp: NaiveDateTime) -> Self {
        Self {
            header: PacketHeader::default(),
            year: (stamp.year() - 2000) as u8,
            month: stamp.month0() as u8,
            day: stamp.day() as u8,
            hour: stamp.hour() as u8,
            min: stamp.minute() as u8,
        }
    }

    /// Declared bytes in wire order, without the trailing checksum.
    pub fn field_bytes(&self) -> [u8; Self::DECLARED_SIZE] {
        [
            self.header.start_code,
            self.header.length,
            self.header.category,
            self.year,
            self.month,
            self.day,
            self.hour,
            self.min,
        ]
    }

    /// Serializes the declared fields and appends their checksum.
    pub fn encode(&self, checksum_width: usize) -> Bytes {
        let fields = self.field_bytes();
        let mut out = Vec::with_capacity(fields.len() + checksum_width);
        out.extend_from_slice(&fields);
        out.extend_from_slice(&checksum(&fields, checksum_width));
        Bytes::from(out)
    }
}

impl TryFrom<&[u8]> for AppPacket {
    type Error = ProtocolError;

    fn try_from(raw: &[u8]) -> Result<Self, Self::Error> {
        let header = PacketHeader::read(raw)?;
        if raw.len() < Self::DECLARED_SIZE {
            return Err(ProtocolError::IllegalLength {
                expected: Self::DECLARED_SIZE,
                actual: raw.len(),
            });
        }
        Ok(Self {
            header,
            year: raw[3],
            month: raw[4],
            day: raw[5],
            hour: raw[6],
            min: raw[7],
        })
    }
}

/// Inbound packet with no kind-specific fields.
///
/// Also the default shape of an end-of-transmission packet: any
/// structurally valid device packet counts unless the active protocol
/// version says otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePacket {
    pub header: PacketHeader,
    raw: Bytes,
}

impl DevicePacket {
    /// The burst exactly as it was received.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

impl TryFrom<&[u8]> for DevicePacket {
    type Error = ProtocolError;

    fn try_from(raw: &[u8]) -> Result<Self, Self::Error> {
        let header = PacketHeader::read(raw)?;
        Ok(Self {
            header,
            raw: Bytes::copy_from_slice(raw),
        })
    }
}

/// Device identification reply to the initial info request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoPacket {
    pub header: PacketHeader,
    pub version_code: u8,
    pub client_code: u8,
}

impl InfoPacket {
    pub const DECLARED_SIZE: usize = HEADER_SIZE + 2;
}

impl TryFrom<&[u8]> for InfoPacket {
    type Error = ProtocolError;

    fn try_from(raw: &[u8]) -> Result<Self, Self::Error> {
        let header = PacketHeader::read(raw)?;
        if raw.len() < Self::DECLARED_SIZE {
            return Err(ProtocolError::IllegalLength {
                expected: Self::DECLARED_SIZE,
                actual: raw.len(),
            });
        }
        Ok(Self {
            header,
            version_code: raw[3],
            client_code: raw[4],
        })
    }
}

/// Countdown notification sent by the device while a reading is in
/// progress.
///
/// This is only the structural shape; whether a version emits timing
/// packets at all is decided by its `parse_timing` hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingPacket {
    pub header: PacketHeader,
    raw: Bytes,
}

impl TimingPacket {
    /// Seconds remaining until the reading is available.
    pub fn countdown(&self) -> u8 {
        self.raw[COUNTDOWN_OFFSET]
    }
}

impl TryFrom<&[u8]> for TimingPacket {
    type Error = ProtocolError;

    fn try_from(raw: &[u8]) -> Result<Self, Self::Error> {
        let header = PacketHeader::read(raw)?;
        if raw.len() <= COUNTDOWN_OFFSET {
            return Err(ProtocolError::IllegalLength {
                expected: COUNTDOWN_OFFSET + 1,
                actual: raw.len(),
            });
        }
        Ok(Self {
            header,
            raw: Bytes::copy_from_slice(raw),
        })
    }
}

/// Fixed-layout body of a result packet, as it appears on the wire
/// right after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ResultFields {
    /// Years since 2000.
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
    pub retain: u8,
    /// Glucose reading in mg/dL, little endian.
    pub glucose_mg_dl: U16,
}

/// One stored glucose reading reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPacket {
    pub header: PacketHeader,
    pub fields: ResultFields,
    raw: Bytes,
}

impl ResultPacket {
    /// Number of declared bytes, excluding the trailing checksum.
    pub const DECLARED_SIZE: usize = HEADER_SIZE + size_of::<ResultFields>();

    /// Glucose reading in mg/dL.
    pub fn glucose_mg_dl(&self) -> u16 {
        self.fields.glucose_mg_dl.get()
    }

    /// Declared bytes in wire order, without any trailing checksum.
    pub fn field_bytes(&self) -> &[u8] {
        &self.raw[..Self::DECLARED_SIZE]
    }
}

impl TryFrom<&[u8]> for ResultPacket {
    type Error = ProtocolError;

    fn try_from(raw: &[u8]) -> Result<Self, Self::Error> {
        let header = PacketHeader::read(raw)?;
        if header.start_code != RESULT_START_CODE {
            return Err(ProtocolError::IllegalContent(format!(
                "result start code must be {RESULT_START_CODE:#04x}, got {:#04x}",
                header.start_code
            )));
        }
        if header.packet_category() != Category::Result {
            return Err(ProtocolError::IllegalContent(format!(
                "result category must be {:#04x}, got {:#04x}",
                u8::from(Category::Result),
                header.category
            )));
        }
        if raw.len() < Self::DECLARED_SIZE {
            return Err(ProtocolError::IllegalLength {
                expected: Self::DECLARED_SIZE,
                actual: raw.len(),
            });
        }
        let fields = ResultFields::read_from_bytes(&raw[HEADER_SIZE..Self::DECLARED_SIZE])
            .map_err(|_| ProtocolError::IllegalContent("result body size mismatch".to_string()))?;
        Ok(Self {
            header,
            fields,
            raw: Bytes::copy_from_slice(raw),
        })
    }
}
