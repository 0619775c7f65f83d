use super::*;

/// Slave ID
pub type SlaveId = u8;

/// A CRC-verified frame as it was received, checksum included.
pub type RawFrame = Vec<u8>;

/// RTU PDU together with the slave it is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressedPdu {
    pub slave: SlaveId,
    pub pdu: Pdu,
}
