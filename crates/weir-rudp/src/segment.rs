use weir_timing::Millis;

/// Header bytes prepended to every segment.
pub const OVERHEAD: usize = 24;

/// Data push.
pub const CMD_PUSH: u8 = 81;
/// Acknowledge.
pub const CMD_ACK: u8 = 82;
/// Window probe (ask the remote for its window).
pub const CMD_WASK: u8 = 83;
/// Window size (tell the remote our window).
pub const CMD_WINS: u8 = 84;

pub const MTU_DEFAULT: usize = 1400;
pub const WND_SND: u32 = 32;
/// Receive window floor; must stay at or above the fragment maximum.
pub const WND_RCV: u32 = 128;

/// Decoded wire header.
///
/// ```text
/// 0               4   5   6       8
/// +---------------+---+---+-------+
/// |     conv      |cmd|frg|  wnd  |
/// +---------------+---+---+-------+   8
/// |     ts        |     sn        |
/// +---------------+---------------+  16
/// |     una       |     len       |
/// +---------------+---------------+  24
/// ```
///
/// Fields are little endian on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SegmentHeader {
    pub conv: u32,
    pub cmd: u8,
    pub frg: u8,
    pub wnd: u16,
    pub ts: Millis,
    pub sn: u32,
    pub una: u32,
    pub len: u32,
}

impl SegmentHeader {
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.conv.to_le_bytes());
        out.push(self.cmd);
        out.push(self.frg);
        out.extend_from_slice(&self.wnd.to_le_bytes());
        out.extend_from_slice(&self.ts.0.to_le_bytes());
        out.extend_from_slice(&self.sn.to_le_bytes());
        out.extend_from_slice(&self.una.to_le_bytes());
        out.extend_from_slice(&self.len.to_le_bytes());
    }

    pub fn decode(bytes: &[u8]) -> Option<SegmentHeader> {
        if bytes.len() < OVERHEAD {
            return None;
        }
        Some(SegmentHeader {
            conv: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            cmd: bytes[4],
            frg: bytes[5],
            wnd: u16::from_le_bytes(bytes[6..8].try_into().unwrap()),
            ts: Millis(u32::from_le_bytes(bytes[8..12].try_into().unwrap())),
            sn: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
            una: u32::from_le_bytes(bytes[16..20].try_into().unwrap()),
            len: u32::from_le_bytes(bytes[20..24].try_into().unwrap()),
        })
    }
}

/// Conversation id of a raw datagram, for routing before a session is
/// looked up.
pub fn peek_conv(datagram: &[u8]) -> Option<u32> {
    if datagram.len() < 4 {
        return None;
    }
    Some(u32::from_le_bytes(datagram[0..4].try_into().unwrap()))
}

/// In-flight segment bookkeeping. Wire fields plus the retransmit
/// state the flush loop maintains.
#[derive(Debug, Default, Clone)]
pub(crate) struct Segment {
    pub frg: u8,
    pub ts: Millis,
    pub sn: u32,
    /// Next retransmit time.
    pub resend_ts: Millis,
    /// Retransmission timeout snapshot for this segment.
    pub rto: u32,
    /// Duplicate-ack hints seen for newer segments.
    pub fast_acks: u32,
    /// Transmit count.
    pub xmit: u32,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let hdr = SegmentHeader {
            conv: 0x11223344,
            cmd: CMD_PUSH,
            frg: 3,
            wnd: 120,
            ts: Millis(987654),
            sn: 42,
            una: 40,
            len: 5,
        };
        let mut wire = Vec::new();
        hdr.encode_into(&mut wire);
        assert_eq!(wire.len(), OVERHEAD);
        assert_eq!(SegmentHeader::decode(&wire), Some(hdr));
        assert_eq!(peek_conv(&wire), Some(0x11223344));
    }

    #[test]
    fn wire_layout_is_fixed() {
        let hdr = SegmentHeader {
            conv: 1,
            cmd: CMD_ACK,
            frg: 0,
            wnd: 2,
            ts: Millis(3),
            sn: 4,
            una: 5,
            len: 0,
        };
        let mut wire = Vec::new();
        hdr.encode_into(&mut wire);
        assert_eq!(&wire[0..4], &[1, 0, 0, 0]);
        assert_eq!(wire[4], 82);
        assert_eq!(wire[5], 0);
        assert_eq!(&wire[6..8], &[2, 0]);
        assert_eq!(&wire[8..12], &[3, 0, 0, 0]);
        assert_eq!(&wire[12..16], &[4, 0, 0, 0]);
        assert_eq!(&wire[16..20], &[5, 0, 0, 0]);
        assert_eq!(&wire[20..24], &[0, 0, 0, 0]);
    }

    #[test]
    fn truncated_header_rejected() {
        assert!(SegmentHeader::decode(&[0u8; OVERHEAD - 1]).is_none());
        assert!(peek_conv(&[1, 2, 3]).is_none());
    }
}
