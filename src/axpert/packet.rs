use serde::Serialize;

/// Largest write the inverter's receive buffer accepts in one go.
pub const MAX_WRITE_CHUNK: usize = 8;

pub const TERMINATOR: u8 = b'\r';

const ACK: &[u8] = b"ACK";
const NAK: &[u8] = b"NAK";

// Frame {{{
/// A request ready to go on the wire: `code ‖ value ‖ crc16 (BE) ‖ \r`.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn new(code: &str, value: Option<&str>) -> Self {
        let mut data = Vec::with_capacity(code.len() + value.map_or(0, str::len) + 3);
        data.extend_from_slice(code.as_bytes());
        if let Some(value) = value {
            data.extend_from_slice(value.as_bytes());
        }

        let checksum = Self::checksum(&data);
        data.extend_from_slice(&checksum);
        data.push(TERMINATOR);

        Self(data)
    }

    pub fn checksum(data: &[u8]) -> [u8; 2] {
        crc16::State::<crc16::XMODEM>::calculate(data).to_be_bytes()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The writes needed to send this frame: the first 8 bytes, then
    /// everything else in a single second write.
    pub fn chunks(&self) -> Vec<&[u8]> {
        if self.0.len() <= MAX_WRITE_CHUNK {
            vec![&self.0[..]]
        } else {
            let (head, tail) = self.0.split_at(MAX_WRITE_CHUNK);
            vec![head, tail]
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({:?})", String::from_utf8_lossy(&self.0))
    }
} // }}}

// Status {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Response contained `ACK`.
    Ok,
    /// Response contained `NAK` (and no `ACK`).
    ProtocolError,
    /// Empty response, or neither marker present.
    Unknown,
    /// The bus was held by someone else for the whole lock timeout.
    Busy,
}

impl Status {
    pub fn from_response(data: Option<&[u8]>) -> Self {
        match data {
            Some(data) if contains(data, ACK) => Self::Ok,
            Some(data) if contains(data, NAK) => Self::ProtocolError,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::ProtocolError => "NAK",
            Self::Unknown => "unknown",
            Self::Busy => "busy",
        };
        write!(f, "{}", s)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
} // }}}

// Outcome {{{
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub status: Status,
    pub data: Option<Vec<u8>>,
}

impl Outcome {
    pub fn from_response(data: Option<Vec<u8>>) -> Self {
        let data = data.filter(|d| !d.is_empty());
        Self {
            status: Status::from_response(data.as_deref()),
            data,
        }
    }

    pub fn busy() -> Self {
        Self {
            status: Status::Busy,
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Whether the inverter actually answered: an acknowledged command, or
    /// a query that produced an unmarked payload.
    pub fn is_usable(&self) -> bool {
        match self.status {
            Status::Ok => true,
            Status::Unknown => self.data.is_some(),
            Status::ProtocolError | Status::Busy => false,
        }
    }

    /// Outcomes worth handing to a second caller.
    pub fn is_cacheable(&self) -> bool {
        self.is_usable()
    }

    pub fn data_lossy(&self) -> String {
        String::from_utf8_lossy(self.data()).to_string()
    }
} // }}}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_with_value_is_split_in_two_writes() {
        let frame = Frame::new("QQQ", Some("33.2"));

        assert_eq!(Frame::checksum(b"QQQ33.2"), [0xC0, 0x99]);
        assert_eq!(frame.bytes(), b"QQQ33.2\xC0\x99\r");
        assert_eq!(frame.len(), 10);

        let chunks = frame.chunks();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], b"QQQ33.2\xC0");
        assert_eq!(chunks[1], b"\x99\r");
    }

    #[test]
    fn short_frame_is_a_single_write() {
        let frame = Frame::new("QPIGS", None);

        assert_eq!(Frame::checksum(b"QPIGS"), [0xB7, 0xA9]);
        assert_eq!(frame.bytes(), b"QPIGS\xB7\xA9\r");
        assert_eq!(frame.chunks(), vec![frame.bytes()]);
    }

    #[test]
    fn empty_value_matches_no_value() {
        assert_eq!(Frame::new("QMOD", Some("")), Frame::new("QMOD", None));
    }

    #[test]
    fn status_from_markers() {
        let s = |d: &[u8]| Status::from_response(Some(d));

        assert_eq!(s(b"lalfdasfdasNAKfdsfa"), Status::ProtocolError);
        assert_eq!(s(b"NAK dfdfas"), Status::ProtocolError);
        assert_eq!(s(b"(ACK\r"), Status::Ok);
        assert_eq!(s(b"fdsaf"), Status::Unknown);
        assert_eq!(s(b""), Status::Unknown);
        assert_eq!(Status::from_response(None), Status::Unknown);
    }

    #[test]
    fn ack_wins_over_nak() {
        assert_eq!(Status::from_response(Some(b"NAK ACK")), Status::Ok);
    }

    #[test]
    fn outcome_cacheability() {
        assert!(Outcome::from_response(Some(b"(ACK9 \r".to_vec())).is_cacheable());
        assert!(Outcome::from_response(Some(b"(B\xe7\xc9\r".to_vec())).is_cacheable());
        assert!(!Outcome::from_response(Some(b"(NAKss\r".to_vec())).is_cacheable());
        assert!(!Outcome::from_response(Some(Vec::new())).is_cacheable());
        assert!(!Outcome::from_response(None).is_cacheable());
        assert!(!Outcome::busy().is_cacheable());
    }

    #[test]
    fn only_real_answers_are_usable() {
        assert!(Outcome::from_response(Some(b"(ACK9 \r".to_vec())).is_usable());
        assert!(Outcome::from_response(Some(b"(230.0 50.0\r".to_vec())).is_usable());
        assert!(!Outcome::from_response(Some(b"(NAKss\r".to_vec())).is_usable());
        assert!(!Outcome::from_response(None).is_usable());
        assert!(!Outcome::busy().is_usable());
    }

    #[test]
    fn empty_payload_is_normalised_to_none() {
        let outcome = Outcome::from_response(Some(Vec::new()));
        assert_eq!(outcome.status, Status::Unknown);
        assert_eq!(outcome.data, None);
        assert_eq!(outcome.data(), b"");
    }
}
