use crate::error::Error;

const SHORT_LEN_MAX: u8 = 0x7D;
const EXT16_SENTINEL: u8 = 0x7E;
const EXT64_SENTINEL: u8 = 0x7F;
const MORE_FRAGMENTS: u8 = 0b1000_0000;
const LOW7_MASK: u8 = 0b0111_1111;

/// Encodes one long-polling envelope header + payload onto `out` (spec.md
/// §3 "Message envelope"). `more_fragments` is carried in the header's
/// high bit; this crate always writes it `false` since it sends one
/// payload per envelope, but a reader may encounter it set, matching
/// the original's ability to split one logical message across envelopes.
pub fn encode(out: &mut Vec<u8>, payload: &[u8], more_fragments: bool) {
    let flag = if more_fragments { MORE_FRAGMENTS } else { 0 };
    let len = payload.len();

    if len <= SHORT_LEN_MAX as usize {
        out.push(flag | len as u8);
    } else if len <= 0xFFFF {
        out.push(flag | EXT16_SENTINEL);
        out.extend_from_slice(format!("{:04x}", len).as_bytes());
    } else {
        out.push(flag | EXT64_SENTINEL);
        out.extend_from_slice(format!("{:016x}", len as u64).as_bytes());
    }
    out.extend_from_slice(payload);
}

/// One decoded envelope: its payload and whether more fragments follow in
/// the same logical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEnvelope {
    pub payload: Vec<u8>,
    pub more_fragments: bool,
}

/// Decodes every envelope present in `buf`, which may concatenate several
/// (a single POST body may carry more than one, per spec.md §4.E).
/// Returns an error if any envelope's header or payload is truncated.
pub fn decode_all(buf: &[u8]) -> Result<Vec<DecodedEnvelope>, Error> {
    let mut envelopes = Vec::new();
    let mut pos = 0usize;

    while pos < buf.len() {
        let header = buf[pos];
        let more_fragments = header & MORE_FRAGMENTS != 0;
        let low7 = header & LOW7_MASK;

        let (len, header_len) = if low7 <= SHORT_LEN_MAX {
            (low7 as usize, 1)
        } else if low7 == EXT16_SENTINEL {
            let hex = buf.get(pos + 1..pos + 5).ok_or(Error::InvalidEnvelopeHeader)?;
            let hex = std::str::from_utf8(hex).map_err(|_| Error::InvalidEnvelopeHeader)?;
            let len = usize::from_str_radix(hex, 16).map_err(|_| Error::InvalidEnvelopeHeader)?;
            (len, 5)
        } else {
            let hex = buf.get(pos + 1..pos + 17).ok_or(Error::InvalidEnvelopeHeader)?;
            let hex = std::str::from_utf8(hex).map_err(|_| Error::InvalidEnvelopeHeader)?;
            let len = usize::from_str_radix(hex, 16).map_err(|_| Error::InvalidEnvelopeHeader)?;
            (len, 17)
        };

        let payload_start = pos + header_len;
        let payload_end = payload_start + len;
        let payload = buf
            .get(payload_start..payload_end)
            .ok_or(Error::InvalidEnvelopeHeader)?
            .to_vec();

        envelopes.push(DecodedEnvelope { payload, more_fragments });
        pos = payload_end;
    }

    Ok(envelopes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(payload: &[u8]) {
        let mut buf = Vec::new();
        encode(&mut buf, payload, false);
        let decoded = decode_all(&buf).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].payload, payload);
        assert!(!decoded[0].more_fragments);
    }

    #[test]
    fn short_header_boundary_cases() {
        round_trip(b"");
        round_trip(&vec![1u8; 125]);
    }

    #[test]
    fn ext16_header_boundary_cases() {
        round_trip(&vec![2u8; 126]);
        round_trip(&vec![3u8; 65535]);
    }

    #[test]
    fn ext64_header_boundary_case() {
        round_trip(&vec![4u8; 65536]);
    }

    #[test]
    fn ext16_uses_ascii_hex_not_binary_be() {
        let mut buf = Vec::new();
        encode(&mut buf, &vec![0u8; 300], false);
        assert_eq!(buf[0], 0x7E);
        assert_eq!(&buf[1..5], b"012c");
    }

    #[test]
    fn multiple_envelopes_concatenate_in_one_buffer() {
        let mut buf = Vec::new();
        encode(&mut buf, b"first", false);
        encode(&mut buf, b"second", false);
        let decoded = decode_all(&buf).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].payload, b"first");
        assert_eq!(decoded[1].payload, b"second");
    }

    #[test]
    fn more_fragments_flag_round_trips() {
        let mut buf = Vec::new();
        encode(&mut buf, b"part", true);
        let decoded = decode_all(&buf).unwrap();
        assert!(decoded[0].more_fragments);
    }

    #[test]
    fn truncated_envelope_is_an_error() {
        let mut buf = Vec::new();
        encode(&mut buf, &vec![9u8; 200], false);
        buf.truncate(buf.len() - 50);
        assert!(decode_all(&buf).is_err());
    }
}
