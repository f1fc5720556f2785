/*!
 * Payload codec.
 *
 * Turns a command (named or raw) into the exact byte sequence to
 * transmit: hex payloads are decoded from whitespace-insensitive hex
 * pairs, text payloads are UTF-8 encoded, and the configured line
 * ending is appended in both cases.
 */
use bytes::{BufMut, Bytes, BytesMut};

use crate::descriptor::{Command, CommandFormat};
use crate::error::{DeviceError, Result};

/// Encode a command into its wire bytes
pub fn encode_command(command: &Command) -> Result<Bytes> {
    let body = match command.format {
        CommandFormat::Hex => decode_hex(&command.payload)?,
        CommandFormat::Text => command.payload.as_bytes().to_vec(),
    };

    let ending = command.line_ending.as_bytes();
    let mut buf = BytesMut::with_capacity(body.len() + ending.len());
    buf.put_slice(&body);
    buf.put_slice(ending);
    Ok(buf.freeze())
}

/// Decode a whitespace-insensitive hex pair string into bytes
pub fn decode_hex(payload: &str) -> Result<Vec<u8>> {
    let mut digits = String::with_capacity(payload.len());
    for c in payload.chars() {
        if c.is_whitespace() {
            continue;
        }
        if !c.is_ascii_hexdigit() {
            return Err(DeviceError::Protocol(format!(
                "Invalid character {:?} in hex payload {:?}",
                c, payload
            )));
        }
        digits.push(c);
    }

    if digits.len() % 2 != 0 {
        return Err(DeviceError::Protocol(format!(
            "Hex payload has odd length: {:?}",
            payload
        )));
    }

    // All-ASCII from the check above, so pair slicing is safe
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| {
                DeviceError::Protocol(format!("Invalid hex pair {:?} in payload", &digits[i..i + 2]))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::LineEnding;

    #[test]
    fn test_hex_payload() {
        let command = Command::raw("A5 01 FF", CommandFormat::Hex, LineEnding::None);
        let bytes = encode_command(&command).unwrap();
        assert_eq!(&bytes[..], &[0xA5, 0x01, 0xFF]);
    }

    #[test]
    fn test_hex_payload_with_line_ending() {
        let command = Command::raw("A5 01 FF", CommandFormat::Hex, LineEnding::CrLf);
        let bytes = encode_command(&command).unwrap();
        assert_eq!(&bytes[..], &[0xA5, 0x01, 0xFF, b'\r', b'\n']);
    }

    #[test]
    fn test_hex_ignores_all_whitespace() {
        assert_eq!(decode_hex(" a5\t01\nff ").unwrap(), vec![0xA5, 0x01, 0xFF]);
    }

    #[test]
    fn test_bad_hex_is_protocol_error() {
        assert!(matches!(decode_hex("A5 0"), Err(DeviceError::Protocol(_))));
        assert!(matches!(decode_hex("ZZ"), Err(DeviceError::Protocol(_))));
    }

    #[test]
    fn test_non_ascii_hex_is_protocol_error() {
        // Multi-byte characters must fail cleanly, not split mid-char
        assert!(matches!(decode_hex("\u{20AC}5"), Err(DeviceError::Protocol(_))));
        assert!(matches!(decode_hex("A5 \u{00E9}F"), Err(DeviceError::Protocol(_))));
    }

    #[test]
    fn test_signed_digit_pairs_rejected() {
        assert!(matches!(decode_hex("+5+5"), Err(DeviceError::Protocol(_))));
    }

    #[test]
    fn test_all_line_endings() {
        let cases = [
            (LineEnding::None, &b""[..]),
            (LineEnding::Cr, &b"\r"[..]),
            (LineEnding::Lf, &b"\n"[..]),
            (LineEnding::CrLf, &b"\r\n"[..]),
            (LineEnding::Exclamation, &b"!"[..]),
        ];
        for (ending, suffix) in cases {
            let command = Command::raw("s power 1", CommandFormat::Text, ending);
            let bytes = encode_command(&command).unwrap();
            assert!(bytes.ends_with(suffix));
            assert_eq!(&bytes[..bytes.len() - suffix.len()], b"s power 1");
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let command = Command::raw("PW?", CommandFormat::Text, LineEnding::Cr);
        let first = encode_command(&command).unwrap();
        let second = encode_command(&command).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_named_and_raw_commands_encode_identically() {
        let named = Command::new("power", "Power", "PWON").with_line_ending(LineEnding::Cr);
        let raw = Command::raw("PWON", CommandFormat::Text, LineEnding::Cr);
        assert_eq!(
            encode_command(&named).unwrap(),
            encode_command(&raw).unwrap()
        );
    }
}
