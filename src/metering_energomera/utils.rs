use super::EnergomeraError;
use crate::transport::ByteChannel;
use log::debug;

/// Block check character: additive sum of all bytes, reduced to 7 bits
pub fn calculate_bcc(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    sum & 0x7F
}

pub fn verify_bcc(data: &[u8], expected: u8) -> Result<(), EnergomeraError> {
    let calculated = calculate_bcc(data);
    if calculated != expected {
        return Err(EnergomeraError::ChecksumMismatch { expected, calculated });
    }
    Ok(())
}

/// Appends the BCC over everything after the leading SOH
pub fn build_request(frame: &[u8]) -> Vec<u8> {
    let mut request = frame.to_vec();
    request.push(calculate_bcc(&frame[1..]));
    request
}

pub fn read_exact<C: ByteChannel + ?Sized>(channel: &mut C, size: usize) -> Result<Vec<u8>, EnergomeraError> {
    let data = channel.read(size).map_err(|_| EnergomeraError::ShortRead { expected: size, received: 0 })?;
    if data.len() < size {
        return Err(EnergomeraError::ShortRead { expected: size, received: data.len() });
    }
    Ok(data)
}

/// Reads one byte and hands it to `err` if it is not `expected`
pub fn expect_byte<C, F>(channel: &mut C, expected: u8, err: F) -> Result<(), EnergomeraError>
where
    C: ByteChannel + ?Sized,
    F: FnOnce(u8) -> EnergomeraError,
{
    let byte = read_exact(channel, 1)?[0];
    if byte != expected {
        return Err(err(byte));
    }
    Ok(())
}

/// Reads byte by byte until the buffer ends with `terminator`.
///
/// The terminator is part of the returned buffer. Never reads past it and
/// gives up with `FrameTooLong` once `max_len` bytes arrived without it.
pub fn read_until<C: ByteChannel + ?Sized>(channel: &mut C, terminator: &[u8], max_len: usize) -> Result<Vec<u8>, EnergomeraError> {
    let mut result: Vec<u8> = Vec::new();
    while !result.ends_with(terminator) {
        if result.len() >= max_len {
            debug!("No terminator after {} bytes: {}", result.len(), hex::encode(&result));
            return Err(EnergomeraError::FrameTooLong(max_len));
        }

        let byte = channel.read(1).map_err(|_| EnergomeraError::Timeout)?;
        if byte.is_empty() {
            return Err(EnergomeraError::Timeout);
        }
        result.extend_from_slice(&byte);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::scripted::ScriptedChannel;

    #[test]
    fn test_calculate_bcc() {
        assert_eq!(calculate_bcc(b""), 0);
        // 'P' + '0' + STX + '(' + ')' + ETX
        assert_eq!(calculate_bcc(b"P0\x02()\x03"), (0x50 + 0x30 + 0x02 + 0x28 + 0x29 + 0x03) & 0x7F);
        assert_eq!(calculate_bcc(&[0xFF, 0x01]), 0x00);
        assert_eq!(calculate_bcc(&[0x7F, 0x01]), 0x00);
    }

    #[test]
    fn test_bcc_stays_in_seven_bits() {
        for len in 0..64usize {
            let data: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
            assert!(calculate_bcc(&data) <= 0x7F);
        }
    }

    #[test]
    fn test_verify_bcc_detects_single_bit_flips() {
        let data = b"(230.12)\r\n(229.80)\r\n(231.01)\r\n\x03".to_vec();
        let bcc = calculate_bcc(&data);
        assert!(verify_bcc(&data, bcc).is_ok());

        for bit in 0..7 {
            let result = verify_bcc(&data, bcc ^ (1 << bit));
            assert!(matches!(result, Err(EnergomeraError::ChecksumMismatch { .. })));
        }

        for pos in 0..data.len() {
            for bit in 0..7 {
                let mut tampered = data.clone();
                tampered[pos] ^= 1 << bit;
                assert!(verify_bcc(&tampered, bcc).is_err(), "flip at {pos}:{bit} not detected");
            }
        }
    }

    #[test]
    fn test_build_request_skips_soh() {
        let request = build_request(b"\x01R1\x02FREQU()\x03");
        assert_eq!(request.len(), 13);
        assert_eq!(*request.last().unwrap(), calculate_bcc(b"R1\x02FREQU()\x03"));
    }

    #[test]
    fn test_read_until_stops_at_terminator() {
        let mut channel = ScriptedChannel::new(b"MeterModel\r\nrest");
        let data = read_until(&mut channel, b"\r\n", 64).unwrap();
        assert_eq!(data, b"MeterModel\r\n".to_vec());
        assert_eq!(channel.remaining(), 4);
    }

    #[test]
    fn test_read_until_partial_terminator() {
        let mut channel = ScriptedChannel::new(b"a\rb\r\n");
        let data = read_until(&mut channel, b"\r\n", 64).unwrap();
        assert_eq!(data, b"a\rb\r\n".to_vec());
    }

    #[test]
    fn test_read_until_timeout() {
        let mut channel = ScriptedChannel::new(b"no end");
        let result = read_until(&mut channel, b"\r\n", 64);
        assert!(matches!(result, Err(EnergomeraError::Timeout)));
    }

    #[test]
    fn test_read_until_channel_error() {
        let mut channel = ScriptedChannel::new(b"/XYZMet").failing_read();
        let result = read_until(&mut channel, b"\r\n", 64);
        assert!(matches!(result, Err(EnergomeraError::Timeout)));
    }

    #[test]
    fn test_read_until_frame_too_long() {
        let mut channel = ScriptedChannel::new(&[b'x'; 100]);
        let result = read_until(&mut channel, b")", 16);
        assert!(matches!(result, Err(EnergomeraError::FrameTooLong(16))));
        assert_eq!(channel.remaining(), 84);
    }

    #[test]
    fn test_read_exact() {
        let mut channel = ScriptedChannel::new(b"\x01P0\x02(12");
        assert_eq!(read_exact(&mut channel, 5).unwrap(), b"\x01P0\x02(".to_vec());

        let result = read_exact(&mut channel, 5);
        assert!(matches!(result, Err(EnergomeraError::ShortRead { expected: 5, received: 2 })));
    }

    #[test]
    fn test_read_exact_channel_error() {
        let mut channel = ScriptedChannel::new(b"").failing_read();
        let result = read_exact(&mut channel, 3);
        assert!(matches!(result, Err(EnergomeraError::ShortRead { expected: 3, received: 0 })));
    }

    #[test]
    fn test_expect_byte() {
        let mut channel = ScriptedChannel::new(b"\x06\x15");
        assert!(expect_byte(&mut channel, 0x06, EnergomeraError::AuthorizationRejected).is_ok());

        let result = expect_byte(&mut channel, 0x06, EnergomeraError::AuthorizationRejected);
        assert!(matches!(result, Err(EnergomeraError::AuthorizationRejected(0x15))));
    }
}
