use super::structs::{PollResult, Reading, RegisterSpec};
use super::utils::{build_request, expect_byte, read_exact, read_until, verify_bcc};
use super::EnergomeraError;
use crate::transport::ByteChannel;
use log::{debug, info};

const SOH: u8 = 0x01;
const STX: u8 = 0x02;
const ETX: u8 = 0x03;
const ACK: u8 = 0x06;
const CRLF: &[u8] = b"\r\n";

const IDENTIFY_REQUEST: &[u8] = b"/?!\r\n";
/// ACK, protocol mode 0, baud rate char 0, programming mode 1
const PROGRAMMING_MODE_REQUEST: &[u8] = b"\x06001\r\n";
const PROGRAMMING_MODE_PREFIX: &[u8] = b"\x01P0\x02(";

/// One programming mode session over an already opened channel.
///
/// The phases must run in order, `run` does exactly that and stops at the
/// first error.
pub struct MeterSession<'a, C: ByteChannel + ?Sized> {
    channel: &'a mut C,
    max_frame_len: usize,
}

impl<'a, C: ByteChannel + ?Sized> MeterSession<'a, C> {
    pub fn new(channel: &'a mut C, max_frame_len: usize) -> Self {
        MeterSession { channel, max_frame_len }
    }

    pub fn run(&mut self, password: &str, catalog: &[RegisterSpec]) -> Result<PollResult, EnergomeraError> {
        let identity = self.identify()?;
        info!("Connected to {identity}");

        let serial_number = self.enter_programming_mode()?;
        info!("Serial number is {serial_number}");

        self.authorize(password)?;
        info!("Authorized");

        let mut readings = Vec::new();
        for spec in catalog {
            readings.extend(self.read_register(spec)?);
        }

        Ok(PollResult { identity, serial_number, readings })
    }

    fn send(&mut self, data: &[u8]) -> Result<(), EnergomeraError> {
        self.channel.write(data).map_err(EnergomeraError::ChannelWrite)
    }

    /// Reads up to and including `terminator`, optionally followed by a fixed
    /// `suffix` byte, then checks the trailing BCC over `span_prefix` + data + suffix.
    fn read_frame(&mut self, span_prefix: &[u8], terminator: &[u8], suffix: Option<u8>) -> Result<Vec<u8>, EnergomeraError> {
        let data = read_until(&mut *self.channel, terminator, self.max_frame_len)?;

        let mut span = span_prefix.to_vec();
        span.extend_from_slice(&data);
        if let Some(suffix) = suffix {
            expect_byte(&mut *self.channel, suffix, EnergomeraError::UnexpectedSuffix)?;
            span.push(suffix);
        }

        let bcc = read_exact(&mut *self.channel, 1)?[0];
        verify_bcc(&span, bcc)?;
        Ok(data)
    }

    /// Sign on, returns the identification the meter reports
    pub fn identify(&mut self) -> Result<String, EnergomeraError> {
        self.send(IDENTIFY_REQUEST)?;
        expect_byte(&mut *self.channel, b'/', EnergomeraError::UnexpectedStartByte)?;

        // manufacturer code, not checked
        let _ = read_exact(&mut *self.channel, 3)?;

        let line = read_until(&mut *self.channel, CRLF, self.max_frame_len)?;
        Ok(String::from_utf8_lossy(&line[..line.len() - CRLF.len()]).to_string())
    }

    /// Switches to programming mode, returns the serial number of the meter
    pub fn enter_programming_mode(&mut self) -> Result<String, EnergomeraError> {
        self.send(PROGRAMMING_MODE_REQUEST)?;

        let prefix = read_exact(&mut *self.channel, PROGRAMMING_MODE_PREFIX.len())?;
        if prefix != PROGRAMMING_MODE_PREFIX {
            return Err(EnergomeraError::UnexpectedPrefix(prefix));
        }

        // The ')' is part of the checked span, SOH is not
        let serial = self.read_frame(&PROGRAMMING_MODE_PREFIX[1..], b")", Some(ETX))?;
        Ok(String::from_utf8_lossy(&serial[..serial.len() - 1]).to_string())
    }

    pub fn authorize(&mut self, password: &str) -> Result<(), EnergomeraError> {
        let mut frame = vec![SOH];
        frame.extend_from_slice(b"P1\x02(");
        frame.extend_from_slice(password.as_bytes());
        frame.extend_from_slice(&[b')', ETX]);

        self.send(&build_request(&frame))?;
        expect_byte(&mut *self.channel, ACK, EnergomeraError::AuthorizationRejected)
    }

    pub fn read_register(&mut self, spec: &RegisterSpec) -> Result<Vec<Reading>, EnergomeraError> {
        debug!("Reading {}", spec.function_code);

        let mut frame = vec![SOH];
        frame.extend_from_slice(b"R1\x02");
        frame.extend_from_slice(spec.function_code.as_bytes());
        frame.extend_from_slice(&[b'(', b')', ETX]);

        self.send(&build_request(&frame))?;
        expect_byte(&mut *self.channel, STX, EnergomeraError::MissingHeader)?;

        let body = self.read_frame(&[], &[ETX], None)?;
        parse_register_body(spec, &body[..body.len() - 1])
    }
}

/// Splits a register reply (without STX/ETX) into one reading per sub name.
///
/// Values are matched to sub names by position only.
pub fn parse_register_body(spec: &RegisterSpec, body: &[u8]) -> Result<Vec<Reading>, EnergomeraError> {
    let malformed = |reason: String| EnergomeraError::MalformedValue {
        register: spec.function_code.to_string(),
        reason,
    };

    let text = std::str::from_utf8(body).map_err(|_| malformed(format!("not ASCII: {}", hex::encode(body))))?;

    let mut lines: Vec<&str> = text.split("\r\n").collect();
    // Each line ends with CRLF, so the last segment is the empty rest
    lines.pop();

    if lines.len() < spec.sub_names.len() {
        return Err(malformed(format!("expected {} values, got {}", spec.sub_names.len(), lines.len())));
    }

    let mut readings = Vec::with_capacity(spec.sub_names.len());
    for (line, sub_name) in lines.iter().zip(spec.sub_names.iter()) {
        let value = extract_value(line).ok_or_else(|| malformed(format!("no value in line {line:?}")))?;
        readings.push(Reading {
            register_name: spec.name.to_string(),
            sub_name: sub_name.to_string(),
            raw_value: value.to_string(),
        });
    }
    Ok(readings)
}

/// Text between the first '(' and the next ')'
fn extract_value(line: &str) -> Option<&str> {
    let start = line.find('(')? + 1;
    let len = line[start..].find(')')?;
    Some(&line[start..start + len])
}
