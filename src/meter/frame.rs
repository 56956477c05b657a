//! Raw RTU frame helpers: CRC, request building and reply summaries

use serde_json::{json, Value};

pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const READ_INPUT_REGISTERS: u8 = 0x04;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Exception replies set the high bit of the function code
const EXCEPTION_FLAG: u8 = 0x80;

/// CRC-16/MODBUS
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Append the CRC, low byte first
pub fn with_crc(mut frame: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

pub fn crc_valid(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let (body, tail) = frame.split_at(frame.len() - 2);
    crc16(body).to_le_bytes() == [tail[0], tail[1]]
}

/// Build a read request for `count` registers at protocol address `address`
pub fn read_request(slave: u8, function: u8, address: u16, count: u16) -> Vec<u8> {
    let mut frame = vec![slave, function];
    frame.extend_from_slice(&address.to_be_bytes());
    frame.extend_from_slice(&count.to_be_bytes());
    with_crc(frame)
}

/// Summarise a raw reply for API output
pub fn parse_response(command: &[u8], response: &[u8]) -> Value {
    if response.len() < 4 {
        return json!({ "error": "Response too short", "length": response.len() });
    }

    let slave_address = response[0];
    let function_code = response[1] & !EXCEPTION_FLAG;
    let exception = response[1] & EXCEPTION_FLAG != 0;
    let matches_request = command.first() == Some(&slave_address)
        && command.get(1).map(|f| f & !EXCEPTION_FLAG) == Some(function_code);

    let mut summary = json!({
        "slave_address": slave_address,
        "function_code": function_code,
        "exception": exception,
        "crc_valid": crc_valid(response),
        "matches_request": matches_request,
    });

    if exception {
        summary["exception_code"] = json!(response[2]);
        return summary;
    }

    if matches!(function_code, READ_HOLDING_REGISTERS | READ_INPUT_REGISTERS) {
        let byte_count = response[2] as usize;
        summary["byte_count"] = json!(byte_count);
        if let Some(data) = response.get(3..3 + byte_count) {
            let registers: Vec<u16> = data
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            summary["registers"] = json!(registers);
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_known_vector() {
        // 01 03 00 00 00 0A -> CRC C5 CD
        let frame = with_crc(vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(&frame[6..], &[0xC5, 0xCD]);
        assert!(crc_valid(&frame));
    }

    #[test]
    fn test_crc_detects_corruption() {
        let mut frame = read_request(1, READ_HOLDING_REGISTERS, 4000, 2);
        frame[3] ^= 0xFF;
        assert!(!crc_valid(&frame));
    }

    #[test]
    fn test_parse_register_reply() {
        let command = read_request(1, READ_HOLDING_REGISTERS, 0, 2);
        let response = with_crc(vec![0x01, 0x03, 0x04, 0x00, 0x0A, 0x01, 0x02]);
        let parsed = parse_response(&command, &response);

        assert_eq!(parsed["slave_address"], 1);
        assert_eq!(parsed["function_code"], 3);
        assert_eq!(parsed["exception"], false);
        assert_eq!(parsed["byte_count"], 4);
        assert_eq!(parsed["registers"], json!([10, 258]));
        assert_eq!(parsed["crc_valid"], true);
        assert_eq!(parsed["matches_request"], true);
    }

    #[test]
    fn test_parse_exception_reply() {
        let command = read_request(1, 0x2B, 0, 1);
        let response = with_crc(vec![0x01, 0xAB, 0x01]);
        let parsed = parse_response(&command, &response);

        assert_eq!(parsed["exception"], true);
        assert_eq!(parsed["function_code"], 0x2B);
        assert_eq!(parsed["exception_code"], 1);
    }

    #[test]
    fn test_parse_short_reply() {
        let parsed = parse_response(&[1, 3], &[1, 3]);
        assert_eq!(parsed["error"], "Response too short");
    }
}
