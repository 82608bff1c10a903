//! Wire format of the serial link. No framing beyond fixed-length fields;
//! multi-byte values travel in native byte order.
use crate::mlp::network::Precision;
use crate::mlp::INPUT_LEN;

pub const MSG_READY: &[u8] = b"Ready\n";
pub const MSG_ERROR: &[u8] = b"Error\n";
pub const MSG_WAITING: &[u8] = b"Waiting for input\n";

pub const OP_NOOP: u8 = 0;
pub const OP_INFER_FLOAT: u8 = 0b0001;
pub const OP_INFER_FLOAT_ACCEL: u8 = 0b0011;
pub const OP_INFER_INT8: u8 = 0b0101;
pub const OP_INFER_INT16_ACCEL: u8 = 0b1001;

/// Size of the input block that follows an accepted opcode.
pub const INPUT_BYTES: usize = INPUT_LEN * std::mem::size_of::<f32>();
/// Size of one inference response: class index then elapsed cycles.
pub const RESPONSE_BYTES: usize = 2 * std::mem::size_of::<i32>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Noop,
    Infer(Precision),
}

impl Command {
    /// Bit 0 marks "begin inference"; the remaining bits pick the precision.
    /// Unknown precision bits fall back to float.
    pub fn decode(byte: u8) -> Self {
        if byte & 1 == 0 {
            return Command::Noop;
        }
        Command::Infer(match byte {
            OP_INFER_FLOAT_ACCEL => Precision::Float32Accel,
            OP_INFER_INT8 => Precision::Int8,
            OP_INFER_INT16_ACCEL => Precision::Int16Accel,
            _ => Precision::Float32,
        })
    }

    pub fn opcode(self) -> u8 {
        match self {
            Command::Noop => OP_NOOP,
            Command::Infer(p) => p.opcode(),
        }
    }
}

impl Precision {
    pub fn opcode(self) -> u8 {
        match self {
            Precision::Float32 => OP_INFER_FLOAT,
            Precision::Float32Accel => OP_INFER_FLOAT_ACCEL,
            Precision::Int8 => OP_INFER_INT8,
            Precision::Int16Accel => OP_INFER_INT16_ACCEL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub class: i32,
    pub cycles: i32,
}

impl Response {
    pub fn encode(&self) -> [u8; RESPONSE_BYTES] {
        let mut out = [0u8; RESPONSE_BYTES];
        out[..4].copy_from_slice(&self.class.to_ne_bytes());
        out[4..].copy_from_slice(&self.cycles.to_ne_bytes());
        out
    }

    pub fn decode(bytes: &[u8; RESPONSE_BYTES]) -> Self {
        let class = i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let cycles = i32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Self { class, cycles }
    }
}

/// Reinterprets the whole input block as native-endian floats.
pub fn decode_input(bytes: &[u8; INPUT_BYTES], out: &mut [f32; INPUT_LEN]) {
    for (o, b) in out.iter_mut().zip(bytes.chunks_exact(4)) {
        *o = f32::from_ne_bytes([b[0], b[1], b[2], b[3]]);
    }
}

pub fn encode_input(features: &[f32]) -> Vec<u8> {
    features.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_bytes_are_noops() {
        for b in [0u8, 2, 4, 0x10, 0xfe] {
            assert_eq!(Command::decode(b), Command::Noop);
        }
    }

    #[test]
    fn opcodes_map_to_precisions() {
        for p in Precision::ALL {
            assert_eq!(Command::decode(p.opcode()), Command::Infer(p));
        }
        assert_eq!(Command::decode(0b0111), Command::Infer(Precision::Float32));
        assert_eq!(Command::decode(0xff), Command::Infer(Precision::Float32));
        assert_eq!(Command::Noop.opcode(), OP_NOOP);
        assert_eq!(Command::Infer(Precision::Int8).opcode(), OP_INFER_INT8);
    }

    #[test]
    fn input_block_decodes_in_native_order() {
        let mut feats = [0f32; INPUT_LEN];
        feats[0] = 1.5;
        feats[INPUT_LEN - 1] = -2.25;
        let bytes = encode_input(&feats);
        let block: [u8; INPUT_BYTES] = bytes.as_slice().try_into().unwrap();
        let mut out = [9f32; INPUT_LEN];
        decode_input(&block, &mut out);
        assert_eq!(out, feats);
    }
}
