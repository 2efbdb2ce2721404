//! Device-side constant header generation
//!
//! Key material is first turned into a flat list of [`HeaderConstant`]s,
//! then rendered. Names and widths the bootloader compiles against live in
//! [`device_constants`].

use crate::bundle::SIGNATURE_SIZE;
use crate::frame::FRAME_SIZE;
use crate::keys::KeyMaterial;
use std::fmt::Write as _;

const HEADER_TEMPLATE: &str = "\
// Generated by fw-keygen. Do not edit or commit.
#ifndef {guard}
#define {guard}

#include <stdint.h>

{constants}
#endif // {guard}
";

const BYTES_PER_LINE: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstantValue {
    Integer(u64),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderConstant {
    pub name: &'static str,
    pub value: ConstantValue,
}

impl HeaderConstant {
    fn integer(name: &'static str, value: usize) -> Self {
        Self {
            name,
            value: ConstantValue::Integer(value as u64),
        }
    }

    fn bytes(name: &'static str, bytes: &[u8]) -> Self {
        Self {
            name,
            value: ConstantValue::Bytes(bytes.to_vec()),
        }
    }
}

/// The constants the bootloader is compiled against
pub fn device_constants(keys: &KeyMaterial) -> Vec<HeaderConstant> {
    let public_point = keys.verifying_key().to_encoded_point(false);
    let aes = keys.aes_key().as_slice();
    let iv = keys.iv().as_slice();

    vec![
        HeaderConstant::bytes("AES_KEY", aes),
        HeaderConstant::integer("AES_KEY_LENGTH", aes.len()),
        HeaderConstant::bytes("IV_KEY", iv),
        HeaderConstant::integer("IV_LENGTH", iv.len()),
        HeaderConstant::bytes("EC_PUBLIC_Q", public_point.as_bytes()),
        HeaderConstant::integer("EC_PUBLIC_Q_LENGTH", public_point.len()),
        HeaderConstant::integer("SIGNATURE_SIZE", SIGNATURE_SIZE),
        HeaderConstant::integer("FRAME_SIZE", FRAME_SIZE),
    ]
}

/// Render constants into a C header with the given include guard
pub fn render_header(guard: &str, constants: &[HeaderConstant]) -> String {
    let mut body = String::new();
    for constant in constants {
        render_constant(&mut body, constant);
    }
    HEADER_TEMPLATE
        .replace("{guard}", guard)
        .replace("{constants}", &body)
}

fn render_constant(out: &mut String, constant: &HeaderConstant) {
    match &constant.value {
        ConstantValue::Integer(value) => {
            let _ = writeln!(out, "#define {} {}", constant.name, value);
        }
        ConstantValue::Bytes(bytes) => {
            let _ = writeln!(out, "static const uint8_t {}[{}] = {{", constant.name, bytes.len());
            for line in bytes.chunks(BYTES_PER_LINE) {
                let hex: Vec<String> = line.iter().map(|b| format!("0x{:02x}", b)).collect();
                let _ = writeln!(out, "    {},", hex.join(", "));
            }
            let _ = writeln!(out, "}};");
        }
    }
    out.push('\n');
}
