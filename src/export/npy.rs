//! NPY v1.0 files holding little-endian f32 arrays in C order

use crate::error::{Result, TrainError};
use std::fs;
use std::path::Path;

const MAGIC: &[u8] = b"\x93NUMPY";
const PREAMBLE_LEN: usize = 10;

fn shape_tuple(shape: &[usize]) -> String {
    match shape {
        [single] => format!("({single},)"),
        dims => {
            let parts: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
            format!("({})", parts.join(", "))
        }
    }
}

/// Serializes an array; the header is space-padded so data starts on a
/// 64-byte boundary.
pub fn encode_npy(shape: &[usize], values: &[f32]) -> Result<Vec<u8>> {
    let expected: usize = shape.iter().product();
    if expected != values.len() {
        return Err(TrainError::precondition(format!(
            "npy shape {shape:?} needs {expected} values, got {}",
            values.len()
        )));
    }

    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': {}, }}",
        shape_tuple(shape)
    );
    let unpadded = PREAMBLE_LEN + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');
    let header_len = u16::try_from(header.len())
        .map_err(|_| TrainError::precondition("npy header too long"))?;

    let mut bytes = Vec::with_capacity(PREAMBLE_LEN + header.len() + values.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&header_len.to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    Ok(bytes)
}

pub fn write_npy(path: &Path, shape: &[usize], values: &[f32]) -> Result<()> {
    let bytes = encode_npy(shape, values)?;
    fs::write(path, bytes).map_err(|e| TrainError::io(path, e))
}

/// Reads back files produced by [`write_npy`].
pub fn read_npy(path: &Path) -> Result<(Vec<usize>, Vec<f32>)> {
    let bytes = fs::read(path).map_err(|e| TrainError::io(path, e))?;
    let bad = |reason: &str| TrainError::precondition(format!("{}: {reason}", path.display()));

    if bytes.len() < PREAMBLE_LEN || &bytes[..6] != MAGIC || bytes[6] != 1 {
        return Err(bad("not an npy v1 file"));
    }
    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let data_start = PREAMBLE_LEN + header_len;
    let header = bytes
        .get(PREAMBLE_LEN..data_start)
        .and_then(|h| std::str::from_utf8(h).ok())
        .ok_or_else(|| bad("truncated header"))?;
    if !header.contains("'descr': '<f4'") || !header.contains("'fortran_order': False") {
        return Err(bad("only little-endian f32 in C order is supported"));
    }

    let shape_text = header
        .split("'shape': (")
        .nth(1)
        .and_then(|rest| rest.split(')').next())
        .ok_or_else(|| bad("missing shape"))?;
    let shape = shape_text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| bad("bad shape entry")))
        .collect::<Result<Vec<_>>>()?;

    let data = &bytes[data_start..];
    let count: usize = shape.iter().product();
    if data.len() != count * 4 {
        return Err(bad("data length does not match shape"));
    }
    let values = data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((shape, values))
}
