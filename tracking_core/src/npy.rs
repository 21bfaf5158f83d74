//! Minimal NumPy `.npy` codec.
//!
//! Reads C-ordered little-endian numeric arrays into `f64` and writes `<f8`
//! arrays. That covers what the reader and writer commands exchange.

use std::path::Path;
use thiserror::Error;
use tokio::fs;

const MAGIC: &[u8] = b"\x93NUMPY";
const ALIGNMENT: usize = 64;

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not an .npy file")]
    BadMagic,

    #[error("Unsupported .npy version {0}.{1}")]
    UnsupportedVersion(u8, u8),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Fortran ordered arrays are not supported")]
    FortranOrder,

    #[error("Unsupported dtype {0}")]
    UnsupportedDtype(String),

    #[error("Expected {expected} bytes of data, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Shape {shape:?} holds {expected} elements, data has {actual}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

/// Number of elements a shape describes, `None` when it overflows `usize`
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
}

fn overflow(shape: &[usize]) -> NpyError {
    NpyError::InvalidHeader(format!("shape {:?} is too large", shape))
}

/// Array data in C order
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl NpyArray {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, NpyError> {
        let expected = element_count(&shape).ok_or_else(|| overflow(&shape))?;
        if expected != data.len() {
            return Err(NpyError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Float,
    Signed,
    Unsigned,
    Bool,
}

#[derive(Debug, Clone, Copy)]
struct Dtype {
    kind: Kind,
    size: usize,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self, NpyError> {
        let unsupported = || NpyError::UnsupportedDtype(descr.to_string());
        let mut chars = descr.chars();
        let order = chars.next().ok_or_else(unsupported)?;
        let kind = match chars.next().ok_or_else(unsupported)? {
            'f' => Kind::Float,
            'i' => Kind::Signed,
            'u' => Kind::Unsigned,
            'b' => Kind::Bool,
            _ => return Err(unsupported()),
        };
        let size: usize = chars.as_str().parse().map_err(|_| unsupported())?;

        let supported = match kind {
            Kind::Float => matches!(size, 4 | 8),
            Kind::Signed | Kind::Unsigned => matches!(size, 1 | 2 | 4 | 8),
            Kind::Bool => size == 1,
        };
        let little = match order {
            '<' | '=' => true,
            '|' => size == 1,
            _ => false,
        };
        if !supported || !little {
            return Err(unsupported());
        }
        Ok(Self { kind, size })
    }

    fn read(&self, bytes: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        buf[..self.size].copy_from_slice(bytes);
        match (self.kind, self.size) {
            (Kind::Float, 4) => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            (Kind::Float, _) => f64::from_le_bytes(buf),
            (Kind::Signed, 1) => buf[0] as i8 as f64,
            (Kind::Signed, 2) => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            (Kind::Signed, 4) => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            (Kind::Signed, _) => i64::from_le_bytes(buf) as f64,
            (Kind::Unsigned, _) | (Kind::Bool, _) => u64::from_le_bytes(buf) as f64,
        }
    }
}

/// Decode an `.npy` byte buffer
pub fn decode(bytes: &[u8]) -> Result<NpyArray, NpyError> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(NpyError::BadMagic);
    }

    let (header_len, header_start) = match (bytes[6], bytes[7]) {
        (1, _) => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        (2 | 3, _) => {
            if bytes.len() < 12 {
                return Err(NpyError::BadMagic);
            }
            (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            )
        }
        (major, minor) => return Err(NpyError::UnsupportedVersion(major, minor)),
    };

    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .ok_or_else(|| NpyError::InvalidHeader("header runs past end of file".to_string()))?;
    let header = std::str::from_utf8(header)
        .map_err(|e| NpyError::InvalidHeader(e.to_string()))?;

    let descr = quoted_value(header, "descr")
        .ok_or_else(|| NpyError::InvalidHeader("missing descr".to_string()))?;
    let dtype = Dtype::parse(descr)?;

    let fortran = header_value(header, "fortran_order")
        .ok_or_else(|| NpyError::InvalidHeader("missing fortran_order".to_string()))?;
    if fortran.starts_with("True") {
        return Err(NpyError::FortranOrder);
    }

    let shape = parse_shape(header)?;
    let expected = element_count(&shape)
        .and_then(|count| count.checked_mul(dtype.size))
        .ok_or_else(|| overflow(&shape))?;
    let body = &bytes[data_start..];
    if body.len() < expected {
        return Err(NpyError::Truncated {
            expected,
            actual: body.len(),
        });
    }

    let data = body[..expected]
        .chunks_exact(dtype.size)
        .map(|chunk| dtype.read(chunk))
        .collect();

    Ok(NpyArray { shape, data })
}

/// Encode an array as a version 1.0 `<f8` `.npy` buffer
pub fn encode(array: &NpyArray) -> Result<Vec<u8>, NpyError> {
    let expected = element_count(&array.shape).ok_or_else(|| overflow(&array.shape))?;
    if expected != array.data.len() {
        return Err(NpyError::ShapeMismatch {
            shape: array.shape.clone(),
            expected,
            actual: array.data.len(),
        });
    }

    let shape = match array.shape.as_slice() {
        [single] => format!("({},)", single),
        dims => format!(
            "({})",
            dims.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': {}, }}",
        shape
    );
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let header_len = u16::try_from(header.len())
        .map_err(|_| NpyError::InvalidHeader("header too long for version 1.0".to_string()))?;

    let mut bytes = Vec::with_capacity(unpadded + padding + array.data.len() * 8);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&header_len.to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for value in &array.data {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    Ok(bytes)
}

pub async fn read<P: AsRef<Path>>(path: P) -> Result<NpyArray, NpyError> {
    let bytes = fs::read(path).await?;
    decode(&bytes)
}

pub async fn write<P: AsRef<Path>>(path: P, array: &NpyArray) -> Result<(), NpyError> {
    let bytes = encode(array)?;
    fs::write(path, bytes).await?;
    Ok(())
}

/// Text following `'key':` in the header dict
fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let quoted = [format!("'{}'", key), format!("\"{}\"", key)];
    let start = quoted
        .iter()
        .find_map(|k| header.find(k.as_str()).map(|i| i + k.len()))?;
    let rest = header[start..].trim_start();
    Some(rest.strip_prefix(':')?.trim_start())
}

fn quoted_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let rest = header_value(header, key)?;
    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let inner = &rest[1..];
    inner.find(quote).map(|end| &inner[..end])
}

fn parse_shape(header: &str) -> Result<Vec<usize>, NpyError> {
    let rest = header_value(header, "shape")
        .ok_or_else(|| NpyError::InvalidHeader("missing shape".to_string()))?;
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.find(')').map(|end| &r[..end]))
        .ok_or_else(|| NpyError::InvalidHeader(format!("bad shape: {}", rest)))?;

    inner
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| NpyError::InvalidHeader(format!("bad dimension: {}", dim)))
        })
        .collect()
}
