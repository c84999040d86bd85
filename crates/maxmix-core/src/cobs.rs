//! Consistent-overhead byte stuffing
//!
//! Frame layout:
//! ```text
//! ┌──────┬──────────────┬──────┬──────────────┬─────┬──────┐
//! │ code │ code-1 bytes │ code │ code-1 bytes │ ... │ 0x00 │
//! └──────┴──────────────┴──────┴──────────────┴─────┴──────┘
//! ```
//!
//! Each code byte gives the distance to the next zero of the original
//! payload. A code of 0xFF marks a full 254-byte run with no implied zero.
//! The stuffed bytes never contain the delimiter, so a receiver can split
//! the stream on 0x00 alone.

use crate::{Error, Result, DELIMITER, MAX_PAYLOAD_SIZE};

/// Longest run a single code byte can describe
const MAX_RUN: u8 = 0xFF;

/// Encode a payload into a delimiter-terminated frame
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::PayloadTooLarge(payload.len()));
    }

    let mut out = Vec::with_capacity(payload.len() + 2);
    let mut code_index = 0;
    let mut code = 1u8;
    out.push(0);

    for &byte in payload {
        if byte == DELIMITER {
            out[code_index] = code;
            code_index = out.len();
            out.push(0);
            code = 1;
        } else {
            out.push(byte);
            code += 1;
            if code == MAX_RUN {
                out[code_index] = code;
                code_index = out.len();
                out.push(0);
                code = 1;
            }
        }
    }

    out[code_index] = code;
    out.push(DELIMITER);
    Ok(out)
}

/// Decode a frame back into its payload.
///
/// The trailing delimiter is optional so that both raw frames and the
/// slices produced by [`FrameAccumulator`](crate::FrameAccumulator) decode.
pub fn decode(frame: &[u8]) -> Result<Vec<u8>> {
    let data = match frame.split_last() {
        Some((&DELIMITER, rest)) => rest,
        _ => frame,
    };

    if data.is_empty() {
        return Err(Error::EmptyFrame);
    }

    let mut out = Vec::with_capacity(data.len());
    let mut offset = 0;

    while offset < data.len() {
        let code = data[offset];
        if code == 0 {
            return Err(Error::ZeroCode { offset });
        }

        let end = offset + code as usize;
        if end > data.len() {
            return Err(Error::CodeOverrun {
                offset,
                code,
                len: data.len(),
            });
        }

        let run = &data[offset + 1..end];
        if let Some(pos) = run.iter().position(|&b| b == DELIMITER) {
            return Err(Error::UnexpectedDelimiter {
                offset: offset + 1 + pos,
            });
        }
        out.extend_from_slice(run);

        offset = end;
        if code != MAX_RUN && offset < data.len() {
            out.push(DELIMITER);
        }
    }

    Ok(out)
}

/// Worst-case encoded size for a payload, delimiter included
pub fn max_encoded_len(payload_len: usize) -> usize {
    payload_len + payload_len / 254 + 2
}
