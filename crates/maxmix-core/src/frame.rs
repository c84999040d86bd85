//! Stream reassembly
//!
//! Serial reads arrive in arbitrary chunks. The accumulator buffers bytes
//! until a delimiter closes a frame and yields the stuffed frame body
//! without its delimiter, ready for [`cobs::decode`](crate::cobs::decode).

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result, DELIMITER, MAX_FRAME_SIZE};

/// Splits a byte stream into frames
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buf: BytesMut,
    /// Set after an overflow until the next delimiter resynchronizes
    discarding: bool,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_FRAME_SIZE),
            discarding: false,
        }
    }

    /// Feed received bytes, returning every frame they complete.
    ///
    /// A run longer than a frame can be is reported once as
    /// [`Error::FrameOverflow`] and dropped up to the next delimiter.
    pub fn push(&mut self, data: &[u8]) -> Vec<Result<Bytes>> {
        let mut frames = Vec::new();

        for &byte in data {
            if byte == DELIMITER {
                if self.discarding {
                    self.discarding = false;
                    self.buf.clear();
                } else if !self.buf.is_empty() {
                    frames.push(Ok(self.buf.split().freeze()));
                }
                continue;
            }

            if self.discarding {
                continue;
            }

            self.buf.put_u8(byte);
            if self.buf.len() >= MAX_FRAME_SIZE {
                frames.push(Err(Error::FrameOverflow(self.buf.len())));
                self.buf.clear();
                self.discarding = true;
            }
        }

        frames
    }

    /// Bytes buffered towards the next frame
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial frame
    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cobs;

    #[test]
    fn test_split_across_reads() {
        let frame = cobs::encode(&[1, 2, 0, 3]).unwrap();
        let mut acc = FrameAccumulator::new();

        let (head, tail) = frame.split_at(2);
        assert!(acc.push(head).is_empty());
        assert_eq!(acc.pending(), 2);

        let frames = acc.push(tail);
        assert_eq!(frames.len(), 1);
        let body = frames[0].as_ref().unwrap();
        assert_eq!(cobs::decode(body).unwrap(), vec![1, 2, 0, 3]);
        assert_eq!(acc.pending(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut stream = cobs::encode(&[9]).unwrap();
        stream.extend(cobs::encode(&[8, 7]).unwrap());
        stream.push(DELIMITER);

        let mut acc = FrameAccumulator::new();
        let frames: Vec<_> = acc.push(&stream).into_iter().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(cobs::decode(&frames[1]).unwrap(), vec![8, 7]);
    }

    #[test]
    fn test_overflow_resyncs_on_delimiter() {
        let mut acc = FrameAccumulator::new();
        let noise = vec![0x42; 300];
        let results = acc.push(&noise);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::FrameOverflow(_))));

        let mut stream = vec![DELIMITER];
        stream.extend(cobs::encode(&[5]).unwrap());
        let frames = acc.push(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(cobs::decode(frames[0].as_ref().unwrap()).unwrap(), vec![5]);
    }
}
