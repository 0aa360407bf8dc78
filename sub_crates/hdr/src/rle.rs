//! Run-length coding of a single scanline component, as used by
//! new-style RLE .hdr files.
//!
//! A count byte above 128 introduces a run of `count - 128` copies of the
//! following byte.  Otherwise it introduces `count` literal bytes.

use std::io::{Read, Write};

use crate::error::ReadError;

const MIN_RUN: usize = 4;
const MAX_RUN: usize = 127;
const MAX_LITERAL: usize = 128;

pub(crate) fn write_component<W: Write>(out: &mut W, data: &[u8]) -> std::io::Result<()> {
    let len = data.len();
    let mut cur = 0;

    while cur < len {
        // Find the start of the next run that's long enough to be worth
        // encoding as a run.
        let mut run_start = cur;
        let mut run_len = 0;
        let mut prev_run_len = 0;
        while run_len < MIN_RUN && run_start < len {
            run_start += run_len;
            prev_run_len = run_len;
            run_len = 1;
            while run_start + run_len < len
                && run_len < MAX_RUN
                && data[run_start] == data[run_start + run_len]
            {
                run_len += 1;
            }
        }

        // A short run directly before the long one still gets encoded
        // as a run.
        if prev_run_len > 1 && prev_run_len == run_start - cur {
            out.write_all(&[(128 + prev_run_len) as u8, data[cur]])?;
            cur = run_start;
        }

        // Literals up to the next run.
        while cur < run_start {
            let n = (run_start - cur).min(MAX_LITERAL);
            out.write_all(&[n as u8])?;
            out.write_all(&data[cur..(cur + n)])?;
            cur += n;
        }

        if run_len >= MIN_RUN {
            out.write_all(&[(128 + run_len) as u8, data[run_start]])?;
            cur += run_len;
        }
    }

    Ok(())
}

pub(crate) fn read_component<R: Read>(input: &mut R, data: &mut [u8]) -> Result<(), ReadError> {
    let mut cur = 0;
    let mut byte = [0u8; 1];

    while cur < data.len() {
        input.read_exact(&mut byte)?;
        let count = byte[0] as usize;
        if count > 128 {
            let n = count - 128;
            if cur + n > data.len() {
                return Err(ReadError::BadScanline);
            }
            input.read_exact(&mut byte)?;
            data[cur..(cur + n)].fill(byte[0]);
            cur += n;
        } else {
            if count == 0 || cur + count > data.len() {
                return Err(ReadError::BadScanline);
            }
            input.read_exact(&mut data[cur..(cur + count)])?;
            cur += count;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(data: &[u8]) -> (Vec<u8>, usize) {
        let mut encoded = Vec::new();
        write_component(&mut encoded, data).unwrap();
        let mut decoded = vec![0u8; data.len()];
        read_component(&mut std::io::Cursor::new(&encoded), &mut decoded).unwrap();
        (decoded, encoded.len())
    }

    #[test]
    fn long_run() {
        let data = [7u8; 300];
        let (decoded, size) = round_trip(&data);
        assert_eq!(&decoded[..], &data[..]);
        // 127 + 127 + 46.
        assert_eq!(size, 6);
    }

    #[test]
    fn literals_only() {
        let data: Vec<u8> = (0..=255).collect();
        let (decoded, size) = round_trip(&data);
        assert_eq!(decoded, data);
        assert_eq!(size, 256 + 2);
    }

    #[test]
    fn mixed_runs_and_literals() {
        let mut data = vec![1u8, 2, 2, 3, 3, 3, 9];
        data.extend_from_slice(&[5u8; 20]);
        data.extend_from_slice(&[4, 4, 6, 6, 6, 6, 6, 1]);
        let (decoded, _) = round_trip(&data);
        assert_eq!(decoded, data);
    }

    #[test]
    fn short_run_before_long_run() {
        let mut data = vec![8u8, 8, 8];
        data.extend_from_slice(&[200u8; 10]);
        let mut encoded = Vec::new();
        write_component(&mut encoded, &data).unwrap();
        assert_eq!(encoded, vec![131, 8, 138, 200]);
    }

    #[test]
    fn overlong_run_is_rejected() {
        let encoded = [200u8, 1];
        let mut decoded = vec![0u8; 10];
        let result = read_component(&mut std::io::Cursor::new(&encoded[..]), &mut decoded);
        assert!(matches!(result, Err(ReadError::BadScanline)));
    }
}
