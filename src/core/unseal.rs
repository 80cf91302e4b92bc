// Turns a sealed page (compressed, possibly split/delta/zigzag/bit packed) into plain
// little-endian elements of `ColumnType::element_size` bytes each.
use crate::core::column_type::{ColumnType, Packing};
use crate::core::compression;
use crate::core::error::{Error, ErrorKind};

pub fn unseal(sealed: &[u8], n_elements: u32, column_type: ColumnType) -> Result<Vec<u8>, Error> {
    let n = n_elements as usize;
    let packed_size = column_type.packed_size(n_elements as u64).ok_or_else(|| {
        Error::new(ErrorKind::Corrupt).with_message("page element count overflows")
    })?;
    let packed = compression::decompress(sealed, packed_size)?;
    let width = column_type.element_size();
    let out = match column_type.packing() {
        Packing::Plain => packed,
        Packing::Split => unsplit(&packed, n, width),
        Packing::SplitDelta => {
            let mut out = unsplit(&packed, n, width);
            undo_delta(&mut out, width)?;
            out
        }
        Packing::SplitZigzag => {
            let mut out = unsplit(&packed, n, width);
            undo_zigzag(&mut out, width)?;
            out
        }
        Packing::Bits => unpack_bits(&packed, n),
    };
    if out.len() != n * width {
        return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
            "unsealed {} bytes for {n} elements of {column_type}",
            out.len()
        )));
    }
    Ok(out)
}

/// Byte plane `b` holds byte `b` of every element.
fn unsplit(packed: &[u8], n: usize, width: usize) -> Vec<u8> {
    let mut out = vec![0u8; packed.len()];
    for b in 0..width {
        for i in 0..n {
            out[i * width + b] = packed[b * n + i];
        }
    }
    out
}

fn undo_delta(buf: &mut [u8], width: usize) -> Result<(), Error> {
    match width {
        4 => {
            let mut acc = 0u32;
            for chunk in buf.chunks_exact_mut(4) {
                acc = acc.wrapping_add(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
                chunk.copy_from_slice(&acc.to_le_bytes());
            }
        }
        8 => {
            let mut acc = 0u64;
            for chunk in buf.chunks_exact_mut(8) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                acc = acc.wrapping_add(u64::from_le_bytes(raw));
                chunk.copy_from_slice(&acc.to_le_bytes());
            }
        }
        _ => return Err(unsupported_width("delta", width)),
    }
    Ok(())
}

fn undo_zigzag(buf: &mut [u8], width: usize) -> Result<(), Error> {
    match width {
        2 => {
            for chunk in buf.chunks_exact_mut(2) {
                let v = u16::from_le_bytes([chunk[0], chunk[1]]);
                let decoded = ((v >> 1) as i16) ^ -((v & 1) as i16);
                chunk.copy_from_slice(&decoded.to_le_bytes());
            }
        }
        4 => {
            for chunk in buf.chunks_exact_mut(4) {
                let v = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let decoded = ((v >> 1) as i32) ^ -((v & 1) as i32);
                chunk.copy_from_slice(&decoded.to_le_bytes());
            }
        }
        8 => {
            for chunk in buf.chunks_exact_mut(8) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                let v = u64::from_le_bytes(raw);
                let decoded = ((v >> 1) as i64) ^ -((v & 1) as i64);
                chunk.copy_from_slice(&decoded.to_le_bytes());
            }
        }
        _ => return Err(unsupported_width("zigzag", width)),
    }
    Ok(())
}

fn unpack_bits(packed: &[u8], n: usize) -> Vec<u8> {
    (0..n).map(|i| (packed[i / 8] >> (i % 8)) & 1).collect()
}

fn unsupported_width(what: &str, width: usize) -> Error {
    Error::new(ErrorKind::Internal).with_message(format!("{what} decoding of {width}-byte elements"))
}

#[cfg(test)]
mod tests {
    use super::unseal;
    use crate::core::column_type::ColumnType;
    use crate::core::compression::compress;
    use crate::core::error::ErrorKind;

    fn split(plain: &[u8], width: usize) -> Vec<u8> {
        let n = plain.len() / width;
        let mut out = vec![0u8; plain.len()];
        for i in 0..n {
            for b in 0..width {
                out[b * n + i] = plain[i * width + b];
            }
        }
        out
    }

    #[test]
    fn plain_pages_pass_through() {
        let raw = [1u8, 0, 0, 0, 2, 0, 0, 0];
        assert_eq!(unseal(&raw, 2, ColumnType::UInt32).expect("unseal"), raw);
    }

    #[test]
    fn split_reals_are_transposed_back() {
        let values = [1.5f32, -2.25, 1e6];
        let plain: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let sealed = split(&plain, 4);
        assert_ne!(sealed, plain);
        assert_eq!(unseal(&sealed, 3, ColumnType::SplitReal32).expect("unseal"), plain);
    }

    #[test]
    fn split_index_is_prefix_summed() {
        let deltas: Vec<u8> = [3u64, 2, 0, 5].iter().flat_map(|v| v.to_le_bytes()).collect();
        let out = unseal(&split(&deltas, 8), 4, ColumnType::SplitIndex64).expect("unseal");
        let offsets: Vec<u64> = out
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(offsets, vec![3, 5, 5, 10]);
    }

    #[test]
    fn split_ints_are_zigzag_decoded() {
        let zigzag: Vec<u8> = [0u16, 1, 2, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
        let out = unseal(&split(&zigzag, 2), 4, ColumnType::SplitInt16).expect("unseal");
        let values: Vec<i16> = out
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(values, vec![0, -1, 1, -2]);
    }

    #[test]
    fn wide_split_ints_are_zigzag_decoded() {
        let zigzag: Vec<u8> = [4u32, 5].iter().flat_map(|v| v.to_le_bytes()).collect();
        let out = unseal(&split(&zigzag, 4), 2, ColumnType::SplitInt32).expect("unseal");
        let values: Vec<i32> = out
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![2, -3]);

        let zigzag: Vec<u8> = [0u64, 1, 2, 3, u64::MAX - 1, u64::MAX]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let out = unseal(&split(&zigzag, 8), 6, ColumnType::SplitInt64).expect("unseal");
        let values: Vec<i64> = out
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![0, -1, 1, -2, i64::MAX, i64::MIN]);
    }

    #[test]
    fn split_index32_prefix_sum_wraps() {
        let deltas: Vec<u8> = [1u32, 1, 1, u32::MAX].iter().flat_map(|v| v.to_le_bytes()).collect();
        let out = unseal(&split(&deltas, 4), 4, ColumnType::SplitIndex32).expect("unseal");
        let offsets: Vec<u32> = out
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(offsets, vec![1, 2, 3, 2]);
    }

    #[test]
    fn split_uints_are_only_transposed() {
        let cases: [(ColumnType, Vec<u8>); 3] = [
            (
                ColumnType::SplitUInt16,
                [0x0102u16, 0xfffe, 7].iter().flat_map(|v| v.to_le_bytes()).collect(),
            ),
            (
                ColumnType::SplitUInt32,
                [0x0102_0304u32, u32::MAX, 7].iter().flat_map(|v| v.to_le_bytes()).collect(),
            ),
            (
                ColumnType::SplitUInt64,
                [0x0102_0304_0506_0708u64, u64::MAX, 7]
                    .iter()
                    .flat_map(|v| v.to_le_bytes())
                    .collect(),
            ),
        ];
        for (ty, plain) in cases {
            let sealed = split(&plain, ty.element_size());
            assert_eq!(unseal(&sealed, 3, ty).expect("unseal"), plain, "{ty}");
        }
    }

    #[test]
    fn empty_pages_unseal_to_nothing() {
        for ty in [
            ColumnType::SplitReal64,
            ColumnType::SplitIndex32,
            ColumnType::SplitInt64,
            ColumnType::Bit,
            ColumnType::UInt8,
        ] {
            assert!(unseal(&[], 0, ty).expect("unseal").is_empty(), "{ty}");
        }
    }

    #[test]
    fn bits_expand_to_one_byte_each() {
        let out = unseal(&[0b0000_0101, 0b1], 9, ColumnType::Bit).expect("unseal");
        assert_eq!(out, vec![1, 0, 1, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn compressed_pages_are_inflated_first() {
        let plain: Vec<u8> = (0..512u32).flat_map(|v| (v % 3).to_le_bytes()).collect();
        let sealed = compress(&plain, 505).expect("compress");
        assert!(sealed.len() < plain.len());
        assert_eq!(unseal(&sealed, 512, ColumnType::UInt32).expect("unseal"), plain);
    }

    #[test]
    fn short_page_is_corrupt() {
        let err = unseal(&[1, 2, 3], 2, ColumnType::UInt32).expect_err("short");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }
}
