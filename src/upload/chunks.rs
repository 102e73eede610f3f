//! Fixed-size chunk splitting and per-chunk checksums

/// Chunk size used by the platform's part upload protocol.
pub const CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// One transfer unit: a borrowed slice of the payload plus its checksum.
/// `index` is 1-based, matching the wire `partNumber`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<'a> {
    pub index: usize,
    pub payload: &'a [u8],
    pub crc32: String,
}

/// Lowercase, zero-padded 8-hex-digit CRC32, as carried in `Content-Crc32`.
pub fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32fast::hash(data))
}

/// Split a payload into 5 MiB chunks in order; the final chunk may be
/// shorter. Empty input yields no chunks (callers reject that earlier).
pub fn split_chunks(data: &[u8]) -> Vec<Chunk<'_>> {
    data.chunks(CHUNK_SIZE)
        .enumerate()
        .map(|(i, payload)| Chunk {
            index: i + 1,
            payload,
            crc32: crc32_hex(payload),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_matches_known_vector() {
        // CRC-32 of "123456789" is 0xCBF43926
        assert_eq!(crc32_hex(b"123456789"), "cbf43926");
    }

    #[test]
    fn crc32_is_zero_padded_and_lowercase() {
        let crc = crc32_hex(b"");
        assert_eq!(crc, "00000000");
        assert_eq!(crc.len(), 8);
    }

    #[test]
    fn empty_payload_yields_no_chunks() {
        assert!(split_chunks(&[]).is_empty());
    }

    #[test]
    fn payload_under_chunk_size_is_single_chunk() {
        let data = vec![7u8; 1024];
        let chunks = split_chunks(&data);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 1);
        assert_eq!(chunks[0].payload.len(), 1024);
    }

    #[test]
    fn twelve_mib_splits_into_three_ordered_chunks() {
        let data = vec![0u8; 12 * 1024 * 1024];
        let chunks = split_chunks(&data);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].payload.len(), CHUNK_SIZE);
        assert_eq!(chunks[1].payload.len(), CHUNK_SIZE);
        assert_eq!(chunks[2].payload.len(), 2 * 1024 * 1024);
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn concatenating_chunks_reconstructs_payload() {
        let data: Vec<u8> = (0..(CHUNK_SIZE + 4321)).map(|i| (i % 251) as u8).collect();
        let chunks = split_chunks(&data);

        let rebuilt: Vec<u8> = chunks.iter().flat_map(|c| c.payload.iter().copied()).collect();
        assert_eq!(rebuilt, data);

        for chunk in &chunks {
            assert_eq!(chunk.crc32, crc32_hex(chunk.payload));
        }
    }
}
