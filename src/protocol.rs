//! Wire format for the UART flashing bootloader.
//!
//! All multi-byte fields are little-endian regardless of host.

/// Key marking the start of a flashing session
pub const START_KEY: u32 = 0x1234_5678;

/// Response byte signalling the bootloader is ready for the next chunk
pub const RESP_READY: u8 = 0x01;

/// Maximum payload carried by a single data packet
pub const CHUNK_SIZE: u32 = 1024;

/// Delay between consecutive byte writes
pub const DEFAULT_BYTE_DELAY_MS: u32 = 10;

pub const DEFAULT_BAUD: usize = 115_200;

pub const START_PACKET_LEN: usize = 8;
pub const CHUNK_HEADER_LEN: usize = 4;

/// Handshake packet, sent once before any data
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct StartPacket {
    pub start_key: u32,
    pub total_length: u32,
}

impl StartPacket {
    pub fn new(total_length: u32) -> Self {
        Self { start_key: START_KEY, total_length }
    }

    pub fn encode(&self) -> [u8; START_PACKET_LEN] {
        encode_start(self.start_key, self.total_length)
    }

    pub fn decode(buff: &[u8; START_PACKET_LEN]) -> Self {
        decode_start(buff)
    }
}

/// A single chunk of the image, preceded on the wire by its length
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct DataPacket<'a> {
    payload: &'a [u8],
}

impl<'a> DataPacket<'a> {
    /// Wrap a chunk, payloads must fit in a u32 length header
    pub fn new(payload: &'a [u8]) -> Self {
        debug_assert!(payload.len() <= u32::MAX as usize);
        Self { payload }
    }

    pub fn length(&self) -> u32 {
        self.payload.len() as u32
    }

    pub fn header(&self) -> [u8; CHUNK_HEADER_LEN] {
        encode_chunk_header(self.length())
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

/// Encode the handshake packet: start key then total length
pub fn encode_start(start_key: u32, total_length: u32) -> [u8; START_PACKET_LEN] {
    let mut buff = [0u8; START_PACKET_LEN];
    buff[..4].copy_from_slice(&start_key.to_le_bytes());
    buff[4..].copy_from_slice(&total_length.to_le_bytes());
    buff
}

pub fn decode_start(buff: &[u8; START_PACKET_LEN]) -> StartPacket {
    let mut key = [0u8; 4];
    let mut len = [0u8; 4];
    key.copy_from_slice(&buff[..4]);
    len.copy_from_slice(&buff[4..]);

    StartPacket {
        start_key: u32::from_le_bytes(key),
        total_length: u32::from_le_bytes(len),
    }
}

/// Encode the length header preceding each chunk payload
pub fn encode_chunk_header(length: u32) -> [u8; CHUNK_HEADER_LEN] {
    length.to_le_bytes()
}

pub fn decode_chunk_header(buff: &[u8; CHUNK_HEADER_LEN]) -> u32 {
    u32::from_le_bytes(*buff)
}

/// Number of chunks needed to carry `file_size` bytes
pub fn total_chunks(file_size: u32, chunk_size: u32) -> u32 {
    debug_assert!(chunk_size > 0);
    file_size / chunk_size + (file_size % chunk_size != 0) as u32
}

/// Length of chunk `index`, only the last chunk may be short
pub fn chunk_length(file_size: u32, chunk_size: u32, index: u32) -> u32 {
    debug_assert!(index < total_chunks(file_size, chunk_size));
    (file_size - index * chunk_size).min(chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_packet_is_little_endian() {
        assert_eq!(
            encode_start(START_KEY, 2500),
            [0x78, 0x56, 0x34, 0x12, 0xC4, 0x09, 0x00, 0x00]
        );
        assert_eq!(
            StartPacket::new(0).encode(),
            [0x78, 0x56, 0x34, 0x12, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn chunk_header_is_little_endian() {
        assert_eq!(encode_chunk_header(1024), [0x00, 0x04, 0x00, 0x00]);
        assert_eq!(encode_chunk_header(452), [0xC4, 0x01, 0x00, 0x00]);
        assert_eq!(encode_chunk_header(0xAABBCCDD), [0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = encode_start(START_KEY, 123_456);
        let b = encode_start(START_KEY, 123_456);
        assert_eq!(a, b);

        assert_eq!(encode_chunk_header(77), encode_chunk_header(77));
    }

    #[test]
    fn start_packet_decodes() {
        let p = StartPacket::decode(&[0x78, 0x56, 0x34, 0x12, 0xD0, 0x07, 0x00, 0x00]);
        assert_eq!(p, StartPacket { start_key: START_KEY, total_length: 2000 });
        assert_eq!(decode_chunk_header(&[0xC4, 0x01, 0x00, 0x00]), 452);
    }

    #[test]
    fn data_packet_header_matches_payload() {
        let data = [0xAAu8; 452];
        let p = DataPacket::new(&data);

        assert_eq!(p.length(), 452);
        assert_eq!(p.header(), [0xC4, 0x01, 0x00, 0x00]);
        assert_eq!(p.payload().len(), 452);
    }

    fn chunk_lengths(file_size: u32) -> impl Iterator<Item = u32> {
        (0..total_chunks(file_size, CHUNK_SIZE)).map(move |i| chunk_length(file_size, CHUNK_SIZE, i))
    }

    #[test]
    fn chunking() {
        assert_eq!(total_chunks(0, CHUNK_SIZE), 0);
        assert_eq!(total_chunks(1, CHUNK_SIZE), 1);
        assert_eq!(total_chunks(1024, CHUNK_SIZE), 1);
        assert_eq!(total_chunks(1025, CHUNK_SIZE), 2);
        assert_eq!(total_chunks(2500, CHUNK_SIZE), 3);

        assert_eq!(chunk_lengths(2500).collect::<Vec<_>>(), vec![1024, 1024, 452]);
        assert_eq!(chunk_lengths(1024).collect::<Vec<_>>(), vec![1024]);
        assert_eq!(chunk_lengths(0).count(), 0);
    }

    #[test]
    fn chunk_lengths_sum_to_file_size() {
        for &size in &[0u32, 1, 1023, 1024, 1025, 2048, 4097, 65_535, 1_000_000] {
            let lengths: Vec<u32> = chunk_lengths(size).collect();

            assert_eq!(lengths.len() as u32, total_chunks(size, CHUNK_SIZE));
            assert_eq!(lengths.iter().map(|&l| l as u64).sum::<u64>(), size as u64);
            assert!(lengths.iter().all(|&l| l > 0 && l <= CHUNK_SIZE));
        }
    }

    #[test]
    fn chunking_near_u32_max() {
        let size = u32::MAX;
        let n = total_chunks(size, CHUNK_SIZE);
        assert_eq!(n, 4_194_304);
        assert_eq!(chunk_length(size, CHUNK_SIZE, n - 1), 1023);
        assert_eq!(chunk_length(size, CHUNK_SIZE, n - 2), CHUNK_SIZE);
    }
}
