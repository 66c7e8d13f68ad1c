use ethereum_types::U256;

/// Linear, byte-addressable, implicitly-growing memory. Growth always
/// rounds up to a whole 32-byte word (§4.8 memory expansion accounting
/// assumes the active region is always a whole number of words).
#[derive(Debug, Default)]
pub struct Memory(Vec<u8>);

/// Number of 32-byte words needed to cover `[offset, offset+len)`. `0` for
/// a zero-length access, regardless of offset (a zero-length read/write
/// never touches memory and so never grows it).
pub fn words_for(offset: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (offset + len + 31) / 32
}

impl Memory {
    pub fn new() -> Self {
        Memory(Vec::new())
    }

    pub fn size(&self) -> usize {
        self.0.len()
    }

    pub fn words(&self) -> usize {
        self.0.len() / 32
    }

    /// Grow to hold at least `words` whole words, zero-filling the
    /// extension. A no-op if already large enough.
    pub fn expand_to_words(&mut self, words: usize) {
        let target = words * 32;
        if target > self.0.len() {
            self.0.resize(target, 0);
        }
    }

    /// Read `len` bytes starting at `offset`, zero-padding past the end of
    /// the allocated region rather than growing it (a plain read never
    /// charges expansion gas on its own — callers that need the region
    /// live call `expand_to_words` first).
    pub fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        if offset >= self.0.len() {
            return out;
        }
        let copy = len.min(self.0.len() - offset);
        out[..copy].copy_from_slice(&self.0[offset..offset + copy]);
        out
    }

    pub fn read_u256(&self, offset: usize) -> U256 {
        U256::from_big_endian(&self.read(offset, 32))
    }

    pub fn write_slice(&mut self, offset: usize, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.expand_to_words(words_for(offset, data.len()));
        self.0[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn write_u256(&mut self, offset: usize, value: U256) {
        let mut buf = [0u8; 32];
        value.to_big_endian(&mut buf);
        self.write_slice(offset, &buf);
    }

    pub fn write_byte(&mut self, offset: usize, value: u8) {
        self.expand_to_words(words_for(offset, 1));
        self.0[offset] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_for_rounds_up_and_is_zero_for_empty_access() {
        assert_eq!(words_for(0, 0), 0);
        assert_eq!(words_for(0, 1), 1);
        assert_eq!(words_for(0, 32), 1);
        assert_eq!(words_for(0, 33), 2);
        assert_eq!(words_for(31, 1), 1);
        assert_eq!(words_for(32, 1), 2);
    }

    #[test]
    fn read_past_the_end_is_zero_padded_without_growing() {
        let mem = Memory::new();
        assert_eq!(mem.read(0, 4), vec![0, 0, 0, 0]);
        assert_eq!(mem.size(), 0);
    }

    #[test]
    fn write_grows_to_whole_words() {
        let mut mem = Memory::new();
        mem.write_slice(2, &[1, 2, 3]);
        assert_eq!(mem.size(), 32);
        assert_eq!(mem.read(2, 3), vec![1, 2, 3]);
    }

    #[test]
    fn write_u256_round_trips() {
        let mut mem = Memory::new();
        mem.write_u256(0, U256::from(0x1234));
        assert_eq!(mem.read_u256(0), U256::from(0x1234));
    }
}
