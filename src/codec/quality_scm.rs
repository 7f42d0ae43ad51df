//! SCM — statistical context-mixing quality codec (spec §4.4).
//!
//! An adaptive range coder over the 94-symbol Phred+33 alphabet, keyed on a
//! composite context: the previous one or two symbols (order-1/order-2),
//! a position bin, and optionally the DNA base at the current position.
//! Frequency tables reset at the start of every block — there is no
//! cross-block state, which is what keeps blocks independently decodable.
//!
//! The range coder itself is the classic Subbotin carryless design (the
//! same family as the bit-oriented coder inside `lzma-rs`'s LZMA
//! implementation, generalised here to cumulative-frequency multi-symbol
//! alphabets instead of binary probabilities).

use crate::error::{FqcError, FqcResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;

pub const ALPHABET_SIZE: usize = 94;
pub const DEFAULT_NUM_BINS: u32 = 16;

const TOP: u32 = 1 << 24;
const BOTTOM: u32 = 1 << 16;

struct RangeEncoder {
    low: u64,
    range: u32,
    out: Vec<u8>,
}

impl RangeEncoder {
    fn new() -> Self {
        Self { low: 0, range: 0xFFFF_FFFF, out: Vec::new() }
    }

    fn encode(&mut self, cum_freq: u32, freq: u32, tot_freq: u32) {
        self.range /= tot_freq;
        self.low += cum_freq as u64 * self.range as u64;
        self.range *= freq;
        self.normalize();
    }

    fn normalize(&mut self) {
        loop {
            if (self.low ^ (self.low + self.range as u64)) < TOP as u64 {
                // top byte settled
            } else if self.range < BOTTOM {
                self.range = (BOTTOM.wrapping_sub(self.low as u32)) & (BOTTOM - 1);
            } else {
                break;
            }
            self.out.push((self.low >> 24) as u8);
            self.low = (self.low << 8) & 0xFFFF_FFFF;
            self.range <<= 8;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        for _ in 0..4 {
            self.out.push((self.low >> 24) as u8);
            self.low = (self.low << 8) & 0xFFFF_FFFF;
        }
        self.out
    }
}

struct RangeDecoder<'a> {
    low: u64,
    range: u32,
    code: u64,
    input: &'a [u8],
    pos: usize,
}

impl<'a> RangeDecoder<'a> {
    fn new(input: &'a [u8]) -> Self {
        let mut code = 0u64;
        let mut pos = 0usize;
        for _ in 0..4 {
            code = (code << 8) | Self::next_byte(input, &mut pos) as u64;
        }
        Self { low: 0, range: 0xFFFF_FFFF, code, input, pos }
    }

    fn next_byte(input: &[u8], pos: &mut usize) -> u8 {
        let b = input.get(*pos).copied().unwrap_or(0);
        *pos += 1;
        b
    }

    fn get_freq(&mut self, tot_freq: u32) -> u32 {
        self.range /= tot_freq;
        (((self.code - self.low) / self.range as u64) as u32).min(tot_freq - 1)
    }

    fn decode(&mut self, cum_freq: u32, freq: u32) {
        self.low += cum_freq as u64 * self.range as u64;
        self.range *= freq;
        self.normalize();
    }

    fn normalize(&mut self) {
        loop {
            if (self.low ^ (self.low + self.range as u64)) < TOP as u64 {
                // top byte settled
            } else if self.range < BOTTOM {
                self.range = (BOTTOM.wrapping_sub(self.low as u32)) & (BOTTOM - 1);
            } else {
                break;
            }
            self.code = ((self.code << 8) | Self::next_byte(self.input, &mut self.pos) as u64) & 0xFFFF_FFFF;
            self.low = (self.low << 8) & 0xFFFF_FFFF;
            self.range <<= 8;
        }
    }
}

const INCREMENT: u32 = 24;
const MAX_TOTAL: u32 = 1 << 14;

/// An adaptive frequency table for one context, initialised to a uniform
/// low-count prior and rescaled (halved) once its total exceeds `MAX_TOTAL`.
struct FreqModel {
    freq: [u16; ALPHABET_SIZE],
    total: u32,
}

impl FreqModel {
    fn new() -> Self {
        Self { freq: [1; ALPHABET_SIZE], total: ALPHABET_SIZE as u32 }
    }

    fn cum_freq(&self, symbol: usize) -> u32 {
        self.freq[..symbol].iter().map(|&f| f as u32).sum()
    }

    fn encode_symbol(&mut self, symbol: usize, rc: &mut RangeEncoder) {
        let cum = self.cum_freq(symbol);
        rc.encode(cum, self.freq[symbol] as u32, self.total);
        self.update(symbol);
    }

    fn decode_symbol(&mut self, rc: &mut RangeDecoder) -> usize {
        let target = rc.get_freq(self.total);
        let mut cum = 0u32;
        let mut symbol = ALPHABET_SIZE - 1;
        for (i, &f) in self.freq.iter().enumerate() {
            if cum + f as u32 > target {
                symbol = i;
                break;
            }
            cum += f as u32;
        }
        rc.decode(cum, self.freq[symbol] as u32);
        self.update(symbol);
        symbol
    }

    fn update(&mut self, symbol: usize) {
        self.freq[symbol] = self.freq[symbol].saturating_add(INCREMENT as u16);
        self.total += INCREMENT;
        if self.total > MAX_TOTAL {
            self.total = 0;
            for f in self.freq.iter_mut() {
                *f = ((*f as u32 + 1) / 2) as u16;
                self.total += *f as u32;
            }
        }
    }
}

/// Which previous-symbol context order to mix in, chosen by the block
/// compressor from the block's read-length regime (short reads get the
/// richer order-2 context; medium/long reads use order-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextOrder {
    One,
    Two,
}

impl ContextOrder {
    pub fn family(self) -> crate::format::CodecFamily {
        match self {
            ContextOrder::One => crate::format::CodecFamily::ScmOrder1,
            ContextOrder::Two => crate::format::CodecFamily::ScmV1,
        }
    }
}

const NONE_SYMBOL: u32 = ALPHABET_SIZE as u32; // sentinel for "no previous symbol"
const NONE_BASE: u32 = 4; // sentinel for "no DNA context"

fn base_index(b: u8) -> u32 {
    match b {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        b'T' => 3,
        _ => 4,
    }
}

fn pos_bin(pos: usize, read_length: usize, num_bins: u32) -> u32 {
    if read_length == 0 {
        return 0;
    }
    (((pos as u64) * num_bins as u64) / read_length as u64) as u32
}

fn context_key(order: ContextOrder, prev1: u32, prev2: u32, bin: u32, base: u32) -> u64 {
    let p2 = if order == ContextOrder::Two { prev2 } else { NONE_SYMBOL };
    let mut key = prev1 as u64;
    key = key * (ALPHABET_SIZE as u64 + 1) + p2 as u64;
    key = key * DEFAULT_NUM_BINS as u64 + bin as u64;
    key = key * 5 + base as u64;
    key
}

struct ModelBank {
    order: ContextOrder,
    num_bins: u32,
    use_dna: bool,
    models: HashMap<u64, FreqModel>,
}

impl ModelBank {
    fn new(order: ContextOrder, num_bins: u32, use_dna: bool) -> Self {
        Self { order, num_bins, use_dna, models: HashMap::new() }
    }

    fn model(&mut self, key: u64) -> &mut FreqModel {
        self.models.entry(key).or_insert_with(FreqModel::new)
    }
}

/// Encode one read's quality stream (already shifted to `[0, 93]`) into the
/// coder, updating `bank`'s per-context models as it goes.
fn encode_read(rc: &mut RangeEncoder, bank: &mut ModelBank, symbols: &[u8], sequence: Option<&[u8]>) {
    let read_length = symbols.len();
    let mut prev1 = NONE_SYMBOL;
    let mut prev2 = NONE_SYMBOL;
    for (pos, &sym) in symbols.iter().enumerate() {
        let base = if bank.use_dna {
            sequence.and_then(|s| s.get(pos)).map(|&b| base_index(b)).unwrap_or(NONE_BASE)
        } else {
            NONE_BASE
        };
        let bin = pos_bin(pos, read_length, bank.num_bins);
        let key = context_key(bank.order, prev1, prev2, bin, base);
        bank.model(key).encode_symbol(sym as usize, rc);
        prev2 = prev1;
        prev1 = sym as u32;
    }
}

fn decode_read(rc: &mut RangeDecoder, bank: &mut ModelBank, read_length: usize, sequence: Option<&[u8]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(read_length);
    let mut prev1 = NONE_SYMBOL;
    let mut prev2 = NONE_SYMBOL;
    for pos in 0..read_length {
        let base = if bank.use_dna {
            sequence.and_then(|s| s.get(pos)).map(|&b| base_index(b)).unwrap_or(NONE_BASE)
        } else {
            NONE_BASE
        };
        let bin = pos_bin(pos, read_length, bank.num_bins);
        let key = context_key(bank.order, prev1, prev2, bin, base);
        let sym = bank.model(key).decode_symbol(rc) as u8;
        out.push(sym);
        prev2 = prev1;
        prev1 = sym as u32;
    }
    out
}

/// Illumina 8-bin lossy transform (spec §4.4): boundaries are exclusive
/// upper bounds, representatives replace every value falling in that bin.
const BIN_BOUNDARIES: [u8; 8] = [2, 10, 20, 25, 30, 35, 40, 94];
const BIN_REPRESENTATIVES: [u8; 8] = [0, 6, 15, 22, 27, 33, 37, 40];

pub fn illumina8_bin(value: u8) -> u8 {
    for (i, &bound) in BIN_BOUNDARIES.iter().enumerate() {
        if value < bound {
            return BIN_REPRESENTATIVES[i];
        }
    }
    *BIN_REPRESENTATIVES.last().unwrap()
}

pub struct ScmEncoded {
    pub payload: Vec<u8>,
}

/// Encode a block's quality streams. `qualities[i]` and `sequences[i]` (when
/// DNA context is enabled) must be the same length for every read.
pub fn encode(
    qualities: &[Vec<u8>],
    sequences: Option<&[Vec<u8>]>,
    order: ContextOrder,
    num_bins: u32,
    use_dna: bool,
) -> FqcResult<ScmEncoded> {
    let mut rc = RangeEncoder::new();
    let mut bank = ModelBank::new(order, num_bins, use_dna);
    let mut lengths = Vec::with_capacity(qualities.len());
    for (i, quality) in qualities.iter().enumerate() {
        lengths.push(quality.len() as u32);
        let seq = sequences.map(|s| s[i].as_slice());
        encode_read(&mut rc, &mut bank, quality, seq);
    }

    let coded = rc.finish();
    let mut payload = Vec::with_capacity(4 + lengths.len() * 4 + coded.len());
    payload.write_u32::<LittleEndian>(lengths.len() as u32)?;
    for len in lengths {
        payload.write_u32::<LittleEndian>(len)?;
    }
    payload.extend_from_slice(&coded);
    Ok(ScmEncoded { payload })
}

pub fn decode(
    payload: &[u8],
    sequences: Option<&[Vec<u8>]>,
    order: ContextOrder,
    num_bins: u32,
    use_dna: bool,
) -> FqcResult<Vec<Vec<u8>>> {
    let truncated = || FqcError::format("truncated SCM quality stream");
    let mut cursor = std::io::Cursor::new(payload);
    let count = cursor.read_u32::<LittleEndian>().map_err(|_| truncated())? as usize;
    let mut lengths = Vec::with_capacity(count);
    for _ in 0..count {
        lengths.push(cursor.read_u32::<LittleEndian>().map_err(|_| truncated())? as usize);
    }
    let coded_start = 4 + count * 4;
    let coded = payload.get(coded_start..).ok_or_else(truncated)?;

    let mut rc = RangeDecoder::new(coded);
    let mut bank = ModelBank::new(order, num_bins, use_dna);
    let mut out = Vec::with_capacity(count);
    for (i, &len) in lengths.iter().enumerate() {
        let seq = sequences.map(|s| s[i].as_slice());
        out.push(decode_read(&mut rc, &mut bank, len, seq));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order1_roundtrip_lossless() {
        let qualities = vec![vec![30u8, 31, 32, 33], vec![10u8, 10, 10, 20, 20]];
        let encoded = encode(&qualities, None, ContextOrder::One, DEFAULT_NUM_BINS, false).unwrap();
        let decoded = decode(&encoded.payload, None, ContextOrder::One, DEFAULT_NUM_BINS, false).unwrap();
        assert_eq!(decoded, qualities);
    }

    #[test]
    fn order2_roundtrip_with_dna_context() {
        let qualities = vec![vec![2u8, 40, 40, 2, 2]];
        let sequences = vec![b"ACGTA".to_vec()];
        let encoded = encode(&qualities, Some(&sequences), ContextOrder::Two, DEFAULT_NUM_BINS, true).unwrap();
        let decoded = decode(&encoded.payload, Some(&sequences), ContextOrder::Two, DEFAULT_NUM_BINS, true).unwrap();
        assert_eq!(decoded, qualities);
    }

    #[test]
    fn illumina8_bin_boundaries() {
        assert_eq!(illumina8_bin(0), 0);
        assert_eq!(illumina8_bin(9), 0);
        assert_eq!(illumina8_bin(10), 6);
        assert_eq!(illumina8_bin(93), 40);
    }

    #[test]
    fn empty_block_roundtrips() {
        let qualities: Vec<Vec<u8>> = Vec::new();
        let encoded = encode(&qualities, None, ContextOrder::One, DEFAULT_NUM_BINS, false).unwrap();
        let decoded = decode(&encoded.payload, None, ContextOrder::One, DEFAULT_NUM_BINS, false).unwrap();
        assert!(decoded.is_empty());
    }
}
