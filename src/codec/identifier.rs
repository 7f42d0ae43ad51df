//! Identifier codec (spec §4.5): exact, tokenise, or discard.
//!
//! Discard is handled entirely upstream — the block compressor skips this
//! module altogether and the archive-id range in the block index is enough
//! for [`synthesize_discarded`] to rebuild placeholder IDs on decode. This
//! module only implements exact and tokenise, which both end up as a
//! back-end-compressed blob prefixed with a one-byte mode marker so a
//! per-block fallback from tokenise to exact (spec §4.5's
//! `min_pattern_match_ratio` escape hatch) is self-describing on decode
//! without needing the archive-wide `id_mode` flag.

use crate::codec::backend::{backend_for_family, Backend};
use crate::error::{FqcError, FqcResult};
use crate::format::{CodecFamily, PeLayout};
use crate::varint::{decode_delta_series, encode_delta_series};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

pub const DEFAULT_DELIMITERS: &[u8] = b":_/| \t";
pub const DEFAULT_PATTERN_SAMPLE: usize = 100;
pub const DEFAULT_MIN_PATTERN_MATCH_RATIO: f64 = 0.9;

const MODE_EXACT: u8 = 0;
const MODE_TOKENISE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Static,
    DynamicInt,
    DynamicString,
}

struct Pattern {
    delimiters: Vec<u8>,
    kinds: Vec<TokenKind>,
    statics: Vec<Option<String>>,
}

fn tokenize(id: &str, delimiter_set: &[u8]) -> (Vec<String>, Vec<u8>) {
    let mut tokens = Vec::new();
    let mut delims = Vec::new();
    let mut current = String::new();
    for b in id.bytes() {
        if delimiter_set.contains(&b) {
            tokens.push(std::mem::take(&mut current));
            delims.push(b);
        } else {
            current.push(b as char);
        }
    }
    tokens.push(current);
    delims.push(0);
    (tokens, delims)
}

fn parse_uint(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok()
}

fn detect_pattern(ids: &[String], delimiter_set: &[u8], sample_size: usize) -> Pattern {
    let sample: Vec<(Vec<String>, Vec<u8>)> =
        ids.iter().take(sample_size).map(|id| tokenize(id, delimiter_set)).collect();
    let num_tokens = sample.first().map(|(t, _)| t.len()).unwrap_or(0);
    let consistent_arity = sample.iter().all(|(t, _)| t.len() == num_tokens);

    if !consistent_arity || num_tokens == 0 {
        return Pattern { delimiters: Vec::new(), kinds: Vec::new(), statics: Vec::new() };
    }

    let delimiters = sample[0].1.clone();
    let mut kinds = Vec::with_capacity(num_tokens);
    let mut statics = Vec::with_capacity(num_tokens);

    for pos in 0..num_tokens {
        let first = &sample[0].0[pos];
        let all_static = sample.iter().all(|(t, _)| &t[pos] == first);
        if all_static {
            kinds.push(TokenKind::Static);
            statics.push(Some(first.clone()));
            continue;
        }
        let all_int = sample.iter().all(|(t, _)| parse_uint(&t[pos]).is_some());
        if all_int {
            kinds.push(TokenKind::DynamicInt);
            statics.push(None);
        } else {
            kinds.push(TokenKind::DynamicString);
            statics.push(None);
        }
    }
    Pattern { delimiters, kinds, statics }
}

fn matches_pattern(id: &str, pattern: &Pattern, delimiter_set: &[u8]) -> Option<Vec<String>> {
    let (tokens, delims) = tokenize(id, delimiter_set);
    if tokens.len() != pattern.kinds.len() || delims != pattern.delimiters {
        return None;
    }
    for (i, kind) in pattern.kinds.iter().enumerate() {
        match kind {
            TokenKind::Static => {
                if Some(&tokens[i]) != pattern.statics[i].as_ref() {
                    return None;
                }
            }
            TokenKind::DynamicInt => {
                if parse_uint(&tokens[i]).is_none() {
                    return None;
                }
            }
            TokenKind::DynamicString => {}
        }
    }
    Some(tokens)
}

pub struct IdentifierEncoded {
    pub family: CodecFamily,
    pub payload: Vec<u8>,
}

pub struct IdentifierConfig {
    pub delimiters: Vec<u8>,
    pub pattern_sample: usize,
    pub min_pattern_match_ratio: f64,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            delimiters: DEFAULT_DELIMITERS.to_vec(),
            pattern_sample: DEFAULT_PATTERN_SAMPLE,
            min_pattern_match_ratio: DEFAULT_MIN_PATTERN_MATCH_RATIO,
        }
    }
}

fn encode_exact_body(ids: &[String]) -> FqcResult<Vec<u8>> {
    let mut body = Vec::new();
    for id in ids {
        let bytes = id.as_bytes();
        body.write_u16::<LittleEndian>(bytes.len() as u16)?;
        body.extend_from_slice(bytes);
    }
    Ok(body)
}

fn decode_exact_body(body: &[u8], count: usize) -> FqcResult<Vec<String>> {
    let truncated = || FqcError::format("truncated exact identifier stream");
    let mut cursor = Cursor::new(body);
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let len = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())? as usize;
        let mut buf = vec![0u8; len];
        cursor.read_exact(&mut buf).map_err(|_| truncated())?;
        ids.push(String::from_utf8(buf).map_err(|_| FqcError::format("identifier bytes are not valid UTF-8"))?);
    }
    Ok(ids)
}

pub fn encode(ids: &[String], config: &IdentifierConfig, backend: Backend, level: i32) -> FqcResult<IdentifierEncoded> {
    if ids.is_empty() {
        return Ok(IdentifierEncoded { family: CodecFamily::Raw, payload: Vec::new() });
    }

    let pattern = detect_pattern(ids, &config.delimiters, config.pattern_sample);
    let per_record: Vec<Option<Vec<String>>> = if pattern.kinds.is_empty() {
        vec![None; ids.len()]
    } else {
        ids.iter().map(|id| matches_pattern(id, &pattern, &config.delimiters)).collect()
    };
    let match_count = per_record.iter().filter(|m| m.is_some()).count();
    let match_ratio = match_count as f64 / ids.len() as f64;

    let mut body = Vec::new();
    if pattern.kinds.is_empty() || match_ratio < config.min_pattern_match_ratio {
        body.push(MODE_EXACT);
        body.extend_from_slice(&encode_exact_body(ids)?);
    } else {
        body.push(MODE_TOKENISE);
        body.write_u16::<LittleEndian>(pattern.kinds.len() as u16)?;
        body.extend_from_slice(&pattern.delimiters);
        for kind in &pattern.kinds {
            body.push(match kind {
                TokenKind::Static => 0u8,
                TokenKind::DynamicInt => 1u8,
                TokenKind::DynamicString => 2u8,
            });
        }
        for (kind, value) in pattern.kinds.iter().zip(&pattern.statics) {
            if *kind == TokenKind::Static {
                let bytes = value.as_ref().unwrap().as_bytes();
                body.write_u16::<LittleEndian>(bytes.len() as u16)?;
                body.extend_from_slice(bytes);
            }
        }

        body.write_u32::<LittleEndian>(ids.len() as u32)?;
        for chunk in per_record.chunks(8) {
            let mut byte = 0u8;
            for (i, m) in chunk.iter().enumerate() {
                if m.is_some() {
                    byte |= 1 << i;
                }
            }
            body.push(byte);
        }

        for (pos, kind) in pattern.kinds.iter().enumerate() {
            match kind {
                TokenKind::Static => {}
                TokenKind::DynamicInt => {
                    let values: Vec<u64> = per_record
                        .iter()
                        .filter_map(|m| m.as_ref().map(|tokens| parse_uint(&tokens[pos]).unwrap()))
                        .collect();
                    let column = encode_delta_series(&values);
                    body.write_u32::<LittleEndian>(column.len() as u32)?;
                    body.extend_from_slice(&column);
                }
                TokenKind::DynamicString => {
                    for m in per_record.iter().filter_map(|m| m.as_ref()) {
                        let bytes = m[pos].as_bytes();
                        body.write_u16::<LittleEndian>(bytes.len() as u16)?;
                        body.extend_from_slice(bytes);
                    }
                }
            }
        }

        for (id, m) in ids.iter().zip(&per_record) {
            if m.is_none() {
                let bytes = id.as_bytes();
                body.write_u16::<LittleEndian>(bytes.len() as u16)?;
                body.extend_from_slice(bytes);
            }
        }
    }

    let payload = backend.codec().compress(&body, level)?;
    Ok(IdentifierEncoded { family: backend.family(), payload })
}

pub fn decode(family: CodecFamily, payload: &[u8], count: usize) -> FqcResult<Vec<String>> {
    if count == 0 || payload.is_empty() {
        return Ok(Vec::new());
    }
    let backend_codec = backend_for_family(family)?;
    let body = backend_codec.decompress(payload)?;
    let truncated = || FqcError::format("truncated identifier stream");

    let mode = *body.first().ok_or_else(truncated)?;
    if mode == MODE_EXACT {
        return decode_exact_body(&body[1..], count);
    }
    if mode != MODE_TOKENISE {
        return Err(FqcError::format("unknown identifier codec mode byte"));
    }

    let mut cursor = Cursor::new(&body[1..]);
    let num_tokens = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())? as usize;
    let mut delimiters = vec![0u8; num_tokens];
    cursor.read_exact(&mut delimiters).map_err(|_| truncated())?;
    let mut kind_bytes = vec![0u8; num_tokens];
    cursor.read_exact(&mut kind_bytes).map_err(|_| truncated())?;
    let kinds: Vec<TokenKind> = kind_bytes
        .iter()
        .map(|&b| match b {
            0 => Ok(TokenKind::Static),
            1 => Ok(TokenKind::DynamicInt),
            2 => Ok(TokenKind::DynamicString),
            _ => Err(FqcError::format("unknown identifier token kind")),
        })
        .collect::<FqcResult<_>>()?;

    let mut statics = vec![None; num_tokens];
    for (pos, kind) in kinds.iter().enumerate() {
        if *kind == TokenKind::Static {
            let len = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())? as usize;
            let mut buf = vec![0u8; len];
            cursor.read_exact(&mut buf).map_err(|_| truncated())?;
            statics[pos] = Some(String::from_utf8(buf).map_err(|_| FqcError::format("static token not UTF-8"))?);
        }
    }

    let record_count = cursor.read_u32::<LittleEndian>().map_err(|_| truncated())? as usize;
    if record_count != count {
        return Err(FqcError::format("identifier stream record count mismatch"));
    }
    let flag_bytes = record_count.div_ceil(8);
    let mut flags = vec![0u8; flag_bytes];
    cursor.read_exact(&mut flags).map_err(|_| truncated())?;
    let matches: Vec<bool> = (0..record_count).map(|i| flags[i / 8] & (1 << (i % 8)) != 0).collect();
    let match_count = matches.iter().filter(|&&m| m).count();

    let mut dynamic_int_columns: Vec<Vec<u64>> = vec![Vec::new(); num_tokens];
    let mut dynamic_string_columns: Vec<Vec<String>> = vec![Vec::new(); num_tokens];
    for (pos, kind) in kinds.iter().enumerate() {
        match kind {
            TokenKind::Static => {}
            TokenKind::DynamicInt => {
                let col_len = cursor.read_u32::<LittleEndian>().map_err(|_| truncated())? as usize;
                let mut buf = vec![0u8; col_len];
                cursor.read_exact(&mut buf).map_err(|_| truncated())?;
                dynamic_int_columns[pos] =
                    decode_delta_series(&buf, match_count).ok_or_else(truncated)?;
            }
            TokenKind::DynamicString => {
                let mut col = Vec::with_capacity(match_count);
                for _ in 0..match_count {
                    let len = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())? as usize;
                    let mut buf = vec![0u8; len];
                    cursor.read_exact(&mut buf).map_err(|_| truncated())?;
                    col.push(String::from_utf8(buf).map_err(|_| FqcError::format("dynamic token not UTF-8"))?);
                }
                dynamic_string_columns[pos] = col;
            }
        }
    }

    let exception_count = record_count - match_count;
    let mut exceptions = Vec::with_capacity(exception_count);
    for _ in 0..exception_count {
        let len = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())? as usize;
        let mut buf = vec![0u8; len];
        cursor.read_exact(&mut buf).map_err(|_| truncated())?;
        exceptions.push(String::from_utf8(buf).map_err(|_| FqcError::format("exception id not UTF-8"))?);
    }

    let mut int_cursors = vec![0usize; num_tokens];
    let mut string_cursors = vec![0usize; num_tokens];
    let mut exception_cursor = 0usize;
    let mut ids = Vec::with_capacity(record_count);
    for &is_match in &matches {
        if is_match {
            let mut tokens = Vec::with_capacity(num_tokens);
            for (pos, kind) in kinds.iter().enumerate() {
                let token = match kind {
                    TokenKind::Static => statics[pos].clone().unwrap(),
                    TokenKind::DynamicInt => {
                        let v = dynamic_int_columns[pos][int_cursors[pos]];
                        int_cursors[pos] += 1;
                        v.to_string()
                    }
                    TokenKind::DynamicString => {
                        let v = dynamic_string_columns[pos][string_cursors[pos]].clone();
                        string_cursors[pos] += 1;
                        v
                    }
                };
                tokens.push(token);
            }
            let mut id = String::new();
            for (token, &delim) in tokens.iter().zip(&delimiters) {
                id.push_str(token);
                if delim != 0 {
                    id.push(delim as char);
                }
            }
            ids.push(id);
        } else {
            ids.push(exceptions[exception_cursor].clone());
            exception_cursor += 1;
        }
    }
    Ok(ids)
}

/// Reconstruct placeholder identifiers for discard mode (spec §4.5). Formats
/// depend on PE layout: interleaved pairs synthesise `{archive_id}/{1|2}`,
/// everything else just `{archive_id}`; both take an optional fixed prefix.
pub fn synthesize_discarded(
    pe_layout: Option<PeLayout>,
    archive_id_start: u64,
    count: usize,
    prefix: &str,
) -> Vec<String> {
    (0..count)
        .map(|i| {
            let archive_id = archive_id_start + i as u64;
            match pe_layout {
                Some(PeLayout::Interleaved) => format!("{prefix}{}/{}", archive_id / 2 + 1, archive_id % 2 + 1),
                _ => format!("{prefix}{archive_id}"),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_roundtrip() {
        let ids = vec!["read one".to_string(), "read two".to_string()];
        let encoded = encode(&ids, &IdentifierConfig { min_pattern_match_ratio: 2.0, ..Default::default() }, Backend::Zstd, 3).unwrap();
        let decoded = decode(encoded.family, &encoded.payload, ids.len()).unwrap();
        assert_eq!(decoded, ids);
    }

    #[test]
    fn tokenise_roundtrip_with_static_and_dynamic_columns() {
        let ids: Vec<String> = (0..20)
            .map(|i| format!("INSTR:7:1101:{}:{}", 1000 + i, 2000 + i * 3))
            .collect();
        let encoded = encode(&ids, &IdentifierConfig::default(), Backend::Zstd, 3).unwrap();
        let decoded = decode(encoded.family, &encoded.payload, ids.len()).unwrap();
        assert_eq!(decoded, ids);
    }

    #[test]
    fn tokenise_handles_minority_exceptions() {
        let mut ids: Vec<String> =
            (0..20).map(|i| format!("INSTR:7:1101:{}:{}", 1000 + i, 2000 + i * 3)).collect();
        ids[5] = "totally-different-format".to_string();
        let encoded = encode(&ids, &IdentifierConfig::default(), Backend::Zstd, 3).unwrap();
        let decoded = decode(encoded.family, &encoded.payload, ids.len()).unwrap();
        assert_eq!(decoded, ids);
    }

    #[test]
    fn low_match_ratio_falls_back_to_exact() {
        let ids: Vec<String> =
            (0..10).map(|i| if i % 2 == 0 { format!("A:{i}") } else { format!("totally different {i}") }).collect();
        let encoded = encode(&ids, &IdentifierConfig::default(), Backend::Zstd, 3).unwrap();
        let decoded = decode(encoded.family, &encoded.payload, ids.len()).unwrap();
        assert_eq!(decoded, ids);
    }

    #[test]
    fn synthesize_discarded_interleaved() {
        let ids = synthesize_discarded(Some(PeLayout::Interleaved), 10, 4, "@");
        assert_eq!(ids, vec!["@6/1", "@6/2", "@7/1", "@7/2"]);
    }
}
