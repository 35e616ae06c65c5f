//! Canonical Huffman coding over the byte alphabet
//!
//! A [`HuffmanTable`] is built from a sample of bytes. Symbol weights are
//! their occurrence counts; the tree is built greedily by merging the two
//! lightest nodes, with ties broken by insertion order (leaves in order of
//! first appearance, merged nodes after them) so the same sample always
//! yields the same table. Only the code lengths are taken from the tree: the
//! codes themselves are assigned canonically in `(length, symbol)` order.
//!
//! # Stream format
//!
//! ```text
//! +----------------------+----------------+---------------------------+
//! | symbol count (u64 BE)| padding (u8)   | codes, MSB first          |
//! +----------------------+----------------+---------------------------+
//!          8 bytes            1 byte        final byte zero-padded
//! ```
//!
//! `padding` is the number of unused low bits in the final byte (0-7).

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use thiserror::Error;

use super::bitio::{BitReader, BitWriter};

/// Longest code the table will assign
pub const MAX_CODE_LENGTH: usize = 64;

/// Length of the stream header (symbol count + padding byte)
pub const HEADER_LEN: usize = 9;

/// Errors produced while building tables or coding streams
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HuffmanError {
    /// The sample had no symbols to weigh
    #[error("cannot build a code table from an empty sample")]
    EmptySample,

    /// Payload byte has no code in the table
    #[error("symbol {symbol:#04x} at offset {offset} is not in the code table")]
    UnknownSymbol { symbol: u8, offset: usize },

    /// The sample produced a tree deeper than [`MAX_CODE_LENGTH`]
    #[error("code length {length} exceeds the 64-bit limit")]
    CodeLengthTooLong { length: usize },

    /// Input was not produced by `encode` with this table
    #[error("corrupt stream: {reason}")]
    CorruptStream { reason: &'static str },
}

/// A single prefix code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code {
    /// Code bits, right-aligned
    pub bits: u64,
    /// Number of significant bits
    pub len: u8,
}

enum NodeKind {
    Leaf(u8),
    Internal(usize, usize),
}

struct Node {
    kind: NodeKind,
}

/// Canonical code table for one payload
#[derive(Debug, Clone)]
pub struct HuffmanTable {
    /// Code per byte value (`None` = symbol absent from the sample)
    codes: [Option<Code>; 256],
    /// Symbols in canonical order
    symbols: Vec<u8>,
    /// First canonical code of each length
    first_code: Vec<u64>,
    /// Index into `symbols` of the first symbol of each length
    first_index: Vec<usize>,
    /// Number of codes of each length
    count: Vec<usize>,
    max_len: usize,
}

impl HuffmanTable {
    /// Build a table from the symbol frequencies of `sample`
    pub fn build(sample: &[u8]) -> Result<Self, HuffmanError> {
        let mut weights = [0u64; 256];
        let mut order = Vec::new();
        for &byte in sample {
            if weights[byte as usize] == 0 {
                order.push(byte);
            }
            weights[byte as usize] += 1;
        }

        if order.is_empty() {
            return Err(HuffmanError::EmptySample);
        }

        let lengths = code_lengths(&weights, &order)?;
        Ok(Self::from_lengths(&lengths))
    }

    /// Assign canonical codes from per-symbol code lengths
    fn from_lengths(lengths: &[(u8, usize)]) -> Self {
        let mut sorted: Vec<(usize, u8)> = lengths.iter().map(|&(s, l)| (l, s)).collect();
        sorted.sort_unstable();

        let max_len = sorted.last().map(|&(l, _)| l).unwrap_or(0);
        let mut codes = [None; 256];
        let mut symbols = Vec::with_capacity(sorted.len());
        let mut first_code = vec![0u64; max_len + 1];
        let mut first_index = vec![0usize; max_len + 1];
        let mut count = vec![0usize; max_len + 1];

        let mut code: u64 = 0;
        let mut prev_len = 0usize;
        for (index, &(len, symbol)) in sorted.iter().enumerate() {
            if index > 0 {
                code += 1;
            }
            if len != prev_len {
                code <<= len - prev_len;
                first_code[len] = code;
                first_index[len] = index;
                prev_len = len;
            }

            codes[symbol as usize] = Some(Code {
                bits: code,
                len: len as u8,
            });
            symbols.push(symbol);
            count[len] += 1;
        }

        Self {
            codes,
            symbols,
            first_code,
            first_index,
            count,
            max_len,
        }
    }

    /// Code assigned to `symbol`, if it appeared in the sample
    pub fn code(&self, symbol: u8) -> Option<Code> {
        self.codes[symbol as usize]
    }

    /// Number of distinct symbols in the table
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Length of the longest code
    pub fn max_code_length(&self) -> usize {
        self.max_len
    }

    /// Encode `payload` into a self-delimiting bit stream
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, HuffmanError> {
        let mut writer = BitWriter::with_capacity(payload.len() / 2 + 1);
        for (offset, &symbol) in payload.iter().enumerate() {
            let code = self
                .code(symbol)
                .ok_or(HuffmanError::UnknownSymbol { symbol, offset })?;
            writer.write_code(code.bits, code.len);
        }

        let (body, padding) = writer.finish();
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        out.push(padding);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode a stream produced by [`encode`](Self::encode) with this table
    pub fn decode(&self, stream: &[u8]) -> Result<Vec<u8>, HuffmanError> {
        if stream.len() < HEADER_LEN {
            return Err(corrupt("truncated header"));
        }

        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&stream[..8]);
        let expected = u64::from_be_bytes(count_bytes);
        let padding = stream[8];
        let body = &stream[HEADER_LEN..];

        if padding > 7 {
            return Err(corrupt("padding exceeds one byte"));
        }
        let Some(&last) = body.last() else {
            return if expected == 0 && padding == 0 {
                Ok(Vec::new())
            } else {
                Err(corrupt("missing code bits"))
            };
        };
        if last & ((1u8 << padding) - 1) != 0 {
            return Err(corrupt("non-zero padding bits"));
        }

        let bit_len = body.len() * 8 - padding as usize;
        // Every code is at least one bit long
        if expected > bit_len as u64 {
            return Err(corrupt("symbol count exceeds available bits"));
        }

        let mut out = Vec::with_capacity(expected as usize);
        let mut reader = BitReader::new(body, bit_len);
        let mut code = 0u64;
        let mut len = 0usize;

        while let Some(bit) = reader.read_bit() {
            if out.len() as u64 == expected {
                return Err(corrupt("trailing bits after last symbol"));
            }

            code = (code << 1) | u64::from(bit);
            len += 1;

            if self.count[len] > 0 && code >= self.first_code[len] {
                let offset = code - self.first_code[len];
                if offset < self.count[len] as u64 {
                    out.push(self.symbols[self.first_index[len] + offset as usize]);
                    code = 0;
                    len = 0;
                    continue;
                }
            }

            // No code is longer than max_len
            if len == self.max_len {
                return Err(corrupt("bit pattern is not a code"));
            }
        }

        if len != 0 {
            return Err(corrupt("stream ends inside a code"));
        }
        if out.len() as u64 != expected {
            return Err(corrupt("symbol count mismatch"));
        }

        Ok(out)
    }
}

fn corrupt(reason: &'static str) -> HuffmanError {
    HuffmanError::CorruptStream { reason }
}

/// Derive `(symbol, code length)` pairs by greedy merging
fn code_lengths(weights: &[u64; 256], order: &[u8]) -> Result<Vec<(u8, usize)>, HuffmanError> {
    if let [only] = order {
        return Ok(vec![(*only, 1)]);
    }

    let mut nodes = Vec::with_capacity(order.len() * 2);
    let mut heap = BinaryHeap::with_capacity(order.len());

    // Node index doubles as insertion sequence for tie-breaking
    for &symbol in order {
        heap.push(Reverse((weights[symbol as usize], nodes.len())));
        nodes.push(Node {
            kind: NodeKind::Leaf(symbol),
        });
    }

    while heap.len() > 1 {
        let (Some(Reverse((w1, a))), Some(Reverse((w2, b)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        heap.push(Reverse((w1 + w2, nodes.len())));
        nodes.push(Node {
            kind: NodeKind::Internal(a, b),
        });
    }

    let root = nodes.len() - 1;
    let mut lengths = Vec::with_capacity(order.len());
    let mut stack = vec![(root, 0usize)];

    while let Some((index, depth)) = stack.pop() {
        match nodes[index].kind {
            NodeKind::Leaf(symbol) => {
                if depth > MAX_CODE_LENGTH {
                    return Err(HuffmanError::CodeLengthTooLong { length: depth });
                }
                lengths.push((symbol, depth));
            }
            NodeKind::Internal(left, right) => {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
    }

    Ok(lengths)
}
