//! Image payload coding
//!
//! This module provides:
//! - MSB-first bit packing
//! - Canonical Huffman tables built from the payload being coded

pub mod bitio;
pub mod huffman;

pub use bitio::{BitReader, BitWriter};
pub use huffman::{Code, HuffmanError, HuffmanTable};
