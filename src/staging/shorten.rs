// src/staging/shorten.rs

//! Deep path shortening
//!
//! The packaging tool rejects directory trees deeper than it supports, so
//! staged directories at or beyond [`MAX_FOLDER_DEPTH`] are collapsed into
//! `deepfiles/<crc>`. The runtime resolves these names with the same hash,
//! which makes the CRC below a wire format: it is the MSB-first CRC-32
//! (polynomial `0x04C11DB7`, init and final XOR `0xFFFFFFFF`) over each
//! UTF-16 code unit of the lower-cased path, high byte first.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Depth at which a directory gets collapsed
pub const MAX_FOLDER_DEPTH: usize = 6;

/// Directory holding collapsed paths
pub const DEEP_FILES_DIR: &str = "deepfiles";

/// Outcome of [`shorten`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortenResult {
    pub shortened: bool,
    pub new_path: String,
}

/// Normalize a staged path the way both build and runtime see it
///
/// Backslashes become slashes, everything is lower-cased, anything up to and
/// including the final `../` is dropped and trailing slashes are removed.
pub fn normalize(path: &str) -> String {
    let mut normalized = path.replace('\\', "/").to_lowercase();
    if let Some(pos) = normalized.rfind("../") {
        normalized = normalized[pos + 3..].to_string();
    }
    normalized.trim_end_matches('/').to_string()
}

/// Count path segments by repeatedly taking the parent directory
pub fn folder_depth(path: &str) -> usize {
    let mut depth = 0;
    let mut current = path.trim_end_matches('/');
    while !current.is_empty() {
        depth += 1;
        current = match current.rfind('/') {
            Some(pos) => current[..pos].trim_end_matches('/'),
            None => "",
        };
    }
    depth
}

/// MSB-first CRC-32 of raw bytes
///
/// crc32fast computes the reflected form; feeding it bit-reversed bytes and
/// reversing the result yields the non-reflected CRC with identical
/// init/final XOR values.
pub fn crc32_msb(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    let reversed: Vec<u8> = bytes.iter().map(|b| b.reverse_bits()).collect();
    hasher.update(&reversed);
    hasher.finalize().reverse_bits()
}

/// Hash of a path string as the runtime computes it
pub fn path_crc(path: &str) -> u32 {
    let bytes: Vec<u8> = path
        .to_lowercase()
        .encode_utf16()
        .flat_map(|unit| unit.to_be_bytes())
        .collect();
    crc32_msb(&bytes)
}

/// Shorten a directory path if it is too deep
pub fn shorten(path: &str) -> ShortenResult {
    shorten_with(path, path_crc)
}

fn shorten_with(path: &str, hash: fn(&str) -> u32) -> ShortenResult {
    let normalized = normalize(path);
    if folder_depth(&normalized) >= MAX_FOLDER_DEPTH {
        ShortenResult {
            shortened: true,
            new_path: format!("{}/{:x}", DEEP_FILES_DIR, hash(&normalized)),
        }
    } else {
        ShortenResult {
            shortened: false,
            new_path: normalized,
        }
    }
}

/// Shortener with the reverse map used for collision detection
///
/// Every shortened path maps back to exactly one original directory; seeing a
/// second, different directory for the same hash is an integrity failure.
#[derive(Debug)]
pub struct PathShortener {
    reverse: HashMap<String, String>,
    hash: fn(&str) -> u32,
}

impl Default for PathShortener {
    fn default() -> Self {
        Self::new()
    }
}

impl PathShortener {
    pub fn new() -> Self {
        Self::with_hasher(path_crc)
    }

    /// Use a different hash function (tests force collisions this way)
    pub fn with_hasher(hash: fn(&str) -> u32) -> Self {
        Self {
            reverse: HashMap::new(),
            hash,
        }
    }

    /// Shorten a directory and record the mapping
    pub fn register(&mut self, directory: &str) -> Result<ShortenResult> {
        let result = shorten_with(directory, self.hash);
        if !result.shortened {
            return Ok(result);
        }

        let original = normalize(directory);
        match self.reverse.get(&result.new_path) {
            Some(existing) if *existing != original => Err(Error::PathCollision {
                shortened: result.new_path,
                existing: existing.clone(),
                incoming: original,
            }),
            Some(_) => Ok(result),
            None => {
                tracing::debug!("Shortened {} -> {}", original, result.new_path);
                self.reverse.insert(result.new_path.clone(), original);
                Ok(result)
            }
        }
    }

    /// Original directory for a shortened path
    pub fn resolve(&self, shortened: &str) -> Option<&str> {
        self.reverse.get(shortened).map(String::as_str)
    }

    /// All recorded mappings (shortened -> original)
    pub fn mappings(&self) -> &HashMap<String, String> {
        &self.reverse
    }
}
