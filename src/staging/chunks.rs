// src/staging/chunks.rs
//! Chunk resolution for staged files
//!
//! Resolution order, highest priority first:
//! 1. custom `"pattern:chunk"` glob overrides from the configuration
//! 2. install-bundle regular expressions
//! 3. the `pakchunk<N>` file-name prefix written by the cooker
//!
//! Anything left over lands in chunk 0.

use crate::config::{ChunkConfig, parse_numbered_entries};
use crate::error::{Error, Result};
use glob::Pattern;
use regex::Regex;
use tracing::warn;

const PAKCHUNK_PREFIX: &str = "pakchunk";

/// Highest chunk id a package may declare
pub const MAX_CHUNK_ID: u32 = 999;

/// Compiled chunk rules
#[derive(Debug, Default)]
pub struct ChunkRules {
    custom: Vec<(Pattern, u32)>,
    bundles: Vec<(Regex, u32)>,
}

impl ChunkRules {
    /// Compile the rules from configuration
    ///
    /// Unparsable custom entries, invalid globs and out-of-range chunk ids
    /// are skipped with a warning; an invalid bundle regex is an error.
    pub fn from_config(config: &ChunkConfig) -> Result<Self> {
        let mut custom = Vec::new();
        for (pattern, chunk) in parse_numbered_entries(&config.custom, "custom chunk") {
            if chunk > MAX_CHUNK_ID {
                warn!("Ignoring chunk glob '{}': chunk {} is out of range", pattern, chunk);
                continue;
            }
            match Pattern::new(&pattern.to_lowercase()) {
                Ok(compiled) => custom.push((compiled, chunk)),
                Err(e) => warn!("Ignoring invalid chunk glob '{}': {}", pattern, e),
            }
        }

        let mut bundles = Vec::new();
        for bundle in &config.install_bundles {
            if bundle.chunk > MAX_CHUNK_ID {
                warn!("Ignoring install bundle for out-of-range chunk {}", bundle.chunk);
                continue;
            }
            for pattern in &bundle.patterns {
                let regex = Regex::new(&format!("(?i){}", pattern))?;
                bundles.push((regex, bundle.chunk));
            }
        }

        Ok(Self { custom, bundles })
    }

    /// Chunk for a staged file, given its normalized relative path
    pub fn resolve(&self, relative_path: &str) -> u32 {
        let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);

        for (pattern, chunk) in &self.custom {
            let subject = if pattern.as_str().contains('/') {
                relative_path
            } else {
                file_name
            };
            if pattern.matches(subject) {
                return *chunk;
            }
        }

        for (regex, chunk) in &self.bundles {
            if regex.is_match(relative_path) {
                return *chunk;
            }
        }

        pakchunk_id(file_name).unwrap_or(0)
    }
}

/// Chunk id encoded in a `pakchunk<N>...` file name
///
/// Returns `None` when the prefix is absent, no digits follow it, or the
/// number is above [`MAX_CHUNK_ID`].
pub fn pakchunk_id(file_name: &str) -> Option<u32> {
    let lower = file_name.to_lowercase();
    let rest = lower.strip_prefix(PAKCHUNK_PREFIX)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    match digits.parse::<u32>() {
        Ok(id) if id <= MAX_CHUNK_ID => Some(id),
        _ => {
            warn!("Chunk id in '{}' is out of range, using chunk 0", file_name);
            None
        }
    }
}

/// Total number of chunks the package declares
///
/// `max(1, max_file_chunk + 1, max_language_chunk + 1)`. Any id above
/// [`MAX_CHUNK_ID`] is a configuration error.
pub fn total_chunk_count(
    file_chunks: impl IntoIterator<Item = u32>,
    language_chunks: impl IntoIterator<Item = u32>,
) -> Result<u32> {
    let mut count = 1;
    for chunk in file_chunks.into_iter().chain(language_chunks) {
        if chunk > MAX_CHUNK_ID {
            return Err(Error::Config(format!(
                "chunk id {} exceeds the maximum of {}",
                chunk, MAX_CHUNK_ID
            )));
        }
        count = count.max(chunk + 1);
    }
    Ok(count)
}
