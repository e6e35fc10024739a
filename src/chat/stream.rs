// Streaming unmasker
// A bracketed token can be split across stream fragments; fragments are
// buffered up to the longest possible token before being emitted

use crate::masking::entity::EntityType;
use crate::masking::tokenizer::Tokenizer;

// A u32 counter prints at most 10 digits
const MAX_COUNTER_DIGITS: usize = 10;

fn max_token_len() -> usize {
    let max_prefix = EntityType::ALL
        .iter()
        .map(|t| t.prefix().len())
        .max()
        .unwrap_or(0);
    // "[" + prefix + "_" + digits + "]"
    max_prefix + MAX_COUNTER_DIGITS + 3
}

/// Applies unmasking to a stream of text fragments. Complete text is
/// emitted as soon as possible; only a trailing substring that could still
/// grow into a token is held back.
pub struct StreamUnmasker {
    buffer: String,
    max_token_len: usize,
}

impl StreamUnmasker {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            max_token_len: max_token_len(),
        }
    }

    /// Feed one fragment; returns the unmasked text that is safe to emit.
    pub fn feed(&mut self, chunk: &str, tokenizer: &Tokenizer) -> String {
        self.buffer.push_str(chunk);

        let hold_from = self.holdback_position();
        let emit: String = self.buffer[..hold_from].to_string();
        self.buffer.drain(..hold_from);

        if emit.is_empty() {
            String::new()
        } else {
            tokenizer.unmask_text(&emit).unmasked_text
        }
    }

    /// Flush whatever is left. Unmasking is total, so an unfinished
    /// bracket sequence comes out verbatim.
    pub fn finish(mut self, tokenizer: &Tokenizer) -> String {
        let rest = std::mem::take(&mut self.buffer);
        if rest.is_empty() {
            String::new()
        } else {
            tokenizer.unmask_text(&rest).unmasked_text
        }
    }

    // Byte index from which the buffer tail could still become a token
    fn holdback_position(&self) -> usize {
        let tail_start = self.buffer.len().saturating_sub(self.max_token_len);
        let mut search_from = self.buffer.len();
        while let Some(pos) = self.buffer[..search_from].rfind('[') {
            if pos < tail_start {
                break;
            }
            if could_be_token_prefix(&self.buffer[pos..]) {
                return pos;
            }
            search_from = pos;
        }
        self.buffer.len()
    }
}

impl Default for StreamUnmasker {
    fn default() -> Self {
        Self::new()
    }
}

// True when `s` is an incomplete prefix of the token grammar
// "[" PREFIX "_" N "]" (i.e. it may still close once more text arrives).
fn could_be_token_prefix(s: &str) -> bool {
    let mut chars = s.chars();
    if chars.next() != Some('[') {
        return false;
    }
    let rest = chars.as_str();
    let letters = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_uppercase()).len();
    let after_letters = &rest[letters..];
    if after_letters.is_empty() {
        return true; // "[", "[USE"
    }
    let Some(digits_part) = after_letters.strip_prefix('_') else {
        return false; // closed or malformed, nothing to wait for
    };
    if letters == 0 {
        return false;
    }
    digits_part.chars().all(|c| c.is_ascii_digit()) // "[USER_", "[USER_12"
}
