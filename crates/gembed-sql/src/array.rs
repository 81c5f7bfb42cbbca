//! Decoder for the `texts_json` argument: a JSON-like array of quoted strings.
//!
//! Accepted grammar (not general JSON):
//!
//! ```text
//! ws* '[' ( ws* ( '"' literal '"' | ',' ) )* ws* ']' ws*
//! ```
//!
//! Inside a literal a backslash escapes exactly the next byte. Escapes are not
//! decoded: the stored string keeps the backslash and the escaped byte as they
//! appear in the input. Separating commas are not enforced, stray commas are
//! skipped.

use thiserror::Error;

use gembed_core::config::DEFAULT_DECODER_CAPACITY;

/// Why a `texts_json` argument was rejected. Offsets are byte positions in the input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected '[' at byte {0}")]
    MissingOpenBracket(usize),

    #[error("unexpected byte 0x{byte:02x} at byte {offset}")]
    UnexpectedByte { offset: usize, byte: u8 },

    #[error("unterminated string starting at byte {0}")]
    UnterminatedString(usize),

    #[error("missing closing ']'")]
    MissingCloseBracket,

    #[error("unexpected content after ']' at byte {0}")]
    TrailingContent(usize),
}

/// Ordered list of decoded strings, each independently owned.
///
/// Element storage starts at a fixed capacity and doubles whenever it fills up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringArray {
    items: Vec<Vec<u8>>,
}

impl StringArray {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, item: Vec<u8>) {
        if self.items.len() == self.items.capacity() {
            let grow_by = self.items.capacity().max(1);
            self.items.reserve_exact(grow_by);
        }
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.items.get(index).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.items.iter().map(Vec::as_slice)
    }

    /// Byte length of each element, in order.
    pub fn lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.items.iter().map(Vec::len)
    }

    pub fn as_slice(&self) -> &[Vec<u8>] {
        &self.items
    }
}

/// Decode with the default initial capacity.
pub fn decode(text: &[u8]) -> Result<StringArray, DecodeError> {
    decode_with_capacity(text, DEFAULT_DECODER_CAPACITY)
}

/// Decode `text` into its string elements.
///
/// `[]` is valid and yields an empty array. On error everything decoded so
/// far is dropped.
pub fn decode_with_capacity(text: &[u8], capacity: usize) -> Result<StringArray, DecodeError> {
    let mut pos = skip_whitespace(text, 0);
    if text.get(pos) != Some(&b'[') {
        return Err(DecodeError::MissingOpenBracket(pos));
    }
    pos += 1;

    let mut items = StringArray::with_capacity(capacity);
    loop {
        pos = skip_whitespace(text, pos);
        match text.get(pos) {
            None => return Err(DecodeError::MissingCloseBracket),
            Some(b']') => {
                pos += 1;
                break;
            }
            Some(b',') => pos += 1,
            Some(b'"') => {
                let (literal, next) = scan_literal(text, pos)?;
                items.push(literal.to_vec());
                pos = next;
            }
            Some(&byte) => return Err(DecodeError::UnexpectedByte { offset: pos, byte }),
        }
    }

    let rest = skip_whitespace(text, pos);
    if rest < text.len() {
        return Err(DecodeError::TrailingContent(rest));
    }
    Ok(items)
}

/// Scan the literal whose opening quote is at `quote`. Returns the raw bytes
/// between the quotes and the position after the closing quote.
fn scan_literal(text: &[u8], quote: usize) -> Result<(&[u8], usize), DecodeError> {
    let start = quote + 1;
    let mut pos = start;
    while pos < text.len() {
        match text[pos] {
            b'"' => return Ok((&text[start..pos], pos + 1)),
            b'\\' if pos + 1 < text.len() => pos += 2,
            _ => pos += 1,
        }
    }
    Err(DecodeError::UnterminatedString(quote))
}

fn skip_whitespace(text: &[u8], mut pos: usize) -> usize {
    while let Some(b' ' | b'\t' | b'\n' | b'\r') = text.get(pos) {
        pos += 1;
    }
    pos
}
