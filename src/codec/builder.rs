//! Reusable serialization buffer for outbound bodies.

use serde::Serialize;

use crate::error::Result;

/// Default initial capacity of the encode buffer.
pub const DEFAULT_BUILDER_CAPACITY: usize = 256;

/// Retained encode buffer.
///
/// Each encode clears the buffer, serializes into it, and returns a view.
/// The buffer grows on demand and is never shrunk, so steady-state encoding
/// allocates nothing. The returned view is only valid until the next encode;
/// callers copy it into a frame or hand it off before encoding again.
#[derive(Debug)]
pub struct EncodeBuilder {
    buf: Vec<u8>,
}

impl EncodeBuilder {
    /// Create a builder with the default initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUILDER_CAPACITY)
    }

    /// Create a builder with a custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Serialize `value` into the retained buffer and return a view of it.
    pub fn encode<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&[u8]> {
        self.buf.clear();
        rmp_serde::encode::write_named(&mut self.buf, value)?;
        Ok(&self.buf)
    }

    /// Current buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}

impl Default for EncodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_matches_codec_output() {
        let mut builder = EncodeBuilder::new();
        let view = builder.encode("hello").unwrap();
        assert_eq!(view, rmp_serde::to_vec_named(&"hello").unwrap());
    }

    #[test]
    fn test_reuse_clears_previous_content() {
        let mut builder = EncodeBuilder::new();

        let first = builder.encode("a longer first value").unwrap().to_vec();
        let second = builder.encode(&7u32).unwrap().to_vec();

        assert_ne!(first, second);
        assert_eq!(second, rmp_serde::to_vec_named(&7u32).unwrap());
    }

    #[test]
    fn test_initial_capacity() {
        let builder = EncodeBuilder::with_capacity(1024);
        assert!(builder.capacity() >= 1024);
    }

    #[test]
    fn test_capacity_retained_after_large_encode() {
        let mut builder = EncodeBuilder::with_capacity(16);
        let big = vec![0u8; 4096];
        builder.encode(&big).unwrap();
        let grown = builder.capacity();

        builder.encode(&1u8).unwrap();
        assert_eq!(builder.capacity(), grown);
    }
}
