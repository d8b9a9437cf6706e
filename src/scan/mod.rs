//! Streaming substring search over byte sequences.
//!
//! A [`Delimiter`] precomputes the failure function of its pattern once, so
//! that a [`Matcher`] can be fed one byte at a time without ever re-reading a
//! byte: on a mismatch with `k` bytes matched it falls back to the longest
//! proper prefix of the pattern that is also a suffix of those `k` bytes and
//! re-tests the current byte from there. Total work is linear in the number
//! of bytes fed, whatever the pattern looks like.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiter {
    bytes: Vec<u8>,
    // failure[i] is the length of the longest proper prefix of bytes[..=i]
    // that is also a suffix of it.
    failure: Vec<usize>,
}

impl Delimiter {
    pub fn new<B>(bytes: B) -> Result<Self>
    where
        B: Into<Vec<u8>>,
    {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::Config("delimiter must not be empty".into()));
        }
        let failure = failure_function(&bytes);
        Ok(Delimiter { bytes, failure })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn matcher(&self) -> Matcher<'_> {
        Matcher {
            delimiter: self,
            matched: 0,
        }
    }

    /// Index of the first occurrence of the delimiter in `haystack`.
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        let mut m = self.matcher();
        haystack
            .iter()
            .position(|b| m.push(*b))
            .map(|end| end + 1 - self.len())
    }

    /// Splits `haystack` on every non-overlapping occurrence of the
    /// delimiter, left to right. Always yields at least one piece.
    pub fn split<'a>(&'a self, haystack: &'a [u8]) -> Split<'a> {
        Split {
            delimiter: self,
            rest: Some(haystack),
        }
    }
}

fn failure_function(pattern: &[u8]) -> Vec<usize> {
    let mut failure = vec![0; pattern.len()];
    let mut k = 0;
    for i in 1..pattern.len() {
        while k > 0 && pattern[i] != pattern[k] {
            k = failure[k - 1];
        }
        if pattern[i] == pattern[k] {
            k += 1;
        }
        failure[i] = k;
    }
    failure
}

/// Matching state for one scan. The matcher only tracks how much of the
/// delimiter is currently matched; the caller keeps the bytes.
#[derive(Debug, Clone)]
pub struct Matcher<'a> {
    delimiter: &'a Delimiter,
    matched: usize,
}

impl<'a> Matcher<'a> {
    /// Feeds one byte. Returns true when this byte completes a match, after
    /// which the matcher starts over from an empty state.
    pub fn push(&mut self, b: u8) -> bool {
        let pattern = &self.delimiter.bytes;
        while self.matched > 0 && pattern[self.matched] != b {
            self.matched = self.delimiter.failure[self.matched - 1];
        }
        if pattern[self.matched] == b {
            self.matched += 1;
        }
        if self.matched == pattern.len() {
            self.matched = 0;
            true
        } else {
            false
        }
    }

    /// Number of trailing bytes seen so far that form a prefix of the
    /// delimiter.
    pub fn matched(&self) -> usize {
        self.matched
    }

    pub fn reset(&mut self) {
        self.matched = 0;
    }
}

pub struct Split<'a> {
    delimiter: &'a Delimiter,
    rest: Option<&'a [u8]>,
}

impl<'a> Iterator for Split<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest?;
        match self.delimiter.find(rest) {
            Some(idx) => {
                self.rest = Some(&rest[idx + self.delimiter.len()..]);
                Some(&rest[..idx])
            }
            None => {
                self.rest = None;
                Some(rest)
            }
        }
    }
}
