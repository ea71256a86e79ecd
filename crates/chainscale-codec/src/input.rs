//! Byte cursor used by every decoder.

use crate::error::CodecError;

/// Deepest chain of recursive type references a single decode may follow.
pub const MAX_DEPTH: usize = 256;

/// A forward-only cursor over a byte slice.
#[derive(Debug, Clone, Copy)]
pub struct Input<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Input<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, depth: 0 }
    }

    /// Enter one level of recursion. Fails past [`MAX_DEPTH`].
    pub fn descend(&mut self) -> Result<(), CodecError> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::DepthLimit { max: MAX_DEPTH });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_byte(&mut self) -> Result<u8, CodecError> {
        let b = *self.data.get(self.pos).ok_or(CodecError::Truncated {
            needed: 1,
            remaining: 0,
        })?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Fails with [`CodecError::TrailingBytes`] unless the input is exhausted.
    pub fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(CodecError::TrailingBytes { remaining }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_position() {
        let mut input = Input::new(&[1, 2, 3, 4]);
        assert_eq!(input.read_byte().unwrap(), 1);
        assert_eq!(input.read_bytes(2).unwrap(), &[2, 3]);
        assert_eq!(input.position(), 3);
        assert_eq!(input.remaining(), 1);
        assert!(input.finish().is_err());
    }

    #[test]
    fn short_read_reports_needed_bytes() {
        let mut input = Input::new(&[1]);
        let err = input.read_bytes(4).unwrap_err();
        assert_eq!(err, CodecError::Truncated { needed: 4, remaining: 1 });
        // a failed read does not consume anything
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn descend_stops_at_max_depth() {
        let mut input = Input::new(&[]);
        for _ in 0..MAX_DEPTH {
            input.descend().unwrap();
        }
        assert_eq!(input.descend(), Err(CodecError::DepthLimit { max: MAX_DEPTH }));
        input.ascend();
        assert_eq!(input.depth(), MAX_DEPTH - 1);
        assert!(input.descend().is_ok());
    }
}
