use bytes::Bytes;

/// Stateful long-read over a stored blob, in the GATT style: each call
/// yields at most `mtu - 3` bytes; an empty chunk terminates the
/// transfer and rearms the reader.
#[derive(Debug)]
pub struct ChunkedRead {
    data: Bytes,
    offset: usize,
}

impl ChunkedRead {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            offset: 0,
        }
    }

    /// Next response chunk for the given MTU. Empty once exhausted.
    pub fn next_chunk(&mut self, mtu: usize) -> Bytes {
        let budget = mtu.saturating_sub(3);
        if budget == 0 || self.offset >= self.data.len() {
            self.offset = 0;
            return Bytes::new();
        }
        let end = (self.offset + budget).min(self.data.len());
        let chunk = self.data.slice(self.offset..end);
        self.offset = end;
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_mtu_minus_three_and_terminates_empty() {
        let mut rd = ChunkedRead::new(&b"abcdefgh"[..]);
        assert_eq!(rd.next_chunk(6).as_ref(), b"abc");
        assert_eq!(rd.next_chunk(6).as_ref(), b"def");
        assert_eq!(rd.next_chunk(6).as_ref(), b"gh");
        assert!(rd.next_chunk(6).is_empty());
        // rearmed after the empty terminator
        assert_eq!(rd.next_chunk(6).as_ref(), b"abc");
    }
}
