use crate::error::DecodeError;

/// Cursor over raw wire bytes.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEnd {
                offset: self.pos,
                needed: n,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u32_le(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u64_le(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// Bitcoin CompactSize integer.
    pub(crate) fn varint(&mut self) -> Result<u64, DecodeError> {
        let [first] = self.array::<1>()?;
        Ok(match first {
            0xfd => u64::from(u16::from_le_bytes(self.array()?)),
            0xfe => u64::from(self.u32_le()?),
            0xff => self.u64_le()?,
            n => u64::from(n),
        })
    }

    /// A length read from the wire, bounded by what is left to read.
    pub(crate) fn length(&mut self) -> Result<usize, DecodeError> {
        let len = self.varint()?;
        if len > self.remaining() as u64 {
            return Err(DecodeError::LengthOverflow(len));
        }
        Ok(len as usize)
    }

    /// An item count read from the wire. Each item takes at least
    /// `min_item_size` bytes, so the count cannot exceed what is left.
    pub(crate) fn count(&mut self, min_item_size: usize) -> Result<usize, DecodeError> {
        let count = self.varint()?;
        if count > (self.remaining() / min_item_size.max(1)) as u64 {
            return Err(DecodeError::LengthOverflow(count));
        }
        Ok(count as usize)
    }

    pub(crate) fn var_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.length()?;
        self.take(len)
    }
}
