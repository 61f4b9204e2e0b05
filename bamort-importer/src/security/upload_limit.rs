//! Upload byte ceiling
//!
//! Uploads are read chunk by chunk into a [`CappedBuffer`]; the first chunk
//! that would cross the ceiling fails the read, no matter how the body is
//! split into chunks.

use super::SecurityError;
use axum::body::Bytes;
use axum::extract::multipart::Field;

/// Growable buffer that refuses to exceed `limit` bytes
#[derive(Debug)]
pub struct CappedBuffer {
    buf: Vec<u8>,
    limit: usize,
}

impl CappedBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    /// Append `chunk`, failing once the total would exceed the limit
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), SecurityError> {
        if self.buf.len() + chunk.len() > self.limit {
            return Err(SecurityError::FileTooLarge { limit: self.limit });
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

/// Failure while reading a multipart field under the ceiling
#[derive(Debug)]
pub enum FieldReadError {
    Limit(SecurityError),
    Multipart(axum::extract::multipart::MultipartError),
}

/// Read one multipart field, failing as soon as it exceeds `limit` bytes
pub async fn read_field_limited(mut field: Field<'_>, limit: usize) -> Result<Bytes, FieldReadError> {
    let mut buffer = CappedBuffer::new(limit);
    while let Some(chunk) = field.chunk().await.map_err(FieldReadError::Multipart)? {
        buffer.push(&chunk).map_err(FieldReadError::Limit)?;
    }
    Ok(buffer.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_exactly_the_limit() {
        let mut buffer = CappedBuffer::new(8);
        buffer.push(b"1234").unwrap();
        buffer.push(b"5678").unwrap();
        assert_eq!(buffer.len(), 8);
        assert_eq!(&buffer.into_bytes()[..], b"12345678");
    }

    #[test]
    fn test_rejects_one_byte_over() {
        let mut buffer = CappedBuffer::new(8);
        buffer.push(b"12345678").unwrap();
        assert_eq!(
            buffer.push(b"9"),
            Err(SecurityError::FileTooLarge { limit: 8 })
        );
    }

    #[test]
    fn test_rejection_independent_of_chunking() {
        let data = vec![b'x'; 100];
        for chunk_size in [1, 7, 50, 100] {
            let mut buffer = CappedBuffer::new(99);
            let result: Result<(), SecurityError> =
                data.chunks(chunk_size).try_for_each(|chunk| buffer.push(chunk));
            assert!(result.is_err(), "chunk size {} should overflow", chunk_size);
        }
    }
}
