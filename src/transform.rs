//! The per-chunk transform primitive - decompression (or identity) applied to a chunk's
//! stored bytes to recover its logical payload.

use crate::error::Result;

/// A byte-level transform applied to each chunk's stored bytes.
///
/// `transform` returns the number of bytes written to `dst`, or a negative sentinel meaning
/// "not transformed, treat `src` as already being the logical payload" (a store/passthrough
/// codec). `copy` must return an independent instance so cloning a cursor never shares
/// transform state across threads.
pub trait ReadTransform: Send {
    fn set_config(&mut self, config: &[u8]) -> Result<()>;

    fn transform(&mut self, src: &[u8], dst: &mut [u8], expected_output: u64) -> Result<i64>;

    fn copy(&self) -> Box<dyn ReadTransform>;
}

/// The passthrough transform: chunk bytes are already the logical payload.
#[derive(Default, Clone, Copy)]
pub struct IdentityTransform;

impl ReadTransform for IdentityTransform {
    fn set_config(&mut self, _config: &[u8]) -> Result<()> {
        Ok(())
    }

    fn transform(&mut self, _src: &[u8], _dst: &mut [u8], _expected_output: u64) -> Result<i64> {
        Ok(-1)
    }

    fn copy(&self) -> Box<dyn ReadTransform> {
        Box::new(*self)
    }
}

/// Zstandard decompression, one independently framed chunk at a time.
///
/// The config blob is accepted and retained for forward compatibility but unused: the
/// distilled specification's data model defines no dictionary-exchange format, so a
/// dictionary-aware variant would need a format extension this crate does not speculate on.
#[derive(Default, Clone)]
pub struct ZstdTransform {
    config: Vec<u8>,
}

impl ZstdTransform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadTransform for ZstdTransform {
    fn set_config(&mut self, config: &[u8]) -> Result<()> {
        self.config = config.to_vec();
        Ok(())
    }

    fn transform(&mut self, src: &[u8], dst: &mut [u8], _expected_output: u64) -> Result<i64> {
        let n = zstd::bulk::decompress_to_buffer(src, dst)?;
        Ok(n as i64)
    }

    fn copy(&self) -> Box<dyn ReadTransform> {
        Box::new(self.clone())
    }
}
