//! Body compression codec.
//!
//! Bodies at or above a size threshold are stored gzip-compressed and tagged
//! with a content-encoding; everything else is stored raw with no tag. Reads
//! decode according to the tag and fail on encodings this build does not
//! know.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;
use std::io::{Read, Write};
use strata_core::CodecError;

/// Content-encoding tag written alongside compressed objects.
pub const GZIP_TAG: &str = "gzip";

/// How a resource body is encoded at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    /// Stored raw, no content-encoding tag.
    Identity,
    /// Gzip-compressed, tagged `gzip`.
    Gzip,
}

impl ContentCoding {
    /// Pick the coding for a body of `len` bytes given the configured
    /// threshold.
    pub fn for_size(len: usize, min_size: usize) -> Self {
        if len >= min_size {
            ContentCoding::Gzip
        } else {
            ContentCoding::Identity
        }
    }

    /// Resolve a stored content-encoding tag. Unknown encodings fail the
    /// read rather than hand back bytes the caller cannot interpret.
    pub fn from_tag(tag: Option<&str>) -> Result<Self, CodecError> {
        match tag {
            None => Ok(ContentCoding::Identity),
            Some(GZIP_TAG) => Ok(ContentCoding::Gzip),
            Some(other) => Err(CodecError::UnknownEncoding {
                encoding: other.to_string(),
            }),
        }
    }

    /// The tag to store with an object encoded this way.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            ContentCoding::Identity => None,
            ContentCoding::Gzip => Some(GZIP_TAG),
        }
    }

    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            ContentCoding::Identity => Ok(data.to_vec()),
            ContentCoding::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), GzCompression::default());
                encoder.write_all(data).map_err(|error| CodecError::Compress {
                    reason: error.to_string(),
                })?;
                encoder.finish().map_err(|error| CodecError::Compress {
                    reason: error.to_string(),
                })
            }
        }
    }

    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            ContentCoding::Identity => Ok(data.to_vec()),
            ContentCoding::Gzip => {
                let mut decoder = GzDecoder::new(data);
                let mut output = Vec::with_capacity(data.len());
                decoder
                    .read_to_end(&mut output)
                    .map_err(|error| CodecError::Decompress {
                        reason: error.to_string(),
                    })?;
                Ok(output)
            }
        }
    }
}
