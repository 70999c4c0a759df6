//! Transport codec for embedding vectors.
//!
//! Embeddings cross the collaborator boundary (and rest in external storage)
//! as base64-wrapped little-endian f32 payloads. The layout is stable and
//! versioned by construction: 4 bytes per component, component order equal to
//! input order, standard base64 with padding. `decode` is the exact inverse
//! of `encode`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

use crate::vector::types::{VectorDimension, VectorError};

/// Number of bytes per f32 component.
const BYTES_PER_F32: usize = 4;

/// Errors produced when decoding a transport-encoded vector.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(
        "Invalid base64 in encoded vector: {0}\nSuggestion: Check that the value was produced by this codec and not truncated in transit"
    )]
    Transport(#[from] base64::DecodeError),

    #[error(
        "Encoded payload of {len} bytes is not a whole number of f32 components\nSuggestion: The value is corrupted or was encoded with a different layout"
    )]
    TruncatedPayload { len: usize },

    #[error(
        "Decoded vector has {actual} components, expected {expected}\nSuggestion: Ensure the value comes from the deployment's configured embedding model"
    )]
    WrongDimension { expected: usize, actual: usize },
}

/// Encoder/decoder bound to a deployment's vector dimension.
///
/// Binding the dimension at construction turns every decode into a dimension
/// check, so a vector from a mismatched model can never enter the index.
#[derive(Debug, Clone, Copy)]
pub struct VectorCodec {
    dimension: VectorDimension,
}

impl VectorCodec {
    /// Creates a codec for the given dimension.
    #[must_use]
    pub const fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    /// Returns the dimension this codec validates against.
    #[must_use]
    pub const fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Encodes a vector into its transport form.
    ///
    /// Pure and deterministic; the only error path is dimension validation.
    pub fn encode(&self, vector: &[f32]) -> Result<String, VectorError> {
        self.dimension.validate_vector(vector)?;
        Ok(BASE64.encode(pack_f32_le(vector)))
    }

    /// Decodes a transport-encoded vector, validating layout and dimension.
    pub fn decode(&self, encoded: &str) -> Result<Vec<f32>, DecodeError> {
        let bytes = BASE64.decode(encoded)?;
        let vector = unpack_f32_le(&bytes)?;
        if vector.len() != self.dimension.get() {
            return Err(DecodeError::WrongDimension {
                expected: self.dimension.get(),
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

/// Packs f32 components into contiguous little-endian bytes.
pub(crate) fn pack_f32_le(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * BYTES_PER_F32);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Unpacks contiguous little-endian bytes into f32 components.
pub(crate) fn unpack_f32_le(bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
    if bytes.len() % BYTES_PER_F32 != 0 {
        return Err(DecodeError::TruncatedPayload { len: bytes.len() });
    }
    let mut vector = Vec::with_capacity(bytes.len() / BYTES_PER_F32);
    for chunk in bytes.chunks_exact(BYTES_PER_F32) {
        vector.push(f32::from_le_bytes(
            chunk.try_into().expect("chunk size verified"),
        ));
    }
    Ok(vector)
}
