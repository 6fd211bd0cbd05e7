use base64::{engine::general_purpose::STANDARD, Engine as _};

use common::storage::types::document::ParentPayload;

/// Magic-byte prefixes for the image formats the corpus extraction step
/// produces.
const IMAGE_SIGNATURES: [&[u8]; 4] = [
    b"\xFF\xD8\xFF",                     // jpg
    b"\x89\x50\x4E\x47\x0D\x0A\x1A\x0A", // png
    b"\x47\x49\x46\x38",                 // gif
    b"\x52\x49\x46\x46",                 // webp (riff container)
];

/// Cheap shape check before attempting a decode: base64 alphabet with at
/// most two trailing padding characters.
pub fn looks_like_base64(candidate: &str) -> bool {
    if candidate.is_empty() {
        return false;
    }
    let trimmed = candidate.trim_end_matches('=');
    if candidate.len() - trimmed.len() > 2 {
        return false;
    }
    !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/')
}

/// Whether the base64 payload decodes to bytes starting with a known image
/// signature.
pub fn is_image_data(encoded: &str) -> bool {
    match STANDARD.decode(encoded) {
        Ok(bytes) => IMAGE_SIGNATURES
            .iter()
            .any(|signature| bytes.starts_with(signature)),
        Err(_) => false,
    }
}

/// Retrieval output split into prompt-ready groups: raw images on one side,
/// plain text on the other.
#[derive(Debug, Default, PartialEq)]
pub struct PartitionedPayloads {
    pub images: Vec<String>,
    pub texts: Vec<String>,
}

pub fn partition_payloads(payloads: &[ParentPayload]) -> PartitionedPayloads {
    let mut partitioned = PartitionedPayloads::default();

    for payload in payloads {
        let content = match payload {
            ParentPayload::Document(doc) => doc.page_content.as_str(),
            ParentPayload::Image(encoded) => encoded.as_str(),
        };

        if looks_like_base64(content) && is_image_data(content) {
            partitioned.images.push(content.to_owned());
        } else {
            partitioned.texts.push(content.to_owned());
        }
    }

    partitioned
}
