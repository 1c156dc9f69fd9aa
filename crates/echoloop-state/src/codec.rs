//! Binary artifact codec
//!
//! Layout (little-endian): `MAGIC "ECHO"`, `version: u32`, `flags: u32`,
//! `timestamp_nanos: i64`, `checksum_len: u32`, `payload_len: u64`, then the
//! raw SHA-256 checksum and the JSON payload. The checksum always covers the
//! uncompressed payload. When the compression flag is set the whole
//! header+checksum+payload block is written as one gzip stream, detectable by
//! its 0x1f 0x8b magic.

use echoloop_core::{Artifact, Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ring::digest::{digest, SHA256};
use std::io::{Read, Write};

pub const MAGIC: [u8; 4] = *b"ECHO";
pub const FLAG_COMPRESSED: u32 = 1;

const CHECKSUM_LEN: usize = 32;
const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 4 + 8;

/// Largest payload `decode` will allocate for. Guards against parsing a
/// corrupted length field, not against legitimate large states.
const MAX_PAYLOAD_LEN: u64 = 256 * 1024 * 1024;

/// Hex SHA-256 of a byte slice.
pub fn checksum_hex(data: &[u8]) -> String {
    let hash = digest(&SHA256, data);
    hash.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
}

/// Fill in `artifact.checksum`: hex SHA-256 of the artifact JSON serialized
/// with the checksum field empty. Deltas key off this value.
pub fn seal(artifact: &mut Artifact) -> Result<()> {
    artifact.checksum = String::new();
    let canonical = serde_json::to_vec(artifact)?;
    artifact.checksum = checksum_hex(&canonical);
    Ok(())
}

/// Encode an artifact to its on-disk bytes. Returns the bytes and the hex
/// checksum of the uncompressed payload (the value indexed in `SnapshotInfo`).
pub fn encode(artifact: &Artifact, compress: bool) -> Result<(Vec<u8>, String)> {
    let payload = serde_json::to_vec(artifact)?;
    let hash = digest(&SHA256, &payload);
    let checksum = hash.as_ref();

    let flags = if compress { FLAG_COMPRESSED } else { 0 };
    let timestamp_nanos = artifact.timestamp.timestamp_nanos_opt().unwrap_or(0);

    let mut buf = Vec::with_capacity(HEADER_LEN + CHECKSUM_LEN + payload.len());
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&artifact.version.to_le_bytes());
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&timestamp_nanos.to_le_bytes());
    buf.extend_from_slice(&(checksum.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(checksum);
    buf.extend_from_slice(&payload);

    let checksum_hex: String = checksum.iter().map(|b| format!("{:02x}", b)).collect();

    if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&buf)?;
        let compressed = encoder.finish()?;
        Ok((compressed, checksum_hex))
    } else {
        Ok((buf, checksum_hex))
    }
}

/// Decode on-disk bytes back into an artifact.
///
/// Fails closed: any magic, length, or checksum mismatch returns an error
/// without attempting partial deserialization.
pub fn decode(bytes: &[u8]) -> Result<Artifact> {
    let raw;
    let data: &[u8] = if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        raw = out;
        &raw
    } else {
        bytes
    };

    if data.len() < HEADER_LEN {
        return Err(Error::InvalidArtifact("truncated header".into()));
    }
    if data[..4] != MAGIC {
        return Err(Error::InvalidArtifact("bad magic".into()));
    }

    let version = u32::from_le_bytes(data[4..8].try_into().unwrap_or_default());
    let _flags = u32::from_le_bytes(data[8..12].try_into().unwrap_or_default());
    let _timestamp_nanos = i64::from_le_bytes(data[12..20].try_into().unwrap_or_default());
    let checksum_len = u32::from_le_bytes(data[20..24].try_into().unwrap_or_default()) as usize;
    let payload_len = u64::from_le_bytes(data[24..32].try_into().unwrap_or_default());

    if version == 0 || version > echoloop_core::ARTIFACT_VERSION {
        return Err(Error::InvalidArtifact(format!(
            "unsupported artifact version {}",
            version
        )));
    }
    if checksum_len != CHECKSUM_LEN {
        return Err(Error::InvalidArtifact(format!(
            "unexpected checksum length {}",
            checksum_len
        )));
    }
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(Error::InvalidArtifact(format!(
            "payload length {} exceeds limit",
            payload_len
        )));
    }

    let body_start = HEADER_LEN + checksum_len;
    let expected_len = body_start + payload_len as usize;
    if data.len() != expected_len {
        return Err(Error::InvalidArtifact(format!(
            "length mismatch: have {} bytes, header says {}",
            data.len(),
            expected_len
        )));
    }

    let stored_checksum = &data[HEADER_LEN..body_start];
    let payload = &data[body_start..];

    let computed = digest(&SHA256, payload);
    if computed.as_ref() != stored_checksum {
        return Err(Error::ChecksumMismatch);
    }

    let artifact: Artifact = serde_json::from_slice(payload)?;
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use echoloop_core::Artifact;

    fn sample() -> Artifact {
        let mut artifact = Artifact::new("codec test", 8);
        artifact.clock.current_step = 7;
        artifact.clock.cycle_count = 3;
        artifact.metrics.total_steps = 39;
        artifact
    }

    #[test]
    fn encode_decode_roundtrip() {
        let artifact = sample();
        let (bytes, _) = encode(&artifact, false).unwrap();
        let restored = decode(&bytes).unwrap();
        assert_eq!(restored.clock.current_step, 7);
        assert_eq!(restored.clock.cycle_count, 3);
        assert_eq!(restored.metrics.total_steps, 39);
    }

    #[test]
    fn compressed_roundtrip_and_gzip_magic() {
        let artifact = sample();
        let (bytes, _) = encode(&artifact, true).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        let restored = decode(&bytes).unwrap();
        assert_eq!(restored.clock.cycle_count, 3);
    }

    #[test]
    fn header_starts_with_echo_magic() {
        let (bytes, _) = encode(&sample(), false).unwrap();
        assert_eq!(&bytes[..4], b"ECHO");
    }

    #[test]
    fn flipped_payload_byte_is_checksum_mismatch() {
        let (mut bytes, _) = encode(&sample(), false).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        match decode(&bytes) {
            Err(Error::ChecksumMismatch) => {}
            other => panic!("expected ChecksumMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn flipped_checksum_byte_is_checksum_mismatch() {
        let (mut bytes, _) = encode(&sample(), false).unwrap();
        bytes[HEADER_LEN] ^= 0x01;
        assert!(matches!(decode(&bytes), Err(Error::ChecksumMismatch)));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let (mut bytes, _) = encode(&sample(), false).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(Error::InvalidArtifact(_))));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let (bytes, _) = encode(&sample(), false).unwrap();
        assert!(matches!(
            decode(&bytes[..bytes.len() - 4]),
            Err(Error::InvalidArtifact(_))
        ));
    }

    #[test]
    fn seal_is_stable_and_sensitive() {
        let mut a = sample();
        seal(&mut a).unwrap();
        let first = a.checksum.clone();
        assert_eq!(first.len(), 64);

        seal(&mut a).unwrap();
        assert_eq!(a.checksum, first, "sealing twice must not drift");

        a.clock.cycle_count += 1;
        seal(&mut a).unwrap();
        assert_ne!(a.checksum, first);
    }
}
