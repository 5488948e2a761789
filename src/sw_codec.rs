// Wire encoding of swarm messages
//
// <kind:u8><fields...>
//
// names:   <len:u32><utf-8 bytes>
// lists:   <count:u32><items...>
// hashes:  32 raw bytes, all-zero for a negative acknowledgement
// ids:     u32 participant / segment index, u64 request id
//
// Everything is big-endian. Lengths are checked against the remaining frame
// before any allocation takes place.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::sw_error::CodecError;
use crate::sw_interface::{Manifest, Message, ParticipantId, SegmentHash, HASH_SIZE};

const KIND_REGISTER: u8 = 0;
const KIND_START_ACK: u8 = 1;
const KIND_LOOKUP: u8 = 2;
const KIND_LOOKUP_REPLY: u8 = 3;
const KIND_REFRESH: u8 = 4;
const KIND_SEEDERS_REPLY: u8 = 5;
const KIND_UNKNOWN_FILE: u8 = 6;
const KIND_REPORT_COMPLETE: u8 = 7;
const KIND_SEGMENT_REQUEST: u8 = 8;
const KIND_SEGMENT_REPLY: u8 = 9;
const KIND_SHUTDOWN: u8 = 10;

pub fn encode(message: &Message) -> Bytes {
    let mut dst = BytesMut::with_capacity(64);

    match message {
        Message::Register { files } => {
            dst.put_u8(KIND_REGISTER);
            dst.put_u32(files.len() as u32);
            for (name, manifest) in files {
                put_name(&mut dst, name);
                put_manifest(&mut dst, manifest);
            }
        }
        Message::StartAck => dst.put_u8(KIND_START_ACK),
        Message::LookupAndJoin { file } => {
            dst.put_u8(KIND_LOOKUP);
            put_name(&mut dst, file);
        }
        Message::LookupReply { manifest, seeders } => {
            dst.put_u8(KIND_LOOKUP_REPLY);
            put_manifest(&mut dst, manifest);
            put_seeders(&mut dst, seeders);
        }
        Message::RefreshSeeders { file } => {
            dst.put_u8(KIND_REFRESH);
            put_name(&mut dst, file);
        }
        Message::SeedersReply { seeders } => {
            dst.put_u8(KIND_SEEDERS_REPLY);
            put_seeders(&mut dst, seeders);
        }
        Message::UnknownFile { file } => {
            dst.put_u8(KIND_UNKNOWN_FILE);
            put_name(&mut dst, file);
        }
        Message::ReportComplete => dst.put_u8(KIND_REPORT_COMPLETE),
        Message::SegmentRequest {
            file,
            index,
            request,
        } => {
            dst.put_u8(KIND_SEGMENT_REQUEST);
            put_name(&mut dst, file);
            dst.put_u32(*index);
            dst.put_u64(*request);
        }
        Message::SegmentReply { index, hash } => {
            dst.put_u8(KIND_SEGMENT_REPLY);
            dst.put_u32(*index);
            dst.put_slice(hash.as_bytes());
        }
        Message::Shutdown => dst.put_u8(KIND_SHUTDOWN),
    }

    dst.freeze()
}

pub fn decode(mut src: Bytes) -> Result<Message, CodecError> {
    let kind = get_u8(&mut src)?;

    let message = match kind {
        KIND_REGISTER => {
            let count = get_count(&mut src, 8)?;
            let mut files = Vec::with_capacity(count);
            for _ in 0..count {
                let name = get_name(&mut src)?;
                let manifest = get_manifest(&mut src)?;
                files.push((name, manifest));
            }
            Message::Register { files }
        }
        KIND_START_ACK => Message::StartAck,
        KIND_LOOKUP => Message::LookupAndJoin {
            file: get_name(&mut src)?,
        },
        KIND_LOOKUP_REPLY => {
            let manifest = get_manifest(&mut src)?;
            let seeders = get_seeders(&mut src)?;
            Message::LookupReply { manifest, seeders }
        }
        KIND_REFRESH => Message::RefreshSeeders {
            file: get_name(&mut src)?,
        },
        KIND_SEEDERS_REPLY => Message::SeedersReply {
            seeders: get_seeders(&mut src)?,
        },
        KIND_UNKNOWN_FILE => Message::UnknownFile {
            file: get_name(&mut src)?,
        },
        KIND_REPORT_COMPLETE => Message::ReportComplete,
        KIND_SEGMENT_REQUEST => {
            let file = get_name(&mut src)?;
            let index = get_u32(&mut src)?;
            ensure(&src, 8)?;
            let request = src.get_u64();
            Message::SegmentRequest {
                file,
                index,
                request,
            }
        }
        KIND_SEGMENT_REPLY => {
            let index = get_u32(&mut src)?;
            let hash = get_hash(&mut src)?;
            Message::SegmentReply { index, hash }
        }
        KIND_SHUTDOWN => Message::Shutdown,
        other => return Err(CodecError::UnknownKind(other)),
    };

    if src.has_remaining() {
        return Err(CodecError::Trailing(src.remaining()));
    }

    Ok(message)
}

// ============================================================================
// Field helpers
// ============================================================================

fn put_name(dst: &mut BytesMut, name: &str) {
    dst.put_u32(name.len() as u32);
    dst.put_slice(name.as_bytes());
}

fn put_manifest(dst: &mut BytesMut, manifest: &Manifest) {
    dst.put_u32(manifest.len() as u32);
    for hash in manifest {
        dst.put_slice(hash.as_bytes());
    }
}

fn put_seeders(dst: &mut BytesMut, seeders: &[ParticipantId]) {
    dst.put_u32(seeders.len() as u32);
    for seeder in seeders {
        dst.put_u32(*seeder);
    }
}

fn ensure(src: &Bytes, needed: usize) -> Result<(), CodecError> {
    if src.remaining() < needed {
        return Err(CodecError::Truncated {
            needed: needed - src.remaining(),
        });
    }
    Ok(())
}

fn get_u8(src: &mut Bytes) -> Result<u8, CodecError> {
    ensure(src, 1)?;
    Ok(src.get_u8())
}

fn get_u32(src: &mut Bytes) -> Result<u32, CodecError> {
    ensure(src, 4)?;
    Ok(src.get_u32())
}

/// Reads a count and rejects it if `count * item_size` can't fit the frame
fn get_count(src: &mut Bytes, item_size: usize) -> Result<usize, CodecError> {
    let count = get_u32(src)? as usize;
    if count.saturating_mul(item_size) > src.remaining() {
        return Err(CodecError::Oversized(count));
    }
    Ok(count)
}

fn get_name(src: &mut Bytes) -> Result<String, CodecError> {
    let len = get_count(src, 1)?;
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

fn get_hash(src: &mut Bytes) -> Result<SegmentHash, CodecError> {
    ensure(src, HASH_SIZE)?;
    let mut bytes = [0u8; HASH_SIZE];
    src.copy_to_slice(&mut bytes);
    Ok(SegmentHash::from_bytes(bytes))
}

fn get_manifest(src: &mut Bytes) -> Result<Manifest, CodecError> {
    let count = get_count(src, HASH_SIZE)?;
    (0..count).map(|_| get_hash(src)).collect()
}

fn get_seeders(src: &mut Bytes) -> Result<Vec<ParticipantId>, CodecError> {
    let count = get_count(src, 4)?;
    (0..count).map(|_| get_u32(src)).collect()
}
