// Length-delimited framing over any byte stream.
//
// Wire format: a 4-byte big-endian payload length, then the payload. Payloads
// are JSON documents (see `message.rs`), but `write_frame` / `read_frame`
// only move bytes; `write_message` / `decode` add the JSON step.
//
// Keeping decode separate from read is what lets the server survive a bad
// frame: a payload that fails to parse has still been fully consumed, so the
// stream stays aligned and the next frame reads cleanly. An oversized length
// prefix is different: the stream can no longer be trusted and the read
// fails with `InvalidData`.

use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Largest accepted payload (1 MiB). A full snapshot for ten players is a
/// few kilobytes.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Write one frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = payload.len();
    if len > MAX_FRAME_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    #[expect(clippy::cast_possible_truncation)]
    let len_bytes = (len as u32).to_be_bytes();
    writer.write_all(&len_bytes)?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read one frame.
///
/// `UnexpectedEof` when the stream closes before or inside a frame;
/// `InvalidData` when the length prefix exceeds `MAX_FRAME_SIZE`.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Serialize `msg` as JSON and write it as one frame.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> io::Result<()> {
    let json = serde_json::to_vec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    write_frame(writer, &json)
}

/// Parse a frame payload.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(payload)
}
