//! Frame readers and writers for the upload stream.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{ProtocolError, Result};
use crate::status::TerminalStatus;

/// Read a u16-length-prefixed UTF-8 string.
pub fn read_utf<R: Read>(reader: &mut R) -> Result<String> {
    let len = reader.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

/// Write a u16-length-prefixed UTF-8 string.
pub fn write_utf<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    let len = s.len();
    if len > u16::MAX as usize {
        return Err(ProtocolError::StringTooLong { len });
    }
    writer.write_u16::<BigEndian>(len as u16)?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

/// Read the declared payload size. Negative values are a protocol violation.
pub fn read_file_size<R: Read>(reader: &mut R) -> Result<i64> {
    let size = reader.read_i64::<BigEndian>()?;
    if size < 0 {
        return Err(ProtocolError::NegativeFileSize { size });
    }
    Ok(size)
}

/// Write a declared payload size. The value is not validated here: the
/// reader side owns rejection, and tests exercise it with hostile input.
pub fn write_file_size<W: Write>(writer: &mut W, size: i64) -> Result<()> {
    writer.write_i64::<BigEndian>(size)?;
    Ok(())
}

/// Write the terminal status frame and flush it.
pub fn write_status<W: Write>(writer: &mut W, status: TerminalStatus) -> Result<()> {
    write_utf(writer, status.as_str())?;
    writer.flush()?;
    Ok(())
}

/// Read a terminal status frame (producer side).
pub fn read_status<R: Read>(reader: &mut R) -> Result<TerminalStatus> {
    read_utf(reader)?.parse()
}
