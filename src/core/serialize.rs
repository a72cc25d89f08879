// Binary codec for ledger records
//
// Every record is encoded field by field in declaration order. Variable
// length fields carry a VarInt length prefix, integers are little-endian.

use crate::error::{LedgerError, Result};
use std::io::{self, Cursor, Read, Write};

/// Trait for types stored in the ledger or committed to by hashes
pub trait Serializable: Sized {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()>;
    fn read_from<R: Read>(reader: &mut R) -> Result<Self>;

    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)
            .expect("writing into a Vec never fails");
        buf
    }

    /// Decode a complete record; trailing bytes are rejected
    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let value = Self::read_from(&mut cursor)?;
        if cursor.position() as usize != data.len() {
            return Err(LedgerError::CorruptEncoding(format!(
                "{} trailing bytes",
                data.len() - cursor.position() as usize
            )));
        }
        Ok(value)
    }
}

pub(crate) fn corrupt(e: io::Error) -> LedgerError {
    LedgerError::CorruptEncoding(e.to_string())
}

/// Write a variable-length integer (VarInt)
pub fn write_varint<W: Write + ?Sized>(writer: &mut W, value: u64) -> io::Result<()> {
    match value {
        0..=0xfc => {
            writer.write_all(&[value as u8])?;
        }
        0xfd..=0xffff => {
            writer.write_all(&[0xfd])?;
            writer.write_all(&(value as u16).to_le_bytes())?;
        }
        0x10000..=0xffffffff => {
            writer.write_all(&[0xfe])?;
            writer.write_all(&(value as u32).to_le_bytes())?;
        }
        _ => {
            writer.write_all(&[0xff])?;
            writer.write_all(&value.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Read a variable-length integer (VarInt)
pub fn read_varint<R: Read + ?Sized>(reader: &mut R) -> io::Result<u64> {
    let mut first_byte = [0u8; 1];
    reader.read_exact(&mut first_byte)?;

    match first_byte[0] {
        0..=0xfc => Ok(first_byte[0] as u64),
        0xfd => Ok(u16::from_le_bytes(read_array(reader)?) as u64),
        0xfe => Ok(u32::from_le_bytes(read_array(reader)?) as u64),
        0xff => Ok(u64::from_le_bytes(read_array(reader)?)),
    }
}

/// Write bytes with length prefix (VarInt length + data)
pub fn write_var_bytes<W: Write + ?Sized>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    write_varint(writer, data.len() as u64)?;
    writer.write_all(data)?;
    Ok(())
}

/// Read bytes with length prefix
pub fn read_var_bytes<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = read_varint(reader)? as usize;
    let mut data = Vec::new();
    // bounded by the bytes actually present, not by the prefix
    Read::take(&mut *reader, len as u64).read_to_end(&mut data)?;
    if data.len() != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, got {}", len, data.len()),
        ));
    }
    Ok(data)
}

/// Read a fixed-size array
pub fn read_array<R: Read + ?Sized, const N: usize>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut bytes = [0u8; N];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}
