//! Binary row-stream codec
//!
//! A row file is a flat stream of rows. Each row is a little-endian cell
//! count followed by its cells; each cell is a one-byte type tag followed by
//! the value payload. Strings are length-prefixed.

use super::cell::Cell;
use super::row::Row;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_LONG: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_DOUBLE: u8 = 4;
const TAG_STRING: u8 = 5;

/// Write one row to the stream
pub fn write_row<W: Write>(writer: &mut W, row: &Row) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(row.len() as u32)?;
    for cell in row.cells() {
        match cell {
            Cell::Null => writer.write_u8(TAG_NULL)?,
            Cell::Int(v) => {
                writer.write_u8(TAG_INT)?;
                writer.write_i32::<LittleEndian>(*v)?;
            }
            Cell::Long(v) => {
                writer.write_u8(TAG_LONG)?;
                writer.write_i64::<LittleEndian>(*v)?;
            }
            Cell::Float(v) => {
                writer.write_u8(TAG_FLOAT)?;
                writer.write_f32::<LittleEndian>(*v)?;
            }
            Cell::Double(v) => {
                writer.write_u8(TAG_DOUBLE)?;
                writer.write_f64::<LittleEndian>(*v)?;
            }
            Cell::Str(s) => {
                writer.write_u8(TAG_STRING)?;
                writer.write_u32::<LittleEndian>(s.len() as u32)?;
                writer.write_all(s.as_bytes())?;
            }
        }
    }
    Ok(())
}

/// Read one row from the stream; `None` on a clean end of stream
pub fn read_row<R: Read>(reader: &mut R) -> io::Result<Option<Row>> {
    // EOF is only legal at a row boundary
    let count = match reader.read_u32::<LittleEndian>() {
        Ok(n) => n as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut cells = Vec::with_capacity(count);
    for _ in 0..count {
        let tag = reader.read_u8()?;
        let cell = match tag {
            TAG_NULL => Cell::Null,
            TAG_INT => Cell::Int(reader.read_i32::<LittleEndian>()?),
            TAG_LONG => Cell::Long(reader.read_i64::<LittleEndian>()?),
            TAG_FLOAT => Cell::Float(reader.read_f32::<LittleEndian>()?),
            TAG_DOUBLE => Cell::Double(reader.read_f64::<LittleEndian>()?),
            TAG_STRING => {
                let len = reader.read_u32::<LittleEndian>()? as usize;
                let mut buf = vec![0u8; len];
                reader.read_exact(&mut buf)?;
                let text = String::from_utf8(buf)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Cell::Str(text)
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown cell tag {}", other),
                ))
            }
        };
        cells.push(cell);
    }
    Ok(Some(Row::new(cells)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let rows = vec![
            Row::new(vec![Cell::Int(1), Cell::Str("alice".into()), Cell::Null]),
            Row::new(vec![Cell::Long(-7), Cell::Double(2.5), Cell::Float(0.5)]),
        ];

        let mut buf = Vec::new();
        for row in &rows {
            write_row(&mut buf, row).unwrap();
        }

        let mut cursor = buf.as_slice();
        let mut decoded = Vec::new();
        while let Some(row) = read_row(&mut cursor).unwrap() {
            decoded.push(row);
        }
        assert_eq!(decoded, rows);
    }

    #[test]
    fn test_eof_at_row_boundary() {
        let mut cursor: &[u8] = &[];
        assert_eq!(read_row(&mut cursor).unwrap(), None);
    }

    #[test]
    fn test_truncated_row_is_an_error() {
        let mut buf = Vec::new();
        write_row(&mut buf, &Row::new(vec![Cell::Int(1)])).unwrap();
        buf.truncate(buf.len() - 2);

        let mut cursor = buf.as_slice();
        assert!(read_row(&mut cursor).is_err());
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        // one cell with a bogus tag
        let buf: &[u8] = &[1, 0, 0, 0, 99];
        let mut cursor = buf;
        assert!(read_row(&mut cursor).is_err());
    }
}
