//! Row payload decoding for both protocols.
//!
//! A text row is a sequence of length-encoded cells with `0xFB` marking
//! NULL. A binary row starts with a `0x00` header and a NULL bitmap whose
//! bit positions are offset by 2, followed by the non-NULL values encoded
//! per column type.

use crate::error::{Error, Result};
use crate::protocol::column::ColumnDefinition;
use crate::protocol::primitive::*;
use crate::value::{self, Value};

const NULL_CELL: u8 = 0xFB;

/// Raw text-protocol cells; `None` is a NULL cell.
pub type TextRow = Vec<Option<Vec<u8>>>;

/// Decode a text-protocol row payload into raw cells.
pub fn read_text_row(payload: &[u8]) -> Result<TextRow> {
    let mut cells = Vec::new();
    let mut data = payload;

    while !data.is_empty() {
        if data[0] == NULL_CELL {
            cells.push(None);
            data = &data[1..];
        } else {
            let (cell, rest) = read_string_lenenc(data)?;
            cells.push(Some(cell.to_vec()));
            data = rest;
        }
    }

    Ok(cells)
}

/// Convert raw text cells to typed values against the column metadata.
pub fn decode_text_row(cells: TextRow, columns: &[ColumnDefinition]) -> Result<Vec<Value>> {
    if cells.len() != columns.len() {
        return Err(Error::InvalidPacket);
    }

    Ok(cells
        .into_iter()
        .zip(columns)
        .map(|(cell, col)| match cell {
            None => Value::Null,
            Some(bytes) => value::from_text(col.column_type, col.flags, &bytes),
        })
        .collect())
}

/// Decode a binary-protocol row payload into typed values.
pub fn read_binary_row(payload: &[u8], columns: &[ColumnDefinition]) -> Result<Vec<Value>> {
    let (header, data) = read_int_1(payload)?;
    if header != 0x00 {
        return Err(Error::InvalidPacket);
    }

    // NULL bitmap with the binary-protocol offset of 2.
    let bitmap_len = (columns.len() + 7 + 2) / 8;
    let (bitmap, mut data) = read_string_fix(data, bitmap_len)?;

    let mut values = Vec::with_capacity(columns.len());
    for (index, col) in columns.iter().enumerate() {
        let bit = index + 2;
        let is_null = bitmap[bit / 8] & (1 << (bit % 8)) != 0;
        if is_null {
            values.push(Value::Null);
            continue;
        }

        let (val, rest) = value::read_binary_value(col.column_type, col.flags, data)?;
        values.push(val);
        data = rest;
    }

    expect_fully_consumed(data)?;
    Ok(values)
}

/// Build the parameter NULL bitmap for COM_STMT_EXECUTE (offset 0).
pub fn write_param_null_bitmap(out: &mut Vec<u8>, params: &[Value]) {
    let bitmap_len = (params.len() + 7) / 8;
    let start = out.len();
    out.resize(start + bitmap_len, 0);
    for (index, param) in params.iter().enumerate() {
        if param.is_null() {
            out[start + index / 8] |= 1 << (index % 8);
        }
    }
}
