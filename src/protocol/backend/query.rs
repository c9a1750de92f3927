//! Query-related backend messages.

use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE, U16 as U16BE, U32 as U32BE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::Result;
use crate::protocol::codec::{expect_end, read_cstr, read_nullable_block, read_u16};
use crate::protocol::types::{FormatCode, Oid};

/// Fixed-size tail of a field description (18 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct FieldDescriptionTail {
    /// Table OID (0 if not a table column)
    pub table_oid: U32BE,
    /// Column attribute number (0 if not a table column)
    pub attribute_number: I16BE,
    /// Data type OID
    pub type_oid: U32BE,
    /// Type size (-1 for variable)
    pub type_size: I16BE,
    /// Type modifier (type-specific)
    pub type_modifier: I32BE,
    /// Format code (0=text, 1=binary)
    pub format: U16BE,
}

/// Field description within a RowDescription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescription<'a> {
    pub name: &'a str,
    pub tail: FieldDescriptionTail,
}

impl FieldDescription<'_> {
    pub fn table_oid(&self) -> Oid {
        self.tail.table_oid.get()
    }

    pub fn attribute_number(&self) -> i16 {
        self.tail.attribute_number.get()
    }

    pub fn type_oid(&self) -> Oid {
        self.tail.type_oid.get()
    }

    pub fn type_size(&self) -> i16 {
        self.tail.type_size.get()
    }

    pub fn type_modifier(&self) -> i32 {
        self.tail.type_modifier.get()
    }

    pub fn format(&self) -> FormatCode {
        FormatCode::from_u16(self.tail.format.get())
    }
}

/// RowDescription message - describes the columns in a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDescription<'a> {
    fields: Vec<FieldDescription<'a>>,
}

impl<'a> RowDescription<'a> {
    /// Parse a RowDescription message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (num_fields, mut data) = read_u16(payload)?;
        let mut fields = Vec::with_capacity(usize::from(num_fields));

        for _ in 0..num_fields {
            let (name, rest) = read_cstr(data)?;
            let (tail, rest) = FieldDescriptionTail::ref_from_prefix(rest)?;
            fields.push(FieldDescription { name, tail: *tail });
            data = rest;
        }

        expect_end(data, "RowDescription")?;
        Ok(Self { fields })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldDescription<'a>] {
        &self.fields
    }
}

/// DataRow message - one row of raw field values, `None` for NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow<'a> {
    values: Vec<Option<&'a [u8]>>,
}

impl<'a> DataRow<'a> {
    /// Parse a DataRow message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (num_columns, mut data) = read_u16(payload)?;
        let mut values = Vec::with_capacity(usize::from(num_columns));
        for _ in 0..num_columns {
            let (value, rest) = read_nullable_block(data)?;
            values.push(value);
            data = rest;
        }
        expect_end(data, "DataRow")?;
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Option<&'a [u8]>] {
        &self.values
    }
}

/// CommandComplete message - indicates successful completion of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandComplete<'a> {
    /// Command tag (e.g., "SELECT", "INSERT 0 1", "COPY 5")
    pub tag: &'a str,
}

impl<'a> CommandComplete<'a> {
    /// Parse a CommandComplete message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (tag, rest) = read_cstr(payload)?;
        expect_end(rest, "CommandComplete")?;
        Ok(Self { tag })
    }

    /// Rows affected, taken from the last number in the tag.
    ///
    /// `INSERT oid rows` carries two numbers; every other tag at most one.
    pub fn rows_affected(&self) -> Option<u64> {
        let mut parts = self.tag.split_whitespace();
        let _command = parts.next()?;
        parts.last()?.parse().ok()
    }

    /// Get the command name from the tag.
    pub fn command(&self) -> Option<&str> {
        self.tag.split_whitespace().next()
    }
}
