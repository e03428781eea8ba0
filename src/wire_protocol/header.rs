use std::fmt;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Error::ResponseError;
use crate::error::Result;

/// Length of a serialized header in bytes.
pub const HEADER_LENGTH: usize = 16;

/// Represents an opcode in the MongoDB Wire Protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpCode {
    Msg = 2013,
}

impl OpCode {
    /// Maps integer values to OpCodes, or `None` if the integer isn't a supported opcode.
    pub fn from_i32(i: i32) -> Option<OpCode> {
        match i {
            2013 => Some(OpCode::Msg),
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            OpCode::Msg => fmt.write_str("OP_MSG"),
        }
    }
}

/// Represents a header in the MongoDB Wire Protocol.
///
/// # Fields
///
/// `message_length` - The length of the entire message in bytes, header included.
/// `request_id` - Identifies the request being sent.
/// `response_to` - Identifies which request the message is a response to. This
///                 should be `0` in a request from the client.
/// `op_code`     - Identifies which type of message is being sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: OpCode,
}

impl Header {
    pub fn new(message_length: i32, request_id: i32, response_to: i32, op_code: OpCode) -> Header {
        Header {
            message_length,
            request_id,
            response_to,
            op_code,
        }
    }

    /// Writes the serialized Header to a buffer.
    pub fn write<W: Write>(&self, buffer: &mut W) -> Result<()> {
        buffer.write_i32::<LittleEndian>(self.message_length)?;
        buffer.write_i32::<LittleEndian>(self.request_id)?;
        buffer.write_i32::<LittleEndian>(self.response_to)?;
        buffer.write_i32::<LittleEndian>(self.op_code as i32)?;
        Ok(())
    }

    /// Reads a serialized Header from a buffer.
    pub fn read<R: Read>(buffer: &mut R) -> Result<Header> {
        let message_length = buffer.read_i32::<LittleEndian>()?;
        let request_id = buffer.read_i32::<LittleEndian>()?;
        let response_to = buffer.read_i32::<LittleEndian>()?;

        let op_code_i32 = buffer.read_i32::<LittleEndian>()?;
        let op_code = match OpCode::from_i32(op_code_i32) {
            Some(code) => code,
            None => {
                return Err(ResponseError(format!(
                    "Invalid header opcode from server: {}.",
                    op_code_i32
                )))
            }
        };

        if message_length < HEADER_LENGTH as i32 {
            return Err(ResponseError(format!(
                "Invalid message length from server: {}.",
                message_length
            )));
        }

        Ok(Header::new(message_length, request_id, response_to, op_code))
    }
}
