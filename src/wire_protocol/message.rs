//! OP_MSG messages.
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicI32, Ordering};

use bson::{Bson, Document};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tokio::io::{AsyncRead, AsyncWrite};

use super::flags::OpMsgFlags;
use super::header::{Header, OpCode, HEADER_LENGTH};
use crate::error::Error::ResponseError;
use crate::error::Result;

/// Upper bound on the size of a message accepted from the wire.
pub const MAX_MESSAGE_SIZE_BYTES: i32 = 48_000_000;

static REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// Returns a unique operational request id.
pub fn next_request_id() -> i32 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// An OP_MSG with a single body section.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub request_id: i32,
    pub response_to: i32,
    pub flags: OpMsgFlags,
    pub document: Document,
}

impl Message {
    /// Builds a request carrying `document`. Unacknowledged requests set `moreToCome` so the
    /// server sends no reply.
    pub fn new_request(document: Document, acknowledged: bool) -> Message {
        Message {
            request_id: next_request_id(),
            response_to: 0,
            flags: OpMsgFlags::for_request(acknowledged),
            document,
        }
    }

    /// Builds a reply to the request with id `response_to`.
    pub fn new_reply(response_to: i32, document: Document) -> Message {
        Message {
            request_id: next_request_id(),
            response_to,
            flags: OpMsgFlags::empty(),
            document,
        }
    }

    /// Serializes the message, header included.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        body.write_u32::<LittleEndian>(self.flags.bits())?;
        body.write_u8(0)?;
        self.document.to_writer(&mut body)?;

        let message_length = (HEADER_LENGTH + body.len()) as i32;
        let mut buffer = Vec::with_capacity(message_length as usize);
        Header::new(message_length, self.request_id, self.response_to, OpCode::Msg)
            .write(&mut buffer)?;
        buffer.extend_from_slice(&body);
        Ok(buffer)
    }

    pub async fn write_to<W: AsyncWrite + Unpin + ?Sized>(&self, writer: &mut W) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let bytes = self.to_bytes()?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn read_from<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<Message> {
        use tokio::io::AsyncReadExt;

        let mut header_bytes = [0u8; HEADER_LENGTH];
        reader.read_exact(&mut header_bytes).await?;
        let header = Header::read(&mut &header_bytes[..])?;

        if header.message_length < HEADER_LENGTH as i32
            || header.message_length > MAX_MESSAGE_SIZE_BYTES
        {
            return Err(ResponseError(format!(
                "Message length {} is outside {}..={} bytes.",
                header.message_length, HEADER_LENGTH, MAX_MESSAGE_SIZE_BYTES
            )));
        }

        let mut body = vec![0u8; header.message_length as usize - HEADER_LENGTH];
        reader.read_exact(&mut body).await?;
        Message::parse_body(&header, &body)
    }

    fn parse_body(header: &Header, body: &[u8]) -> Result<Message> {
        let mut cursor = Cursor::new(body);
        let flags = OpMsgFlags::from_bits_truncate(cursor.read_u32::<LittleEndian>()?);

        let mut end = body.len() as u64;
        if flags.contains(OpMsgFlags::CHECKSUM_PRESENT) {
            end = end.saturating_sub(4);
        }

        let mut document = None;
        let mut sequences = Vec::new();

        while cursor.position() < end {
            match cursor.read_u8()? {
                0 => document = Some(Document::from_reader(&mut cursor)?),
                1 => {
                    let start = cursor.position();
                    let size = cursor.read_i32::<LittleEndian>()?;
                    if size < 4 || start + size as u64 > end {
                        return Err(ResponseError(format!(
                            "Invalid document sequence size: {}.",
                            size
                        )));
                    }
                    let size = size as u64;
                    let identifier = read_cstring(&mut cursor)?;

                    let mut docs = Vec::new();
                    while cursor.position() < start + size {
                        docs.push(Bson::Document(Document::from_reader(&mut cursor)?));
                    }
                    sequences.push((identifier, docs));
                }
                kind => {
                    return Err(ResponseError(format!("Invalid OP_MSG section kind: {}.", kind)))
                }
            }
        }

        let mut document = match document {
            Some(document) => document,
            None => return Err(ResponseError("OP_MSG is missing a body section.".to_owned())),
        };

        for (identifier, docs) in sequences {
            document.insert(identifier, Bson::Array(docs));
        }

        Ok(Message {
            request_id: header.request_id,
            response_to: header.response_to,
            flags,
            document,
        })
    }
}

fn read_cstring<R: Read>(reader: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        match reader.read_u8()? {
            0 => break,
            b => bytes.push(b),
        }
    }
    String::from_utf8(bytes)
        .map_err(|e| ResponseError(format!("Invalid section identifier: {}.", e)))
}
