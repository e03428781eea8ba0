//! Message flags.
use bitflags::bitflags;

bitflags! {
    /// Represents the bit vector of flags for an OP_MSG message.
    pub struct OpMsgFlags: u32 {
        const CHECKSUM_PRESENT = 0b00000001;
        const MORE_TO_COME     = 0b00000010;
        const EXHAUST_ALLOWED  = 0x00010000;
    }
}

impl OpMsgFlags {
    /// Flags for a request, given whether the server is expected to reply.
    pub fn for_request(acknowledged: bool) -> OpMsgFlags {
        if acknowledged {
            OpMsgFlags::empty()
        } else {
            OpMsgFlags::MORE_TO_COME
        }
    }
}
