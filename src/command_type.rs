//! Monitorable command types and operation aspects.
use bitflags::bitflags;

/// Executable command types that can be monitored by the driver.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum CommandType {
    BulkWrite,
    DropSearchIndex,
    GetMore,
    Hello,
    KillCursors,
    RenameCollection,
}

impl CommandType {
    /// The command's name as it appears as the first key of the command document.
    pub fn to_str(&self) -> &'static str {
        match *self {
            CommandType::BulkWrite => "bulkWrite",
            CommandType::DropSearchIndex => "dropSearchIndex",
            CommandType::GetMore => "getMore",
            CommandType::Hello => "hello",
            CommandType::KillCursors => "killCursors",
            CommandType::RenameCollection => "renameCollection",
        }
    }

    pub fn is_write_command(&self) -> bool {
        match *self {
            CommandType::BulkWrite
            | CommandType::DropSearchIndex
            | CommandType::RenameCollection => true,
            CommandType::GetMore | CommandType::Hello | CommandType::KillCursors => false,
        }
    }
}

bitflags! {
    /// Static capabilities of an operation, consulted by the executor.
    pub struct Aspect: u8 {
        /// The operation modifies data.
        const WRITE_OPERATION = 0b0001;
        /// A retryable failure may be retried once.
        const RETRYABLE       = 0b0010;
        /// The reply may carry a server cursor.
        const CURSOR_CREATING = 0b0100;
        /// No `maxTimeMS` is attached even when a timeout is in effect.
        const OMIT_MAX_TIME   = 0b1000;
    }
}

impl Aspect {
    /// The default aspects of a command type.
    pub fn for_command(command: CommandType) -> Aspect {
        match command {
            CommandType::BulkWrite => {
                Aspect::WRITE_OPERATION | Aspect::RETRYABLE | Aspect::CURSOR_CREATING
            }
            CommandType::DropSearchIndex | CommandType::RenameCollection => Aspect::WRITE_OPERATION,
            CommandType::GetMore => Aspect::OMIT_MAX_TIME,
            CommandType::Hello | CommandType::KillCursors => Aspect::empty(),
        }
    }
}
