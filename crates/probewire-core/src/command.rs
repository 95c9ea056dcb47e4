//! Command bodies understood by the target.

use std::fmt;

use crate::frame::Frame;

/// Address of the task-presence word on the target.
pub const TASK_STATUS_ADDRESS: u32 = 0x2000_001C;

/// Address of the downloaded program's code CRC on the target.
pub const CODE_CRC_ADDRESS: u32 = 0x2000_0000;

/// Width in bytes of the task-status and code-CRC words.
pub const STATUS_WORD_LEN: u8 = 4;

/// Which tasks a resume/stop command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadSel {
    /// Every task (`-1` on the wire).
    All,
    /// A single task by thread id.
    Task(u32),
}

impl fmt::Display for ThreadSel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadSel::All => f.write_str("-1"),
            ThreadSel::Task(id) => write!(f, "{id}"),
        }
    }
}

/// A command sent to the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Detach and end the debug session.
    StopDebug,
    /// Reset the target; it answers with a stop-notification.
    Reset,
    /// Read the task-presence word.
    TaskStatus,
    /// Read the code CRC word.
    CodeCrc,
    /// Install a hardware breakpoint.
    SetBreakpoint {
        /// Code address.
        address: u32,
        /// Thread the breakpoint applies to.
        thread: u32,
    },
    /// Remove a hardware breakpoint.
    RemoveBreakpoint {
        /// Code address.
        address: u32,
        /// Thread the breakpoint applies to.
        thread: u32,
    },
    /// Resume execution.
    Continue(ThreadSel),
    /// Halt execution.
    Stop(ThreadSel),
    /// Single-step one task.
    Step(u32),
    /// Read `size` bytes of target memory.
    ReadMemory {
        /// Start address.
        address: u32,
        /// Byte count.
        size: u8,
    },
    /// Write hex-encoded bytes to target memory.
    WriteMemory {
        /// Start address.
        address: u32,
        /// Byte count.
        size: u8,
        /// Hex-encoded bytes.
        data: String,
    },
}

impl Command {
    /// Render the frame body.
    pub fn body(&self) -> String {
        match self {
            Command::StopDebug => "D;4".to_string(),
            Command::Reset => "?".to_string(),
            Command::TaskStatus => memory_read_body(TASK_STATUS_ADDRESS, STATUS_WORD_LEN),
            Command::CodeCrc => memory_read_body(CODE_CRC_ADDRESS, STATUS_WORD_LEN),
            Command::SetBreakpoint { address, thread } => format!("Z1,{address:X},{thread}"),
            Command::RemoveBreakpoint { address, thread } => format!("z1,{address:X},{thread}"),
            Command::Continue(sel) => format!("vCont;c:{sel}"),
            Command::Stop(sel) => format!("vCont;t:{sel}"),
            Command::Step(thread) => format!("vCont;s:{thread}"),
            // Watch reads and writes spell the byte count as `0` plus decimal.
            Command::ReadMemory { address, size } => format!("m{address:X},0{size}"),
            Command::WriteMemory {
                address,
                size,
                data,
            } => format!("M{address:X},0{size}:{data}"),
        }
    }

    /// Build the complete frame for this command.
    pub fn frame(&self) -> Frame {
        Frame::new(&self.body())
    }
}

fn memory_read_body(address: u32, size: u8) -> String {
    format!("m{address:X},{size:X}")
}
