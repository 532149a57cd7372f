//! Command codes understood by the data server.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A data request command.
///
/// The discriminant is the code sent on the wire. New commands take the
/// next code and bump the protocol minor version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Command {
    /// System, bus and per-device metrics
    GetAllData = 0,
    /// System metrics only
    GetSysData = 1,
}

impl Command {
    /// Highest valid command code.
    pub const MAX: i64 = Command::GetSysData as i64;

    /// Every command, in code order.
    pub const ALL: [Command; 2] = [Command::GetAllData, Command::GetSysData];

    /// Returns the wire code for this command.
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Returns true if `code` names a command.
    pub fn is_valid_code(code: i64) -> bool {
        (0..=Self::MAX).contains(&code)
    }

    /// Short name used in logs and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Command::GetAllData => "all",
            Command::GetSysData => "sys",
        }
    }
}

impl TryFrom<i64> for Command {
    type Error = UnknownCommand;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Command::GetAllData),
            1 => Ok(Command::GetSysData),
            other => Err(UnknownCommand(other)),
        }
    }
}

impl From<Command> for i64 {
    fn from(command: Command) -> Self {
        command.code()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A command code outside `0..=Command::MAX`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Unknown command code: {0}")]
pub struct UnknownCommand(pub i64);
