use std::fmt;

/// Operation result status carried in response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Success = 0x00,
    Invalid = 0x01,
    NoMemory = 0x02,
    Busy = 0x03,
    Retry = 0x04,
    Bad = 0xff,
}

impl Status {
    /// Wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns true for `Success`.
    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Invalid => "INVALID",
            Status::NoMemory => "NOMEMORY",
            Status::Busy => "BUSY",
            Status::Retry => "RETRY",
            Status::Bad => "BAD",
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Status::Success),
            0x01 => Ok(Status::Invalid),
            0x02 => Ok(Status::NoMemory),
            0x03 => Ok(Status::Busy),
            0x04 => Ok(Status::Retry),
            0xff => Ok(Status::Bad),
            other => Err(other),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values() {
        assert_eq!(Status::Success.as_u8(), 0);
        assert_eq!(Status::Busy.as_u8(), 3);
        assert_eq!(Status::Bad.as_u8(), 0xff);
    }

    #[test]
    fn try_from_rejects_unknown_codes() {
        assert_eq!(Status::try_from(0x04), Ok(Status::Retry));
        assert_eq!(Status::try_from(0x10), Err(0x10));
    }

    #[test]
    fn only_success_is_success() {
        assert!(Status::Success.is_success());
        assert!(!Status::Invalid.is_success());
        assert_eq!(Status::Invalid.to_string(), "INVALID");
    }
}
