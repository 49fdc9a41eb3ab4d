use crate::error::protocol_err;
use crate::error::HdbResult;

/// Command codes, transmitted as `int32` at the start of each request payload
/// (§6). An explicit-discriminant enum so wire values round-trip exactly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum Command {
    Query = 50,
    DisposeResult = 55,
    ResultSection = 60,
    StreamableObjectSection = 61,
    DisposeStreamableObject = 62,
    PushStreamableObjectPart = 63,
    Ping = 65,
    Close = 70,
    DatabaseEvent = 75,
    /// Reserved by the protocol; this driver neither sends nor expects it.
    ServerRequest = 80,
}

impl Command {
    pub(crate) fn try_new(code: i32) -> HdbResult<Self> {
        Ok(match code {
            50 => Self::Query,
            55 => Self::DisposeResult,
            60 => Self::ResultSection,
            61 => Self::StreamableObjectSection,
            62 => Self::DisposeStreamableObject,
            63 => Self::PushStreamableObjectPart,
            65 => Self::Ping,
            70 => Self::Close,
            75 => Self::DatabaseEvent,
            80 => Self::ServerRequest,
            other => return Err(protocol_err!("unknown command code {other}")),
        })
    }
}

/// First `int32` of a response body, after the dispatch id (§6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum ResponseStatus {
    Acknowledgement = 5,
    UserAuthenticationPassed = 10,
    UserAuthenticationFailed = 15,
    Success = 20,
    Exception = 30,
    AuthenticationError = 35,
}

impl ResponseStatus {
    pub(crate) fn try_new(code: i32) -> HdbResult<Self> {
        Ok(match code {
            5 => Self::Acknowledgement,
            10 => Self::UserAuthenticationPassed,
            15 => Self::UserAuthenticationFailed,
            20 => Self::Success,
            30 => Self::Exception,
            35 => Self::AuthenticationError,
            // Any other nonzero, non-SUCCESS code on a disposal reply is FAILED (§6).
            other => return Err(protocol_err!("unknown response status {other}")),
        })
    }
}
