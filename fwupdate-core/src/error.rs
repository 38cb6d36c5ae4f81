//! Error and result-code types shared by every module in this crate.

/// Outcome of a fallible FragmentArea/CommandArea operation.
///
/// Mirrors the original's `{OK, EMPTY, INVALID, BUSY, PARAM}` return set; `OK`
/// is modeled as `Ok(())` rather than a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// Caller violated the contract (null config, zero size, bad alignment).
    Param,
    /// The flash device could not service the request.
    Busy,
    /// A record parsed but failed signature/CRC/shape validation.
    Invalid,
}

/// Distinguishes an empty region from a hard error; not every read has a
/// meaningful "empty" outcome, so this sits next to `CoreError` rather than
/// folded into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Empty,
    Error(CoreError),
}

impl From<CoreError> for ReadOutcome {
    fn from(err: CoreError) -> Self {
        ReadOutcome::Error(err)
    }
}

/// Result of a last-fragment search (`find_last_fragment`/`_linear`).
///
/// Carries the found index separately from the terminal status, since the
/// original conflates "which index" and "which status" in one return value.
/// `Invalid` carries the index the search stopped at, matching the source's
/// `*index = middle` before returning `FA_ERR_INVALID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(usize),
    Empty,
    Invalid(usize),
}

/// On-wire result code used by [`crate::update_server`] and
/// [`crate::transfer`]. Unlike [`CoreError`] this is not an internal error
/// type: its numeric value is part of the protocol and must round-trip
/// exactly, so it carries an explicit `#[repr(u8)]` and the two `From`/
/// `TryFrom` conversions below instead of being derived ad hoc at each call
/// site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtocolResult {
    Ok = 0x00,
    RequestOutOfRange = 0xE0,
    InvalidRequest = 0xE1,
    BusyRepeatRequest = 0xE2,
    RequestFailed = 0xE3,
    InternalError = 0xE4,
}

impl From<ProtocolResult> for u8 {
    fn from(result: ProtocolResult) -> Self {
        result as u8
    }
}

impl TryFrom<u8> for ProtocolResult {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ProtocolResult::Ok),
            0xE0 => Ok(ProtocolResult::RequestOutOfRange),
            0xE1 => Ok(ProtocolResult::InvalidRequest),
            0xE2 => Ok(ProtocolResult::BusyRepeatRequest),
            0xE3 => Ok(ProtocolResult::RequestFailed),
            0xE4 => Ok(ProtocolResult::InternalError),
            _ => Err(()),
        }
    }
}
