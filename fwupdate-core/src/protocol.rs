//! Wire-level constants shared by [`crate::update_server`] and
//! [`crate::transfer`]: service ids, transfer control codes, and the data-id
//! registry used by the `ReadDataById`/`WriteDataById` handlers a device
//! wires into [`crate::update_server::UpdateServer`].
//!
//! Grounded in `updateserver/include/updateserver/protocol.h`.

/// Service ids dispatched by [`crate::update_server::UpdateServer`].
pub const SID_PING: u8 = 0x01;
pub const SID_READ_DATA_BY_ID: u8 = 0x02;
pub const SID_WRITE_DATA_BY_ID: u8 = 0x03;
pub const SID_PUT_METADATA: u8 = 0x10;
pub const SID_PUT_FRAGMENT: u8 = 0x11;

/// Transfer control codes consumed by [`crate::transfer::TransferBuffer`].
pub const TRANSFER_SINGLE_PACKET: u8 = 0x00;
pub const TRANSFER_MULTI_PACKET_INIT: u8 = 0x01;
pub const TRANSFER_MULTI_PACKET_TRANSFER: u8 = 0x02;
pub const TRANSFER_MULTI_PACKET_END: u8 = 0x03;

/// Data-id registry for `READ_DATA_BY_ID`/`WRITE_DATA_BY_ID`. Not interpreted
/// by `UpdateServer` itself — it only dispatches by service id and forwards
/// these ids opaquely to the injected handler. Meaningful only to whatever
/// `ReadDataById`/`WriteDataById` implementation a device wires in, and to
/// host tooling that needs to agree on the same numbering.
pub const DATA_ID_FIRMWARE_VERSION: u8 = 0x01;
pub const DATA_ID_FIRMWARE_TYPE: u8 = 0x02;
pub const DATA_ID_FIRMWARE_NAME: u8 = 0x03;
pub const DATA_ID_FIRMWARE_UPDATE: u8 = 0x10;
pub const DATA_ID_FIRMWARE_ROLLBACK: u8 = 0x11;
/// This and [`DATA_ID_RESET`] are not present in the original's
/// `protocol.h`; they extend the data-id registry the way the hash-chain
/// verify method extends `Fragment` (see `crate::codec`), to round out the
/// write-side operations the distilled spec calls for without a dedicated
/// service id of their own.
pub const DATA_ID_ERASE_SLOT: u8 = 0x12;
pub const DATA_ID_RESET: u8 = 0x13;
