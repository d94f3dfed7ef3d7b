//! Provides the numeric values used on the wire

macro_rules! makeid {
    ($($name:ident, $val:literal),*) => {
        $(pub const $name: u8 = $val;)*
    };
}

// frame command ids, every reply id is the request id + 1
#[rustfmt::skip]
makeid!(
    BATCH_CMD, 0x10,
    BATCH_CMD_RET, 0x11,
    BUFFERED_CMD, 0x12,
    BUFFERED_CMD_RET, 0x13,
    GET_CLOCK, 0x14,
    GET_CLOCK_RET, 0x15,
    FAST_UPDATE_CYCLE, 0x16,
    FAST_UPDATE_CYCLE_RET, 0x17
);

// tags of the items inside a batch payload, same for request and reply
#[rustfmt::skip]
makeid!(
    ITEM_RAW, 0x00,
    ITEM_SMP, 0x01,
    ITEM_GET_PARAM, 0x02,
    ITEM_SET_PARAM, 0x03
);

/// Wire address reserved for broadcasting to every device on the bus
pub const BROADCAST_ADDRESS: u8 = 0;

/// Highest parameter id, ids are 14 bits wide
pub const MAX_PARAM_ID: u16 = 0x3fff;

/// Biggest payload a single batch frame can carry
pub const MAX_PAYLOAD: usize = u8::MAX as usize;
