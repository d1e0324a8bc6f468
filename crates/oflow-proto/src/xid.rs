/// 32-bit OpenFlow transaction identifier used to correlate a request with its reply.
pub type Xid = u32;

/// Upper bound (inclusive) of the range reserved for driver-assigned xids.
///
/// Callers supplying their own xid (rather than having the correlator assign
/// one) must use a value strictly greater than this.
pub const XID_RESERVED_MAX: Xid = 255;

/// First xid handed out by the correlator's allocator; wraps back to this
/// value once `u32::MAX - XID_RESERVED_MAX` allocations have passed.
pub const XID_WRAP_START: Xid = XID_RESERVED_MAX + 1;
