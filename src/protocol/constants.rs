//! SOCKS5 Protocol Constants

// SOCKS5 Protocol Version
pub const SOCKS5_VERSION: u8 = 0x05;

// SOCKS5 Commands
pub const SOCKS5_CMD_CONNECT: u8 = 0x01;
pub const SOCKS5_CMD_UDP_ASSOCIATE: u8 = 0x03;

// Address Types
pub const SOCKS5_ADDR_IPV4: u8 = 0x01;
pub const SOCKS5_ADDR_DOMAIN: u8 = 0x03;
pub const SOCKS5_ADDR_IPV6: u8 = 0x04;

// Authentication Methods
pub const SOCKS5_AUTH_NONE: u8 = 0x00;
pub const SOCKS5_AUTH_USERPASS: u8 = 0x02;
pub const SOCKS5_AUTH_UNSUPPORTED: u8 = 0xFF;

// Response Codes
pub const SOCKS5_REPLY_SUCCESS: u8 = 0x00;

// Reserved field value
pub const SOCKS5_RESERVED: u8 = 0x00;

// Username/password sub-negotiation echoes the protocol version byte
pub const SOCKS5_USERPASS_VERSION: u8 = SOCKS5_VERSION;
pub const SOCKS5_USERPASS_SUCCESS: u8 = 0x00;

// UDP relay framing: RSV(2) FRAG(1)
pub const SOCKS5_UDP_FRAG_NONE: u8 = 0x00;

// Command replies are taken in one read of at most this many bytes
pub const SOCKS5_REPLY_BUFFER_LEN: usize = 512;

// Upper bound for single-byte length prefixed fields
pub const SOCKS5_MAX_FIELD_LEN: usize = 255;
