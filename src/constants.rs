// Protocol constants for the glucometer wire format

use std::time::Duration;

/// Size of the header shared by every packet (start code, length, category)
pub const HEADER_SIZE: usize = 3;

/// Minimum size for a valid device packet (header only)
pub const MIN_DEVICE_PACKET_SIZE: usize = HEADER_SIZE;

/// Fixed start code of measurement result packets
pub const RESULT_START_CODE: u8 = 0x55;

/// Additive constant folded into every checksum
pub const CHECKSUM_OFFSET: u8 = 2;

/// Offset of the countdown byte within a timing packet
pub const COUNTDOWN_OFFSET: usize = 4;

/// Maximum number of send attempts for the packet expected in the current state
pub const MAX_RETRIES: u8 = 5;

/// Delay before re-sending the current request
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Glucose unit conversion divisor, mg/dL per mmol/L
pub const MG_DL_PER_MMOL_L: f64 = 18.0;
