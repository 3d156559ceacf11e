use rust_decimal::Decimal;

/// If a resting order has this much or less remaining, it is considered
/// completely filled. Venues may substitute their own minimum lot via the
/// `epsilon` config key.
pub const DUST_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 8);

/// Fractional digits kept by internal divisions.
pub const DIV_SCALE: u32 = 12;
