//! Square-window helpers shared by the neighborhood filters.

/// Offset `coord` by `delta`, clamping to `0..len`.
///
/// Out-of-range samples repeat the nearest edge pixel; they never wrap
/// or read as zero. `len` must be non-zero.
pub(crate) fn clamp_to_edge(coord: u32, delta: i64, len: u32) -> u32 {
    let shifted = i64::from(coord) + delta;
    let max = i64::from(len) - 1;
    // In 0..=max, which fits in u32.
    u32::try_from(shifted.clamp(0, max)).unwrap_or(0)
}

/// Signed offsets `-radius..=radius`.
pub(crate) fn offsets(radius: u32) -> std::ops::RangeInclusive<i64> {
    let r = i64::from(radius);
    -r..=r
}
