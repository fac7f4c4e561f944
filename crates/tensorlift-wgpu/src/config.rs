pub const WORKGROUP_SIZE: u32 = 256;
pub const MAX_DISPATCH_WORKGROUPS: u32 = 65_535;
pub const RESIDENCY_MAX_PER_KEY: usize = 8;

/// Parse a requested workgroup size; zero and non-numeric values are
/// rejected.
pub fn requested_workgroup_size(raw: &str) -> Option<u32> {
    match raw.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => Some(parsed),
        _ => None,
    }
}

/// Effective global workgroup size for pooling kernels.
/// Overridable via env `TENSORLIFT_WG` (u32). Falls back to WORKGROUP_SIZE.
pub fn effective_workgroup_size() -> u32 {
    std::env::var("TENSORLIFT_WG")
        .ok()
        .and_then(|raw| requested_workgroup_size(&raw))
        .unwrap_or(WORKGROUP_SIZE)
}
