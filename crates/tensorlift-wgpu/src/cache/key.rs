use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub fn compute_pipeline_hash_bytes(
    shader_bytes: &[u8],
    layout_tag: &str,
    workgroup_size: Option<u32>,
) -> u64 {
    let mut hasher = DefaultHasher::new();
    shader_bytes.hash(&mut hasher);
    layout_tag.hash(&mut hasher);
    if let Some(wg) = workgroup_size {
        wg.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_separates_shader_layout_and_workgroup() {
        let base = compute_pipeline_hash_bytes(b"shader", "tag", Some(64));
        assert_eq!(base, compute_pipeline_hash_bytes(b"shader", "tag", Some(64)));
        assert_ne!(base, compute_pipeline_hash_bytes(b"shader2", "tag", Some(64)));
        assert_ne!(base, compute_pipeline_hash_bytes(b"shader", "tag2", Some(64)));
        assert_ne!(base, compute_pipeline_hash_bytes(b"shader", "tag", Some(128)));
        assert_ne!(base, compute_pipeline_hash_bytes(b"shader", "tag", None));
    }
}
