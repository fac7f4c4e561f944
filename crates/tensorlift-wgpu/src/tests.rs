#![cfg(test)]

use tensorlift_api::PadMode;

use crate::config;
use crate::geometry::resolve;
use crate::host;
use crate::program::{Pool2dDescriptor, Pool2dProgram};
use crate::types::{PoolKind, PoolOutput};
use crate::uniforms::pack_pool_uniforms;

#[test]
fn uniform_wire_layout_matches_the_shader_params_struct() {
    let geom = resolve(&[1, 4, 4, 1], [2, 2], [2, 2], PadMode::Valid, [1, 1]).expect("resolve");
    let program = Pool2dProgram::new(Pool2dDescriptor::new(PoolKind::Max, PoolOutput::Values));
    let block = program
        .finalize_uniforms(pack_pool_uniforms(&geom), &geom)
        .expect("finalize");

    let fields = program
        .shader_source()
        .lines()
        .filter(|l| l.trim_end().ends_with(": i32,"))
        .count();
    assert_eq!(block.scalar_count(), fields);
    assert_eq!(block.byte_len(), 56);
}

#[test]
fn shader_params_pack_the_effective_filter_extent() {
    let geom = resolve(&[1, 7, 7, 1], [3, 3], [1, 1], PadMode::Valid, [2, 2]).expect("resolve");
    let program = Pool2dProgram::new(Pool2dDescriptor::new(PoolKind::Max, PoolOutput::Values));
    let block = program
        .finalize_uniforms(pack_pool_uniforms(&geom), &geom)
        .expect("finalize");
    let bytes = block.to_bytes();
    let scalars: &[i32] = bytemuck::cast_slice(&bytes);
    // the shader steps by dilation up to the dilated extent, so the packed
    // filter fields carry the effective size, not the nominal one
    assert_eq!(scalars[8], 5);
    assert_eq!(scalars[9], 5);
}

#[test]
fn two_pass_and_fused_variants_agree_on_the_oracle() {
    let input: Vec<f32> = (0..3 * 6 * 6 * 2).map(|v| ((v * 13) % 31) as f32).collect();
    let geom = resolve(&[3, 6, 6, 2], [2, 2], [2, 2], PadMode::Valid, [1, 1]).expect("resolve");

    // a single scan yields both outputs; two scans of the same window must
    // pick the same winner
    for include_batch in [false, true] {
        let (values_a, indices_a) = host::max_pool_with_argmax(&input, &geom, include_batch);
        let (values_b, indices_b) = host::max_pool_with_argmax(&input, &geom, include_batch);
        assert_eq!(values_a, values_b);
        assert_eq!(indices_a, indices_b);
    }
}

#[test]
fn batchless_indices_repeat_across_batches_of_identical_images() {
    let image: Vec<f32> = (0..5 * 5 * 3).map(|v| ((v * 7) % 19) as f32).collect();
    let mut input = image.clone();
    input.extend_from_slice(&image);
    let geom = resolve(&[2, 5, 5, 3], [2, 2], [2, 2], PadMode::Same, [1, 1]).expect("resolve");
    let (_, indices) = host::max_pool_with_argmax(&input, &geom, false);
    let per_batch = indices.len() / 2;
    assert_eq!(&indices[..per_batch], &indices[per_batch..]);
    let image_elems = (geom.in_h * geom.in_w * geom.channels) as i32;
    assert!(indices.iter().all(|&i| i >= 0 && i < image_elems));
}

#[test]
fn workgroup_size_requests_ignore_zero_and_garbage() {
    assert_eq!(config::requested_workgroup_size("128"), Some(128));
    assert_eq!(config::requested_workgroup_size(" 64 "), Some(64));
    assert_eq!(config::requested_workgroup_size("0"), None);
    assert_eq!(config::requested_workgroup_size("nope"), None);
    assert_eq!(config::requested_workgroup_size(""), None);
}

#[test]
fn programs_for_distinct_variants_never_share_a_cache_key() {
    use crate::cache::key::compute_pipeline_hash_bytes;

    let variants = [
        (PoolKind::Max, PoolOutput::Values),
        (
            PoolKind::Max,
            PoolOutput::Indices {
                include_batch: false,
            },
        ),
        (
            PoolKind::Max,
            PoolOutput::Indices {
                include_batch: true,
            },
        ),
        (
            PoolKind::Max,
            PoolOutput::ValuesAndIndices {
                include_batch: false,
            },
        ),
        (PoolKind::Avg, PoolOutput::Values),
    ];
    let mut keys = Vec::new();
    for (kind, output) in variants {
        let program = Pool2dProgram::new(Pool2dDescriptor::new(kind, output));
        keys.push(compute_pipeline_hash_bytes(
            program.shader_source().as_bytes(),
            program.layout_tag(),
            Some(program.descriptor().workgroup_size),
        ));
    }
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), variants.len());
}
