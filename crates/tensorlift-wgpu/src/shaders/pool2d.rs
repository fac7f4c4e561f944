//! WGSL source generation for the 2-D pooling programs.
//!
//! One shader is generated per program variant; the variant decides the
//! window reduction (max or mean), which output buffers exist, and how the
//! argmax offset is flattened. The `Params` struct layout here is the wire
//! contract with [`crate::uniforms::pack_pool_uniforms`] plus the
//! engine-appended output-dims group; the two must change together.

use crate::types::{PoolKind, PoolOutput};

/// Sentinel replaced with the concrete workgroup size before compilation.
pub const WORKGROUP_SENTINEL: &str = "@WG@";

const PARAMS_AND_INPUT: &str = r#"
struct Params {
    stride_h: i32,
    stride_w: i32,
    pad_top: i32,
    pad_left: i32,
    dilation_h: i32,
    dilation_w: i32,
    in_h: i32,
    in_w: i32,
    filter_h: i32,
    filter_w: i32,
    out_b: i32,
    out_h: i32,
    out_w: i32,
    out_c: i32,
};

struct InputBuf {
    data: array<f32>,
};

struct ValueBuf {
    data: array<f32>,
};

struct IndexBuf {
    data: array<i32>,
};
"#;

const DECODE_OUTPUT_POSITION: &str = r#"
    let total = u32(params.out_b * params.out_h * params.out_w * params.out_c);
    let idx = gid.x;
    if idx >= total {
        return;
    }
    var rest = i32(idx);
    let c = rest % params.out_c;
    rest = rest / params.out_c;
    let ow = rest % params.out_w;
    rest = rest / params.out_w;
    let oh = rest % params.out_h;
    let b = rest / params.out_h;
    let h_start = oh * params.stride_h - params.pad_top;
    let w_start = ow * params.stride_w - params.pad_left;
"#;

fn bindings(output: PoolOutput) -> String {
    let mut src = String::new();
    src.push_str("@group(0) @binding(0) var<storage, read> Input: InputBuf;\n");
    let mut binding = 1u32;
    if output.emits_values() {
        src.push_str(&format!(
            "@group(0) @binding({binding}) var<storage, read_write> OutValues: ValueBuf;\n"
        ));
        binding += 1;
    }
    if output.emits_indices() {
        src.push_str(&format!(
            "@group(0) @binding({binding}) var<storage, read_write> OutIndices: IndexBuf;\n"
        ));
        binding += 1;
    }
    src.push_str(&format!(
        "@group(0) @binding({binding}) var<uniform> params: Params;\n"
    ));
    src
}

/// Flattened offset of the winning input cell. Batch-inclusive indices fold
/// the batch coordinate in; otherwise the offset is within one batch image.
fn argmax_offset_expr(include_batch: bool) -> &'static str {
    if include_batch {
        "((b * params.in_h + h) * params.in_w + w) * params.out_c + c"
    } else {
        "(h * params.in_w + w) * params.out_c + c"
    }
}

/// Row-major window scan shared by every max variant. Positions outside the
/// input are skipped, never read as zero, and the strictly-greater compare
/// makes the first maximum in scan order win ties.
fn max_scan(include_batch: bool) -> String {
    format!(
        r#"
    var best = -3.4028234e+38;
    var best_index = 0;
    var wh = 0;
    loop {{
        if wh >= params.filter_h {{
            break;
        }}
        let h = h_start + wh;
        if h >= 0 && h < params.in_h {{
            var ww = 0;
            loop {{
                if ww >= params.filter_w {{
                    break;
                }}
                let w = w_start + ww;
                if w >= 0 && w < params.in_w {{
                    let v = Input.data[u32(((b * params.in_h + h) * params.in_w + w) * params.out_c + c)];
                    if v > best {{
                        best = v;
                        best_index = {offset};
                    }}
                }}
                ww = ww + params.dilation_w;
            }}
        }}
        wh = wh + params.dilation_h;
    }}
"#,
        offset = argmax_offset_expr(include_batch)
    )
}

/// Mean over the in-bounds window cells only; padding never contributes to
/// the sum or the divisor.
const AVG_SCAN: &str = r#"
    var sum = 0.0;
    var count = 0;
    var wh = 0;
    loop {
        if wh >= params.filter_h {
            break;
        }
        let h = h_start + wh;
        if h >= 0 && h < params.in_h {
            var ww = 0;
            loop {
                if ww >= params.filter_w {
                    break;
                }
                let w = w_start + ww;
                if w >= 0 && w < params.in_w {
                    sum = sum + Input.data[u32(((b * params.in_h + h) * params.in_w + w) * params.out_c + c)];
                    count = count + 1;
                }
                ww = ww + params.dilation_w;
            }
        }
        wh = wh + params.dilation_h;
    }
    let mean = select(0.0, sum / f32(count), count > 0);
"#;

/// Generate the WGSL source for one pooling program variant with the
/// workgroup size substituted in.
pub fn pool2d_shader(kind: PoolKind, output: PoolOutput, workgroup_size: u32) -> String {
    let mut src = String::new();
    src.push_str(PARAMS_AND_INPUT);
    src.push_str(&bindings(output));
    src.push_str(&format!(
        "\n@compute @workgroup_size({WORKGROUP_SENTINEL})\nfn main(@builtin(global_invocation_id) gid: vec3<u32>) {{\n"
    ));
    src.push_str(DECODE_OUTPUT_POSITION);

    match kind {
        PoolKind::Max => {
            src.push_str(&max_scan(output.include_batch().unwrap_or(false)));
            if output.emits_values() {
                src.push_str("    OutValues.data[idx] = best;\n");
            }
            if output.emits_indices() {
                src.push_str("    OutIndices.data[idx] = best_index;\n");
            }
        }
        PoolKind::Avg => {
            src.push_str(AVG_SCAN);
            src.push_str("    OutValues.data[idx] = mean;\n");
        }
    }

    src.push_str("}\n");
    src.replace(WORKGROUP_SENTINEL, &workgroup_size.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroup_sentinel_is_substituted() {
        let src = pool2d_shader(PoolKind::Max, PoolOutput::Values, 256);
        assert!(!src.contains(WORKGROUP_SENTINEL));
        assert!(src.contains("@workgroup_size(256)"));
    }

    #[test]
    fn batch_flag_changes_the_generated_offset() {
        let batched = pool2d_shader(
            PoolKind::Max,
            PoolOutput::Indices {
                include_batch: true,
            },
            64,
        );
        let unbatched = pool2d_shader(
            PoolKind::Max,
            PoolOutput::Indices {
                include_batch: false,
            },
            64,
        );
        assert_ne!(batched, unbatched);
        assert!(batched.contains("((b * params.in_h + h) * params.in_w + w)"));
        assert!(unbatched.contains("best_index = (h * params.in_w + w) * params.out_c + c;"));
    }

    #[test]
    fn variants_declare_the_right_outputs() {
        let values = pool2d_shader(PoolKind::Max, PoolOutput::Values, 64);
        assert!(values.contains("OutValues"));
        assert!(!values.contains("OutIndices"));
        assert!(values.contains("@binding(2) var<uniform>"));

        let combined = pool2d_shader(
            PoolKind::Max,
            PoolOutput::ValuesAndIndices {
                include_batch: false,
            },
            64,
        );
        assert!(combined.contains("@binding(1) var<storage, read_write> OutValues"));
        assert!(combined.contains("@binding(2) var<storage, read_write> OutIndices"));
        assert!(combined.contains("@binding(3) var<uniform>"));

        let avg = pool2d_shader(PoolKind::Avg, PoolOutput::Values, 64);
        assert!(avg.contains("sum / f32(count)"));
        assert!(!avg.contains("OutIndices"));
    }
}
